//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mail Archiver.
//
// Mail Archiver is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mail Archiver is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Mail Archiver. If not, see <http://www.gnu.org/licenses/>.

use std::borrow::Cow;

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line breaks (UNIX or DOS) are handled, the latter by
/// discarding.
///
/// This never fails. Invalid or truncated escape sequences are passed through
/// untransformed, as are 8-bit characters.
pub fn qp_decode(s: &[u8]) -> Cow<[u8]> {
    if !s.contains(&b'=') {
        return Cow::Borrowed(s);
    }

    let mut decoded = Vec::with_capacity(s.len());
    let mut ix = 0;
    while ix < s.len() {
        let b = s[ix];
        if b'=' != b {
            decoded.push(b);
            ix += 1;
            continue;
        }

        let rest = &s[ix + 1..];
        if rest.starts_with(b"\n") {
            ix += 2;
        } else if rest.starts_with(b"\r\n") {
            ix += 3;
        } else if let Some(byte) = rest.get(..2).and_then(hex_byte) {
            decoded.push(byte);
            ix += 3;
        } else {
            decoded.push(b'=');
            ix += 1;
        }
    }

    Cow::Owned(decoded)
}

fn hex_byte(digits: &[u8]) -> Option<u8> {
    let hi = (digits[0] as char).to_digit(16)?;
    let lo = (digits[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_qp(expected: &[u8], input: &[u8]) {
        assert_eq!(expected, &qp_decode(input)[..]);
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"hello world");
        assert_qp(b"\xabfoo", b"=ABfoo");
        assert_qp(b"fo\xabo", b"fo=abo");
        assert_qp(b"foo\xab\xcd", b"foo=AB=CD");
        assert_qp(b"foobar", b"foo=\nbar");
        assert_qp(b"foobar", b"foo=\r\nbar");
        assert_qp(b"Keld J\xf8rn", b"Keld J=F8rn");
    }

    #[test]
    fn invalid_sequences_pass_through() {
        assert_qp(b"foo=", b"foo=");
        assert_qp(b"foo=A", b"foo=A");
        assert_qp(b"foo=XYbar", b"foo=XYbar");
        assert_qp(b"a=A", b"a==41");
    }
}
