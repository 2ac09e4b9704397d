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

/// A configuration of UTF-7.
#[derive(Clone, Copy, Debug)]
pub struct Utf7 {
    shift_in: u8,
    base64: base64::Config,
    ch_63: u8,
}

/// Standard UTF-7, as set by RFC 2152.
///
/// This shows up as a MIME charset now and then.
pub const STD: Utf7 = Utf7 {
    shift_in: b'+',
    base64: base64::STANDARD_NO_PAD,
    ch_63: b'/',
};

/// IMAP's "modified UTF-7", as set by RFC 3501, used for folder names.
pub const IMAP: Utf7 = Utf7 {
    shift_in: b'&',
    base64: base64::IMAP_MUTF7,
    ch_63: b',',
};

impl Utf7 {
    /// Decode the given string from UTF-7.
    ///
    /// Decoding is extremely permissive and never fails. 8-bit characters are
    /// passed through. Unnecessary shift sequences are accepted, the shift-out
    /// `-` is optional, and a shift sequence whose base64 cannot be decoded is
    /// passed through verbatim.
    pub fn decode<'a>(&self, s: &'a str) -> Cow<'a, str> {
        let bytes = s.as_bytes();
        if !bytes.contains(&self.shift_in) {
            return Cow::Borrowed(s);
        }

        let mut decoded = String::with_capacity(s.len());
        let mut ix = 0;
        while ix < bytes.len() {
            let start = match memchr::memchr(self.shift_in, &bytes[ix..]) {
                Some(offset) => ix + offset,
                None => {
                    decoded.push_str(&s[ix..]);
                    break;
                },
            };

            decoded.push_str(&s[ix..start]);

            let run_start = start + 1;
            let run_end = bytes[run_start..]
                .iter()
                .position(|&ch| !self.is_base64_char(ch))
                .map_or(bytes.len(), |offset| run_start + offset);
            // The shift-out character is swallowed if present
            let resume = if Some(&b'-') == bytes.get(run_end) {
                run_end + 1
            } else {
                run_end
            };

            if run_start == run_end {
                // Either the `&-` escape or a stray shift character
                decoded.push(self.shift_in.into());
                ix = resume;
            } else if let Some(run) =
                self.decode_run(&bytes[run_start..run_end])
            {
                decoded.push_str(&run);
                ix = resume;
            } else {
                decoded.push(self.shift_in.into());
                ix = run_start;
            }
        }

        Cow::Owned(decoded)
    }

    fn decode_run(&self, run: &[u8]) -> Option<String> {
        let utf16_be = base64::decode_config(
            run,
            self.base64.decode_allow_trailing_bits(true),
        )
        .ok()?;

        let utf16 = utf16_be
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect::<Vec<_>>();
        Some(String::from_utf16_lossy(&utf16))
    }

    fn is_base64_char(&self, ch: u8) -> bool {
        ch.is_ascii_alphanumeric() || ch == b'+' || ch == self.ch_63
    }
}
