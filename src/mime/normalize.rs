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

//! The header normalizer: turns raw header and folder-name bytes into
//! readable text.
//!
//! Normalisation never fails. Whatever cannot be decoded is replaced or
//! passed through, so callers always get something they can display.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use super::encoded_word::{decode_charset, decode_encoded_words};
use super::utf7;

/// How the raw bytes given to `normalize` are encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hint<'a> {
    /// A message header value, possibly containing RFC 2047 encoded words
    /// and possibly in some 8-bit legacy charset.
    Header,
    /// An IMAP folder name in modified UTF-7 (RFC 3501 5.1.3).
    Utf7,
    /// Text known to be in the named character set.
    Charset(&'a str),
}

/// Decode `raw` into a displayable string.
///
/// `None` (a missing header) normalises to the empty string. The result
/// never contains line breaks or other control characters, and has no
/// leading or trailing whitespace. Normalising an already-normalised value
/// with `Hint::Header` returns it unchanged.
///
/// Path separators are display text here and are kept. Anything bound for
/// a file name goes through `slugify`, and folder titles are decoded one
/// path segment at a time by the catalog, which also replaces encoded
/// separators.
pub fn normalize(raw: Option<&[u8]>, hint: Hint<'_>) -> String {
    let raw = match raw {
        Some(raw) => raw,
        None => return String::new(),
    };

    let decoded = match hint {
        Hint::Header => {
            let text = sniff_encoding(raw).decode_without_bom_handling(raw).0;
            Cow::Owned(decode_encoded_words(&text).into_owned())
        },
        Hint::Utf7 => {
            let text = String::from_utf8_lossy(raw);
            Cow::Owned(utf7::IMAP.decode(&text).into_owned())
        },
        Hint::Charset(charset) => decode_charset(charset, raw)
            .unwrap_or_else(|| String::from_utf8_lossy(raw)),
    };

    clean(&decoded)
}

/// Like `normalize`, but for text which has already been read as a string.
pub fn normalize_str(raw: Option<&str>, hint: Hint<'_>) -> String {
    normalize(raw.map(str::as_bytes), hint)
}

/// Guess the encoding of 8-bit text which came with no declaration.
///
/// Anything which is valid UTF-8 is taken to be UTF-8; everything else is
/// assumed to be Windows-1252, which never fails to decode and is the usual
/// culprit for undeclared 8-bit mail.
pub fn sniff_encoding(raw: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(raw) {
        return encoding;
    }

    if std::str::from_utf8(raw).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

fn clean(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars() {
        if ch.is_control() || ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn missing_is_empty() {
        assert_eq!("", normalize(None, Hint::Header));
        assert_eq!("", normalize(None, Hint::Utf7));
        assert_eq!("", normalize(None, Hint::Charset("utf-8")));
    }

    #[test]
    fn headers() {
        assert_eq!(
            "Hello world",
            normalize(Some(b"  Hello\r\n\tworld  "), Hint::Header)
        );
        assert_eq!(
            "Grüße aus Köln",
            normalize(
                Some(b"=?ISO-8859-1?Q?Gr=FC=DFe?= aus =?utf-8?B?S8O2bG4=?="),
                Hint::Header
            )
        );
        assert_eq!(
            "café",
            normalize(Some("café".as_bytes()), Hint::Header)
        );
        // Undeclared Latin-1
        assert_eq!("café", normalize(Some(b"caf\xE9"), Hint::Header));
        // Unknown charsets are left alone rather than lost
        assert_eq!(
            "=?x-unknown?Q?abc?=",
            normalize(Some(b"=?x-unknown?Q?abc?="), Hint::Header)
        );
    }

    #[test]
    fn folder_names() {
        assert_eq!("Entwürfe", normalize(Some(b"Entw&APw-rfe"), Hint::Utf7));
        assert_eq!("INBOX/Sent", normalize(Some(b"INBOX/Sent"), Hint::Utf7));
        assert_eq!("a&b", normalize(Some(b"a&-b"), Hint::Utf7));
    }

    #[test]
    fn charsets() {
        assert_eq!(
            "Grüße",
            normalize(Some(b"Gr\xFC\xDFe"), Hint::Charset("iso-8859-1"))
        );
        assert_eq!(
            "x\u{FFFD}",
            normalize(Some(b"x\xFF"), Hint::Charset("no-such-charset"))
        );
    }

    #[test]
    fn test_sniff_encoding() {
        assert_eq!(UTF_8, sniff_encoding(b"plain"));
        assert_eq!(UTF_8, sniff_encoding("ü".as_bytes()));
        assert_eq!(WINDOWS_1252, sniff_encoding(b"\xFC"));
        assert_eq!(UTF_8, sniff_encoding(b"\xEF\xBB\xBFx"));
    }

    proptest! {
        #[test]
        fn normalisation_is_stable(s in ".*") {
            let once = normalize(Some(s.as_bytes()), Hint::Header);
            let twice = normalize(Some(once.as_bytes()), Hint::Header);
            prop_assert_eq!(&once, &twice);
            prop_assert!(!once.contains('\n'));
            prop_assert_eq!(once.trim(), &once[..]);
        }
    }
}
