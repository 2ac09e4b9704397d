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

//! RFC 2047 "encoded words" in header values.

use std::borrow::Cow;
use std::str;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

use super::quoted_printable::qp_decode;
use super::utf7;

lazy_static! {
    // RFC 2047 limits encoded words to 75 characters. Plenty of agents
    // produce longer ones and other clients accept them, so no limit is
    // applied here.
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]*)\?([bBqQ])\?([^?\s]*)\?=").unwrap();
}

/// Decode every encoded word in `value`, leaving the rest of the text alone.
///
/// Whitespace between two adjacent encoded words is deleted, as RFC 2047
/// requires; whitespace anywhere else is kept. Encoded words which cannot be
/// decoded (unknown charset, bad base64) are left in their encoded form.
pub fn decode_encoded_words(value: &str) -> Cow<str> {
    if !value.contains("=?") {
        return Cow::Borrowed(value);
    }

    let mut decoded = String::with_capacity(value.len());
    let mut last_end = 0;
    let mut last_was_word = false;
    for captures in ENCODED_WORD.captures_iter(value) {
        let whole = captures.get(0).unwrap();
        let gap = &value[last_end..whole.start()];
        let word = decode_parts(
            captures.get(1).unwrap().as_str(),
            captures.get(2).unwrap().as_str(),
            captures.get(3).unwrap().as_str(),
        );

        match word {
            Some(word) => {
                if !(last_was_word && gap.trim().is_empty()) {
                    decoded.push_str(gap);
                }
                decoded.push_str(&word);
                last_was_word = true;
            },
            None => {
                decoded.push_str(gap);
                decoded.push_str(whole.as_str());
                last_was_word = false;
            },
        }

        last_end = whole.end();
    }

    decoded.push_str(&value[last_end..]);
    Cow::Owned(decoded)
}

fn decode_parts(
    charset: &str,
    transfer_encoding: &str,
    content: &str,
) -> Option<String> {
    // RFC 2231 allows a language suffix on the charset
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match transfer_encoding {
        "q" | "Q" => {
            // _ in the content stands for ASCII space regardless of charset
            let content = content.replace('_', " ");
            qp_decode(content.as_bytes()).into_owned()
        },
        _ => base64::decode_config(
            content,
            base64::STANDARD.decode_allow_trailing_bits(true),
        )
        .ok()?,
    };

    decode_charset(charset, &bytes).map(Cow::into_owned)
}

/// Decode `content` in the named character set.
///
/// Returns `None` if the character set is unknown. Malformed sequences in a
/// known character set are replaced with U+FFFD.
pub fn decode_charset<'a>(
    charset: &str,
    content: &'a [u8],
) -> Option<Cow<'a, str>> {
    // encoding_rs doesn't do UTF-7...
    if "utf-7".eq_ignore_ascii_case(charset) {
        let s = String::from_utf8_lossy(content);
        Some(Cow::Owned(utf7::STD.decode(&s).into_owned()))
    } else {
        // ... but it does everything else browsers care about
        Some(
            Encoding::for_label_no_replacement(charset.trim().as_bytes())?
                .decode_with_bom_removal(content)
                .0,
        )
    }
}
