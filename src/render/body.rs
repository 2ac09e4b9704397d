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

//! Extracting displayable content from a stored message.
//!
//! This is deliberately forgiving: whatever cannot be decoded is noted in
//! `MessageBody::errors` and the page is rendered with what is left.

use std::borrow::Cow;

use lazy_static::lazy_static;
use mailparse::{DispositionType, ParsedMail};
use regex::Regex;
use serde::Serialize;

use crate::mime::encoded_word::decode_charset;
use crate::mime::normalize::{normalize_str, Hint};
use crate::support::safe_name::slugify;

lazy_static! {
    static ref HTML_CRUFT: Vec<Regex> = vec![
        Regex::new(r"(?is)<html[^>]*>.*?<head[^>]*>.*?</head>.*?<body[^>]*>")
            .unwrap(),
        Regex::new(r"(?is)<base\s[^>]*>").unwrap(),
        Regex::new(r"(?is)</body>.*?</html>").unwrap(),
        Regex::new(r"(?is)<!DOCTYPE[^>]*>").unwrap(),
        Regex::new(r"(?i)position:\s*absolute;").unwrap(),
    ];
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Attachment {
    /// The file name given in the message.
    pub title: String,
    /// A safe file name for storing the attachment.
    pub slug: String,
    pub mime_type: String,
    pub size: usize,
    #[serde(skip)]
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessageBody {
    /// All `text/plain` parts, concatenated.
    pub text: String,
    /// All `text/html` parts, concatenated, with document wrappers removed.
    pub html: String,
    pub attachments: Vec<Attachment>,
    /// Problems encountered decoding the message.
    pub errors: Vec<String>,
}

impl MessageBody {
    pub fn extract(raw: &[u8]) -> Self {
        let mut body = MessageBody::default();
        match mailparse::parse_mail(raw) {
            Ok(parsed) => body.collect_parts(&parsed),
            Err(e) => body.errors.push(format!("Cannot parse message: {}", e)),
        }

        if !body.html.is_empty() {
            body.html = strip_html_cruft(&body.html).into_owned();
        }
        body
    }

    /// The view of the message to show first.
    pub fn default_view(&self) -> &'static str {
        if !self.html.is_empty() {
            "html"
        } else if !self.text.is_empty() {
            "text"
        } else {
            "raw"
        }
    }

    fn collect_parts(&mut self, part: &ParsedMail<'_>) {
        if !part.subparts.is_empty() {
            for subpart in &part.subparts {
                self.collect_parts(subpart);
            }
            return;
        }

        let mime_type = part.ctype.mimetype.to_ascii_lowercase();
        if mime_type.starts_with("multipart/") {
            return;
        }

        let disposition = part.get_content_disposition();
        let explicit_attachment =
            matches!(disposition.disposition, DispositionType::Attachment);
        let is_text = "text/plain" == mime_type || "text/html" == mime_type;

        if is_text && !explicit_attachment {
            let text = match part.get_body_raw() {
                Ok(raw) => decode_text(&part.ctype.charset, &raw),
                Err(e) => {
                    self.errors.push(format!(
                        "Cannot decode {} part: {}",
                        mime_type, e
                    ));
                    return;
                },
            };

            if "text/plain" == mime_type {
                self.text.push_str(&text);
            } else {
                self.html.push_str(&text);
            }
            return;
        }

        let has_disposition = part.headers.iter().any(|h| {
            h.get_key_ref().eq_ignore_ascii_case("Content-Disposition")
        });
        if !explicit_attachment
            && !has_disposition
            && !part.ctype.params.contains_key("name")
        {
            return;
        }

        let content = match part.get_body_raw() {
            Ok(content) => content,
            Err(e) => {
                self.errors.push(format!("Cannot decode attachment: {}", e));
                return;
            },
        };
        if content.is_empty() {
            return;
        }

        let default_name = format!("no-name-{}", self.attachments.len() + 1);
        let title = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .map(|name| normalize_str(Some(name), Hint::Header))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_name.clone());

        self.attachments.push(Attachment {
            slug: attachment_slug(&title, &default_name),
            title,
            mime_type,
            size: content.len(),
            content,
        });
    }
}

fn decode_text(charset: &str, raw: &[u8]) -> String {
    decode_charset(charset, raw)
        .unwrap_or_else(|| String::from_utf8_lossy(raw))
        .into_owned()
}

/// Produce a file name for an attachment: the slug of the name, followed by
/// the lower-cased extension if there is one.
pub fn attachment_slug(name: &str, default: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => format!(
            "{}.{}",
            slugify(&name[..dot], default),
            slugify(&name[dot + 1..], "bin"),
        ),
        _ => slugify(name, default),
    }
}

/// Remove the parts of an HTML document which make no sense when it is
/// embedded into another page.
pub fn strip_html_cruft(html: &str) -> Cow<'_, str> {
    let mut html = Cow::Borrowed(html);
    for re in HTML_CRUFT.iter() {
        if let Cow::Owned(replaced) = re.replace_all(&html, "") {
            html = Cow::Owned(replaced);
        }
    }
    html
}
