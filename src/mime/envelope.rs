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

use chrono::prelude::*;

use super::header::{parse_datetime, parse_message_id, HeaderBlock};
use super::normalize::{normalize, Hint};
use crate::support::error::Error;

/// The headers of a message the archive cares about, decoded.
///
/// Missing headers decode to empty strings or `None`; nothing here is
/// defaulted yet, since the defaults are part of message identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: Option<DateTime<FixedOffset>>,
    pub spam_flagged: bool,
}

impl Envelope {
    /// Parse the envelope out of a raw message.
    ///
    /// Only the header section is examined; the body is never decoded.
    pub fn parse(message: &[u8]) -> Result<Self, Error> {
        HeaderBlock::parse(message).map(|headers| Self::from_headers(&headers))
    }

    pub fn from_headers(headers: &HeaderBlock) -> Self {
        let text = |name: &str| normalize(headers.get(name), Hint::Header);

        Envelope {
            message_id: parse_message_id(&text("Message-ID")),
            in_reply_to: parse_message_id(&text("In-Reply-To")),
            subject: text("Subject"),
            from: text("From"),
            to: text("To"),
            date: parse_datetime(&text("Date")),
            spam_flagged: text("X-Spam-Flag").eq_ignore_ascii_case("yes"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::support::chronox::*;
    use crate::test_data::*;

    #[test]
    fn parse_plain() {
        let env = Envelope::parse(PLAIN).unwrap();
        assert_eq!(Some("<plain@example.com>".to_owned()), env.message_id);
        assert_eq!(None, env.in_reply_to);
        assert_eq!("Lunch on Friday?", env.subject);
        assert_eq!("Alice Example <alice@example.com>", env.from);
        assert_eq!("Bob Example <bob@example.net>", env.to);
        assert_eq!(
            Some(
                FixedOffset::eastx(-7 * 3600)
                    .ymd_hmsx(2001, 5, 14, 19, 36, 0)
            ),
            env.date
        );
        assert!(!env.spam_flagged);
    }

    #[test]
    fn parse_reply_with_dos_line_endings() {
        let env = Envelope::parse(REPLY).unwrap();
        assert_eq!(Some("<reply@example.net>".to_owned()), env.message_id);
        assert_eq!(Some("<plain@example.com>".to_owned()), env.in_reply_to);
        assert_eq!("Re: Lunch on Friday?", env.subject);
        assert_eq!("alice@example.com", env.to);
    }

    #[test]
    fn parse_encoded_headers() {
        let env = Envelope::parse(LATIN1).unwrap();
        assert_eq!("Grüße aus Köln", env.subject);
        assert_eq!("Jürgen Müller <juergen@example.de>", env.from);
        assert_eq!("Bärbel <baerbel@example.de>", env.to);
    }

    #[test]
    fn parse_degraded() {
        let env = Envelope::parse(NO_MESSAGE_ID).unwrap();
        assert_eq!(None, env.message_id);
        assert_eq!("Daily report", env.subject);

        let env = Envelope::parse(SPAM).unwrap();
        assert!(env.spam_flagged);

        let env = Envelope::parse(b"Subject: x\nDate: yesterday\n\n").unwrap();
        assert_eq!(None, env.date);
        assert_eq!("", env.from);

        assert!(Envelope::parse(b"no headers at all").is_err());
    }
}
