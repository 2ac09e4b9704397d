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

//! Deriving the identity of a message from its headers.
//!
//! The sync engine and the graph builder must agree exactly on what a
//! message's id is, or the same message would appear under two identities.
//! Both go through `MessageIdentity::derive`.

use std::fmt::Write as _;

use chrono::prelude::*;
use tiny_keccak::{Hasher, Sha3};

use crate::mime::envelope::Envelope;

/// Subject used for messages that have none.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Subject shown for a message that is replied to but is not in the archive.
pub const NOT_FOUND_SUBJECT: &str = "(mail not found)";

/// The date assumed for messages with a missing or unparseable `Date`.
pub fn sentinel_date() -> DateTime<FixedOffset> {
    // Infallible: zero is always a valid offset and the date is fixed
    Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0)
        .single()
        .map(|dt| dt.fixed_offset())
        .unwrap_or_default()
}

/// The identity of one stored message, with its defaults applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageIdentity {
    /// The `Message-ID`, or the fallback id if there is none.
    pub id: String,
    /// Hex hash of `id`, used in file names.
    pub id_hash: String,
    /// The `In-Reply-To` message id, if any.
    pub parent_id: Option<String>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: DateTime<FixedOffset>,
}

impl MessageIdentity {
    pub fn derive(envelope: &Envelope) -> Self {
        let subject = if envelope.subject.is_empty() {
            NO_SUBJECT.to_owned()
        } else {
            envelope.subject.clone()
        };
        let date = envelope.date.unwrap_or_else(sentinel_date);

        let (id, id_hash) = match envelope.message_id {
            Some(ref id) => (id.clone(), hash_hex(id.as_bytes())),
            None => {
                let id =
                    fallback_id(&subject, date, &envelope.from, &envelope.to);
                (id.clone(), id)
            },
        };

        MessageIdentity {
            id,
            id_hash,
            parent_id: envelope.in_reply_to.clone(),
            subject,
            from: envelope.from.clone(),
            to: envelope.to.clone(),
            date,
        }
    }

    /// The directory, relative to the site root, the message's page and
    /// attachments go in.
    pub fn date_dir(&self) -> String {
        date_dir(self.date)
    }

    /// The path of the message's page relative to the site root.
    pub fn file_ref(&self) -> String {
        format!("{}/{}.html", self.date_dir(), self.id_hash)
    }
}

/// The `YYYY/MM/DD` bucket for `date`, in the date's own zone.
pub fn date_dir(date: DateTime<FixedOffset>) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Compute the id of a message with no `Message-ID`.
///
/// This is a 128-bit hash over the (defaulted) subject, date, from and to,
/// so it is the same on every run.
pub fn fallback_id(
    subject: &str,
    date: DateTime<FixedOffset>,
    from: &str,
    to: &str,
) -> String {
    hash_hex(
        format!(
            "{} {} {} {}",
            subject,
            date.format("%Y-%m-%d %H:%M:%S %z"),
            from,
            to
        )
        .as_bytes(),
    )
}

/// SHA-3 of `data`, truncated to 128 bits, in lowercase hex.
fn hash_hex(data: &[u8]) -> String {
    let mut sha3 = Sha3::v256();
    sha3.update(data);
    let mut hash = [0u8; 32];
    sha3.finalize(&mut hash);

    let mut s = String::with_capacity(32);
    for &b in &hash[..16] {
        let _ = write!(s, "{:02x}", b);
    }
    s
}
