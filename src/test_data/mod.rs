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

//! Messages used by tests throughout the crate.

/// A plain single-part message with every header the archive looks at.
pub static PLAIN: &[u8] = include_bytes!("plain.eml");

/// A reply to `PLAIN`, with DOS line endings.
pub static REPLY: &[u8] = include_bytes!("reply.eml");

/// A message with no `Message-ID` header.
pub static NO_MESSAGE_ID: &[u8] = include_bytes!("no_message_id.eml");

/// A message with encoded-word headers, a header containing raw ISO-8859-1
/// and a quoted-printable ISO-8859-1 body.
pub static LATIN1: &[u8] = include_bytes!("latin1.eml");

/// A message flagged by SpamAssassin.
pub static SPAM: &[u8] = include_bytes!("spam.eml");

/// A multipart/mixed message with text and HTML alternatives and a CSV
/// attachment.
pub static MULTIPART: &[u8] = include_bytes!("multipart.eml");
