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

//! The capability the archive needs from a remote mail server.
//!
//! The sync engine only ever talks to a `Transport`; how that is backed
//! (IMAP over TLS in production, an in-memory fake in tests) is up to the
//! `Connector` that produced it.

use thiserror::Error;

/// Identifies a message within one folder of one session.
///
/// For IMAP this is the message sequence number.
pub type RemoteId = u32;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection went away. A fresh connection may succeed.
    #[error("Connection to server lost: {0}")]
    Aborted(String),
    #[error("No such folder: {0}")]
    NoSuchFolder(String),
    /// The server understood the request and refused it.
    #[error("Server rejected request: {0}")]
    Rejected(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("TLS error: {0}")]
    Tls(String),
}

/// The folders on the server, in the order the server listed them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderListing {
    pub folders: Vec<String>,
    /// The hierarchy delimiter. Empty if the server has a flat namespace.
    pub separator: String,
}

pub trait Transport {
    fn list_folders(&mut self) -> Result<FolderListing, TransportError>;

    /// List every message currently in `folder`, in server order.
    fn list_message_ids(
        &mut self,
        folder: &str,
    ) -> Result<Vec<RemoteId>, TransportError>;

    /// Fetch the full RFC 822 representation of one message.
    fn fetch_raw(
        &mut self,
        folder: &str,
        id: RemoteId,
    ) -> Result<Vec<u8>, TransportError>;
}

/// Establishes new `Transport` sessions, both initially and to recover from
/// `TransportError::Aborted`.
pub trait Connector {
    type Transport: Transport;

    fn connect(&mut self) -> Result<Self::Transport, TransportError>;
}
