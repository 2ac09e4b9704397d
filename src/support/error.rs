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

use std::io;

use thiserror::Error;

use crate::archive::transport::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsafe folder name: {0}")]
    UnsafeName(String),
    #[error("Invalid folder selection pattern '{0}': {1}")]
    BadSelectPattern(String, regex::Error),
    #[error("Message has no parseable header block")]
    NoHeaders,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Template(#[from] minijinja::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the connection to the server went away and
    /// the operation may succeed on a fresh connection.
    pub fn is_transport_abort(&self) -> bool {
        matches!(*self, Error::Transport(TransportError::Aborted(..)))
    }
}
