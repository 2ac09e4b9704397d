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

//! Turning the archive into pages.
//!
//! The archive layer hands fully resolved page data to a `Renderer`; the
//! walk over the archive which produces that data is in `site`.

pub mod body;
pub mod html;
pub mod site;

use chrono::prelude::*;

use self::body::MessageBody;
use crate::archive::catalog::FolderDescriptor;
use crate::archive::graph::MessageNode;
use crate::archive::traversal::{Breadcrumb, MenuEntry, ThreadTree};
use crate::support::error::Error;

/// Facts about the run shown on the index page.
#[derive(Clone, Debug)]
pub struct SiteInfo {
    pub server: String,
    pub user: String,
    pub generated: DateTime<Local>,
}

pub struct MessagePage<'a> {
    pub message: &'a MessageNode,
    /// The message as stored.
    pub raw: &'a [u8],
    pub body: &'a MessageBody,
    /// The thread around the message; empty if it is not in a thread.
    pub thread: &'a ThreadTree,
    /// The path to each folder containing the message.
    pub locations: &'a [Vec<Breadcrumb>],
    pub menu: &'a [MenuEntry],
}

pub struct FolderIndex<'a> {
    pub folder: &'a FolderDescriptor,
    /// Newest first.
    pub messages: &'a [&'a MessageNode],
    pub breadcrumbs: &'a [Breadcrumb],
    pub menu: &'a [MenuEntry],
}

pub struct FolderSummary<'a> {
    pub folder: &'a FolderDescriptor,
    pub messages: usize,
}

pub struct ArchiveIndex<'a> {
    pub info: &'a SiteInfo,
    pub folders: &'a [FolderSummary<'a>],
    pub menu: &'a [MenuEntry],
}

/// A sink for the pages of the archive.
pub trait Renderer {
    fn message_page(&mut self, page: &MessagePage<'_>) -> Result<(), Error>;
    fn folder_index(&mut self, index: &FolderIndex<'_>) -> Result<(), Error>;
    fn archive_index(&mut self, index: &ArchiveIndex<'_>)
        -> Result<(), Error>;
}

/// Format a byte count for people, e.g. `1.5 KB`.
pub fn humansize(bytes: u64) -> String {
    const SUFFIXES: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut suffix = 0;
    while size >= 1024.0 && suffix + 1 < SUFFIXES.len() {
        size /= 1024.0;
        suffix += 1;
    }

    let formatted = format!("{:.2}", size);
    let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", formatted, SUFFIXES[suffix])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_humansize() {
        assert_eq!("0 B", humansize(0));
        assert_eq!("1000 B", humansize(1000));
        assert_eq!("1 KB", humansize(1024));
        assert_eq!("1.5 KB", humansize(1536));
        assert_eq!("2.25 MB", humansize(2_359_296));
        assert_eq!("1024 PB", humansize(1 << 60));
    }
}
