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

//! The local store of raw messages.
//!
//! The store is a Maildir++ tree: each folder is a directory named `.`
//! followed by the folder id with `/` replaced by `.`, holding the usual
//! `tmp`, `new` and `cur` subdirectories. Messages are stored exactly as
//! downloaded (modulo line endings) and are never rewritten.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::support::error::Error;
use crate::support::file_ops::{spit, IgnoreKinds};
use crate::support::safe_name::maildir_folder_name;

/// Flags given to every stored message (seen).
const INFO_SUFFIX: &str = ":2,S";
const SEQUENCE_DIGITS: usize = 10;

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    next_sequence: HashMap<String, u32>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore {
            root: root.into(),
            next_sequence: HashMap::new(),
        }
    }

    /// The directory holding the given folder.
    pub fn folder_path(&self, folder_id: &str) -> Result<PathBuf, Error> {
        Ok(self.root.join(maildir_folder_name(folder_id)?))
    }

    /// Atomically add `data` as a new message in `folder_id`, creating the
    /// folder if needed.
    ///
    /// Returns the path of the new message.
    pub fn append(
        &mut self,
        folder_id: &str,
        data: &[u8],
    ) -> Result<PathBuf, Error> {
        let folder = self.folder_path(folder_id)?;
        for sub in &["tmp", "new", "cur"] {
            fs::create_dir_all(folder.join(sub)).ignore_already_exists()?;
        }

        let mut sequence = match self.next_sequence.get(folder_id) {
            Some(&sequence) => sequence,
            None => last_sequence(&folder.join("cur"))? + 1,
        };

        loop {
            let path = folder.join("cur").join(format!(
                "{:0width$}{}",
                sequence,
                INFO_SUFFIX,
                width = SEQUENCE_DIGITS
            ));

            match spit(folder.join("tmp"), &path, false, 0o600, data) {
                Ok(()) => {
                    debug!("Stored message as {}", path.display());
                    self.next_sequence
                        .insert(folder_id.to_owned(), sequence + 1);
                    return Ok(path);
                },
                // Something else wrote to the folder; skip past it
                Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                    sequence += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// List every message in `folder_id`.
    ///
    /// Messages stored by `append` come first, in the order they were
    /// stored, followed by anything other tools put in `cur` or `new`,
    /// ordered by file name. A folder which does not exist locally is
    /// empty.
    pub fn list(&self, folder_id: &str) -> Result<Vec<PathBuf>, Error> {
        let folder = self.folder_path(folder_id)?;
        let mut entries = Vec::<(bool, String, PathBuf)>::new();

        for sub in &["cur", "new"] {
            let readdir = match fs::read_dir(folder.join(sub)) {
                Ok(readdir) => readdir,
                Err(e) if io::ErrorKind::NotFound == e.kind() => continue,
                Err(e) => return Err(e.into()),
            };

            for entry in readdir {
                let entry = entry?;
                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                if name.starts_with('.') || !entry.file_type()?.is_file() {
                    continue;
                }

                entries.push((
                    parse_sequence(&name).is_none(),
                    name,
                    entry.path(),
                ));
            }
        }

        entries.sort();
        Ok(entries.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Read a message found by `list`.
    pub fn read(&self, path: &Path) -> Result<Vec<u8>, Error> {
        Ok(fs::read(path)?)
    }
}

fn parse_sequence(name: &str) -> Option<u32> {
    let digits = name.strip_suffix(INFO_SUFFIX)?;
    if SEQUENCE_DIGITS != digits.len()
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    digits.parse().ok()
}

fn last_sequence(cur: &Path) -> Result<u32, Error> {
    let mut last = 0;
    for entry in fs::read_dir(cur)? {
        let entry = entry?;
        if let Some(sequence) =
            entry.file_name().to_str().and_then(parse_sequence)
        {
            last = last.max(sequence);
        }
    }

    Ok(last)
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn append_and_list() {
        let root = TempDir::new().unwrap();
        let mut store = LocalStore::new(root.path());

        assert!(store.list("INBOX/Sent").unwrap().is_empty());

        let first = store.append("INBOX/Sent", b"first").unwrap();
        let second = store.append("INBOX/Sent", b"second").unwrap();
        assert_eq!(
            root.path().join(".INBOX.Sent/cur/0000000001:2,S"),
            first
        );
        assert_eq!(
            root.path().join(".INBOX.Sent/cur/0000000002:2,S"),
            second
        );
        assert!(root.path().join(".INBOX.Sent/new").is_dir());
        assert!(root.path().join(".INBOX.Sent/tmp").is_dir());

        let listed = store.list("INBOX/Sent").unwrap();
        assert_eq!(vec![first.clone(), second], listed);
        assert_eq!(b"first", &store.read(&first).unwrap()[..]);
        assert!(store.list("INBOX").unwrap().is_empty());
    }

    #[test]
    fn sequence_continues_across_instances() {
        let root = TempDir::new().unwrap();
        LocalStore::new(root.path()).append("INBOX", b"1").unwrap();
        LocalStore::new(root.path()).append("INBOX", b"2").unwrap();

        let store = LocalStore::new(root.path());
        assert_eq!(
            vec!["0000000001:2,S", "0000000002:2,S"],
            names(&store.list("INBOX").unwrap())
        );
    }

    #[test]
    fn foreign_files_are_listed_last() {
        let root = TempDir::new().unwrap();
        let mut store = LocalStore::new(root.path());
        store.append("INBOX", b"mine").unwrap();

        let folder = root.path().join(".INBOX");
        fs::write(folder.join("new/1600000000.M1P2.host"), b"a").unwrap();
        fs::write(folder.join("cur/1500000000.M1P2.host:2,S"), b"b").unwrap();
        fs::write(folder.join("cur/.hidden"), b"c").unwrap();

        store.append("INBOX", b"mine too").unwrap();
        assert_eq!(
            vec![
                "0000000001:2,S",
                "0000000002:2,S",
                "1500000000.M1P2.host:2,S",
                "1600000000.M1P2.host",
            ],
            names(&store.list("INBOX").unwrap())
        );
    }

    #[test]
    fn awkward_folder_ids_get_their_own_directories() {
        let root = TempDir::new().unwrap();
        let mut store = LocalStore::new(root.path());
        store.append("a/b", b"slash").unwrap();
        store.append("a.b", b"dot").unwrap();
        store.append("a\\b", b"backslash").unwrap();

        assert!(root.path().join(".a.b/cur").is_dir());
        assert!(root.path().join(".a%2Eb/cur").is_dir());
        assert!(root.path().join(".a%5Cb/cur").is_dir());
        for (folder, data) in
            &[("a/b", "slash"), ("a.b", "dot"), ("a\\b", "backslash")]
        {
            let paths = store.list(folder).unwrap();
            assert_eq!(1, paths.len());
            assert_eq!(data.as_bytes(), &store.read(&paths[0]).unwrap()[..]);
        }
    }
}
