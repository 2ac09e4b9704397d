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

//! The folder catalog: which remote folders exist, which are archived and
//! how they nest.

use std::collections::HashMap;

use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::mime::normalize::{normalize_str, Hint};
use crate::support::archive_config::SELECT_ALL;
use crate::support::error::Error;
use crate::support::safe_name::slugify;

/// One remote folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FolderDescriptor {
    /// The folder's path as the server names it. Unique.
    pub id: String,
    /// The last path segment, decoded for display.
    pub title: String,
    /// The id of the containing folder, or empty for a top-level folder.
    pub parent_id: String,
    /// Whether the folder is archived.
    pub selected: bool,
    pub slug: String,
    /// 1-based position in the server's listing, excluded folders not
    /// counted.
    pub sequence: u32,
}

impl FolderDescriptor {
    /// The name of the folder's index page.
    pub fn file_name(&self) -> String {
        format!("{:03}-{}.html", self.sequence, self.slug)
    }
}

/// Every non-excluded remote folder, in server order.
#[derive(Clone, Debug, Default)]
pub struct FolderCatalog {
    folders: Vec<FolderDescriptor>,
    index: HashMap<String, usize>,
}

impl FolderCatalog {
    /// Build the catalog from the server's folder listing.
    ///
    /// Folders named exactly in `excluded` are dropped entirely. A folder is
    /// selected if its id matches one of `select_patterns` in full, or if
    /// `select_patterns` contains `--all`.
    ///
    /// If exactly one folder ends up at the top level, it is removed and its
    /// children become top-level folders; a lone root (usually `INBOX`) does
    /// not make for useful navigation.
    pub fn build(
        remote_folders: &[String],
        separator: &str,
        excluded: &[String],
        select_patterns: &[String],
    ) -> Result<Self, Error> {
        let select_all =
            select_patterns.iter().any(|p| p.as_str() == SELECT_ALL);
        let select_patterns = select_patterns
            .iter()
            .filter(|p| p.as_str() != SELECT_ALL)
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p))
                    .map_err(|e| Error::BadSelectPattern(p.clone(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut catalog = FolderCatalog::default();
        for id in remote_folders {
            if id.is_empty()
                || excluded.contains(id)
                || catalog.index.contains_key(id)
            {
                continue;
            }

            let (parent_id, last) = match separator {
                "" => ("", &id[..]),
                sep => match id.rfind(sep) {
                    Some(ix) => (&id[..ix], &id[ix + sep.len()..]),
                    None => ("", &id[..]),
                },
            };

            let sequence = catalog.folders.len() as u32 + 1;
            catalog.push(FolderDescriptor {
                id: id.clone(),
                title: folder_title(last, separator),
                parent_id: parent_id.to_owned(),
                selected: select_all
                    || select_patterns.iter().any(|p| p.is_match(id)),
                slug: slugify(&normalize_str(Some(id), Hint::Utf7), "folder"),
                sequence,
            });
        }

        catalog.collapse_root();
        Ok(catalog)
    }

    fn push(&mut self, folder: FolderDescriptor) {
        self.index.insert(folder.id.clone(), self.folders.len());
        self.folders.push(folder);
    }

    fn collapse_root(&mut self) {
        let mut roots = self.folders.iter().filter(|f| f.parent_id.is_empty());
        let root_id = match (roots.next(), roots.next()) {
            (Some(root), None) => root.id.clone(),
            _ => return,
        };

        debug!("Collapsing lone root folder {}", root_id);
        let folders = std::mem::take(&mut self.folders);
        self.index.clear();
        for mut folder in folders {
            if folder.id == root_id {
                continue;
            }
            if folder.parent_id == root_id {
                folder.parent_id.clear();
            }
            self.push(folder);
        }
    }

    pub fn get(&self, id: &str) -> Option<&FolderDescriptor> {
        self.index.get(id).map(|&ix| &self.folders[ix])
    }

    /// Iterate all folders in sequence order.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &FolderDescriptor> + '_ {
        self.folders.iter()
    }

    /// Iterate the selected folders in sequence order.
    pub fn selected(&self) -> impl Iterator<Item = &FolderDescriptor> + '_ {
        self.folders.iter().filter(|f| f.selected)
    }

    /// Iterate the folders whose parent is `parent_id`, in sequence order.
    pub fn children<'a>(
        &'a self,
        parent_id: &'a str,
    ) -> impl Iterator<Item = &'a FolderDescriptor> + 'a {
        self.folders.iter().filter(move |f| f.parent_id == parent_id)
    }

    /// Look up the parent of `folder`, if it has one in the catalog.
    pub fn parent(
        &self,
        folder: &FolderDescriptor,
    ) -> Option<&FolderDescriptor> {
        if folder.parent_id.is_empty() {
            None
        } else {
            self.get(&folder.parent_id)
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.folders.len()
    }
}

/// Decode one path segment of a folder id for display.
///
/// A segment can spell the separator in modified UTF-7 (`&AC8-` is `/`);
/// it is replaced with a space so titles never look like paths.
fn folder_title(segment: &str, separator: &str) -> String {
    let title = normalize_str(Some(segment), Hint::Utf7);
    if separator.is_empty() || !title.contains(separator) {
        title
    } else {
        normalize_str(Some(&title.replace(separator, " ")), Hint::Header)
    }
}
