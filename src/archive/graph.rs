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

//! The message graph: every archived message across all selected folders,
//! linked by reply relationships.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::prelude::*;
use log::{debug, info, warn};

use super::catalog::FolderCatalog;
use super::identity::{MessageIdentity, NOT_FOUND_SUBJECT};
use super::store::LocalStore;
use crate::mime::envelope::Envelope;
use crate::support::error::Error;

/// One logical message, possibly stored in several folders.
///
/// A node that is replied to but was never itself seen is a placeholder: it
/// has no date, no page and no folders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageNode {
    pub id: String,
    pub id_hash: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: Option<DateTime<FixedOffset>>,
    /// The page of the message, relative to the site root.
    pub file_ref: Option<String>,
    /// The ids of the folders containing the message, in the order they
    /// were scanned. No duplicates.
    pub folders: Vec<String>,
    pub parent_id: Option<String>,
    /// The ids of the messages replying to this one, in the order they were
    /// found. Use `MessageGraph::children` for date order.
    pub children: Vec<String>,
    /// The stored copy of the message the node was built from.
    pub source: Option<PathBuf>,
}

impl MessageNode {
    fn placeholder(id: &str) -> Self {
        MessageNode {
            id: id.to_owned(),
            id_hash: String::new(),
            subject: NOT_FOUND_SUBJECT.to_owned(),
            from: String::new(),
            to: String::new(),
            date: None,
            file_ref: None,
            folders: vec![],
            parent_id: None,
            children: vec![],
            source: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.file_ref.is_none()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub placeholders: usize,
    /// Messages which claimed to reply to themselves.
    pub self_references: u32,
    /// Stored messages which could not be parsed at all.
    pub unreadable: u32,
}

#[derive(Clone, Debug, Default)]
pub struct MessageGraph {
    nodes: Vec<MessageNode>,
    index: HashMap<String, usize>,
    self_references: u32,
    unreadable: u32,
}

impl MessageGraph {
    /// Build the graph from everything in the local store belonging to the
    /// selected folders of `catalog`.
    ///
    /// Folders are scanned in catalog order, which determines which copy of
    /// a message provides its details.
    pub fn build(
        catalog: &FolderCatalog,
        store: &LocalStore,
    ) -> Result<Self, Error> {
        let mut graph = MessageGraph::default();

        for folder in catalog.selected() {
            let paths = store.list(&folder.id)?;
            debug!("{}: {} stored messages", folder.title, paths.len());

            for path in paths {
                let raw = store.read(&path)?;
                match Envelope::parse(&raw) {
                    Ok(envelope) => graph.add(
                        &folder.id,
                        &MessageIdentity::derive(&envelope),
                        path,
                    ),
                    Err(e) => {
                        warn!("{}: {}", path.display(), e);
                        graph.unreadable += 1;
                    },
                }
            }
        }

        let stats = graph.stats();
        info!(
            "Message graph: {} messages, {} missing from the archive",
            stats.nodes - stats.placeholders,
            stats.placeholders
        );
        Ok(graph)
    }

    /// Merge one stored message into the graph.
    ///
    /// The first sighting of a message sets its details and parent; later
    /// sightings only add their folder.
    pub fn add(
        &mut self,
        folder_id: &str,
        identity: &MessageIdentity,
        source: PathBuf,
    ) {
        let ix = self.get_or_insert(&identity.id);
        let node = &mut self.nodes[ix];

        let mut parent_id = None;
        if node.is_placeholder() {
            node.id_hash = identity.id_hash.clone();
            node.subject = identity.subject.clone();
            node.from = identity.from.clone();
            node.to = identity.to.clone();
            node.date = Some(identity.date);
            node.file_ref = Some(identity.file_ref());
            node.source = Some(source);

            match identity.parent_id {
                Some(ref parent) if *parent == identity.id => {
                    debug!("{} claims to reply to itself", identity.id);
                    self.self_references += 1;
                },
                Some(ref parent) => {
                    node.parent_id = Some(parent.clone());
                    parent_id = Some(parent);
                },
                None => (),
            }
        }

        let node = &mut self.nodes[ix];
        if !node.folders.iter().any(|f| f == folder_id) {
            node.folders.push(folder_id.to_owned());
        }

        if let Some(parent_id) = parent_id {
            let parent_ix = self.get_or_insert(parent_id);
            let children = &mut self.nodes[parent_ix].children;
            if !children.contains(&identity.id) {
                children.push(identity.id.clone());
            }
        }
    }

    fn get_or_insert(&mut self, id: &str) -> usize {
        if let Some(&ix) = self.index.get(id) {
            return ix;
        }

        let ix = self.nodes.len();
        self.nodes.push(MessageNode::placeholder(id));
        self.index.insert(id.to_owned(), ix);
        ix
    }

    pub fn get(&self, id: &str) -> Option<&MessageNode> {
        self.index.get(id).map(|&ix| &self.nodes[ix])
    }

    /// Iterate all nodes, placeholders included, in the order they were
    /// first referenced.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &MessageNode> + '_ {
        self.nodes.iter()
    }

    /// Iterate the messages stored in `folder_id`.
    pub fn in_folder<'a>(
        &'a self,
        folder_id: &'a str,
    ) -> impl Iterator<Item = &'a MessageNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.folders.iter().any(|f| f == folder_id))
    }

    /// The replies to `id`, oldest first.
    ///
    /// Ties are broken by id so the order does not depend on scan order.
    pub fn children(&self, id: &str) -> Vec<&MessageNode> {
        let mut children: Vec<&MessageNode> = self
            .get(id)
            .map(|node| {
                node.children.iter().filter_map(|c| self.get(c)).collect()
            })
            .unwrap_or_default();
        children.sort_by(|a, b| (a.date, &a.id).cmp(&(b.date, &b.id)));
        children
    }

    /// Find the root of the thread containing `id`, by following parent
    /// links as far as they go.
    ///
    /// Returns `None` if the message is not part of any thread (no parent
    /// and no replies) or is unknown. If the parent links loop, the last
    /// message before the loop closes is taken as the root.
    pub fn thread_root(&self, id: &str) -> Option<&MessageNode> {
        let mut node = self.get(id)?;
        if node.parent_id.is_none() && node.children.is_empty() {
            return None;
        }

        let mut visited = HashSet::new();
        visited.insert(&node.id[..]);
        while let Some(parent) =
            node.parent_id.as_ref().and_then(|p| self.get(p))
        {
            if !visited.insert(&parent.id[..]) {
                warn!("Reply cycle through {}", parent.id);
                break;
            }
            node = parent;
        }

        Some(node)
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            placeholders: self
                .nodes
                .iter()
                .filter(|n| n.is_placeholder())
                .count(),
            self_references: self.self_references,
            unreadable: self.unreadable,
        }
    }
}
