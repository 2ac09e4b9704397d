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

//! Read-only walks over the folder catalog and the message graph which
//! produce what the pages need for navigation.

use std::collections::HashSet;

use chrono::prelude::*;
use log::warn;
use serde::Serialize;

use super::catalog::FolderCatalog;
use super::graph::MessageGraph;

/// One step of the path from the top level to a folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub title: String,
    /// The folder's index page, if the folder is archived.
    pub link: Option<String>,
}

/// Compute the path from the top level down to `folder_id`.
///
/// The walk stops at the first folder whose parent is not in the catalog.
/// Returns an empty path for an unknown folder.
pub fn breadcrumb_path(
    catalog: &FolderCatalog,
    folder_id: &str,
) -> Vec<Breadcrumb> {
    let mut path = Vec::new();
    let mut current = catalog.get(folder_id);
    // Terminates since a parent id is always shorter than the child's id
    while let Some(folder) = current {
        path.push(Breadcrumb {
            title: folder.title.clone(),
            link: if folder.selected {
                Some(folder.file_name())
            } else {
                None
            },
        });
        current = catalog.parent(folder);
    }

    path.reverse();
    path
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MenuEntry {
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    pub children: Vec<MenuEntry>,
}

/// Build the navigation tree of the folders below `current_parent` (the
/// empty string for the whole catalog).
///
/// Each level is sorted by title.
pub fn folder_menu(
    catalog: &FolderCatalog,
    current_parent: &str,
) -> Vec<MenuEntry> {
    let mut entries: Vec<MenuEntry> = catalog
        .children(current_parent)
        .map(|folder| MenuEntry {
            id: folder.id.clone(),
            title: folder.title.clone(),
            link: if folder.selected {
                Some(folder.file_name())
            } else {
                None
            },
            children: folder_menu(catalog, &folder.id),
        })
        .collect();

    entries.sort_by(|a, b| a.title.cmp(&b.title));
    entries
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThreadEntry {
    pub id: String,
    pub subject: String,
    /// The message's page. `None` for messages not in the archive.
    pub link: Option<String>,
    pub date: Option<DateTime<FixedOffset>>,
    pub selected: bool,
    pub depth: usize,
    /// Index of the entry this one replies to.
    pub parent: Option<usize>,
}

/// A thread, flattened in display order (each entry directly followed by
/// its replies).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ThreadTree {
    pub entries: Vec<ThreadEntry>,
    /// How many times a reply cycle was cut short.
    pub truncated_cycles: u32,
}

#[cfg(test)]
impl ThreadTree {
    pub fn selected(&self) -> Option<&ThreadEntry> {
        self.entries.iter().find(|e| e.selected)
    }

    /// The indices of the direct replies to entry `ix`.
    pub fn children_of(&self, ix: usize) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| Some(ix) == e.parent)
            .map(|(child, _)| child)
    }
}

struct Level {
    siblings: Vec<String>,
    next: usize,
    depth: usize,
    parent: Option<usize>,
}

/// Lay out the thread starting at `root_id`, marking `selected_id`.
///
/// The top level is `root_id` together with its siblings, or just
/// `root_id` if its parent is not in the graph. Below each message come all
/// replies to it (reached through its oldest reply), recursively. Every
/// level is in date order.
///
/// A message is shown at most once. Reply cycles are cut where they would
/// show a message again, and logged.
pub fn thread_subtree(
    graph: &MessageGraph,
    root_id: &str,
    selected_id: &str,
) -> ThreadTree {
    let mut tree = ThreadTree::default();
    let root = match graph.get(root_id) {
        Some(root) => root,
        None => return tree,
    };

    let siblings = match root.parent_id.as_ref().and_then(|p| graph.get(p)) {
        Some(parent) => graph
            .children(&parent.id)
            .into_iter()
            .map(|n| n.id.clone())
            .collect(),
        None => vec![root.id.clone()],
    };

    let mut shown = HashSet::<String>::new();
    let mut stack = vec![Level {
        siblings,
        next: 0,
        depth: 0,
        parent: None,
    }];

    while let Some(level) = stack.last_mut() {
        if level.next == level.siblings.len() {
            stack.pop();
            continue;
        }

        let id = level.siblings[level.next].clone();
        level.next += 1;
        let (depth, parent) = (level.depth, level.parent);

        let node = match graph.get(&id) {
            Some(node) => node,
            None => continue,
        };

        if !shown.insert(id.clone()) {
            warn!("Reply cycle through {}; not following it", id);
            tree.truncated_cycles += 1;
            continue;
        }

        let ix = tree.entries.len();
        tree.entries.push(ThreadEntry {
            selected: selected_id == id,
            id,
            subject: node.subject.clone(),
            link: node.file_ref.clone(),
            date: node.date,
            depth,
            parent,
        });

        // Descending into the oldest reply shows it along with its siblings,
        // that is, every reply to this message.
        let replies = graph.children(&node.id);
        if let Some(oldest) = replies.first() {
            let siblings = match oldest.parent_id {
                Some(ref p) => graph.children(p),
                None => vec![],
            };
            stack.push(Level {
                siblings: siblings.into_iter().map(|n| n.id.clone()).collect(),
                next: 0,
                depth: depth + 1,
                parent: Some(ix),
            });
        }
    }

    tree
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::*;
    use crate::archive::identity::{
        sentinel_date, MessageIdentity, NOT_FOUND_SUBJECT,
    };
    use crate::support::chronox::*;

    fn build_catalog(remote: &[&str], select: &[&str]) -> FolderCatalog {
        FolderCatalog::build(
            &remote.iter().map(|&s| s.to_owned()).collect::<Vec<_>>(),
            "/",
            &[],
            &select.iter().map(|&s| s.to_owned()).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn add(graph: &mut MessageGraph, id: &str, parent: Option<&str>, day: u32) {
        graph.add(
            "INBOX",
            &MessageIdentity {
                id: id.to_owned(),
                id_hash: id.trim_matches(|c| c == '<' || c == '>').to_owned(),
                parent_id: parent.map(str::to_owned),
                subject: format!("Subject {}", id),
                from: String::new(),
                to: String::new(),
                date: if 0 == day {
                    sentinel_date()
                } else {
                    FixedOffset::zero().ymd_hmsx(2020, 1, day, 0, 0, 0)
                },
            },
            PathBuf::new(),
        );
    }

    fn ids(tree: &ThreadTree) -> Vec<(&str, usize)> {
        tree.entries.iter().map(|e| (&e.id[..], e.depth)).collect()
    }

    #[test]
    fn breadcrumbs() {
        let catalog = build_catalog(
            &["INBOX", "INBOX/Sent", "INBOX/Sent/2020", "Archive"],
            &["INBOX", "INBOX/Sent/2020"],
        );

        assert_eq!(
            vec![
                Breadcrumb {
                    title: "INBOX".to_owned(),
                    link: Some("001-inbox.html".to_owned()),
                },
                Breadcrumb {
                    title: "Sent".to_owned(),
                    link: None,
                },
                Breadcrumb {
                    title: "2020".to_owned(),
                    link: Some("003-inbox-sent-2020.html".to_owned()),
                },
            ],
            breadcrumb_path(&catalog, "INBOX/Sent/2020")
        );
        assert_eq!(1, breadcrumb_path(&catalog, "Archive").len());
        assert!(breadcrumb_path(&catalog, "Nonexistent").is_empty());
    }

    #[test]
    fn breadcrumbs_stop_at_unresolvable_parent() {
        // INBOX is collapsed away
        let catalog = build_catalog(
            &["INBOX", "INBOX/Sent", "INBOX/Sent/2020"],
            &["--all"],
        );
        let titles: Vec<String> = breadcrumb_path(&catalog, "INBOX/Sent/2020")
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(vec!["Sent".to_owned(), "2020".to_owned()], titles);

        // Parent never listed by the server
        let catalog = build_catalog(&["a/b/c", "x"], &["--all"]);
        assert_eq!(1, breadcrumb_path(&catalog, "a/b/c").len());
    }

    #[test]
    fn menu() {
        let catalog = build_catalog(
            &["b", "B", "a", "a/z", "a/y", "a/y/deep"],
            &["a/.*"],
        );
        let menu = folder_menu(&catalog, "");

        let titles: Vec<&str> = menu.iter().map(|e| &e.title[..]).collect();
        assert_eq!(vec!["B", "a", "b"], titles);

        let a = &menu[1];
        assert_eq!(None, a.link);
        let a_titles: Vec<&str> =
            a.children.iter().map(|e| &e.title[..]).collect();
        assert_eq!(vec!["y", "z"], a_titles);
        assert_eq!(Some("005-a-y.html".to_owned()), a.children[0].link);
        assert_eq!("a/y/deep", a.children[0].children[0].id);
        assert!(a.children[1].children.is_empty());

        assert!(folder_menu(&catalog, "b").is_empty());
        assert_eq!(2, folder_menu(&catalog, "a").len());
    }

    #[test]
    fn reply_chain() {
        let mut graph = MessageGraph::default();
        add(&mut graph, "<1>", None, 1);
        add(&mut graph, "<2>", Some("<1>"), 2);

        let tree = thread_subtree(&graph, "<1>", "<2>");
        assert_eq!(vec![("<1>", 0), ("<2>", 1)], ids(&tree));
        assert!(!tree.entries[0].selected);
        assert!(tree.entries[1].selected);
        assert_eq!(Some(0), tree.entries[1].parent);
        assert_eq!(Some("2020/01/01/1.html"), tree.entries[0].link.as_deref());
        assert_eq!(0, tree.truncated_cycles);
        assert_eq!(vec![1], tree.children_of(0).collect::<Vec<_>>());
    }

    #[test]
    fn siblings_and_branches_in_date_order() {
        let mut graph = MessageGraph::default();
        add(&mut graph, "<p>", None, 1);
        add(&mut graph, "<late>", Some("<p>"), 9);
        add(&mut graph, "<early>", Some("<p>"), 2);
        add(&mut graph, "<early.2>", Some("<early>"), 4);
        add(&mut graph, "<early.1>", Some("<early>"), 3);
        add(&mut graph, "<early.1.1>", Some("<early.1>"), 5);

        // Starting below the root lists the siblings of the starting point
        let tree = thread_subtree(&graph, "<late>", "<early.1.1>");
        assert_eq!(
            vec![
                ("<early>", 0),
                ("<early.1>", 1),
                ("<early.1.1>", 2),
                ("<early.2>", 1),
                ("<late>", 0),
            ],
            ids(&tree)
        );
        assert_eq!("<early.1.1>", tree.selected().unwrap().id);

        let tree = thread_subtree(&graph, "<p>", "<p>");
        assert_eq!(6, tree.entries.len());
        assert_eq!(1, tree.entries.iter().filter(|e| e.selected).count());

        let tree = thread_subtree(&graph, "<p>", "<not in thread>");
        assert!(tree.selected().is_none());
    }

    #[test]
    fn placeholder_root() {
        let mut graph = MessageGraph::default();
        add(&mut graph, "<2>", Some("<1>"), 2);

        let root = graph.thread_root("<2>").unwrap();
        let tree = thread_subtree(&graph, &root.id, "<2>");
        assert_eq!(vec![("<1>", 0), ("<2>", 1)], ids(&tree));
        assert_eq!(NOT_FOUND_SUBJECT, tree.entries[0].subject);
        assert_eq!(None, tree.entries[0].link);
        assert_eq!(None, tree.entries[0].date);

        assert!(thread_subtree(&graph, "<unknown>", "<2>").entries.is_empty());
    }

    #[test]
    fn cycles_are_cut() {
        crate::init_test_log();

        let mut graph = MessageGraph::default();
        add(&mut graph, "<a>", Some("<b>"), 1);
        add(&mut graph, "<b>", Some("<a>"), 2);
        add(&mut graph, "<c>", Some("<b>"), 3);

        let root = graph.thread_root("<a>").unwrap();
        assert_eq!("<b>", root.id);
        let tree = thread_subtree(&graph, &root.id, "<a>");
        assert_eq!(vec![("<b>", 0), ("<a>", 1), ("<c>", 1)], ids(&tree));
        assert_eq!(1, tree.truncated_cycles);
        assert_eq!(1, tree.entries.iter().filter(|e| e.selected).count());
    }

    #[test]
    fn long_chains_do_not_overflow() {
        let mut graph = MessageGraph::default();
        add(&mut graph, "<0>", None, 0);
        for i in 1..20_000 {
            add(
                &mut graph,
                &format!("<{}>", i),
                Some(&format!("<{}>", i - 1)),
                0,
            );
        }

        let tree = thread_subtree(&graph, "<0>", "<19999>");
        assert_eq!(20_000, tree.entries.len());
        assert_eq!(19_999, tree.entries.last().unwrap().depth);
        assert!(tree.entries.last().unwrap().selected);
    }
}
