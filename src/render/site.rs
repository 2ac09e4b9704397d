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

//! The walk over the archive which feeds a `Renderer`.

use std::collections::HashSet;
use std::fmt;

use log::{error, info, warn};

use super::body::MessageBody;
use super::{
    ArchiveIndex, FolderIndex, FolderSummary, MessagePage, Renderer, SiteInfo,
};
use crate::archive::catalog::FolderCatalog;
use crate::archive::graph::{MessageGraph, MessageNode};
use crate::archive::store::LocalStore;
use crate::archive::traversal::{
    breadcrumb_path, folder_menu, thread_subtree, Breadcrumb, MenuEntry,
    ThreadTree,
};
use crate::support::error::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub pages: usize,
    pub failed: usize,
    pub truncated_cycles: u32,
}

impl fmt::Display for RenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages, {} failed, {} reply cycles cut",
            self.pages, self.failed, self.truncated_cycles
        )
    }
}

/// Render every message of every selected folder, then the folder indices,
/// then the archive index.
///
/// A message in several folders gets one page. Failing to render a message
/// is logged and counted; failing to render an index is fatal.
pub fn render_site<R: Renderer>(
    catalog: &FolderCatalog,
    graph: &MessageGraph,
    store: &LocalStore,
    renderer: &mut R,
    info: &SiteInfo,
) -> Result<RenderReport, Error> {
    let menu = folder_menu(catalog, "");
    let mut report = RenderReport::default();
    let mut rendered = HashSet::<&str>::new();
    let mut summaries = Vec::new();

    for folder in catalog.selected() {
        let mut messages: Vec<&MessageNode> =
            graph.in_folder(&folder.id).collect();
        messages.sort_by(|a, b| (b.date, &b.id).cmp(&(a.date, &a.id)));
        info!("{}: rendering {} messages", folder.title, messages.len());

        for &message in &messages {
            if !rendered.insert(&message.id) {
                continue;
            }

            match render_message(
                catalog,
                graph,
                store,
                renderer,
                &menu,
                message,
                &mut report,
            ) {
                Ok(()) => report.pages += 1,
                Err(e) => {
                    error!("{}: failed to render: {}", message.id, e);
                    report.failed += 1;
                },
            }
        }

        renderer.folder_index(&FolderIndex {
            folder,
            messages: &messages,
            breadcrumbs: &breadcrumb_path(catalog, &folder.id),
            menu: &menu,
        })?;
        summaries.push(FolderSummary {
            folder,
            messages: messages.len(),
        });
    }

    renderer.archive_index(&ArchiveIndex {
        info,
        folders: &summaries,
        menu: &menu,
    })?;

    info!("Rendering done: {}", report);
    Ok(report)
}

fn render_message<R: Renderer>(
    catalog: &FolderCatalog,
    graph: &MessageGraph,
    store: &LocalStore,
    renderer: &mut R,
    menu: &[MenuEntry],
    message: &MessageNode,
    report: &mut RenderReport,
) -> Result<(), Error> {
    let source = match message.source {
        Some(ref source) => source,
        // Placeholders are in no folder
        None => return Ok(()),
    };

    let raw = store.read(source)?;
    let body = MessageBody::extract(&raw);
    for problem in &body.errors {
        warn!("{}: {}", message.id, problem);
    }

    let thread = match graph.thread_root(&message.id) {
        Some(root) => thread_subtree(graph, &root.id, &message.id),
        None => ThreadTree::default(),
    };
    report.truncated_cycles += thread.truncated_cycles;

    let locations: Vec<Vec<Breadcrumb>> = message
        .folders
        .iter()
        .map(|folder| breadcrumb_path(catalog, folder))
        .collect();

    renderer.message_page(&MessagePage {
        message,
        raw: &raw,
        body: &body,
        thread: &thread,
        locations: &locations,
        menu,
    })
}
