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

//! One archive run: catalog, then sync, then render.

use std::fmt::Write as _;
use std::fs;

use chrono::prelude::*;
use log::info;

use super::remote::ImapConnector;
use crate::archive::catalog::{FolderCatalog, FolderDescriptor};
use crate::archive::graph::MessageGraph;
use crate::archive::ledger::Ledger;
use crate::archive::store::LocalStore;
use crate::archive::sync::{FolderOutcome, SyncEngine, SyncOptions};
use crate::archive::transport::{Connector, Transport, TransportError};
use crate::render::html::HtmlRenderer;
use crate::render::site::render_site;
use crate::render::SiteInfo;
use crate::support::archive_config::ArchiveConfig;
use crate::support::error::Error;
use crate::support::sysexits::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Only print the folder tree.
    Folders,
    Sync,
    Render,
    /// Sync, then render.
    Archive,
}

impl Stage {
    fn syncs(self) -> bool {
        matches!(self, Stage::Sync | Stage::Archive)
    }

    fn renders(self) -> bool {
        matches!(self, Stage::Render | Stage::Archive)
    }
}

pub fn run(stage: Stage, config: ArchiveConfig, trace: bool) {
    if let Err(e) = run_impl(stage, &config, trace) {
        die!(exit_code(&e), "Error: {}", e);
    }
}

fn exit_code(e: &Error) -> Sysexit {
    match *e {
        Error::Transport(TransportError::Auth(..)) => EX_NOPERM,
        Error::Transport(TransportError::Tls(..)) => EX_PROTOCOL,
        Error::Transport(..) => EX_UNAVAILABLE,
        Error::BadSelectPattern(..) | Error::Config(..) => EX_CONFIG,
        Error::Io(..) | Error::Sqlite(..) => EX_IOERR,
        _ => EX_SOFTWARE,
    }
}

fn run_impl(
    stage: Stage,
    config: &ArchiveConfig,
    trace: bool,
) -> Result<(), Error> {
    let password = if !config.server.password.is_empty() {
        config.server.password.clone()
    } else if Ok(true) == nix::unistd::isatty(0) {
        rpassword::read_password_from_tty(Some("Password: "))?
    } else {
        die!(
            EX_CONFIG,
            "No password configured for {} and not running interactively",
            config.server.user
        )
    };

    let mut connector =
        ImapConnector::new(config.server.clone(), password, trace);
    let mut transport = connector.connect()?;
    let listing = transport.list_folders()?;
    let catalog = FolderCatalog::build(
        &listing.folders,
        &listing.separator,
        &config.archive.excluded_folders,
        &config.archive.folders,
    )?;

    if Stage::Folders == stage {
        print!("{}", folder_tree(&catalog));
        return Ok(());
    }

    fs::create_dir_all(config.root())?;
    let mut store = LocalStore::new(config.raw_dir());

    if stage.syncs() {
        let ledger = Ledger::open(&config.ledger_path())?;
        let mut engine = SyncEngine::new(
            &mut connector,
            Some(transport),
            SyncOptions {
                skip_spam_flagged: config.archive.skip_spam_flagged,
                max_retries: config.archive.max_retries,
            },
        );

        let mut outcomes = Vec::new();
        for folder in catalog.selected() {
            info!("Getting messages from folder {}", folder.title);
            let outcome = engine.sync(folder, &ledger, &mut store)?;
            info!("Done with folder {}", folder.title);
            outcomes.push((folder, outcome));
        }

        print!("{}", sync_summary(&outcomes));
    } else {
        drop(transport);
    }

    if stage.renders() {
        let graph = MessageGraph::build(&catalog, &store)?;
        let mut renderer =
            HtmlRenderer::new(config.html_dir(), &config.server.user as &str)?;
        let report = render_site(
            &catalog,
            &graph,
            &store,
            &mut renderer,
            &SiteInfo {
                server: config.server.host.clone(),
                user: config.server.user.clone(),
                generated: Local::now(),
            },
        )?;

        let stats = graph.stats();
        println!(
            "Rendered {} into {}: {} messages, {} missing replied-to \
             messages, {} unreadable",
            report,
            config.html_dir().display(),
            stats.nodes - stats.placeholders,
            stats.placeholders,
            stats.unreadable,
        );
    }

    Ok(())
}

/// Format the catalog as an indented tree, marking archived folders with
/// `**`.
fn folder_tree(catalog: &FolderCatalog) -> String {
    fn walk(
        catalog: &FolderCatalog,
        parent: &str,
        depth: usize,
        out: &mut String,
    ) {
        for folder in catalog.children(parent) {
            let _ = writeln!(
                out,
                "{:indent$}{}{} ({})",
                "",
                if folder.selected { "** " } else { "" },
                folder.title,
                folder.id,
                indent = 4 * depth,
            );
            walk(catalog, &folder.id, depth + 1, out);
        }
    }

    let mut out = String::new();
    walk(catalog, "", 0, &mut out);
    out
}

fn sync_summary(outcomes: &[(&FolderDescriptor, FolderOutcome)]) -> String {
    let mut out = String::new();
    for &(folder, ref outcome) in outcomes {
        let _ = match *outcome {
            FolderOutcome::Synced(ref report) => {
                writeln!(out, "{}: {}", folder.title, report)
            },
            FolderOutcome::Skipped(ref why) => {
                writeln!(out, "{}: skipped: {}", folder.title, why)
            },
            FolderOutcome::Abandoned(ref report) => writeln!(
                out,
                "{}: gave up after repeated connection failures: {}",
                folder.title, report
            ),
        };
    }
    out
}
