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

//! The static HTML site.
//!
//! Layout below the site root:
//!
//! - `index.html`: the archive index.
//! - `<NNN>-<slug>.html`: one index per archived folder.
//! - `<YYYY>/<MM>/<DD>/<idhash>.html`: one page per message, with its
//!   attachments next to it as `<idhash>-<NN>-<name>`.
//! - `inc/style.css`.
//!
//! Pages are rewritten on every run; each file is replaced atomically.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use log::{debug, warn};
use minijinja::{context, Environment};
use serde::Serialize;

use super::{humansize, ArchiveIndex, FolderIndex, MessagePage, Renderer};
use crate::archive::graph::MessageNode;
use crate::mime::header::simplify_address;
use crate::support::error::Error;
use crate::support::file_ops::{spit, IgnoreKinds};

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("templates/base.html")),
    ("macros.html", include_str!("templates/macros.html")),
    ("message.html", include_str!("templates/message.html")),
    ("folder.html", include_str!("templates/folder.html")),
    ("index.html", include_str!("templates/index.html")),
];
const STYLE: &str = include_str!("templates/style.css");

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
/// Message pages are three directories (year, month, day) below the root.
const MESSAGE_PREFIX: &str = "../../..";
const ROOT_PREFIX: &str = ".";
const FILE_MODE: u32 = 0o644;

pub struct HtmlRenderer {
    root: PathBuf,
    user: String,
    env: Environment<'static>,
}

#[derive(Serialize)]
struct MessageView<'a> {
    id: &'a str,
    subject: &'a str,
    from: &'a str,
    to: &'a str,
    from_address: String,
    to_address: String,
    date: String,
    link: &'a str,
    size: usize,
}

impl<'a> MessageView<'a> {
    fn new(node: &'a MessageNode, size: usize) -> Self {
        MessageView {
            id: &node.id,
            subject: &node.subject,
            from: &node.from,
            to: &node.to,
            from_address: simplify_address(&node.from),
            to_address: simplify_address(&node.to),
            date: format_date(node.date),
            link: node.file_ref.as_deref().unwrap_or_default(),
            size,
        }
    }
}

#[derive(Serialize)]
struct ThreadView<'a> {
    subject: &'a str,
    link: Option<&'a str>,
    date: String,
    selected: bool,
    depth: usize,
}

#[derive(Serialize)]
struct AttachmentView<'a> {
    title: &'a str,
    link: String,
    mime_type: &'a str,
    size: usize,
}

#[derive(Serialize)]
struct Download {
    filename: String,
    uri: String,
}

#[derive(Serialize)]
struct FolderView<'a> {
    title: &'a str,
    link: String,
    messages: usize,
}

#[derive(Serialize)]
struct InfoView<'a> {
    server: &'a str,
    user: &'a str,
    generated: String,
}

impl HtmlRenderer {
    /// Set up a site rooted at `root` for the archive of `user`, creating
    /// the root and the stylesheet.
    pub fn new(
        root: impl Into<PathBuf>,
        user: impl Into<String>,
    ) -> Result<Self, Error> {
        let root = root.into();
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        env.add_filter("humansize", humansize);

        let renderer = HtmlRenderer {
            root,
            user: user.into(),
            env,
        };
        renderer.write("inc/style.css", STYLE.as_bytes())?;
        Ok(renderer)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` to `rel_path` below the root, replacing whatever is
    /// there.
    fn write(&self, rel_path: &str, data: &[u8]) -> Result<(), Error> {
        let path = self.root.join(rel_path);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).ignore_already_exists()?;
        spit(dir, &path, true, FILE_MODE, data)?;
        Ok(())
    }
}

impl Renderer for HtmlRenderer {
    fn message_page(&mut self, page: &MessagePage<'_>) -> Result<(), Error> {
        let message = page.message;
        let file_ref = match message.file_ref {
            Some(ref file_ref) => file_ref,
            None => return Ok(()),
        };
        let dir = match file_ref.rfind('/') {
            Some(ix) => &file_ref[..ix],
            None => "",
        };

        let mut errors = page.body.errors.clone();
        let mut attachments = Vec::with_capacity(page.body.attachments.len());
        for (ix, attachment) in page.body.attachments.iter().enumerate() {
            let name = format!(
                "{}-{:02}-{}",
                message.id_hash,
                ix + 1,
                attachment.slug
            );
            if let Err(e) =
                self.write(&format!("{}/{}", dir, name), &attachment.content)
            {
                warn!("{}: writing attachment {}: {}", message.id, name, e);
                errors.push(format!("Error writing attachment: {}", e));
            }

            attachments.push(AttachmentView {
                title: &attachment.title,
                link: name,
                mime_type: &attachment.mime_type,
                size: attachment.size,
            });
        }

        let thread: Vec<ThreadView<'_>> = page
            .thread
            .entries
            .iter()
            .map(|entry| ThreadView {
                subject: &entry.subject,
                link: entry.link.as_deref(),
                date: format_date(entry.date),
                selected: entry.selected,
                depth: entry.depth,
            })
            .collect();

        let html = self.env.get_template("message.html")?.render(context! {
            prefix => MESSAGE_PREFIX,
            user => &self.user,
            menu => page.menu,
            current_folders => &message.folders,
            locations => page.locations,
            message => MessageView::new(message, page.raw.len()),
            download => Download {
                filename: format!("{}.eml", message.id_hash),
                uri: format!(
                    "data:message/rfc822;base64,{}",
                    base64::encode(page.raw)
                ),
            },
            errors => errors,
            attachments => attachments,
            default_view => page.body.default_view(),
            html => &page.body.html,
            text => &page.body.text,
            raw => String::from_utf8_lossy(page.raw),
            thread => thread,
        })?;

        debug!("{}: writing {}", message.id, file_ref);
        self.write(file_ref, html.as_bytes())
    }

    fn folder_index(&mut self, index: &FolderIndex<'_>) -> Result<(), Error> {
        let messages: Vec<MessageView<'_>> = index
            .messages
            .iter()
            .map(|&node| MessageView::new(node, 0))
            .collect();

        let html = self.env.get_template("folder.html")?.render(context! {
            prefix => ROOT_PREFIX,
            user => &self.user,
            menu => index.menu,
            current_folders => vec![&index.folder.id],
            folder => index.folder,
            breadcrumbs_path => index.breadcrumbs,
            messages => messages,
        })?;

        self.write(&index.folder.file_name(), html.as_bytes())
    }

    fn archive_index(
        &mut self,
        index: &ArchiveIndex<'_>,
    ) -> Result<(), Error> {
        let folders: Vec<FolderView<'_>> = index
            .folders
            .iter()
            .map(|summary| FolderView {
                title: &summary.folder.title,
                link: summary.folder.file_name(),
                messages: summary.messages,
            })
            .collect();

        let html = self.env.get_template("index.html")?.render(context! {
            prefix => ROOT_PREFIX,
            user => &self.user,
            menu => index.menu,
            current_folders => Vec::<String>::new(),
            info => InfoView {
                server: &index.info.server,
                user: &index.info.user,
                generated: index
                    .info
                    .generated
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            },
            folders => folders,
        })?;

        self.write("index.html", html.as_bytes())
    }
}

fn format_date(date: Option<DateTime<FixedOffset>>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}
