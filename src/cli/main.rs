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

use std::path::PathBuf;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use structopt::StructOpt;

use super::archive::{run, Stage};
use crate::support::archive_config::ArchiveConfig;
use crate::support::sysexits::*;

/// Archive an IMAP account into a browsable static HTML site.
///
/// Messages are downloaded into a Maildir++ tree under the archive root
/// (`raw/`), recorded in `ledger.sqlite` so that later runs only fetch what
/// is new, and rendered into `html/`.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Connect and print the folder tree, marking the folders which would
    /// be archived with `**`.
    Folders(CommonOptions),
    /// Download new messages from the selected folders.
    Sync(CommonOptions),
    /// Render the site from what has been downloaded so far.
    ///
    /// This still connects to the server to learn the folder structure,
    /// but does not download anything.
    Render(CommonOptions),
    /// Download new messages, then render the site.
    Archive(CommonOptions),
}

#[derive(StructOpt)]
struct CommonOptions {
    /// Log more detail about what is happening.
    #[structopt(long, short)]
    verbose: bool,
    /// Dump a trace of the IMAP connection to standard error.
    #[structopt(long)]
    trace: bool,
    /// The archive configuration file. If a `logging.toml` is next to it,
    /// it is used to configure logging.
    #[structopt(parse(from_os_str))]
    config: PathBuf,
}

impl Command {
    fn split(self) -> (Stage, CommonOptions) {
        match self {
            Command::Folders(c) => (Stage::Folders, c),
            Command::Sync(c) => (Stage::Sync, c),
            Command::Render(c) => (Stage::Render, c),
            Command::Archive(c) => (Stage::Archive, c),
        }
    }
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        },
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        },
    });

    let (stage, common) = cmd.split();
    let config = match ArchiveConfig::load(&common.config) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file at '{}': {}",
            common.config.display(),
            e
        ),
    };

    init_log(&common);
    run(stage, config, common.trace);
}

fn init_log(common: &CommonOptions) {
    let log_config_file = ArchiveConfig::logging_config(&common.config);
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Error in logging config at '{}': {}",
                log_config_file.display(),
                e
            );
        }
        return;
    }

    let level = if common.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));
    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                die!(EX_SOFTWARE, "Failed to initialise logging: {}", e);
            }
        },
        Err(e) => die!(EX_SOFTWARE, "Failed to initialise logging: {}", e),
    }
}
