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

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Select pattern meaning "every folder the server reports".
pub const SELECT_ALL: &str = "--all";

/// The configuration for one archive run.
///
/// This is the root of the TOML file passed on the command line.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    /// How to reach and log into the IMAP server.
    pub server: ServerConfig,

    /// What to archive and where.
    #[serde(default)]
    pub archive: ArchiveOptions,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The host name of the IMAP server.
    pub host: String,
    /// The port to connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// The user name to log in as.
    pub user: String,
    /// The password to log in with.
    ///
    /// If empty, the password is prompted for on the terminal. Storing the
    /// password here is only sensible if the file is not world-readable.
    #[serde(default)]
    pub password: String,
    /// Whether to use implicit TLS. Plaintext connections are only intended
    /// for testing against a local server.
    #[serde(default = "default_true")]
    pub tls: bool,
    /// If true, the server certificate is not verified.
    #[serde(default)]
    pub allow_insecure_tls_connections: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveOptions {
    /// The directory holding the raw mail store, the ledger, and the rendered
    /// site.
    ///
    /// If unset, `mailbox.<user>@<host>` in the current directory is used.
    pub root: Option<PathBuf>,

    /// Patterns selecting the folders to archive.
    ///
    /// Each pattern is a regular expression which must match the whole
    /// (server-native) folder name. The special value `--all` selects every
    /// folder.
    pub folders: Vec<String>,

    /// Folder names (exact, server-native) which are ignored entirely. They
    /// do not appear in menus or breadcrumbs.
    pub excluded_folders: Vec<String>,

    /// If true, messages carrying `X-Spam-Flag: YES` are not downloaded.
    pub skip_spam_flagged: bool,

    /// The number of times a folder is retried on a fresh connection if the
    /// connection drops while it is being downloaded.
    pub max_retries: u32,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        ArchiveOptions {
            root: None,
            folders: vec![SELECT_ALL.to_owned()],
            excluded_folders: vec![],
            skip_spam_flagged: false,
            max_retries: 5,
        }
    }
}

fn default_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

impl ArchiveConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        Ok(toml::from_slice(&data)?)
    }

    /// The root directory of the archive.
    pub fn root(&self) -> PathBuf {
        self.archive.root.clone().unwrap_or_else(|| {
            format!("mailbox.{}@{}", self.server.user, self.server.host).into()
        })
    }

    /// The local store of raw messages.
    pub fn raw_dir(&self) -> PathBuf {
        self.root().join("raw")
    }

    /// The rendered HTML site.
    pub fn html_dir(&self) -> PathBuf {
        self.root().join("html")
    }

    /// The download ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.root().join("ledger.sqlite")
    }

    /// The `logging.toml` which may sit next to the configuration file.
    pub fn logging_config(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("logging.toml")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_minimal() {
        let config: ArchiveConfig = toml::from_str(
            r#"
[server]
host = "imap.example.com"
user = "alice"
"#,
        )
        .unwrap();

        assert_eq!(993, config.server.port);
        assert!(config.server.tls);
        assert!(config.server.password.is_empty());
        assert_eq!(vec![SELECT_ALL.to_owned()], config.archive.folders);
        assert_eq!(5, config.archive.max_retries);
        assert!(!config.archive.skip_spam_flagged);
        assert_eq!(
            PathBuf::from("mailbox.alice@imap.example.com/raw"),
            config.raw_dir()
        );
    }

    #[test]
    fn parse_full() {
        let config: ArchiveConfig = toml::from_str(
            r#"
[server]
host = "localhost"
port = 1143
user = "bob"
password = "hunter2"
tls = false

[archive]
root = "/srv/mail"
folders = ["INBOX", "Archive/.*"]
excluded_folders = ["Trash"]
skip_spam_flagged = true
max_retries = 2
"#,
        )
        .unwrap();

        assert_eq!(1143, config.server.port);
        assert!(!config.server.tls);
        assert_eq!(PathBuf::from("/srv/mail/html"), config.html_dir());
        assert_eq!(
            PathBuf::from("/srv/mail/ledger.sqlite"),
            config.ledger_path()
        );
        assert_eq!(vec!["Trash".to_owned()], config.archive.excluded_folders);
        assert!(config.archive.skip_spam_flagged);
        assert_eq!(2, config.archive.max_retries);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("archive.toml");
        fs::write(&path, "[server]\nhost = \"h\"\nuser = \"u\"\n").unwrap();
        let config = ArchiveConfig::load(&path).unwrap();
        assert_eq!("h", config.server.host);
        assert_eq!(PathBuf::from("mailbox.u@h"), config.root());

        assert_matches!(
            Err(Error::Io(..)),
            ArchiveConfig::load(&dir.path().join("nx.toml"))
        );
        fs::write(&path, "[server]\nhost = 42\n").unwrap();
        assert_matches!(Err(Error::Config(..)), ArchiveConfig::load(&path));
    }

    #[test]
    fn reject_unknown_keys() {
        assert!(toml::from_str::<ArchiveConfig>(
            r#"
[server]
host = "localhost"
user = "bob"
pasword = "typo"
"#,
        )
        .is_err());
    }
}
