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

//! The sync engine: downloads new messages from the server into the local
//! store.

use std::fmt;

use log::{debug, info, warn};

use super::catalog::FolderDescriptor;
use super::identity::MessageIdentity;
use super::ledger::Ledger;
use super::store::LocalStore;
use super::transport::{Connector, Transport, TransportError};
use crate::mime::envelope::Envelope;
use crate::support::error::Error;

/// Policy knobs for the sync engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Skip messages carrying `X-Spam-Flag: YES`.
    pub skip_spam_flagged: bool,
    /// How many times a folder is retried on a new connection after the
    /// connection drops.
    pub max_retries: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            skip_spam_flagged: false,
            max_retries: 5,
        }
    }
}

/// What happened to the messages of one folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Downloaded and stored by this run.
    pub fetched: u32,
    /// Already in the ledger.
    pub existing: u32,
    /// Could not be fetched or identified; skipped.
    pub errored: u32,
    /// Skipped by the spam policy.
    pub filtered: u32,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched, {} already present, {} errors",
            self.fetched, self.existing, self.errored
        )?;
        if self.filtered > 0 {
            write!(f, ", {} filtered", self.filtered)?;
        }
        Ok(())
    }
}

/// How syncing a folder turned out, if not fatally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FolderOutcome {
    Synced(SyncReport),
    /// The server did not let us read the folder at all.
    Skipped(String),
    /// The connection kept dropping; the folder is left for the next run.
    /// The report covers what was done before giving up.
    Abandoned(SyncReport),
}

/// Download every message in `folder` which is not yet in the ledger.
///
/// Progress is accumulated into `report` as it is made, so it is still
/// meaningful if this returns an error part way through.
///
/// Problems with individual messages are logged and counted; they never
/// fail the folder. Transport failures other than per-message rejections
/// are returned, as are ledger and store errors, since continuing without
/// the ledger would break deduplication.
pub fn sync_folder<T: Transport>(
    folder: &FolderDescriptor,
    transport: &mut T,
    ledger: &Ledger,
    store: &mut LocalStore,
    options: &SyncOptions,
    report: &mut SyncReport,
) -> Result<(), Error> {
    let ids = transport.list_message_ids(&folder.id)?;
    info!("{}: {} messages on server", folder.title, ids.len());

    for remote_id in ids {
        let raw = match transport.fetch_raw(&folder.id, remote_id) {
            Ok(raw) => raw,
            Err(TransportError::Rejected(msg)) => {
                warn!(
                    "{}: Server refused message {}: {}",
                    folder.title, remote_id, msg
                );
                report.errored += 1;
                continue;
            },
            Err(e) => return Err(e.into()),
        };

        let raw = normalize_line_endings(raw);
        let envelope = match Envelope::parse(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    "{}: Skipping message {}: {}",
                    folder.title, remote_id, e
                );
                report.errored += 1;
                continue;
            },
        };

        if options.skip_spam_flagged && envelope.spam_flagged {
            debug!(
                "{}: Message {} is flagged as spam",
                folder.title, remote_id
            );
            report.filtered += 1;
            continue;
        }

        let identity = MessageIdentity::derive(&envelope);
        if ledger.exists(&identity.id, &folder.id)? {
            report.existing += 1;
            continue;
        }

        store.append(&folder.id, &raw)?;
        ledger.record(&identity.id, &folder.id)?;
        debug!("{}: Stored {}", folder.title, identity.id);
        report.fetched += 1;
    }

    Ok(())
}

/// Syncs folders one after another, reconnecting when the connection drops.
pub struct SyncEngine<'a, C: Connector> {
    connector: &'a mut C,
    transport: Option<C::Transport>,
    options: SyncOptions,
}

impl<'a, C: Connector> SyncEngine<'a, C> {
    /// Create an engine. `transport`, if given, is used until it fails.
    pub fn new(
        connector: &'a mut C,
        transport: Option<C::Transport>,
        options: SyncOptions,
    ) -> Self {
        SyncEngine {
            connector,
            transport,
            options,
        }
    }

    /// Sync one folder.
    ///
    /// If the connection drops, the folder is started over on a new
    /// connection, up to `max_retries` times. Since the ledger is updated
    /// with every message, a retry only downloads what the failed attempt
    /// did not get to.
    ///
    /// Only fatal errors are returned: authentication failures and local
    /// I/O errors.
    pub fn sync(
        &mut self,
        folder: &FolderDescriptor,
        ledger: &Ledger,
        store: &mut LocalStore,
    ) -> Result<FolderOutcome, Error> {
        // Messages fetched by attempts that then failed. A later attempt
        // sees them as existing.
        let mut carried = 0;
        let mut retries = 0;

        loop {
            let mut report = SyncReport::default();
            let result = match self.transport {
                Some(ref mut transport) => sync_folder(
                    folder,
                    transport,
                    ledger,
                    store,
                    &self.options,
                    &mut report,
                ),
                None => match self.connector.connect() {
                    Ok(transport) => {
                        self.transport = Some(transport);
                        continue;
                    },
                    Err(e) => Err(e.into()),
                },
            };

            match result {
                Ok(()) => {
                    report.existing = report.existing.saturating_sub(carried);
                    report.fetched += carried;
                    return Ok(FolderOutcome::Synced(report));
                },

                Err(e) if e.is_transport_abort() => {
                    self.transport = None;
                    carried += report.fetched;
                    if retries >= self.options.max_retries {
                        warn!(
                            "{}: {}; giving up after {} retries",
                            folder.title, e, retries
                        );
                        return Ok(FolderOutcome::Abandoned(SyncReport {
                            fetched: carried,
                            ..report
                        }));
                    }

                    retries += 1;
                    warn!(
                        "{}: {}; trying again (#{})",
                        folder.title, e, retries
                    );
                },

                Err(Error::Transport(TransportError::NoSuchFolder(msg)))
                | Err(Error::Transport(TransportError::Rejected(msg))) => {
                    warn!("{}: Cannot read folder: {}", folder.title, msg);
                    return Ok(FolderOutcome::Skipped(msg));
                },

                Err(e) => return Err(e),
            }
        }
    }
}

/// Convert DOS line endings to UNIX ones.
pub fn normalize_line_endings(raw: Vec<u8>) -> Vec<u8> {
    if memchr::memchr(b'\r', &raw).is_none() {
        return raw;
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut rest = &raw[..];
    while let Some(ix) = memchr::memchr(b'\r', rest) {
        if Some(&b'\n') == rest.get(ix + 1) {
            out.extend_from_slice(&rest[..ix]);
        } else {
            out.extend_from_slice(&rest[..=ix]);
        }
        rest = &rest[ix + 1..];
    }
    out.extend_from_slice(rest);
    out
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::archive::catalog::FolderCatalog;
    use crate::archive::graph::MessageGraph;
    use crate::archive::transport::fake::*;
    use crate::test_data::*;

    struct Setup {
        _root: TempDir,
        catalog: FolderCatalog,
        ledger: Ledger,
        store: LocalStore,
        connector: FakeConnector,
    }

    fn setup(server: FakeServer) -> Setup {
        crate::init_test_log();

        let root = TempDir::new().unwrap();
        let ledger = Ledger::open(&root.path().join("ledger.sqlite")).unwrap();
        let store = LocalStore::new(root.path().join("raw"));
        let folders: Vec<String> =
            server.folders.iter().map(|(name, _)| name.clone()).collect();
        let catalog = FolderCatalog::build(
            &folders,
            &server.separator,
            &[],
            &["--all".to_owned()],
        )
        .unwrap();

        Setup {
            _root: root,
            catalog,
            ledger,
            store,
            connector: FakeConnector::new(server),
        }
    }

    fn server() -> FakeServer {
        let mut server = FakeServer::new("/");
        server.add("INBOX", PLAIN);
        server.add("INBOX", REPLY);
        server.add("INBOX", NO_MESSAGE_ID);
        server.add("Sent", REPLY);
        server
    }

    fn sync_once(
        setup: &mut Setup,
        folder: &str,
        options: &SyncOptions,
    ) -> SyncReport {
        let folder = setup.catalog.get(folder).unwrap();
        let mut transport = setup.connector.connect().unwrap();
        let mut report = SyncReport::default();
        sync_folder(
            folder,
            &mut transport,
            &setup.ledger,
            &mut setup.store,
            options,
            &mut report,
        )
        .unwrap();
        report
    }

    #[test]
    fn sync_is_idempotent() {
        let mut setup = setup(server());
        let options = SyncOptions::default();

        let report = sync_once(&mut setup, "INBOX", &options);
        assert_eq!(
            SyncReport {
                fetched: 3,
                ..SyncReport::default()
            },
            report
        );
        assert_eq!(3, setup.ledger.count("INBOX").unwrap());
        assert_eq!(3, setup.store.list("INBOX").unwrap().len());

        let report = sync_once(&mut setup, "INBOX", &options);
        assert_eq!(
            SyncReport {
                existing: 3,
                ..SyncReport::default()
            },
            report
        );
        assert_eq!(3, setup.ledger.count("INBOX").unwrap());
        assert_eq!(3, setup.store.list("INBOX").unwrap().len());

        // The same message in another folder is another ledger entry
        let report = sync_once(&mut setup, "Sent", &options);
        assert_eq!(1, report.fetched);
        assert!(setup.ledger.exists("<reply@example.net>", "Sent").unwrap());
    }

    #[test]
    fn stored_verbatim_with_unix_line_endings() {
        let mut setup = setup(server());
        sync_once(&mut setup, "Sent", &SyncOptions::default());

        let paths = setup.store.list("Sent").unwrap();
        assert_eq!(1, paths.len());
        let stored = setup.store.read(&paths[0]).unwrap();
        assert!(!stored.contains(&b'\r'));
        assert_eq!(
            String::from_utf8_lossy(REPLY).replace("\r\n", "\n"),
            String::from_utf8(stored).unwrap()
        );
    }

    #[test]
    fn duplicates_within_folder_are_stored_once() {
        let mut server = FakeServer::new("/");
        server.add("INBOX", PLAIN);
        server.add("INBOX", PLAIN);
        let mut setup = setup(server);

        let report = sync_once(&mut setup, "INBOX", &SyncOptions::default());
        assert_eq!(1, report.fetched);
        assert_eq!(1, report.existing);
        assert_eq!(1, setup.store.list("INBOX").unwrap().len());
    }

    #[test]
    fn bad_messages_are_skipped() {
        let mut server = FakeServer::new("/");
        server.add("INBOX", b"this is not a message at all");
        server.add("INBOX", PLAIN);
        let mut setup = setup(server);

        let report = sync_once(&mut setup, "INBOX", &SyncOptions::default());
        assert_eq!(1, report.fetched);
        assert_eq!(1, report.errored);
    }

    #[test]
    fn spam_policy() {
        let mut server = FakeServer::new("/");
        server.add("INBOX", SPAM);
        server.add("INBOX", PLAIN);
        let mut setup = setup(server);

        let report = sync_once(
            &mut setup,
            "INBOX",
            &SyncOptions {
                skip_spam_flagged: true,
                ..SyncOptions::default()
            },
        );
        assert_eq!(1, report.fetched);
        assert_eq!(1, report.filtered);
        assert!(!setup
            .ledger
            .exists("<spam@spammer.example>", "INBOX")
            .unwrap());

        // Turning the policy off picks the message up
        let report = sync_once(&mut setup, "INBOX", &SyncOptions::default());
        assert_eq!(1, report.fetched);
        assert_eq!(1, report.existing);
    }

    #[test]
    fn reconnects_and_resumes_after_abort() {
        let mut server = server();
        server.abort_fetches = vec![2];
        let mut setup = setup(server);

        let mut engine = SyncEngine::new(
            &mut setup.connector,
            None,
            SyncOptions::default(),
        );
        let folder = setup.catalog.get("INBOX").unwrap();
        let outcome = engine
            .sync(folder, &setup.ledger, &mut setup.store)
            .unwrap();
        assert_eq!(
            FolderOutcome::Synced(SyncReport {
                fetched: 3,
                ..SyncReport::default()
            }),
            outcome
        );

        let server = setup.connector.0.borrow();
        assert_eq!(2, server.connections);
        // 1 ok, 2 aborted, then 1 (existing), 2, 3
        assert_eq!(5, server.fetches);
        drop(server);
        assert_eq!(3, setup.store.list("INBOX").unwrap().len());
    }

    #[test]
    fn folder_abandoned_after_retries() {
        let mut server = server();
        server.abort_fetches = vec![1, 2, 3];
        let mut setup = setup(server);

        let mut engine = SyncEngine::new(
            &mut setup.connector,
            None,
            SyncOptions {
                max_retries: 2,
                ..SyncOptions::default()
            },
        );

        let inbox = setup.catalog.get("INBOX").unwrap();
        assert_eq!(
            FolderOutcome::Abandoned(SyncReport::default()),
            engine.sync(inbox, &setup.ledger, &mut setup.store).unwrap()
        );

        // The next folder still goes through
        let sent = setup.catalog.get("Sent").unwrap();
        assert_eq!(
            FolderOutcome::Synced(SyncReport {
                fetched: 1,
                ..SyncReport::default()
            }),
            engine.sync(sent, &setup.ledger, &mut setup.store).unwrap()
        );
        assert_eq!(4, setup.connector.0.borrow().connections);
    }

    #[test]
    fn backslash_separated_folders_are_archived() {
        let mut server = FakeServer::new("\\");
        server.add("Work", PLAIN);
        server.add("Work\\2020", REPLY);
        server.add("Home", PLAIN);
        let mut setup = setup(server);

        let mut engine = SyncEngine::new(
            &mut setup.connector,
            None,
            SyncOptions::default(),
        );
        for id in &["Work", "Work\\2020", "Home"] {
            let folder = setup.catalog.get(id).unwrap();
            assert_eq!(
                FolderOutcome::Synced(SyncReport {
                    fetched: 1,
                    ..SyncReport::default()
                }),
                engine.sync(folder, &setup.ledger, &mut setup.store).unwrap()
            );
        }
        drop(engine);

        let graph = MessageGraph::build(&setup.catalog, &setup.store).unwrap();
        assert_eq!(
            vec!["Work\\2020".to_owned()],
            graph.get("<reply@example.net>").unwrap().folders
        );
        assert_eq!(
            vec!["Work".to_owned(), "Home".to_owned()],
            graph.get("<plain@example.com>").unwrap().folders
        );
    }

    #[test]
    fn missing_folder_is_skipped() {
        let mut setup = setup(server());
        // Present in the catalog, gone from the server
        setup.connector.0.borrow_mut().folders.retain(|(n, _)| "Sent" != n);

        let mut engine = SyncEngine::new(
            &mut setup.connector,
            None,
            SyncOptions::default(),
        );
        let sent = setup.catalog.get("Sent").unwrap();
        assert_matches!(
            Ok(FolderOutcome::Skipped(..)),
            engine.sync(sent, &setup.ledger, &mut setup.store)
        );
    }

    #[test]
    fn auth_failure_is_fatal() {
        let mut server = server();
        server.refuse_login = true;
        let mut setup = setup(server);

        let mut engine = SyncEngine::new(
            &mut setup.connector,
            None,
            SyncOptions::default(),
        );
        let inbox = setup.catalog.get("INBOX").unwrap();
        assert_matches!(
            Err(Error::Transport(TransportError::Auth(..))),
            engine.sync(inbox, &setup.ledger, &mut setup.store)
        );
    }

    #[test]
    fn line_endings() {
        assert_eq!(
            b"a\nb\n\rc\r".to_vec(),
            normalize_line_endings(b"a\r\nb\n\rc\r".to_vec())
        );
        assert_eq!(b"x\n".to_vec(), normalize_line_endings(b"x\n".to_vec()));
    }
}
