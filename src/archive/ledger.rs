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

//! The dedup ledger: the persistent record of which messages have already
//! been downloaded from which folder.

use std::path::Path;
use std::time::Duration;

use chrono::prelude::*;
use log::info;

use crate::support::error::Error;

static MIGRATIONS: &[&str] = &[include_str!("ledger.v1.sql")];

/// A connection to the `ledger.sqlite` database.
pub struct Ledger {
    cxn: rusqlite::Connection,
}

impl Ledger {
    /// Open the ledger at `path`, creating it if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut cxn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        cxn.pragma_update(None, "journal_mode", "WAL")?;
        cxn.busy_timeout(Duration::from_secs(10))?;
        apply_migrations(&mut cxn)?;

        Ok(Self { cxn })
    }

    /// Returns whether the message has already been downloaded from the
    /// folder.
    pub fn exists(
        &self,
        message_id: &str,
        folder_id: &str,
    ) -> Result<bool, Error> {
        self.cxn
            .prepare_cached(
                "SELECT 1 FROM `fetched` \
                 WHERE `message_id` = ? AND `folder_id` = ?",
            )?
            .exists((message_id, folder_id))
            .map_err(Into::into)
    }

    /// Record that the message has been downloaded from the folder.
    ///
    /// Recording the same pair again has no effect.
    pub fn record(
        &self,
        message_id: &str,
        folder_id: &str,
    ) -> Result<(), Error> {
        self.cxn
            .prepare_cached(
                "INSERT OR IGNORE INTO `fetched` \
                 (`message_id`, `folder_id`, `fetched_at`) \
                 VALUES (?, ?, ?)",
            )?
            .execute((message_id, folder_id, Utc::now().timestamp()))?;
        Ok(())
    }

    /// The number of messages recorded for `folder_id`.
    #[cfg(test)]
    pub fn count(&self, folder_id: &str) -> Result<u64, Error> {
        self.cxn
            .query_row(
                "SELECT COUNT(*) FROM `fetched` WHERE `folder_id` = ?",
                (folder_id,),
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

fn apply_migrations(cxn: &mut rusqlite::Connection) -> Result<(), Error> {
    let latest_version = MIGRATIONS.len();

    if Ok(latest_version)
        == cxn.query_row(
            "SELECT MAX(`version`) FROM `migration`",
            (),
            |row| row.get::<_, usize>(0),
        )
    {
        return Ok(());
    }

    let txn = cxn
        .transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive)?;
    txn.execute(
        "CREATE TABLE IF NOT EXISTS `migration` (\
         `version` INTEGER NOT NULL PRIMARY KEY, \
         `applied_at` INTEGER NOT NULL\
         ) STRICT",
        (),
    )?;

    let current_version = txn
        .query_row("SELECT MAX(`version`) FROM `migration`", (), |row| {
            row.get::<_, Option<usize>>(0)
        })?
        .unwrap_or(0);

    for (version, migration) in MIGRATIONS
        .iter()
        .copied()
        .enumerate()
        .map(|(ix, migration)| (ix + 1, migration))
        .skip(current_version)
    {
        info!("Applying ledger migration #{}", version);
        txn.execute_batch(migration)?;
        txn.execute(
            "INSERT INTO `migration` (`version`, `applied_at`) VALUES (?, ?)",
            (version, Utc::now().timestamp()),
        )?;
    }

    txn.commit()?;

    Ok(())
}
