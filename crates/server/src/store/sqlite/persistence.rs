// Copyright 2015-2016 Benjamin Fry <benjaminfry -@- me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! All zone persistence related types

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{self, params, Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{PersistenceErrorKind, PersistenceResult};
use crate::proto::rr::Name;
use crate::serialize::txt::Parser;
use crate::store::{ZoneFileBackend, ZonePersistenceBackend, ZoneState};

/// The current Journal version of the application
pub const CURRENT_VERSION: i64 = 1;

/// The Journal is the audit log of every committed version of the zone.
///
/// Each commit appends one snapshot row and the zone's master file lines for it, in a single
/// sqlite transaction. Recovery reads back the newest snapshot.
pub struct Journal {
    conn: Mutex<Connection>,
    version: i64,
    origin: Name,
    zone_file: Option<ZoneFileBackend>,
}

impl Journal {
    /// Constructs a new Journal, attaching to the specified Sqlite Connection
    pub fn new(conn: Connection, origin: Name) -> PersistenceResult<Self> {
        let version = Self::select_schema_version(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            version,
            origin,
            zone_file: None,
        })
    }

    /// Constructs a new Journal opening a Sqlite connection to the file at the specified path
    pub fn from_file(journal_file: &Path, origin: Name) -> PersistenceResult<Self> {
        let mut journal = Self::new(Connection::open(journal_file)?, origin)?;
        journal.schema_up()?;
        Ok(journal)
    }

    /// Constructs a Journal that lives only as long as the process, with its schema in place
    pub fn in_memory(origin: Name) -> PersistenceResult<Self> {
        let mut journal = Self::new(Connection::open_in_memory()?, origin)?;
        journal.schema_up()?;
        Ok(journal)
    }

    /// Also render the zone file after each commit
    pub fn with_zone_file(mut self, zone_file: ZoneFileBackend) -> Self {
        self.zone_file = Some(zone_file);
        self
    }

    /// Returns a reference to the Sqlite Connection
    fn conn(&self) -> PersistenceResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            PersistenceErrorKind::Recovery("journal connection poisoned".to_string()).into()
        })
    }

    /// Returns the current schema version of the journal
    pub fn schema_version(&self) -> i64 {
        self.version
    }

    /// Appends a snapshot of the zone, this is an append only operation.
    ///
    /// # Return value
    ///
    /// The row id of the new snapshot
    pub fn insert_snapshot(&self, zone: &ZoneState) -> PersistenceResult<i64> {
        self.check_version()?;

        let text = zone.to_zone_file();
        let lines = text
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with(';'))
            .collect::<Vec<_>>();

        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let soa_serial = i64::from(zone.serial().get());

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let count = tx.execute(
            "INSERT INTO snapshots (soa_serial, timestamp, origin) VALUES ($1, $2, $3)",
            params![soa_serial, timestamp, zone.origin().to_ascii()],
        )?;
        if count != 1 {
            return Err(PersistenceErrorKind::WrongInsertCount {
                got: count,
                expect: 1,
            }
            .into());
        }

        let snapshot_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare("INSERT INTO records (snapshot_id, line) VALUES ($1, $2)")?;
            let mut inserted = 0;
            for line in &lines {
                inserted += stmt.execute(params![snapshot_id, line])?;
            }

            if inserted != lines.len() {
                return Err(PersistenceErrorKind::WrongInsertCount {
                    got: inserted,
                    expect: lines.len(),
                }
                .into());
            }
        }

        tx.commit()?;
        Ok(snapshot_id)
    }

    /// Removes a snapshot and its records
    pub fn remove_snapshot(&self, snapshot_id: i64) -> PersistenceResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records WHERE snapshot_id = $1", [snapshot_id])?;
        tx.execute("DELETE FROM snapshots WHERE _rowid_ = $1", [snapshot_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Selects the newest snapshot, parsed back into a zone
    pub fn select_latest(&self) -> PersistenceResult<Option<ZoneState>> {
        self.check_version()?;

        let conn = self.conn()?;
        let latest: Option<(i64, i64)> = conn
            .query_row(
                "SELECT _rowid_, soa_serial FROM snapshots ORDER BY _rowid_ DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((snapshot_id, soa_serial)) = latest else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT line FROM records WHERE snapshot_id = $1 ORDER BY _rowid_")?;
        let lines = stmt
            .query_map([snapshot_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let zone = Parser::new(&lines.join("\n"), Some(self.origin.clone())).parse()?;
        if i64::from(zone.serial().get()) != soa_serial {
            return Err(PersistenceErrorKind::Recovery(format!(
                "snapshot {snapshot_id} carries serial {soa_serial} but its SOA says {}",
                zone.serial()
            ))
            .into());
        }

        Ok(Some(zone))
    }

    /// Number of snapshots in the journal
    pub fn snapshot_count(&self) -> PersistenceResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count)
    }

    fn check_version(&self) -> PersistenceResult<()> {
        if self.version != CURRENT_VERSION {
            return Err(PersistenceErrorKind::Recovery(format!(
                "journal schema version {} expected {CURRENT_VERSION}, schema_up() resolves this",
                self.version
            ))
            .into());
        }
        Ok(())
    }

    /// selects the current schema version of the journal DB, returns -1 if there is no schema
    ///
    /// # Arguments
    ///
    /// * `conn` - db connection to use
    pub fn select_schema_version(conn: &Connection) -> PersistenceResult<i64> {
        // first see if our schema is there
        let schema: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='ddns_schema'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        if schema.is_none() {
            return Ok(-1);
        }

        let version: i64 = conn.query_row("SELECT version FROM ddns_schema", [], |row| row.get(0))?;
        Ok(version)
    }

    /// update the schema version
    fn update_schema_version(&self, new_version: i64) -> PersistenceResult<()> {
        let count = self
            .conn()?
            .execute("UPDATE ddns_schema SET version = $1", [&new_version])?;

        if count != 1 {
            return Err(PersistenceErrorKind::WrongInsertCount {
                got: count,
                expect: 1,
            }
            .into());
        }
        Ok(())
    }

    /// initializes the schema for the Journal
    pub fn schema_up(&mut self) -> PersistenceResult<i64> {
        if self.version > CURRENT_VERSION {
            return Err(PersistenceErrorKind::Recovery(format!(
                "journal schema version {} is newer than supported {CURRENT_VERSION}",
                self.version
            ))
            .into());
        }

        while self.version < CURRENT_VERSION {
            self.version = match self.version + 1 {
                0 => self.init_up()?,
                1 => self.snapshots_up()?,
                v => {
                    return Err(
                        PersistenceErrorKind::Recovery(format!("unknown schema version {v}")).into(),
                    )
                }
            };

            self.update_schema_version(self.version)?;
            info!("journal schema now at version {}", self.version);
        }

        Ok(self.version)
    }

    /// initial schema, include the ddns_schema table for tracking the Journal version
    fn init_up(&self) -> PersistenceResult<i64> {
        let conn = self.conn()?;
        conn.execute("CREATE TABLE ddns_schema (version INTEGER NOT NULL)", [])?;
        let count = conn.execute("INSERT INTO ddns_schema (version) VALUES (0)", [])?;
        if count != 1 {
            return Err(PersistenceErrorKind::WrongInsertCount {
                got: count,
                expect: 1,
            }
            .into());
        }

        Ok(0)
    }

    /// adds the snapshots table and the records of each snapshot, in master file syntax
    fn snapshots_up(&self) -> PersistenceResult<i64> {
        // we'll be using rowid for our primary key, basically: `rowid INTEGER PRIMARY KEY ASC`
        self.conn()?.execute_batch(
            "CREATE TABLE snapshots (
                soa_serial  INTEGER NOT NULL,
                timestamp   INTEGER NOT NULL,
                origin      TEXT NOT NULL
            );
            CREATE TABLE records (
                snapshot_id INTEGER NOT NULL,
                line        TEXT NOT NULL
            );
            CREATE INDEX records_snapshot ON records (snapshot_id);",
        )?;

        Ok(1)
    }
}

#[async_trait]
impl ZonePersistenceBackend for Journal {
    async fn load(&self) -> PersistenceResult<Option<ZoneState>> {
        self.select_latest()
    }

    async fn commit(&self, state: &ZoneState) -> PersistenceResult<()> {
        let snapshot_id = self.insert_snapshot(state)?;
        debug!(
            "journaled serial {} as snapshot {snapshot_id}",
            state.serial()
        );

        if let Some(zone_file) = &self.zone_file {
            if let Err(e) = zone_file.commit(state).await {
                // the journal must not run ahead of a commit that is reported as failed
                self.remove_snapshot(snapshot_id)?;
                return Err(e);
            }
        }

        Ok(())
    }
}
