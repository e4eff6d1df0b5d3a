// Copyright 2015-2018 Benjamin Fry <benjaminfry -@- me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The zone state store and its persistence backends

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info};

use crate::{
    error::{PersistenceErrorKind, PersistenceResult, UpdateError, UpdateErrorKind},
    proto::rr::Name,
    record::{RecordKey, RecordType, ZoneRecord},
    serial::{SerialLedger, SerialNumber},
};

mod config;
pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;
mod state;

pub use self::config::StoreConfig;
pub use self::file::{FileConfig, ZoneFileBackend};
pub use self::memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use self::sqlite::{Journal, SqliteConfig};
pub use self::state::{SoaParams, ZoneState};

/// Durable storage of the zone
///
/// The store calls [`Self::commit`] while it holds the write section, at most one commit is in
/// flight at any time.
#[async_trait]
pub trait ZonePersistenceBackend: Send + Sync {
    /// Recover the last committed state, `None` if nothing was ever committed
    async fn load(&self) -> PersistenceResult<Option<ZoneState>>;

    /// Durably persist the full state
    ///
    /// Must not return `Ok` before the state survives a crash. On error the previous state must
    /// still be what [`Self::load`] returns.
    async fn commit(&self, state: &ZoneState) -> PersistenceResult<()>;
}

#[async_trait]
impl<T: ZonePersistenceBackend + ?Sized> ZonePersistenceBackend for Arc<T> {
    async fn load(&self) -> PersistenceResult<Option<ZoneState>> {
        (**self).load().await
    }

    async fn commit(&self, state: &ZoneState) -> PersistenceResult<()> {
        (**self).commit(state).await
    }
}

/// One per `(owner, type)` change of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementaryMutation {
    /// Create or replace the record at its key
    Upsert(ZoneRecord),
    /// Remove the record if it exists
    Delete {
        /// fully qualified owner
        owner: Name,
        /// type to remove
        record_type: RecordType,
    },
}

impl ElementaryMutation {
    /// The owner this mutation touches
    pub fn owner(&self) -> &Name {
        match self {
            Self::Upsert(record) => record.owner(),
            Self::Delete { owner, .. } => owner,
        }
    }

    /// The key this mutation touches
    pub fn key(&self) -> RecordKey {
        match self {
            Self::Upsert(record) => record.key(),
            Self::Delete { owner, record_type } => RecordKey::new(owner, *record_type),
        }
    }

    /// True if applying this mutation to `zone` would change what it serves
    pub fn changes(&self, zone: &ZoneState) -> bool {
        match self {
            Self::Upsert(record) => !zone
                .lookup(&record.key())
                .is_some_and(|existing| existing.is_equivalent(record)),
            Self::Delete { .. } => zone.lookup(&self.key()).is_some(),
        }
    }
}

/// The outcome of a transaction applied by [`WriteSection::apply_transaction`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Serial of the zone after the transaction
    pub serial: SerialNumber,
    /// Owners whose records actually changed, in the order first touched
    pub changed: Vec<Name>,
}

struct Writer {
    backend: Box<dyn ZonePersistenceBackend>,
    ledger: SerialLedger,
}

/// Owns the zone: a consistent snapshot for readers and a single serialized write path
///
/// Readers get an `Arc` of the last committed [`ZoneState`] and never wait on a writer's
/// persistence I/O. Writers queue on the write section, see [`Self::begin`].
pub struct ZoneStateStore {
    current: Arc<RwLock<Arc<ZoneState>>>,
    writer: Arc<Mutex<Writer>>,
    write_timeout: Option<Duration>,
}

impl ZoneStateStore {
    /// Open the store, recovering the zone from `backend`
    ///
    /// If the backend has never been committed to, `seed` is committed as the initial zone.
    ///
    /// # Arguments
    ///
    /// * `backend` - durable storage of the zone
    /// * `seed` - the fresh zone with its SOA and NS records
    /// * `serial_increment` - step of the serial per committed transaction
    pub async fn open(
        backend: Box<dyn ZonePersistenceBackend>,
        seed: ZoneState,
        serial_increment: u32,
    ) -> PersistenceResult<Self> {
        let state = match backend.load().await? {
            Some(state) => {
                if state.origin() != seed.origin() {
                    return Err(PersistenceErrorKind::Recovery(format!(
                        "persisted zone {} does not match configured zone {}",
                        state.origin(),
                        seed.origin()
                    ))
                    .into());
                }

                info!(
                    "recovered zone {} at serial {} with {} records",
                    state.origin(),
                    state.serial(),
                    state.len()
                );
                state
            }
            None => {
                info!(
                    "seeding zone {} at serial {}",
                    seed.origin(),
                    seed.serial()
                );
                backend.commit(&seed).await.map_err(|e| {
                    error!("failed to persist seeded zone {}: {e}", seed.origin());
                    e
                })?;
                seed
            }
        };

        let ledger = SerialLedger::recover(state.serial(), serial_increment);
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(state))),
            writer: Arc::new(Mutex::new(Writer { backend, ledger })),
            write_timeout: None,
        })
    }

    /// Bound the wait for the write section, `None` waits forever
    pub fn with_write_timeout(mut self, write_timeout: Option<Duration>) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// The last committed zone
    pub async fn snapshot(&self) -> Arc<ZoneState> {
        Arc::clone(&*self.current.read().await)
    }

    /// The serial of the last committed zone
    pub async fn serial(&self) -> SerialNumber {
        self.current.read().await.serial()
    }

    /// Enter the write section, waiting for any in-flight transaction
    ///
    /// Fails with [`UpdateErrorKind::ConcurrencyTimeout`] if a write timeout is configured and
    /// expires first.
    pub async fn begin(&self) -> Result<WriteSection, UpdateError> {
        let lock = Arc::clone(&self.writer).lock_owned();
        let writer = match self.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock)
                .await
                .map_err(|_| UpdateErrorKind::ConcurrencyTimeout(timeout))?,
            None => lock.await,
        };

        let base = self.snapshot().await;
        Ok(WriteSection {
            current: Arc::clone(&self.current),
            writer,
            base,
        })
    }
}

/// Exclusive access to the write path of a [`ZoneStateStore`]
///
/// Dropping the section without applying a transaction leaves the zone untouched.
pub struct WriteSection {
    current: Arc<RwLock<Arc<ZoneState>>>,
    writer: OwnedMutexGuard<Writer>,
    base: Arc<ZoneState>,
}

impl WriteSection {
    /// The committed zone, stable for the life of the section
    pub fn state(&self) -> &ZoneState {
        &self.base
    }

    /// Apply all mutations as one transaction
    ///
    /// Later mutations of the same key win. If the batch changes nothing the serial stays put
    /// and nothing is persisted. Otherwise the next serial is staged together with the records,
    /// the staged zone is committed to the backend, and only then published to readers. A
    /// failed commit leaves the zone and the serial as they were.
    ///
    /// The transaction runs on its own task and holds the write section until it is done.
    /// Dropping the returned future does not abort it, a commit that reached the backend is
    /// always published.
    pub async fn apply_transaction(
        self,
        mutations: Vec<ElementaryMutation>,
    ) -> PersistenceResult<CommitResult> {
        match tokio::spawn(self.run(mutations)).await {
            Ok(result) => result,
            Err(e) => {
                error!("zone transaction task failed: {e}");
                Err(
                    PersistenceErrorKind::Recovery(format!("transaction task failed: {e}"))
                        .into(),
                )
            }
        }
    }

    async fn run(mut self, mutations: Vec<ElementaryMutation>) -> PersistenceResult<CommitResult> {
        let mut staged = (*self.base).clone();
        let mut touched: Vec<(RecordKey, Name)> = Vec::new();

        for mutation in mutations {
            let key = mutation.key();
            if !touched.iter().any(|(k, _)| *k == key) {
                touched.push((key.clone(), mutation.owner().clone()));
            }

            match mutation {
                ElementaryMutation::Upsert(record) => {
                    staged.upsert(record);
                }
                ElementaryMutation::Delete { .. } => {
                    staged.remove(&key);
                }
            }
        }

        let mut changed: Vec<Name> = Vec::new();
        for (key, owner) in touched {
            let same = match (self.base.lookup(&key), staged.lookup(&key)) {
                (None, None) => true,
                (Some(before), Some(after)) => before.is_equivalent(after),
                _ => false,
            };
            if !same && !changed.contains(&owner) {
                changed.push(owner);
            }
        }

        if changed.is_empty() {
            debug!("transaction changes nothing, serial stays {}", self.base.serial());
            return Ok(CommitResult {
                serial: self.base.serial(),
                changed,
            });
        }

        let serial = self.writer.ledger.next_serial();
        staged.set_serial(serial);

        if let Err(e) = self.writer.backend.commit(&staged).await {
            error!(
                "failed to persist zone {} at serial {serial}: {e}",
                staged.origin()
            );
            return Err(e);
        }

        self.writer.ledger.advance(serial);
        *self.current.write().await = Arc::new(staged);

        info!(
            "committed serial {serial}, changed: {}",
            changed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(CommitResult { serial, changed })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::record::RecordValue;

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    fn seed() -> ZoneState {
        let ns = name("ns.zone.example.");
        ZoneState::new(
            name("zone.example."),
            SerialNumber::new(1),
            3600,
            SoaParams {
                mname: ns.clone(),
                rname: name("hostmaster.zone.example."),
                refresh: 3600,
                retry: 600,
                expire: 604_800,
                minimum: 300,
            },
            vec![ns],
        )
    }

    fn a(owner: &str, last: u8) -> ElementaryMutation {
        ElementaryMutation::Upsert(ZoneRecord::new(
            name(owner),
            RecordValue::A(Ipv4Addr::new(192, 0, 2, last)),
            60,
        ))
    }

    #[tokio::test]
    async fn test_last_write_in_batch_wins() {
        let store = ZoneStateStore::open(Box::<MemoryBackend>::default(), seed(), 1)
            .await
            .unwrap();

        let section = store.begin().await.unwrap();
        let result = section
            .apply_transaction(vec![a("h1.zone.example.", 1), a("h1.zone.example.", 2)])
            .await
            .unwrap();
        assert_eq!(result.serial.get(), 2);
        assert_eq!(result.changed, vec![name("h1.zone.example.")]);

        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot
                .get(&name("h1.zone.example."), RecordType::A)
                .map(|r| r.value()),
            Some(&RecordValue::A(Ipv4Addr::new(192, 0, 2, 2)))
        );
    }

    #[tokio::test]
    async fn test_net_zero_batch_keeps_serial() {
        let store = ZoneStateStore::open(Box::<MemoryBackend>::default(), seed(), 1)
            .await
            .unwrap();

        let section = store.begin().await.unwrap();
        let result = section
            .apply_transaction(vec![
                a("h1.zone.example.", 1),
                ElementaryMutation::Delete {
                    owner: name("h1.zone.example."),
                    record_type: RecordType::A,
                },
            ])
            .await
            .unwrap();
        assert_eq!(result.serial.get(), 1);
        assert!(result.changed.is_empty());
        assert_eq!(store.serial().await.get(), 1);
    }

    #[tokio::test]
    async fn test_origin_mismatch_is_rejected() {
        let backend = Arc::new(MemoryBackend::default());
        ZoneStateStore::open(Box::new(Arc::clone(&backend)), seed(), 1)
            .await
            .unwrap();

        let base = seed();
        let other = ZoneState::new(
            name("other.example."),
            base.serial(),
            base.apex_ttl(),
            base.soa().clone(),
            base.name_servers().to_vec(),
        );
        let error = ZoneStateStore::open(Box::new(backend), other, 1)
            .await
            .err()
            .unwrap();
        assert!(matches!(error.kind(), PersistenceErrorKind::Recovery(_)));
    }

    #[test]
    fn test_mutation_changes() {
        let mut zone = seed();
        let upsert = a("h1.zone.example.", 1);
        let delete = ElementaryMutation::Delete {
            owner: name("H1.zone.example."),
            record_type: RecordType::A,
        };

        assert!(upsert.changes(&zone));
        assert!(!delete.changes(&zone));

        let ElementaryMutation::Upsert(record) = upsert.clone() else {
            unreachable!()
        };
        zone.upsert(record);
        assert!(!upsert.changes(&zone));
        assert!(delete.changes(&zone));
        assert!(a("h1.zone.example.", 9).changes(&zone));
    }
}
