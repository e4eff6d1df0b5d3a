// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Turns validated requests into atomic zone transactions

use std::{net::Ipv4Addr, sync::Arc};

use tracing::debug;

use crate::{
    error::{UpdateErrorKind, UpdateResult, ValidationError},
    proto::rr::Name,
    record::{MutationRequest, Operation, RecordType, RecordValue, ZoneRecord},
    serial::SerialNumber,
    store::{ElementaryMutation, ZoneStateStore},
};

/// What a call to [`UpdateTransactionEngine::apply`] did to the zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// At least one record changed and the serial advanced exactly once
    Committed {
        /// the new serial
        serial: SerialNumber,
        /// owners whose records changed
        changed: Vec<Name>,
    },
    /// Nothing changed, the serial is untouched
    NoOp {
        /// the current serial
        serial: SerialNumber,
    },
}

impl TransactionOutcome {
    /// Serial of the zone after the transaction
    pub fn serial(&self) -> SerialNumber {
        match self {
            Self::Committed { serial, .. } | Self::NoOp { serial } => *serial,
        }
    }

    /// Owners whose records changed, empty for a no-op
    pub fn changed(&self) -> &[Name] {
        match self {
            Self::Committed { changed, .. } => changed,
            Self::NoOp { .. } => &[],
        }
    }

    /// True if the zone is unchanged
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }
}

/// The sole writer of the [`ZoneStateStore`]
#[derive(Clone)]
pub struct UpdateTransactionEngine {
    store: Arc<ZoneStateStore>,
    default_ttl: u32,
}

impl UpdateTransactionEngine {
    /// Creates an engine writing records with `default_ttl`
    pub fn new(store: Arc<ZoneStateStore>, default_ttl: u32) -> Self {
        Self { store, default_ttl }
    }

    /// The store this engine writes to
    pub fn store(&self) -> &Arc<ZoneStateStore> {
        &self.store
    }

    /// Apply all requests as one transaction
    ///
    /// Every request is expanded into one mutation per owner, repeated keys collapse with the
    /// last one winning. If nothing would change the serial is not advanced and nothing is
    /// persisted.
    ///
    /// # Arguments
    ///
    /// * `requests` - validated requests, applied in order
    /// * `client_address` - the value of `A` updates that carry none
    pub async fn apply(
        &self,
        requests: &[MutationRequest],
        client_address: Option<Ipv4Addr>,
    ) -> UpdateResult<TransactionOutcome> {
        let mutations = self.expand(requests, client_address)?;

        let section = self.store.begin().await?;
        if !mutations.iter().any(|m| m.changes(section.state())) {
            let serial = section.state().serial();
            debug!(
                "no net change in {} mutations, serial stays {serial}",
                mutations.len()
            );
            return Ok(TransactionOutcome::NoOp { serial });
        }

        let result = section.apply_transaction(mutations).await?;
        Ok(TransactionOutcome::Committed {
            serial: result.serial,
            changed: result.changed,
        })
    }

    fn expand(
        &self,
        requests: &[MutationRequest],
        client_address: Option<Ipv4Addr>,
    ) -> UpdateResult<Vec<ElementaryMutation>> {
        let mut mutations: Vec<ElementaryMutation> = Vec::new();

        for request in requests {
            let value = match (request.operation(), request.value()) {
                (Operation::Delete, _) => None,
                (Operation::Update, Some(value)) => Some(value.clone()),
                (Operation::Update, None) => match (request.record_type(), client_address) {
                    (RecordType::A, Some(addr)) => Some(RecordValue::A(addr)),
                    (RecordType::A, None) => {
                        return Err(UpdateErrorKind::NoResolvableAddress(
                            "no client address for A update without value".to_string(),
                        )
                        .into())
                    }
                    (RecordType::TXT, _) => return Err(ValidationError::MissingValue.into()),
                },
            };

            for owner in request.owners() {
                let mutation = match &value {
                    Some(value) => ElementaryMutation::Upsert(ZoneRecord::new(
                        owner.clone(),
                        value.clone(),
                        self.default_ttl,
                    )),
                    None => ElementaryMutation::Delete {
                        owner: owner.clone(),
                        record_type: request.record_type(),
                    },
                };

                let key = mutation.key();
                match mutations.iter_mut().find(|m| m.key() == key) {
                    Some(earlier) => *earlier = mutation,
                    None => mutations.push(mutation),
                }
            }
        }

        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{MemoryBackend, SoaParams, ZoneState},
        validator::Validator,
    };

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    async fn engine() -> UpdateTransactionEngine {
        let ns = name("ns.zone.example.");
        let seed = ZoneState::new(
            name("zone.example."),
            SerialNumber::new(10),
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
        );
        let store = ZoneStateStore::open(Box::<MemoryBackend>::default(), seed, 1)
            .await
            .unwrap();
        UpdateTransactionEngine::new(Arc::new(store), 300)
    }

    fn request(rtype: &str, op: &str, hosts: &[&str], value: Option<&str>) -> MutationRequest {
        Validator::new(name("zone.example."))
            .validate(rtype, op, hosts, value)
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_hosts_bump_once() {
        let engine = engine().await;
        let outcome = engine
            .apply(
                &[request("A", "update", &["h1", "h1", "H1"], Some("192.0.2.1"))],
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.serial().get(), 11);
        assert_eq!(outcome.changed(), &[name("h1.zone.example.")]);

        let snapshot = engine.store().snapshot().await;
        let record = snapshot.get(&name("h1.zone.example."), RecordType::A).unwrap();
        assert_eq!(record.ttl(), 300);
    }

    #[tokio::test]
    async fn test_client_address_fills_a_update() {
        let engine = engine().await;
        let outcome = engine
            .apply(
                &[request("A", "update", &["h1"], None)],
                Some(Ipv4Addr::new(198, 51, 100, 9)),
            )
            .await
            .unwrap();
        assert!(!outcome.is_noop());

        let error = engine
            .apply(&[request("A", "update", &["h2"], None)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            error.kind(),
            UpdateErrorKind::NoResolvableAddress(_)
        ));
    }

    #[tokio::test]
    async fn test_batch_of_requests_is_one_transaction() {
        let engine = engine().await;
        let outcome = engine
            .apply(
                &[
                    request("A", "update", &["h1"], Some("192.0.2.1")),
                    request("TXT", "update", &["h1", "h2"], Some("hello")),
                    request("A", "delete", &["h3"], None),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.serial().get(), 11);
        assert_eq!(
            outcome.changed(),
            &[name("h1.zone.example."), name("h2.zone.example.")]
        );
    }

    #[tokio::test]
    async fn test_later_request_wins() {
        let engine = engine().await;
        engine
            .apply(
                &[
                    request("TXT", "update", &["h1"], Some("first")),
                    request("TXT", "delete", &["h1"], None),
                ],
                None,
            )
            .await
            .map(|outcome| assert!(outcome.is_noop()))
            .unwrap();

        assert_eq!(engine.store().serial().await.get(), 10);
    }
}
