// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The entry point of the zone update coordinator

use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
    sync::Arc,
};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    config::ZoneConfig,
    error::{ConfigResult, UpdateError, UpdateErrorKind, UpdateResult},
    identity::{ClientIdentityResolver, ClientRequest},
    proto::rr::Name,
    record::{display_owner, MutationRequest, Operation, RecordValue},
    store::{ZonePersistenceBackend, ZoneState, ZoneStateStore},
    transaction::{TransactionOutcome, UpdateTransactionEngine},
    validator::Validator,
};

/// The structured result handed back to the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResponse {
    /// true if the request was applied, or was a no-op
    pub success: bool,
    /// human readable summary
    pub message: String,
    /// serial of the zone after the request, absent on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,
    /// owners whose records changed, without the trailing dot
    pub changed: Vec<String>,
    /// the request field that failed validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl UpdateResponse {
    fn applied(
        request: &MutationRequest,
        value: Option<&RecordValue>,
        outcome: &TransactionOutcome,
    ) -> Self {
        let rtype = request.record_type();
        let message = match (outcome, request.operation()) {
            (TransactionOutcome::NoOp { .. }, _) => {
                let mut owners = Vec::<&Name>::new();
                for owner in request.owners() {
                    if !owners.contains(&owner) {
                        owners.push(owner);
                    }
                }
                match value {
                    Some(value) => format!("No change: {} {rtype} {value}", owner_list(owners)),
                    None => format!("No change: {} {rtype}", owner_list(owners)),
                }
            }
            (TransactionOutcome::Committed { changed, .. }, Operation::Update) => {
                let value = value.map(ToString::to_string).unwrap_or_default();
                format!("Updated record: {} {rtype} {value}", owner_list(changed))
            }
            (TransactionOutcome::Committed { changed, .. }, Operation::Delete) => {
                format!("Deleted record: {} {rtype}", owner_list(changed))
            }
        };

        Self {
            success: true,
            message,
            serial: Some(outcome.serial().get()),
            changed: outcome.changed().iter().map(display_owner).collect(),
            field: None,
        }
    }

    /// The response for a failed request, internal details are never included
    pub fn from_error(error: &UpdateError) -> Self {
        let field = match error.kind() {
            UpdateErrorKind::Validation(validation) => Some(validation.field()),
            UpdateErrorKind::NoResolvableAddress(_) => Some("value"),
            _ => None,
        };

        Self {
            success: false,
            message: error.public_message(),
            serial: None,
            changed: Vec::new(),
            field,
        }
    }
}

fn owner_list<'a>(owners: impl IntoIterator<Item = &'a Name>) -> String {
    let owners = owners.into_iter().map(display_owner).collect::<Vec<_>>();
    format!("[{}]", owners.join(", "))
}

/// Sequences validation, identity resolution and the transaction for every inbound request
///
/// The coordinator is cheap to share behind an `Arc`; all writes funnel into the single write
/// section of its [`ZoneStateStore`].
pub struct MutationCoordinator {
    validator: Validator,
    identity: ClientIdentityResolver,
    engine: UpdateTransactionEngine,
}

impl MutationCoordinator {
    /// Assemble a coordinator from its parts
    pub fn new(
        validator: Validator,
        identity: ClientIdentityResolver,
        engine: UpdateTransactionEngine,
    ) -> Self {
        Self {
            validator,
            identity,
            engine,
        }
    }

    /// Open the configured store and build a coordinator on top of it
    ///
    /// # Arguments
    ///
    /// * `config` - the zone configuration
    /// * `root_dir` - directory relative store paths are resolved against
    pub async fn from_config(config: &ZoneConfig, root_dir: Option<&Path>) -> ConfigResult<Self> {
        config.validate()?;
        let origin = config.get_zone()?;
        let backend = config.get_store()?.backend(root_dir, &origin)?;
        Self::with_backend(config, backend).await
    }

    /// Build a coordinator persisting through `backend`, ignoring the configured store
    pub async fn with_backend(
        config: &ZoneConfig,
        backend: Box<dyn ZonePersistenceBackend>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let origin = config.get_zone()?;

        let store = ZoneStateStore::open(backend, config.seed_zone()?, config.get_serial_increment())
            .await?
            .with_write_timeout(config.get_write_timeout());
        info!("managing zone {origin} at serial {}", store.serial().await);

        Ok(Self::new(
            Validator::new(origin).with_max_txt_length(config.get_max_txt_length()),
            ClientIdentityResolver::new(config.get_trusted_proxies().iter().copied()),
            UpdateTransactionEngine::new(Arc::new(store), config.get_default_ttl()),
        ))
    }

    /// The managed zone
    pub fn zone(&self) -> &Name {
        self.validator.zone()
    }

    /// Handle one authenticated mutation call
    ///
    /// # Arguments
    ///
    /// * `raw_type` - `A` or `TXT`
    /// * `raw_operation` - `update` or `delete`
    /// * `hosts` - hosts relative to the zone
    /// * `value` - the record data, for `A` updates the caller's address if absent
    /// * `request` - transport facts of the call
    pub async fn handle<S: AsRef<str>>(
        &self,
        raw_type: &str,
        raw_operation: &str,
        hosts: &[S],
        value: Option<&str>,
        request: &ClientRequest,
    ) -> UpdateResult<UpdateResponse> {
        let mutation = self
            .validator
            .validate(raw_type, raw_operation, hosts, value)
            .map_err(|e| {
                debug!("rejected request from {}: {e}", request.peer());
                UpdateError::from(e)
            })?;

        let client_address = if mutation.needs_client_address() {
            Some(self.identity.resolve_client_address(request)?)
        } else {
            None
        };

        let outcome = self
            .engine
            .apply(std::slice::from_ref(&mutation), client_address)
            .await
            .map_err(|e| {
                if !e.is_caller_error() {
                    error!("request from {} failed: {e}", request.peer());
                }
                e
            })?;

        let value = effective_value(&mutation, client_address);
        Ok(UpdateResponse::applied(&mutation, value.as_ref(), &outcome))
    }

    /// The caller's address as seen through trusted proxies, for the unauthenticated "what is
    /// my address" call
    pub fn client_address(&self, request: &ClientRequest) -> IpAddr {
        self.identity.client_address(request)
    }

    /// The last committed zone
    pub async fn snapshot(&self) -> Arc<ZoneState> {
        self.engine.store().snapshot().await
    }
}

fn effective_value(
    mutation: &MutationRequest,
    client_address: Option<Ipv4Addr>,
) -> Option<RecordValue> {
    match mutation.operation() {
        Operation::Delete => None,
        Operation::Update => mutation
            .value()
            .cloned()
            .or_else(|| client_address.map(RecordValue::A)),
    }
}
