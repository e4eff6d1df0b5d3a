// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Volatile persistence, for tests and dry runs

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::PersistenceResult,
    store::{ZonePersistenceBackend, ZoneState},
};

/// Keeps the last committed zone in memory only
#[derive(Default)]
pub struct MemoryBackend {
    committed: RwLock<Option<ZoneState>>,
}

impl MemoryBackend {
    /// A backend that recovers `state` on open
    pub fn with_state(state: ZoneState) -> Self {
        Self {
            committed: RwLock::new(Some(state)),
        }
    }

    /// The last committed zone
    pub async fn committed(&self) -> Option<ZoneState> {
        self.committed.read().await.clone()
    }
}

#[async_trait]
impl ZonePersistenceBackend for MemoryBackend {
    async fn load(&self) -> PersistenceResult<Option<ZoneState>> {
        Ok(self.committed().await)
    }

    async fn commit(&self, state: &ZoneState) -> PersistenceResult<()> {
        *self.committed.write().await = Some(state.clone());
        Ok(())
    }
}
