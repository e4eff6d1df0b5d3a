// Copyright 2015-2018 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Configuration for the stores

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    error::PersistenceResult,
    proto::rr::Name,
    store::{file::FileConfig, MemoryBackend, ZoneFileBackend, ZonePersistenceBackend},
};
#[cfg(feature = "sqlite")]
use crate::store::sqlite::{Journal, SqliteConfig};

/// Enumeration over all Store configurations
#[derive(Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum StoreConfig {
    /// File based configuration
    File(FileConfig),
    /// Nothing survives the process
    Memory,
    /// Sqlite based configuration file
    #[cfg(feature = "sqlite")]
    #[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
    Sqlite(SqliteConfig),
}

impl StoreConfig {
    /// The default store of a zone, its zone file `<zone>.zone`
    pub fn default_for(zone: &Name) -> Self {
        let mut file_name = zone.to_ascii();
        if file_name.ends_with('.') {
            file_name.pop();
        }
        file_name.push_str(".zone");

        Self::File(FileConfig::new(file_name))
    }

    /// Build the backend
    ///
    /// # Arguments
    ///
    /// * `root_dir` - directory relative paths are resolved against
    /// * `origin` - the zone the backend holds
    pub fn backend(
        &self,
        root_dir: Option<&Path>,
        origin: &Name,
    ) -> PersistenceResult<Box<dyn ZonePersistenceBackend>> {
        match self {
            Self::File(config) => Ok(Box::new(ZoneFileBackend::new(
                resolve(root_dir, &config.zone_file_path),
                origin.clone(),
            ))),
            Self::Memory => Ok(Box::<MemoryBackend>::default()),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(config) => {
                let mut journal = Journal::from_file(
                    &resolve(root_dir, &config.journal_file_path),
                    origin.clone(),
                )?;
                if let Some(zone_file_path) = &config.zone_file_path {
                    journal = journal.with_zone_file(ZoneFileBackend::new(
                        resolve(root_dir, zone_file_path),
                        origin.clone(),
                    ));
                }
                Ok(Box::new(journal))
            }
        }
    }
}

fn resolve(root_dir: Option<&Path>, path: &Path) -> PathBuf {
    match root_dir {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}
