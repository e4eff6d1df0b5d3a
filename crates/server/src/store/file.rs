// Copyright 2015-2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Zone file persistence, the view the nameserver reloads

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use crate::{
    error::PersistenceResult,
    proto::rr::Name,
    serialize::txt::Parser,
    store::{ZonePersistenceBackend, ZoneState},
};

/// Configuration for file based zones
#[derive(Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// path to the zone file
    pub zone_file_path: PathBuf,
}

impl FileConfig {
    /// Create a new [`FileConfig`] from a path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            zone_file_path: path.into(),
        }
    }
}

/// Persists the zone as an RFC 1035 master file
///
/// Each commit writes the whole zone to a sibling temporary file, syncs it, and renames it over
/// the zone file. Readers of the path only ever see a complete zone.
#[derive(Debug)]
pub struct ZoneFileBackend {
    path: PathBuf,
    origin: Name,
}

impl ZoneFileBackend {
    /// Creates a backend for the zone file at `path` holding the zone `origin`
    pub fn new(path: impl Into<PathBuf>, origin: Name) -> Self {
        Self {
            path: path.into(),
            origin,
        }
    }

    /// Path of the zone file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = OsString::from(self.path.as_os_str());
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    async fn write_atomic(&self, contents: &str) -> io::Result<()> {
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &self.path).await?;
        self.sync_directory().await
    }

    /// Flushes the directory entry of the renamed zone file
    #[cfg(unix)]
    async fn sync_directory(&self) -> io::Result<()> {
        fs::File::open(self.directory()).await?.sync_all().await
    }

    #[cfg(not(unix))]
    async fn sync_directory(&self) -> io::Result<()> {
        Ok(())
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

#[async_trait]
impl ZonePersistenceBackend for ZoneFileBackend {
    async fn load(&self) -> PersistenceResult<Option<ZoneState>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no zone file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        debug!("loading zone file {}", self.path.display());
        Parser::new(&text, Some(self.origin.clone()))
            .parse()
            .map(Some)
    }

    async fn commit(&self, state: &ZoneState) -> PersistenceResult<()> {
        if let Err(e) = self.write_atomic(&state.to_zone_file()).await {
            let temp = self.temp_path();
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("could not remove {}: {cleanup}", temp.display());
                }
            }
            return Err(e.into());
        }

        debug!(
            "wrote zone file {} at serial {}",
            self.path.display(),
            state.serial()
        );
        Ok(())
    }
}
