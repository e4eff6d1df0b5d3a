// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;

use crate::{
    proto::rr::Name,
    record::{RecordKey, RecordType, ZoneRecord},
    serial::SerialNumber,
    serialize::txt,
};

/// Parameters of the zone's SOA record, apart from the serial which the ledger owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoaParams {
    /// primary nameserver
    pub mname: Name,
    /// mailbox of the responsible person, with the `@` replaced by a dot
    pub rname: Name,
    /// seconds before secondaries refresh
    pub refresh: u32,
    /// seconds between failed refresh retries
    pub retry: u32,
    /// seconds after which secondaries stop answering
    pub expire: u32,
    /// negative caching TTL
    pub minimum: u32,
}

/// The full authoritative snapshot of the zone
///
/// Snapshots are immutable once published by the [`super::ZoneStateStore`], the write path works
/// on a private copy and swaps it in as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneState {
    origin: Name,
    serial: SerialNumber,
    apex_ttl: u32,
    soa: SoaParams,
    name_servers: Vec<Name>,
    records: BTreeMap<RecordKey, ZoneRecord>,
}

impl ZoneState {
    /// A zone with only its apex SOA and NS records
    ///
    /// # Arguments
    ///
    /// * `origin` - fully qualified zone name
    /// * `serial` - serial of the seeded zone
    /// * `apex_ttl` - TTL of the SOA and NS records
    /// * `soa` - SOA parameters
    /// * `name_servers` - names of the NS records at the apex
    pub fn new(
        origin: Name,
        serial: SerialNumber,
        apex_ttl: u32,
        soa: SoaParams,
        name_servers: Vec<Name>,
    ) -> Self {
        Self {
            origin,
            serial,
            apex_ttl,
            soa,
            name_servers,
            records: BTreeMap::new(),
        }
    }

    /// The zone name
    pub fn origin(&self) -> &Name {
        &self.origin
    }

    /// The serial this snapshot was committed with
    pub fn serial(&self) -> SerialNumber {
        self.serial
    }

    /// TTL of the apex records
    pub fn apex_ttl(&self) -> u32 {
        self.apex_ttl
    }

    /// SOA parameters
    pub fn soa(&self) -> &SoaParams {
        &self.soa
    }

    /// NS targets at the apex
    pub fn name_servers(&self) -> &[Name] {
        &self.name_servers
    }

    /// All dynamic records, ordered by owner and type
    pub fn records(&self) -> impl Iterator<Item = &ZoneRecord> + '_ {
        self.records.values()
    }

    /// Lookup a record by key
    pub fn lookup(&self, key: &RecordKey) -> Option<&ZoneRecord> {
        self.records.get(key)
    }

    /// Lookup a record by owner and type
    pub fn get(&self, owner: &Name, record_type: RecordType) -> Option<&ZoneRecord> {
        self.lookup(&RecordKey::new(owner, record_type))
    }

    /// Number of dynamic records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if there are no dynamic records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render as a master file the nameserver can load
    pub fn to_zone_file(&self) -> String {
        txt::emit(self)
    }

    /// Inserts or replaces the record at its key
    ///
    /// # Return value
    ///
    /// true if the zone changed
    pub(crate) fn upsert(&mut self, record: ZoneRecord) -> bool {
        let key = record.key();
        match self.records.get(&key) {
            Some(existing) if existing.is_equivalent(&record) => false,
            _ => {
                self.records.insert(key, record);
                true
            }
        }
    }

    /// Removes the record, returning it if it existed
    pub(crate) fn remove(&mut self, key: &RecordKey) -> Option<ZoneRecord> {
        self.records.remove(key)
    }

    pub(crate) fn set_serial(&mut self, serial: SerialNumber) {
        self.serial = serial;
    }

    pub(crate) fn push_name_server(&mut self, name: Name) {
        if !self.name_servers.contains(&name) {
            self.name_servers.push(name);
        }
    }
}
