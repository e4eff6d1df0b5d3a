// Copyright 2015-2018 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Configuration of the managed zone

#[cfg(feature = "toml")]
use std::fs::File;
#[cfg(feature = "toml")]
use std::io::Read;
#[cfg(feature = "toml")]
use std::path::Path;
use std::{collections::BTreeMap, net::Ipv4Addr, time::Duration};

use ipnet::IpNet;
use serde::{self, Deserialize};

use crate::error::{ConfigErrorKind, ConfigResult};
use crate::proto::rr::Name;
use crate::record::{RecordValue, ZoneRecord};
use crate::serial::{SerialNumber, MAX_SERIAL_INCREMENT};
use crate::store::{SoaParams, StoreConfig, ZoneState};
use crate::validator::DEFAULT_MAX_TXT_LENGTH;

static DEFAULT_TTL: u32 = 3600;
static DEFAULT_SERIAL_INCREMENT: u32 = 1;
static DEFAULT_INITIAL_SERIAL: u32 = 1;
static DEFAULT_REFRESH: u32 = 3600;
static DEFAULT_RETRY: u32 = 600;
static DEFAULT_EXPIRE: u32 = 604_800;
static DEFAULT_MINIMUM: u32 = 300;

/// Configuration for the zone under dynamic management
///
/// ```toml
/// zone = "dyn.example.com"
/// default_ttl = 60
/// trusted_proxies = ["10.0.0.0/8"]
///
/// [glue]
/// ns = "192.0.2.53"
///
/// [store]
/// type = "file"
/// zone_file_path = "dyn.example.com.zone"
/// ```
#[derive(Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    /// name of the zone, records are created below it
    pub zone: String,
    /// TTL of records written on request
    pub default_ttl: Option<u32>,
    /// Networks of proxies whose forwarded-for headers are believed
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    /// Step of the serial per committed transaction
    pub serial_increment: Option<u32>,
    /// Serial of a freshly seeded zone
    pub initial_serial: Option<u32>,
    /// Bound on the wait for the write section, waits forever if absent
    pub write_timeout_ms: Option<u64>,
    /// Maximum TXT value length in bytes
    pub max_txt_length: Option<usize>,
    /// SOA of a freshly seeded zone
    #[serde(default)]
    pub soa: SoaConfig,
    /// NS records of a freshly seeded zone
    #[serde(default)]
    pub name_servers: Vec<String>,
    /// Addresses of the nameservers inside the zone, seeded as `A` records
    #[serde(default)]
    pub glue: BTreeMap<String, Ipv4Addr>,
    /// Persistence of the zone
    pub store: Option<StoreConfig>,
}

/// SOA parameters of a freshly seeded zone, relative names are below the zone
#[derive(Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SoaConfig {
    /// primary nameserver, `ns` by default
    pub mname: Option<String>,
    /// responsible mailbox, `hostmaster` by default
    pub rname: Option<String>,
    /// refresh interval
    pub refresh: Option<u32>,
    /// retry interval
    pub retry: Option<u32>,
    /// expire interval
    pub expire: Option<u32>,
    /// negative caching TTL
    pub minimum: Option<u32>,
}

impl ZoneConfig {
    /// A configuration with every default for `zone`
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            default_ttl: None,
            trusted_proxies: Vec::new(),
            serial_increment: None,
            initial_serial: None,
            write_timeout_ms: None,
            max_txt_length: None,
            soa: SoaConfig::default(),
            name_servers: Vec::new(),
            glue: BTreeMap::new(),
            store: None,
        }
    }

    /// read a ZoneConfig file from the file specified at path.
    #[cfg(feature = "toml")]
    #[cfg_attr(docsrs, doc(cfg(feature = "toml")))]
    pub fn read_config(path: &Path) -> ConfigResult<Self> {
        let mut file = File::open(path)?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)?;
        Self::from_toml(&toml)
    }

    /// Read a [`ZoneConfig`] from the given TOML string.
    #[cfg(feature = "toml")]
    #[cfg_attr(docsrs, doc(cfg(feature = "toml")))]
    pub fn from_toml(toml: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(toml)?)
    }

    /// Use `store` for persistence
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = Some(store);
        self
    }

    /// Trust forwarded-for headers from these networks
    pub fn with_trusted_proxies(mut self, networks: impl IntoIterator<Item = IpNet>) -> Self {
        self.trusted_proxies.extend(networks);
        self
    }

    /// Set the TTL of written records
    pub fn with_default_ttl(mut self, ttl: u32) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the serial of a freshly seeded zone
    pub fn with_initial_serial(mut self, serial: u32) -> Self {
        self.initial_serial = Some(serial);
        self
    }

    /// Seed `addr` as the address of the nameserver `name_server`
    pub fn with_glue(mut self, name_server: impl Into<String>, addr: Ipv4Addr) -> Self {
        self.glue.insert(name_server.into(), addr);
        self
    }

    /// Bound the wait for the write section
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// returns the fully qualified name of the zone, i.e. `example.com.` for `example.com`
    ///
    /// Surrounding spaces and dots are ignored.
    pub fn get_zone(&self) -> ConfigResult<Name> {
        let zone = self.zone.trim_matches(|c: char| c == '.' || c.is_whitespace());
        if zone.is_empty() {
            return Err(ConfigErrorKind::Invalid(format!("zone name {:?} is empty", self.zone)).into());
        }

        Ok(Name::from_ascii(format!("{zone}."))?)
    }

    /// TTL of records written on request
    pub fn get_default_ttl(&self) -> u32 {
        self.default_ttl.unwrap_or(DEFAULT_TTL)
    }

    /// Networks whose forwarded-for headers are believed
    pub fn get_trusted_proxies(&self) -> &[IpNet] {
        &self.trusted_proxies
    }

    /// step of the serial per committed transaction
    pub fn get_serial_increment(&self) -> u32 {
        self.serial_increment.unwrap_or(DEFAULT_SERIAL_INCREMENT)
    }

    /// serial of a freshly seeded zone
    pub fn get_initial_serial(&self) -> SerialNumber {
        SerialNumber::new(self.initial_serial.unwrap_or(DEFAULT_INITIAL_SERIAL))
    }

    /// bounded wait for the write section, `None` for unbounded
    pub fn get_write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// maximum TXT value length in bytes
    pub fn get_max_txt_length(&self) -> usize {
        self.max_txt_length.unwrap_or(DEFAULT_MAX_TXT_LENGTH)
    }

    /// the store configuration, a zone file named after the zone by default
    pub fn get_store(&self) -> ConfigResult<StoreConfig> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => Ok(StoreConfig::default_for(&self.get_zone()?)),
        }
    }

    /// The zone committed when the store has never been written to
    pub fn seed_zone(&self) -> ConfigResult<ZoneState> {
        let origin = self.get_zone()?;
        let below = |name: &str| -> ConfigResult<Name> {
            let name = Name::from_ascii(name)?;
            if name.is_fqdn() {
                Ok(name)
            } else {
                Ok(name.append_domain(&origin)?)
            }
        };

        let soa = SoaParams {
            mname: below(self.soa.mname.as_deref().unwrap_or("ns"))?,
            rname: below(self.soa.rname.as_deref().unwrap_or("hostmaster"))?,
            refresh: self.soa.refresh.unwrap_or(DEFAULT_REFRESH),
            retry: self.soa.retry.unwrap_or(DEFAULT_RETRY),
            expire: self.soa.expire.unwrap_or(DEFAULT_EXPIRE),
            minimum: self.soa.minimum.unwrap_or(DEFAULT_MINIMUM),
        };

        let name_servers = if self.name_servers.is_empty() {
            vec![soa.mname.clone()]
        } else {
            self.name_servers
                .iter()
                .map(|ns| below(ns))
                .collect::<ConfigResult<Vec<_>>>()?
        };

        let mut glue = Vec::with_capacity(self.glue.len());
        for (name_server, addr) in &self.glue {
            let owner = below(name_server)?;
            if !name_servers.contains(&owner) {
                return Err(ConfigErrorKind::Invalid(format!(
                    "glue for {owner}, which is not a nameserver of the zone"
                ))
                .into());
            }
            glue.push(ZoneRecord::new(owner, RecordValue::A(*addr), self.get_default_ttl()));
        }

        // a nameserver below the origin is unreachable without its address in the zone
        if let Some(name_server) = name_servers
            .iter()
            .find(|ns| origin.zone_of(ns) && !glue.iter().any(|r| r.owner() == *ns))
        {
            return Err(ConfigErrorKind::Invalid(format!(
                "nameserver {name_server} is inside the zone and needs a glue address"
            ))
            .into());
        }

        let mut zone = ZoneState::new(
            origin,
            self.get_initial_serial(),
            self.get_default_ttl(),
            soa,
            name_servers,
        );
        for record in glue {
            zone.upsert(record);
        }
        Ok(zone)
    }

    /// Check every value for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        let increment = self.get_serial_increment();
        if !(1..=MAX_SERIAL_INCREMENT).contains(&increment) {
            return Err(ConfigErrorKind::Invalid(format!(
                "serial_increment {increment} is outside 1..={MAX_SERIAL_INCREMENT}"
            ))
            .into());
        }

        if self.get_default_ttl() == 0 {
            return Err("default_ttl must not be zero".into());
        }

        if self.get_max_txt_length() == 0 {
            return Err("max_txt_length must not be zero".into());
        }

        self.seed_zone()?;
        self.get_store()?;
        Ok(())
    }
}
