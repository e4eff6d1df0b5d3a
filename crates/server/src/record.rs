// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Record model for dynamically managed resource records

use std::{
    fmt::{self, Write},
    net::Ipv4Addr,
    str::FromStr,
};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::{
    error::ValidationError,
    proto::rr::{LowerName, Name},
};

/// The record types callers may manage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// Text record
    TXT,
}

impl RecordType {
    /// The mnemonic as used in zone files
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::TXT => "TXT",
        }
    }
}

impl FromStr for RecordType {
    type Err = ValidationError;

    /// Case-insensitive, `a` and `txt` are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("A") {
            Ok(Self::A)
        } else if s.eq_ignore_ascii_case("TXT") {
            Ok(Self::TXT)
        } else {
            Err(ValidationError::InvalidRecordType(s.to_string()))
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RecordType> for crate::proto::rr::RecordType {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => Self::A,
            RecordType::TXT => Self::TXT,
        }
    }
}

/// What the caller wants to happen to the named records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create the record, or replace its value
    Update,
    /// Remove the record, a no-op if it does not exist
    Delete,
}

impl FromStr for Operation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("update") {
            Ok(Self::Update)
        } else if s.eq_ignore_ascii_case("delete") {
            Ok(Self::Delete)
        } else {
            Err(ValidationError::InvalidOperation(s.to_string()))
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Record data of a managed record
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner)]
pub enum RecordValue {
    /// Address of an `A` record
    A(Ipv4Addr),
    /// Unquoted, unescaped text of a `TXT` record
    TXT(String),
}

impl RecordValue {
    /// The record type this data belongs to
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::A(_) => RecordType::A,
            Self::TXT(_) => RecordType::TXT,
        }
    }
}

/// Presentation format, TXT data is quoted and escaped as a single character-string
impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(addr) => write!(f, "{addr}"),
            Self::TXT(text) => write!(f, "\"{}\"", escape_txt(text)),
        }
    }
}

/// Escape text for use inside a quoted character-string
///
/// `"` and `\` get a backslash, every byte outside printable ASCII is written as `\DDD` so a
/// record always stays on one line of the zone file.
pub(crate) fn escape_txt(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'"' | b'\\' => {
                escaped.push('\\');
                escaped.push(char::from(byte));
            }
            b' '..=b'~' => escaped.push(char::from(byte)),
            _ => {
                // writing to a String is infallible
                let _ = write!(escaped, "\\{byte:03}");
            }
        }
    }
    escaped
}

/// Identity of a record within the zone, the owner compares case-insensitively
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// lowercased owner name
    pub owner: LowerName,
    /// type of the record
    pub record_type: RecordType,
}

impl RecordKey {
    /// Construct a new key
    pub fn new(owner: &Name, record_type: RecordType) -> Self {
        Self {
            owner: LowerName::new(owner),
            record_type,
        }
    }
}

/// One resource record in the zone's dynamic record set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    owner: Name,
    value: RecordValue,
    ttl: u32,
}

impl ZoneRecord {
    /// Construct a new record, the owner must be fully qualified
    pub fn new(owner: Name, value: RecordValue, ttl: u32) -> Self {
        Self { owner, value, ttl }
    }

    /// Fully qualified owner name
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    /// Type of this record, derived from its data
    pub fn record_type(&self) -> RecordType {
        self.value.record_type()
    }

    /// The record data
    pub fn value(&self) -> &RecordValue {
        &self.value
    }

    /// Time to live in seconds
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Key of this record in the zone
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.owner, self.record_type())
    }

    /// True if replacing `self` with `other` would not change what the zone serves
    ///
    /// Owner names compare case-insensitively.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.key() == other.key() && self.value == other.value && self.ttl == other.ttl
    }
}

impl fmt::Display for ZoneRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{owner} {ttl} IN {rtype} {value}",
            owner = self.owner,
            ttl = self.ttl,
            rtype = self.record_type(),
            value = self.value
        )
    }
}

/// One validated caller intent
///
/// `owners` keeps the caller's order and duplicates, the transaction engine collapses
/// duplicates. `value` is `None` for deletes and for `A` updates that fall back to the
/// caller's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    record_type: RecordType,
    operation: Operation,
    owners: Vec<Name>,
    value: Option<RecordValue>,
}

impl MutationRequest {
    pub(crate) fn new(
        record_type: RecordType,
        operation: Operation,
        owners: Vec<Name>,
        value: Option<RecordValue>,
    ) -> Self {
        Self {
            record_type,
            operation,
            owners,
            value,
        }
    }

    /// The record type to manage
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Update or delete
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Fully qualified owners in request order
    pub fn owners(&self) -> &[Name] {
        &self.owners
    }

    /// The explicit value, if any
    pub fn value(&self) -> Option<&RecordValue> {
        self.value.as_ref()
    }

    /// True if this is an `A` update whose value must come from the client address
    pub fn needs_client_address(&self) -> bool {
        self.operation == Operation::Update
            && self.record_type == RecordType::A
            && self.value.is_none()
    }
}

/// Owner name without the trailing root dot, as shown to callers
pub(crate) fn display_owner(owner: &Name) -> String {
    let ascii = owner.to_ascii();
    match ascii.strip_suffix('.') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => ascii,
    }
}
