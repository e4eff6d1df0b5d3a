// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Validation of raw mutation requests

use std::net::Ipv4Addr;

use tracing::debug;

use crate::{
    error::ValidationError,
    proto::rr::Name,
    record::{MutationRequest, Operation, RecordType, RecordValue},
};

/// Maximum length of a single label in octets, RFC 1035 2.3.4
pub const MAX_LABEL_LENGTH: usize = 63;
/// Maximum length of a name in wire format, RFC 1035 2.3.4
pub const MAX_NAME_LENGTH: usize = 255;
/// Default upper bound on TXT values
pub const DEFAULT_MAX_TXT_LENGTH: usize = 1024;

/// Turns raw request fields into a [`MutationRequest`]
///
/// The zone suffix is injected, the validator never looks at configuration on its own.
#[derive(Clone, Debug)]
pub struct Validator {
    zone: Name,
    zone_wire_len: usize,
    max_txt_length: usize,
}

impl Validator {
    /// Creates a validator for hosts below `zone`, which must be fully qualified
    pub fn new(zone: Name) -> Self {
        let zone_wire_len = zone.iter().map(|label| label.len() + 1).sum::<usize>() + 1;
        Self {
            zone,
            zone_wire_len,
            max_txt_length: DEFAULT_MAX_TXT_LENGTH,
        }
    }

    /// Override the maximum accepted TXT value length in bytes
    pub fn with_max_txt_length(mut self, max_txt_length: usize) -> Self {
        self.max_txt_length = max_txt_length;
        self
    }

    /// The zone all owners are placed in
    pub fn zone(&self) -> &Name {
        &self.zone
    }

    /// Validate one request
    ///
    /// # Arguments
    ///
    /// * `raw_type` - `A` or `TXT`, any case
    /// * `raw_operation` - `update` or `delete`, any case
    /// * `raw_hosts` - one or more hosts relative to the zone, e.g. `www` or `www.lab`
    /// * `raw_value` - record data, ignored for deletes; surrounding spaces and quotes are
    ///   trimmed and an empty value counts as absent
    pub fn validate<S: AsRef<str>>(
        &self,
        raw_type: &str,
        raw_operation: &str,
        raw_hosts: &[S],
        raw_value: Option<&str>,
    ) -> Result<MutationRequest, ValidationError> {
        let record_type: RecordType = raw_type.trim().parse()?;
        let operation: Operation = raw_operation.trim().parse()?;

        if raw_hosts.is_empty() {
            return Err(ValidationError::InvalidHostLabel(String::new()));
        }

        let owners = raw_hosts
            .iter()
            .map(|host| self.owner_for(host.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let value = raw_value.map(trim_value).filter(|v| !v.is_empty());
        let value = match (operation, record_type, value) {
            (Operation::Delete, _, value) => {
                if value.is_some() {
                    debug!("ignoring value supplied with delete");
                }
                None
            }
            (Operation::Update, RecordType::A, Some(value)) => Some(RecordValue::A(
                value
                    .parse::<Ipv4Addr>()
                    .map_err(|_| ValidationError::InvalidAddress(value.to_string()))?,
            )),
            (Operation::Update, RecordType::A, None) => None,
            (Operation::Update, RecordType::TXT, Some(value)) => {
                if value.len() > self.max_txt_length {
                    return Err(ValidationError::ValueTooLong {
                        len: value.len(),
                        max: self.max_txt_length,
                    });
                }
                Some(RecordValue::TXT(value.to_string()))
            }
            (Operation::Update, RecordType::TXT, None) => return Err(ValidationError::MissingValue),
        };

        Ok(MutationRequest::new(record_type, operation, owners, value))
    }

    /// The fully qualified owner for a host: `host + "." + zone`
    pub fn owner_for(&self, host: &str) -> Result<Name, ValidationError> {
        let invalid = || ValidationError::InvalidHostLabel(host.to_string());

        let mut wire_len = self.zone_wire_len;
        for label in host.split('.') {
            if !is_valid_label(label) {
                return Err(ValidationError::InvalidHostLabel(label.to_string()));
            }
            wire_len += label.len() + 1;
        }

        if wire_len > MAX_NAME_LENGTH {
            return Err(invalid());
        }

        Name::from_ascii(host)
            .and_then(|name| name.append_domain(&self.zone))
            .map_err(|_| invalid())
    }
}

/// True if `label` is a hostname label: letters, digits and hyphens, not starting or ending with
/// a hyphen, 1 to 63 octets
pub fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= MAX_LABEL_LENGTH
                && *first != b'-'
                && *last != b'-'
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        }
        _ => false,
    }
}

fn trim_value(value: &str) -> &str {
    value.trim_matches(|c| c == ' ' || c == '"' || c == '\'')
}
