// Copyright 2015-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use thiserror::Error;

/// A request field was malformed, these are caller errors and are never retried
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The record type is neither `A` nor `TXT`
    #[error("invalid record type: {0:?}, expected A or TXT")]
    InvalidRecordType(String),

    /// The operation is neither `update` nor `delete`
    #[error("invalid operation: {0:?}, expected update or delete")]
    InvalidOperation(String),

    /// A host is missing, or one of its labels is not a valid DNS label
    #[error("invalid host label: {0:?}")]
    InvalidHostLabel(String),

    /// The value of an `A` record is not an IPv4 address
    #[error("value for A record is not a valid IPv4 address: {0:?}")]
    InvalidAddress(String),

    /// The record type requires a value and none was given
    #[error("value is required for this record type")]
    MissingValue,

    /// The value exceeds the configured maximum length
    #[error("value is {len} bytes long, at most {max} are allowed")]
    ValueTooLong {
        /// length of the rejected value in bytes
        len: usize,
        /// maximum permitted length
        max: usize,
    },
}

impl ValidationError {
    /// The name of the request field that failed validation
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidRecordType(_) => "record_type",
            Self::InvalidOperation(_) => "operation",
            Self::InvalidHostLabel(_) => "host",
            Self::InvalidAddress(_) | Self::MissingValue | Self::ValueTooLong { .. } => "value",
        }
    }
}
