// Copyright 2015-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{fmt, io};

use thiserror::Error;

use crate::{error::PersistenceError, proto::error::ProtoError};

/// An alias for results returned while loading the zone configuration
pub type ConfigResult<T> = ::std::result::Result<T, ConfigError>;

/// The error kind for configuration errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// A configuration value is out of range or inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),

    // foreign
    /// An error got returned from IO
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error occurred while decoding toml data
    #[cfg(feature = "toml")]
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    /// A configured name is not a valid domain name
    #[error("invalid domain name: {0}")]
    Name(#[from] ProtoError),

    /// The configured store could not be opened or recovered
    #[error("error opening zone store: {0}")]
    Persistence(#[from] PersistenceError),
}

/// The error type for configuration errors
#[derive(Debug)]
pub struct ConfigError {
    kind: Box<ConfigErrorKind>,
}

impl ConfigError {
    /// Get the kind of the error
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.kind)
    }
}

impl<E> From<E> for ConfigError
where
    E: Into<ConfigErrorKind>,
{
    fn from(error: E) -> Self {
        Self {
            kind: Box::new(error.into()),
        }
    }
}

impl From<String> for ConfigErrorKind {
    fn from(msg: String) -> Self {
        Self::Invalid(msg)
    }
}

impl From<&str> for ConfigErrorKind {
    fn from(msg: &str) -> Self {
        Self::Invalid(msg.to_string())
    }
}
