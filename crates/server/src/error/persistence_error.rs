// Copyright 2015-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{fmt, io};

use thiserror::Error;

/// An alias for results returned by persistence backends
pub type PersistenceResult<T> = ::std::result::Result<T, PersistenceError>;

/// The error kind for errors that get returned while persisting or recovering the zone
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistenceErrorKind {
    /// An error that occurred when recovering from persisted state
    #[error("error recovering zone: {0}")]
    Recovery(String),

    /// The persisted zone could not be parsed
    #[error("zone file line {line}: {reason}")]
    ZoneParse {
        /// 1-based line number of the offending entry
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// The number of inserted records didn't match the expected amount
    #[error("wrong insert count: {got} expect: {expect}")]
    WrongInsertCount {
        /// The number of inserted records
        got: usize,
        /// The number of records expected to be inserted
        expect: usize,
    },

    // foreign
    /// An error got returned from IO
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error got returned from the rusqlite crate
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The error type for errors that get returned while persisting or recovering the zone
#[derive(Debug)]
pub struct PersistenceError {
    kind: Box<PersistenceErrorKind>,
}

impl PersistenceError {
    /// Get the kind of the error
    pub fn kind(&self) -> &PersistenceErrorKind {
        &self.kind
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        PersistenceErrorKind::ZoneParse {
            line,
            reason: reason.into(),
        }
        .into()
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.kind)
    }
}

impl<E> From<E> for PersistenceError
where
    E: Into<PersistenceErrorKind>,
{
    fn from(error: E) -> Self {
        Self {
            kind: Box::new(error.into()),
        }
    }
}
