// Copyright 2015-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::error::{PersistenceError, ValidationError};

/// The message handed to callers for every internal failure
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred.";

/// An alias for results returned by the coordinator
pub type UpdateResult<T> = ::std::result::Result<T, UpdateError>;

/// The error kind for failures of a mutation request
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateErrorKind {
    /// The request was malformed
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// No IPv4 address could be derived for the caller
    #[error("no resolvable IPv4 client address: {0}")]
    NoResolvableAddress(String),

    /// Persisting the zone failed, the transaction was aborted
    #[error("storage failure: {0}")]
    Storage(#[from] PersistenceError),

    /// The write section could not be acquired in time
    #[error("timed out after {0:?} waiting for the zone write lock")]
    ConcurrencyTimeout(Duration),
}

/// The error type for failures of a mutation request
#[derive(Debug)]
pub struct UpdateError {
    kind: Box<UpdateErrorKind>,
}

impl UpdateError {
    /// Get the kind of the error
    pub fn kind(&self) -> &UpdateErrorKind {
        &self.kind
    }

    /// True if the caller sent something unusable, these map to a 4xx status
    pub fn is_caller_error(&self) -> bool {
        matches!(
            *self.kind,
            UpdateErrorKind::Validation(_) | UpdateErrorKind::NoResolvableAddress(_)
        )
    }

    /// True if the caller may retry the identical request later
    pub fn is_transient(&self) -> bool {
        matches!(*self.kind, UpdateErrorKind::ConcurrencyTimeout(_))
    }

    /// The message safe to return to the caller
    ///
    /// Caller errors are surfaced verbatim, internal errors collapse to
    /// [`GENERIC_FAILURE_MESSAGE`] so that storage details stay in the logs.
    pub fn public_message(&self) -> String {
        if self.is_caller_error() {
            self.kind.to_string()
        } else {
            GENERIC_FAILURE_MESSAGE.to_string()
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.kind)
    }
}

impl<E> From<E> for UpdateError
where
    E: Into<UpdateErrorKind>,
{
    fn from(error: E) -> Self {
        Self {
            kind: Box::new(error.into()),
        }
    }
}
