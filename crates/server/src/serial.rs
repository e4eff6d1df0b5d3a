// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Zone serial numbers and the ledger that advances them

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Largest increment that keeps the result "greater" under RFC 1982, 2^31 - 1
pub const MAX_SERIAL_INCREMENT: u32 = (1 << (u32::BITS - 1)) - 1;

/// SOA serial, compared with Serial Number Arithmetic as defined in RFC 1982
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(u32);

impl SerialNumber {
    /// Wrap a raw serial
    pub const fn new(serial: u32) -> Self {
        Self(serial)
    }

    /// Returns internal value
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Serial Number Addition, see RFC 1982, section 3.1
    ///
    /// The result is a wrapping add, `increment` must not exceed [`MAX_SERIAL_INCREMENT`].
    pub fn increment(self, increment: u32) -> Self {
        debug_assert!(increment <= MAX_SERIAL_INCREMENT);
        Self(self.0.wrapping_add(increment))
    }
}

/// Serial Number Comparison, see RFC 1982, section 3.2
impl PartialOrd for SerialNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        const SERIAL_BITS_HALF: u32 = 1 << (u32::BITS - 1);

        let i1 = self.0;
        let i2 = other.0;

        if i1 == i2 {
            Some(Ordering::Equal)
        } else if (i1 < i2 && (i2 - i1) < SERIAL_BITS_HALF)
            || (i1 > i2 && (i1 - i2) > SERIAL_BITS_HALF)
        {
            Some(Ordering::Less)
        } else if (i1 < i2 && (i2 - i1) > SERIAL_BITS_HALF)
            || (i1 > i2 && (i1 - i2) < SERIAL_BITS_HALF)
        {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl From<u32> for SerialNumber {
    fn from(serial: u32) -> Self {
        Self(serial)
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Tracks the zone's committed serial, only the write path of the zone store holds one
#[derive(Debug)]
pub struct SerialLedger {
    current: SerialNumber,
    increment: u32,
}

impl SerialLedger {
    /// Rebuild the ledger from the last persisted serial
    ///
    /// The increment is clamped to `1..=MAX_SERIAL_INCREMENT`.
    pub fn recover(persisted: SerialNumber, increment: u32) -> Self {
        Self {
            current: persisted,
            increment: increment.clamp(1, MAX_SERIAL_INCREMENT),
        }
    }

    /// The serial of the last committed transaction
    pub fn current(&self) -> SerialNumber {
        self.current
    }

    /// The serial the next committed transaction will carry
    ///
    /// This does not advance the ledger, see [`Self::advance`].
    pub fn next_serial(&self) -> SerialNumber {
        let next = self.current.increment(self.increment);
        if next.get() < self.current.get() {
            warn!(
                "zone serial wraps around from {} to {}",
                self.current, next
            );
        }
        next
    }

    /// Record that a transaction carrying `serial` has been durably committed
    pub(crate) fn advance(&mut self, serial: SerialNumber) {
        debug_assert!(serial > self.current, "serial must move forward");
        self.current = serial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_comparison() {
        let zero = SerialNumber::new(0);
        let one = SerialNumber::new(1);
        let max = SerialNumber::new(u32::MAX);

        assert!(one > zero);
        assert!(zero > max);
        assert_eq!(
            zero.partial_cmp(&SerialNumber::new(1 << 31)),
            None,
            "exactly half way is undefined"
        );
    }

    #[test]
    fn test_ledger_advances() {
        let mut ledger = SerialLedger::recover(SerialNumber::new(41), 1);
        let next = ledger.next_serial();
        assert_eq!(next.get(), 42);
        assert_eq!(ledger.current().get(), 41, "next_serial is side effect free");

        ledger.advance(next);
        assert_eq!(ledger.current().get(), 42);
    }

    #[test]
    fn test_ledger_wraps() {
        let mut ledger = SerialLedger::recover(SerialNumber::new(u32::MAX - 1), 3);
        let next = ledger.next_serial();
        assert_eq!(next.get(), 1);
        assert!(next > ledger.current());
        ledger.advance(next);
        assert_eq!(ledger.current().get(), 1);
    }

    #[test]
    fn test_increment_clamped() {
        let ledger = SerialLedger::recover(SerialNumber::new(10), 0);
        assert_eq!(ledger.next_serial().get(), 11);

        let ledger = SerialLedger::recover(SerialNumber::new(0), u32::MAX);
        assert_eq!(ledger.next_serial().get(), MAX_SERIAL_INCREMENT);
    }
}
