// Copyright 2015-2024 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

// LIBRARY WARNINGS
#![warn(
    clippy::default_trait_access,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::unimplemented,
    clippy::use_self,
    missing_copy_implementations,
    missing_docs,
    non_snake_case,
    non_upper_case_globals,
    rust_2018_idioms,
    unreachable_pub
)]
#![allow(
    clippy::single_component_path_imports,
    clippy::upper_case_acronyms, // A and TXT are record type mnemonics
)]
#![recursion_limit = "2048"]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Zone update coordination for a dynamic DNS service.
//!
//! Remote, already authenticated callers create, update and delete `A` and `TXT` records in a
//! single authoritative zone. Every request flows through the [`MutationCoordinator`]:
//!
//! * the [`validator::Validator`] turns raw request fields into a [`record::MutationRequest`],
//! * the [`identity::ClientIdentityResolver`] supplies the caller's address when an `A` update
//!   omits its value,
//! * the [`transaction::UpdateTransactionEngine`] expands the request into per record changes and
//!   applies them as one atomic transaction against the [`store::ZoneStateStore`], advancing the
//!   SOA serial through the [`serial::SerialLedger`] at most once.
//!
//! # Goals
//!
//! * Only safe Rust
//! * All errors handled
//! * Exactly one serialized writer per zone
//! * Nothing reported as committed before it is durable

pub use hickory_proto as proto;

mod access;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod record;
pub mod serial;
pub mod serialize;
pub mod store;
pub mod transaction;
pub mod validator;

pub use self::config::ZoneConfig;
pub use self::coordinator::{MutationCoordinator, UpdateResponse};

/// Returns the current version of the zone update coordinator
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
