// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Derives the caller's address from the transport peer and trusted forwarding headers

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use ipnet::IpNet;
use tracing::{debug, warn};

use crate::{
    access::TrustedNetworks,
    error::{UpdateError, UpdateErrorKind},
};

/// Transport level facts about one inbound call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientRequest {
    peer: IpAddr,
    forwarded_for: Vec<String>,
}

impl ClientRequest {
    /// A request received directly from `peer`
    pub fn new(peer: IpAddr) -> Self {
        Self {
            peer,
            forwarded_for: Vec::new(),
        }
    }

    /// Append the entries of one `X-Forwarded-For` header, comma separated, oldest first
    ///
    /// Repeated headers are appended in the order received.
    pub fn with_forwarded_for(mut self, header: &str) -> Self {
        self.forwarded_for.extend(
            header
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string),
        );
        self
    }

    /// The address of the immediate transport peer
    pub fn peer(&self) -> IpAddr {
        self.peer
    }

    /// The forwarded-for chain, oldest first
    pub fn forwarded_for(&self) -> &[String] {
        &self.forwarded_for
    }
}

/// Resolves which address a request originated from
///
/// Forwarding headers are honored only when the immediate peer is a trusted proxy, anyone else
/// could put arbitrary addresses into them.
pub struct ClientIdentityResolver {
    trusted_proxies: TrustedNetworks,
}

impl ClientIdentityResolver {
    /// Creates a resolver trusting the given proxy networks
    pub fn new(trusted_proxies: impl IntoIterator<Item = IpNet>) -> Self {
        Self {
            trusted_proxies: trusted_proxies.into_iter().collect(),
        }
    }

    /// True if `ip` belongs to a trusted proxy
    pub fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.contains(ip)
    }

    /// Best effort address of the caller, of either family
    ///
    /// This backs the unauthenticated "what is my address" call and never fails.
    pub fn client_address(&self, request: &ClientRequest) -> IpAddr {
        self.forwarded_client(request).unwrap_or(request.peer)
    }

    /// The IPv4 address an `A` record should point at when the caller omitted a value
    ///
    /// Behind a trusted proxy only the forwarded client counts, the proxy's own address is never
    /// the caller. An IPv4-mapped IPv6 address is unmapped, any other IPv6 client has no usable
    /// address.
    pub fn resolve_client_address(&self, request: &ClientRequest) -> Result<Ipv4Addr, UpdateError> {
        let client = if self.speaks_for_client(request) {
            self.forwarded_client(request).ok_or_else(|| {
                UpdateErrorKind::NoResolvableAddress(format!(
                    "no usable forwarded-for entry from proxy {}",
                    request.peer
                ))
            })?
        } else {
            request.peer
        };

        match to_ipv4(client) {
            Some(v4) => {
                debug!(peer = %request.peer, client = %v4, "resolved client address");
                Ok(v4)
            }
            None => Err(UpdateErrorKind::NoResolvableAddress(format!(
                "client {client} has no IPv4 address"
            ))
            .into()),
        }
    }

    /// True if the request came through a trusted proxy that named its client
    fn speaks_for_client(&self, request: &ClientRequest) -> bool {
        !request.forwarded_for.is_empty() && self.is_trusted_proxy(request.peer)
    }

    /// The client named by the forwarded-for chain, if the peer may speak for it
    fn forwarded_client(&self, request: &ClientRequest) -> Option<IpAddr> {
        if request.forwarded_for.is_empty() {
            return None;
        }

        if !self.is_trusted_proxy(request.peer) {
            warn!(
                peer = %request.peer,
                "ignoring forwarded-for header from untrusted peer"
            );
            return None;
        }

        // walk from the nearest hop outwards, skipping our own proxies
        let mut outermost = None;
        for entry in request.forwarded_for.iter().rev() {
            let Some(ip) = parse_forwarded(entry) else {
                debug!(%entry, "unparseable forwarded-for entry");
                return None;
            };

            if !self.is_trusted_proxy(ip) {
                return Some(ip);
            }

            outermost = Some(ip);
        }

        outermost
    }
}

/// Accepts `ip`, `ip:port` and `[ipv6]:port`
fn parse_forwarded(entry: &str) -> Option<IpAddr> {
    let entry = entry.trim_matches('"');
    entry
        .parse::<IpAddr>()
        .ok()
        .or_else(|| entry.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

fn to_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}
