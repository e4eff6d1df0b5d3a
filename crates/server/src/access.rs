use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use prefix_trie::PrefixSet;

/// Set of networks whose forwarding headers are believed.
///
/// Unlike a server allow-list an empty set matches nothing: without configured proxies every
/// peer is the client itself.
#[derive(Default)]
pub(crate) struct TrustedNetworks {
    ipv4: PrefixSet<Ipv4Net>,
    ipv6: PrefixSet<Ipv6Net>,
}

impl TrustedNetworks {
    /// Insert a network whose members are trusted proxies
    pub(crate) fn insert(&mut self, network: IpNet) {
        match network {
            IpNet::V4(v4) => {
                self.ipv4.insert(v4.trunc());
            }
            IpNet::V6(v6) => {
                self.ipv6.insert(v6.trunc());
            }
        }
    }

    /// Evaluate the IP address against the trusted networks
    pub(crate) fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self.ipv4.get_lpm(&Ipv4Net::from(v4)).is_some(),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.ipv4.get_lpm(&Ipv4Net::from(v4)).is_some(),
                None => self.ipv6.get_lpm(&Ipv6Net::from(v6)).is_some(),
            },
        }
    }
}

impl FromIterator<IpNet> for TrustedNetworks {
    fn from_iter<T: IntoIterator<Item = IpNet>>(iter: T) -> Self {
        let mut networks = Self::default();
        for network in iter {
            networks.insert(network);
        }
        networks
    }
}
