//! IPv4 subnet membership

use crate::error::ValidationError;
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Network address and mask, compared with `addr & mask == network & mask`.
///
/// The mask is applied bit-for-bit and need not be contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetRule {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl SubnetRule {
    pub fn new(network: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { network, mask }
    }

    /// Single-address rule (mask 255.255.255.255)
    pub fn host(addr: Ipv4Addr) -> Self {
        Self::new(addr, Ipv4Addr::BROADCAST)
    }

    /// Parse the dotted-quad `network` and `mask` pair used by `isInNet`
    pub fn from_parts(network: &str, mask: &str) -> Result<Self, ValidationError> {
        let network = parse_addr(network)?;
        let mask = parse_addr(mask)?;
        Ok(Self::new(network, mask))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(addr) & mask == u32::from(self.network) & mask
    }
}

impl From<Ipv4Net> for SubnetRule {
    fn from(net: Ipv4Net) -> Self {
        Self::new(net.network(), net.netmask())
    }
}

impl FromStr for SubnetRule {
    type Err = ValidationError;

    /// Accepts `a.b.c.d/bits` or `a.b.c.d/m.m.m.m`. A zero-length prefix is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidSubnet {
            subnet: s.to_string(),
        };

        let (network, suffix) = s.trim().split_once('/').ok_or_else(invalid)?;

        if suffix.contains('.') {
            let network = network.parse::<Ipv4Addr>().map_err(|_| invalid())?;
            let mask = suffix.parse::<Ipv4Addr>().map_err(|_| invalid())?;
            return Ok(Self::new(network, mask));
        }

        let net: Ipv4Net = s.trim().parse().map_err(|_| invalid())?;
        if net.prefix_len() == 0 {
            return Err(invalid());
        }
        Ok(net.into())
    }
}

impl fmt::Display for SubnetRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.mask)
    }
}

fn parse_addr(s: &str) -> Result<Ipv4Addr, ValidationError> {
    s.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidAddress {
            addr: s.to_string(),
        })
}
