//! Host environment capabilities used by rule evaluation

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};
use tracing::debug;

/// Name resolution and local address discovery supplied by the caller
pub trait HostEnvironment: Send + Sync {
    /// Resolve a hostname (or IPv4 literal) to an IPv4 address
    fn resolve(&self, host: &str) -> Option<Ipv4Addr>;

    /// The local machine's own IPv4 address
    fn my_ip_address(&self) -> Option<Ipv4Addr>;
}

/// Environment backed by the system resolver
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    my_ip: Option<Ipv4Addr>,
}

impl SystemHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the local address instead of discovering it
    pub fn with_my_ip(mut self, addr: Option<Ipv4Addr>) -> Self {
        self.my_ip = addr;
        self
    }
}

impl HostEnvironment for SystemHost {
    fn resolve(&self, host: &str) -> Option<Ipv4Addr> {
        if let Ok(addr) = host.parse::<Ipv4Addr>() {
            return Some(addr);
        }

        let addrs = match (host, 0).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("Failed to resolve {}: {}", host, e);
                return None;
            }
        };

        addrs.into_iter().find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        })
    }

    fn my_ip_address(&self) -> Option<Ipv4Addr> {
        if self.my_ip.is_some() {
            return self.my_ip;
        }

        // Connecting a UDP socket sends nothing but selects the outbound interface
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:53").ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(v4) if !v4.is_unspecified() => Some(v4),
            _ => None,
        }
    }
}

/// Fixed lookup table, for tests and offline evaluation
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    hosts: HashMap<String, Ipv4Addr>,
    my_ip: Option<Ipv4Addr>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, name: &str, addr: Ipv4Addr) -> Self {
        self.hosts.insert(name.to_ascii_lowercase(), addr);
        self
    }

    pub fn with_my_ip(mut self, addr: Ipv4Addr) -> Self {
        self.my_ip = Some(addr);
        self
    }
}

impl HostEnvironment for StaticHost {
    fn resolve(&self, host: &str) -> Option<Ipv4Addr> {
        host.parse()
            .ok()
            .or_else(|| self.hosts.get(&host.to_ascii_lowercase()).copied())
    }

    fn my_ip_address(&self) -> Option<Ipv4Addr> {
        self.my_ip
    }
}
