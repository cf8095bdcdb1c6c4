//! Addressing types shared by the TCP and UDP engines.

use std::fmt;
use std::net::Ipv4Addr;

/// A single (address, port) pair, as seen on the virtual link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// The 4-tuple that uniquely identifies one connection for this tool's
/// purposes: what the child used as a source, and what it was trying to
/// reach. Order matters for `Display` but not for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    /// The endpoint used by the application inside the isolated environment.
    pub child: Endpoint,
    /// The endpoint the child was trying to reach; the one we impersonate.
    pub peer: Endpoint,
}

impl FlowKey {
    pub const fn new(child: Endpoint, peer: Endpoint) -> Self {
        Self { child, peer }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.child, self.peer)
    }
}
