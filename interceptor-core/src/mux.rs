//! Routes newly-arrived flows to the handler registered for their
//! destination, the way a real stack hands an accepted connection off to
//! whichever process is listening on that port.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::tcp::flow::PendingFlow;
use crate::udp::flow::UdpFlow;

/// A pattern a handler registers interest in. The first matching pattern,
/// in registration order, wins; a flow matching nothing is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Matches every destination.
    Any,
    /// Matches any destination address on this port.
    Port(u16),
    /// Matches only this exact address and port.
    AddrPort(Ipv4Addr, u16),
}

impl Pattern {
    fn matches(self, endpoint: Endpoint) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Port(port) => endpoint.port == port,
            Pattern::AddrPort(address, port) => {
                endpoint.address == address && endpoint.port == port
            }
        }
    }
}

/// Handles one accepted or pending TCP flow. Implementations decide
/// whether to accept or reject as their first action; the mux never makes
/// that call itself.
#[async_trait]
pub trait TcpHandler: Send + Sync {
    async fn handle(&self, pending: PendingFlow);
}

/// Handles one UDP flow, starting from its first datagram. There is no
/// accept/reject step; a flow matching nothing registered is simply
/// dropped.
#[async_trait]
pub trait UdpHandler: Send + Sync {
    async fn handle(&self, flow: UdpFlow);
}

struct TcpRegistration {
    pattern: Pattern,
    handler: Arc<dyn TcpHandler>,
}

struct UdpRegistration {
    pattern: Pattern,
    handler: Arc<dyn UdpHandler>,
}

/// The table of registered handlers, consulted once per new flow.
#[derive(Default)]
pub struct Mux {
    tcp: Vec<TcpRegistration>,
    udp: Vec<UdpRegistration>,
}

impl Mux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a TCP handler for destinations matching `pattern`.
    /// Earlier registrations take priority over later ones with
    /// overlapping patterns.
    pub fn register_tcp(&mut self, pattern: Pattern, handler: Arc<dyn TcpHandler>) {
        self.tcp.push(TcpRegistration { pattern, handler });
    }

    /// Registers a UDP handler for destinations matching `pattern`.
    pub fn register_udp(&mut self, pattern: Pattern, handler: Arc<dyn UdpHandler>) {
        self.udp.push(UdpRegistration { pattern, handler });
    }

    /// Finds the TCP handler for `destination`, if any is registered.
    pub fn route(&self, destination: Endpoint) -> Option<Arc<dyn TcpHandler>> {
        self.tcp
            .iter()
            .find(|registration| registration.pattern.matches(destination))
            .map(|registration| Arc::clone(&registration.handler))
    }

    /// Finds the UDP handler for `destination`, if any is registered.
    pub fn route_udp(&self, destination: Endpoint) -> Option<Arc<dyn UdpHandler>> {
        self.udp
            .iter()
            .find(|registration| registration.pattern.matches(destination))
            .map(|registration| Arc::clone(&registration.handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Recorder(Arc<AtomicBool>);

    #[async_trait]
    impl TcpHandler for Recorder {
        async fn handle(&self, pending: PendingFlow) {
            self.0.store(true, Ordering::SeqCst);
            pending.reject();
        }
    }

    #[tokio::test]
    async fn earlier_registration_wins_on_overlap() {
        let mut mux = Mux::new();
        let hit_specific = Arc::new(AtomicBool::new(false));
        let hit_any = Arc::new(AtomicBool::new(false));
        mux.register_tcp(
            Pattern::AddrPort(Ipv4Addr::new(93, 184, 216, 34), 443),
            Arc::new(Recorder(Arc::clone(&hit_specific))),
        );
        mux.register_tcp(Pattern::Any, Arc::new(Recorder(Arc::clone(&hit_any))));

        let handler = mux
            .route(Endpoint::new(Ipv4Addr::new(93, 184, 216, 34), 443))
            .expect("a handler should match");
        let (shared, _) = crate::tcp::flow::test_support::dummy_shared();
        handler.handle(PendingFlow::new(shared)).await;

        assert!(hit_specific.load(Ordering::SeqCst));
        assert!(!hit_any.load(Ordering::SeqCst));
    }

    #[test]
    fn no_match_returns_none() {
        let mut mux = Mux::new();
        mux.register_tcp(
            Pattern::Port(443),
            Arc::new(Recorder(Arc::new(AtomicBool::new(false)))),
        );
        assert!(mux
            .route(Endpoint::new(Ipv4Addr::new(1, 2, 3, 4), 80))
            .is_none());
    }
}
