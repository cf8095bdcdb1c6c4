//! The UDP flow object. Unlike TCP there is no handshake or state machine:
//! the first datagram for a 4-tuple creates the flow and hands it straight
//! to a handler, matching how a single `recvfrom`/`sendto` pair is
//! typically wired up in userspace.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::endpoint::{Endpoint, FlowKey};
use crate::error::Error;
use crate::udp::header::UdpHeader;

pub(crate) struct FlowShared {
    pub(crate) key: FlowKey,
    pub(crate) ttl: u8,
    pub(crate) inbox_tx: mpsc::Sender<Vec<u8>>,
    inbox_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl FlowShared {
    pub(crate) fn new(
        key: FlowKey,
        ttl: u8,
        inbox_capacity: usize,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Arc<Self> {
        let (inbox_tx, inbox_rx) = mpsc::channel(inbox_capacity);
        Arc::new(Self {
            key,
            ttl,
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            outbound,
        })
    }
}

/// A live UDP flow: a handle for exchanging datagrams with the child
/// application under the impersonated peer address.
pub struct UdpFlow {
    shared: Arc<FlowShared>,
}

impl UdpFlow {
    pub(crate) fn new(shared: Arc<FlowShared>) -> Self {
        Self { shared }
    }

    pub fn key(&self) -> FlowKey {
        self.shared.key
    }

    pub fn peer(&self) -> Endpoint {
        self.shared.key.peer
    }

    pub fn child(&self) -> Endpoint {
        self.shared.key.child
    }

    /// Waits for the next datagram sent by the child. Returns `None` only
    /// once the engine has dropped this flow's inbox sender, which happens
    /// when the flow table entry is evicted.
    pub async fn read(&self) -> Option<Vec<u8>> {
        let mut rx = self.shared.inbox_rx.lock().await;
        rx.recv().await
    }

    /// Sends `data` to the child as a datagram from the impersonated peer.
    pub fn write(&self, data: &[u8]) -> Result<(), Error> {
        let header = UdpHeader {
            source_port: self.shared.key.peer.port,
            destination_port: self.shared.key.child.port,
        };
        let mut udp_bytes = Vec::new();
        header.serialize_into(
            &mut udp_bytes,
            data,
            self.shared.key.peer.address,
            self.shared.key.child.address,
        )?;

        let ip_header = crate::ipv4::Ipv4Header {
            ttl: self.shared.ttl,
            protocol: crate::ipv4::PROTOCOL_UDP,
            identification: 0,
            source: self.shared.key.peer.address,
            destination: self.shared.key.child.address,
        };
        let mut ip_bytes = Vec::new();
        ip_header.serialize_into(&mut ip_bytes, &udp_bytes)?;

        if self.shared.outbound.try_send(ip_bytes).is_err() {
            crate::logging::outbound_full();
        }
        Ok(())
    }
}
