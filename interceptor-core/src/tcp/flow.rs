//! The flow object: what a handler actually sees and operates on once a
//! SYN has arrived on the link.
//!
//! `PendingFlow` exists only until the handler calls [`PendingFlow::accept`]
//! or [`PendingFlow::reject`]; afterward only a [`TcpFlow`] survives. Both
//! are thin handles onto a shared [`FlowShared`], the same split the
//! engine uses to mutate connection state from the link-reader task while
//! handler tasks read and write independently.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::endpoint::{Endpoint, FlowKey};
use crate::error::Error;
use crate::logging;
use crate::tcp::header::{Control, TcpHeader};
use crate::tcp::state::FlowState;

pub(crate) const DEFAULT_WINDOW: u16 = 64240;
pub(crate) const DEFAULT_TTL: u8 = 10;

/// What the engine pushes into a flow's inbox. A plain channel close would
/// be indistinguishable from a handler that simply stopped polling, so a
/// peer-initiated FIN is its own explicit sentinel rather than a dropped
/// sender.
pub(crate) enum InboxItem {
    Data(Vec<u8>),
    PeerFinished,
}

pub(crate) struct FlowShared {
    pub(crate) key: FlowKey,
    pub(crate) state: Mutex<FlowState>,
    pub(crate) seq_out: AtomicU32,
    pub(crate) ack_out: AtomicU32,
    pub(crate) window: u16,
    pub(crate) ttl: u8,
    pub(crate) inbox_tx: mpsc::Sender<InboxItem>,
    inbox_rx: tokio::sync::Mutex<mpsc::Receiver<InboxItem>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl FlowShared {
    pub(crate) fn new(
        key: FlowKey,
        isn: u32,
        peer_isn: u32,
        window: u16,
        ttl: u8,
        inbox_capacity: usize,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> (Arc<Self>, mpsc::Sender<InboxItem>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(inbox_capacity);
        let shared = Arc::new(Self {
            key,
            state: Mutex::new(FlowState::Init),
            seq_out: AtomicU32::new(isn),
            ack_out: AtomicU32::new(peer_isn.wrapping_add(1)),
            window,
            ttl,
            inbox_tx: inbox_tx.clone(),
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            outbound,
        });
        (shared, inbox_tx)
    }

    pub(crate) fn state(&self) -> FlowState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: FlowState) {
        *self.state.lock().unwrap() = state;
    }
}

/// Builds a fully serialized IPv4+TCP frame addressed as though sent by the
/// impersonated peer to the child application, and enqueues it for the
/// link writer. Drops and logs on backpressure rather than blocking.
pub(crate) fn send_segment(
    shared: &FlowShared,
    seq: u32,
    control: Control,
    payload: &[u8],
) -> Result<(), Error> {
    let ack = shared.ack_out.load(Ordering::SeqCst);
    let header = TcpHeader {
        source_port: shared.key.peer.port,
        destination_port: shared.key.child.port,
        sequence: seq,
        acknowledgment: ack,
        control,
        window: shared.window,
    };
    let mut tcp_bytes = Vec::new();
    header.serialize_into(
        &mut tcp_bytes,
        payload,
        shared.key.peer.address,
        shared.key.child.address,
    )?;

    let ip_header = crate::ipv4::Ipv4Header {
        ttl: shared.ttl,
        protocol: crate::ipv4::PROTOCOL_TCP,
        identification: 0,
        source: shared.key.peer.address,
        destination: shared.key.child.address,
    };
    let mut ip_bytes = Vec::new();
    ip_header.serialize_into(&mut ip_bytes, &tcp_bytes)?;

    if shared.outbound.try_send(ip_bytes).is_err() {
        logging::outbound_full();
    }
    Ok(())
}

/// A flow whose SYN has arrived but that the handler has not yet decided
/// to accept or reject. Dropping this without calling either method leaves
/// the flow in `Init` forever; the engine does not time those out, per
/// the datapath's Non-goals around connection timeouts.
pub struct PendingFlow {
    shared: Arc<FlowShared>,
}

impl PendingFlow {
    pub(crate) fn new(shared: Arc<FlowShared>) -> Self {
        Self { shared }
    }

    pub fn key(&self) -> FlowKey {
        self.shared.key
    }

    /// Accepts the flow: sends SYN+ACK and returns a handle for reading and
    /// writing the connection once the final ACK of the handshake lands.
    pub fn accept(self) -> Result<TcpFlow, Error> {
        self.shared.set_state(FlowState::SynReceived);
        let seq = self.shared.seq_out.fetch_add(1, Ordering::SeqCst);
        send_segment(&self.shared, seq, Control::syn_ack(), &[])?;
        logging::flow_accepted(&self.shared.key);
        Ok(TcpFlow {
            shared: self.shared,
        })
    }

    /// Rejects the flow: sends RST+ACK and discards it. The sequence number
    /// in the reset is the flow's initial sequence number incremented by
    /// one, as though a SYN had actually been sent and then immediately
    /// reset, matching what a real stack would show on the wire.
    pub fn reject(self) {
        self.shared.set_state(FlowState::Closed);
        let seq = self.shared.seq_out.load(Ordering::SeqCst).wrapping_add(1);
        let _ = send_segment(&self.shared, seq, Control::rst_ack(), &[]);
        logging::flow_rejected(&self.shared.key);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::net::Ipv4Addr;

    pub(crate) fn dummy_shared() -> (Arc<FlowShared>, mpsc::Receiver<Vec<u8>>) {
        let key = FlowKey::new(
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 54000),
            Endpoint::new(Ipv4Addr::new(93, 184, 216, 34), 443),
        );
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let (shared, _inbox_tx) =
            FlowShared::new(key, 0, 0, DEFAULT_WINDOW, DEFAULT_TTL, 16, outbound_tx);
        (shared, outbound_rx)
    }
}

/// A live, accepted TCP flow. Reads return payload bytes in order; writes
/// enqueue payload bytes for the peer. Both copy data rather than retaining
/// any borrow across the link boundary.
#[derive(Clone)]
pub struct TcpFlow {
    shared: Arc<FlowShared>,
}

impl TcpFlow {
    pub fn key(&self) -> FlowKey {
        self.shared.key
    }

    /// The endpoint this flow impersonates: the address and port the child
    /// application originally tried to reach.
    pub fn peer(&self) -> Endpoint {
        self.shared.key.peer
    }

    /// The endpoint inside the intercepted environment that opened this
    /// connection.
    pub fn child(&self) -> Endpoint {
        self.shared.key.child
    }

    /// Waits for the next chunk of payload bytes sent by the child. Returns
    /// `Ok(None)` once the peer has finished and no more data will arrive.
    pub async fn read(&self) -> Result<Option<Vec<u8>>, Error> {
        let mut rx = self.shared.inbox_rx.lock().await;
        match rx.recv().await {
            Some(InboxItem::Data(data)) => Ok(Some(data)),
            Some(InboxItem::PeerFinished) | None => Ok(None),
        }
    }

    /// Sends `data` to the child as though it came from the impersonated
    /// peer.
    pub fn write(&self, data: &[u8]) -> Result<(), Error> {
        if self.shared.state() == FlowState::Closed {
            return Err(Error::SerializeError("flow already closed"));
        }
        let seq = self
            .shared
            .seq_out
            .fetch_add(data.len() as u32, Ordering::SeqCst);
        send_segment(&self.shared, seq, Control::ack(), data)
    }

    /// Sends FIN+ACK and marks the flow closed. Calling this on a flow that
    /// never left `Init` is a programming error the taxonomy makes explicit.
    pub fn close(&self) -> Result<(), Error> {
        if self.shared.state() == FlowState::Init {
            return Err(Error::CloseInInit);
        }
        if self.shared.state() == FlowState::Closed {
            return Ok(());
        }
        let seq = self.shared.seq_out.fetch_add(1, Ordering::SeqCst);
        self.shared.set_state(FlowState::Closed);
        send_segment(&self.shared, seq, Control::fin_ack(), &[])?;
        logging::flow_closed(&self.shared.key);
        Ok(())
    }
}
