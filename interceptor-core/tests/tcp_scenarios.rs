//! Black-box scenarios driving `TcpEngine` directly over raw wire bytes,
//! the same way the virtual link would, without needing a real TUN device.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use interceptor_core::ipv4::Ipv4Header;
use interceptor_core::mux::{Mux, Pattern, TcpHandler};
use interceptor_core::tcp::engine::{EngineConfig, TcpEngine};
use interceptor_core::tcp::header::{Control, TcpHeader};
use interceptor_core::tcp::PendingFlow;
use tokio::sync::mpsc;

const CHILD_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const CHILD_PORT: u16 = 54000;
const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);
const PEER_PORT: u16 = 443;

/// Builds a raw TCP segment as the child would send it. `TcpEngine::handle_frame`
/// takes the segment alone, the way `link::dispatch_frame` hands it over
/// after already having stripped the IPv4 header.
fn child_segment(seq: u32, ack: u32, control: Control, payload: &[u8]) -> Vec<u8> {
    child_segment_from(CHILD_PORT, seq, ack, control, payload)
}

fn child_segment_from(source_port: u16, seq: u32, ack: u32, control: Control, payload: &[u8]) -> Vec<u8> {
    let tcp_header = TcpHeader {
        source_port,
        destination_port: PEER_PORT,
        sequence: seq,
        acknowledgment: ack,
        control,
        window: 65535,
    };
    let mut tcp_bytes = Vec::new();
    tcp_header
        .serialize_into(&mut tcp_bytes, payload, CHILD_ADDR, PEER_ADDR)
        .unwrap();
    tcp_bytes
}

/// Unpacks an outbound frame the engine produced back into its TCP header
/// and payload, asserting the IP addressing is the impersonated peer
/// talking to the child.
fn parse_outbound(frame: &[u8]) -> (TcpHeader, Vec<u8>) {
    let (ip_header, tcp_bytes) = Ipv4Header::parse(frame).unwrap();
    assert_eq!(ip_header.source, PEER_ADDR);
    assert_eq!(ip_header.destination, CHILD_ADDR);
    let (tcp_header, payload) = TcpHeader::parse(tcp_bytes, PEER_ADDR, CHILD_ADDR).unwrap();
    (tcp_header, payload.to_vec())
}

struct EchoUppercase;

#[async_trait]
impl TcpHandler for EchoUppercase {
    async fn handle(&self, pending: PendingFlow) {
        let flow = pending.accept().expect("accept should succeed");
        while let Some(chunk) = flow.read().await.unwrap() {
            let upper: Vec<u8> = chunk.iter().map(u8::to_ascii_uppercase).collect();
            flow.write(&upper).unwrap();
        }
        flow.close().unwrap();
    }
}

struct AlwaysReject(Arc<AtomicBool>);

#[async_trait]
impl TcpHandler for AlwaysReject {
    async fn handle(&self, pending: PendingFlow) {
        self.0.store(true, Ordering::SeqCst);
        pending.reject();
    }
}

fn engine_with(mux: Mux) -> (Arc<TcpEngine>, mpsc::Receiver<Vec<u8>>) {
    let (outbound_tx, outbound_rx) = mpsc::channel(32);
    let engine = Arc::new(TcpEngine::new(
        Arc::new(mux),
        EngineConfig::default(),
        outbound_tx,
    ));
    (engine, outbound_rx)
}

#[tokio::test]
async fn handshake_echo_and_close() {
    let mut mux = Mux::new();
    mux.register_tcp(Pattern::Port(PEER_PORT), Arc::new(EchoUppercase));
    let (engine, mut outbound_rx) = engine_with(mux);

    let child_isn = 1000u32;
    engine
        .handle_frame(CHILD_ADDR, PEER_ADDR, &child_segment(child_isn, 0, Control::syn(), &[]))
        .await
        .unwrap();

    let syn_ack = outbound_rx.recv().await.expect("syn-ack expected");
    let (header, _) = parse_outbound(&syn_ack);
    assert!(header.control.syn && header.control.ack);
    assert_eq!(header.sequence, 0);
    assert_eq!(header.acknowledgment, child_isn.wrapping_add(1));

    engine
        .handle_frame(
            CHILD_ADDR,
            PEER_ADDR,
            &child_segment(child_isn + 1, 1, Control::ack(), &[]),
        )
        .await
        .unwrap();

    engine
        .handle_frame(
            CHILD_ADDR,
            PEER_ADDR,
            &child_segment(child_isn + 1, 1, Control::psh_ack(), b"hello"),
        )
        .await
        .unwrap();

    let ack = outbound_rx.recv().await.expect("pure ack expected");
    let (header, _) = parse_outbound(&ack);
    assert!(header.control.ack && !header.control.psh);
    assert_eq!(header.acknowledgment, child_isn + 1 + 5);

    let echoed = outbound_rx.recv().await.expect("echoed data expected");
    let (header, payload) = parse_outbound(&echoed);
    assert_eq!(payload, b"HELLO");
    assert_eq!(header.sequence, 1);

    engine
        .handle_frame(
            CHILD_ADDR,
            PEER_ADDR,
            &child_segment(child_isn + 1 + 5, 1, Control::fin_ack(), &[]),
        )
        .await
        .unwrap();

    let fin_ack = outbound_rx
        .recv()
        .await
        .expect("fin+ack expected in reply to the child's fin");
    let (header, _) = parse_outbound(&fin_ack);
    assert!(header.control.fin && header.control.ack);
    assert_eq!(header.sequence, 6);
    assert_eq!(header.acknowledgment, child_isn + 1 + 5 + 1);

    let fin = outbound_rx
        .recv()
        .await
        .expect("second fin expected once the handler closes after end of stream");
    let (header, _) = parse_outbound(&fin);
    assert!(header.control.fin && header.control.ack);
    assert_eq!(header.sequence, 7);
}

#[tokio::test]
async fn unregistered_destination_is_rejected() {
    let called = Arc::new(AtomicBool::new(false));
    let mut mux = Mux::new();
    mux.register_tcp(Pattern::Port(9999), Arc::new(AlwaysReject(Arc::clone(&called))));
    let (engine, mut outbound_rx) = engine_with(mux);

    engine
        .handle_frame(CHILD_ADDR, PEER_ADDR, &child_segment(500, 0, Control::syn(), &[]))
        .await
        .unwrap();

    let rst = outbound_rx.recv().await.expect("rst expected");
    let (header, _) = parse_outbound(&rst);
    assert!(header.control.rst && header.control.ack);
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn two_simultaneous_flows_stay_independent() {
    let mut mux = Mux::new();
    mux.register_tcp(Pattern::Port(PEER_PORT), Arc::new(EchoUppercase));
    let (engine, mut outbound_rx) = engine_with(mux);

    let other_child_port = CHILD_PORT + 1;
    let second_segment = child_segment_from(other_child_port, 2000, 0, Control::syn(), &[]);

    engine
        .handle_frame(CHILD_ADDR, PEER_ADDR, &child_segment(1000, 0, Control::syn(), &[]))
        .await
        .unwrap();
    engine
        .handle_frame(CHILD_ADDR, PEER_ADDR, &second_segment)
        .await
        .unwrap();

    let first = parse_outbound(&outbound_rx.recv().await.unwrap());
    let second = parse_outbound(&outbound_rx.recv().await.unwrap());
    assert_ne!(first.0.destination_port, second.0.destination_port);
}
