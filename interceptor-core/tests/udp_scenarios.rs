//! Black-box scenario driving `UdpEngine` directly over raw wire bytes.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use interceptor_core::ipv4::Ipv4Header;
use interceptor_core::mux::{Mux, Pattern, UdpHandler};
use interceptor_core::udp::engine::{EngineConfig, UdpEngine};
use interceptor_core::udp::header::UdpHeader;
use interceptor_core::udp::UdpFlow;
use tokio::sync::mpsc;

const CHILD_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const CHILD_PORT: u16 = 55000;
const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);
const PEER_PORT: u16 = 53;

struct Echo;

#[async_trait]
impl UdpHandler for Echo {
    async fn handle(&self, flow: UdpFlow) {
        if let Some(datagram) = flow.read().await {
            flow.write(&datagram).unwrap();
        }
    }
}

#[tokio::test]
async fn first_datagram_creates_and_routes_the_flow() {
    let mut mux = Mux::new();
    mux.register_udp(Pattern::Port(PEER_PORT), Arc::new(Echo));
    let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
    let engine = UdpEngine::new(Arc::new(mux), EngineConfig::default(), outbound_tx);

    let header = UdpHeader {
        source_port: CHILD_PORT,
        destination_port: PEER_PORT,
    };
    let mut datagram = Vec::new();
    header
        .serialize_into(&mut datagram, b"query", CHILD_ADDR, PEER_ADDR)
        .unwrap();

    engine
        .handle_frame(CHILD_ADDR, PEER_ADDR, &datagram)
        .await
        .unwrap();

    let reply = outbound_rx.recv().await.expect("echoed datagram expected");
    let (ip_header, udp_bytes) = Ipv4Header::parse(&reply).unwrap();
    assert_eq!(ip_header.source, PEER_ADDR);
    assert_eq!(ip_header.destination, CHILD_ADDR);
    let (_, payload) = UdpHeader::parse(udp_bytes, PEER_ADDR, CHILD_ADDR).unwrap();
    assert_eq!(payload, b"query");
}

#[tokio::test]
async fn unregistered_destination_is_silently_dropped() {
    let mux = Mux::new();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
    let engine = UdpEngine::new(Arc::new(mux), EngineConfig::default(), outbound_tx);

    let header = UdpHeader {
        source_port: CHILD_PORT,
        destination_port: PEER_PORT,
    };
    let mut datagram = Vec::new();
    header
        .serialize_into(&mut datagram, b"query", CHILD_ADDR, PEER_ADDR)
        .unwrap();

    engine
        .handle_frame(CHILD_ADDR, PEER_ADDR, &datagram)
        .await
        .unwrap();

    assert!(outbound_rx.try_recv().is_err());
}
