//! Demultiplexes incoming UDP datagrams onto flow objects. Simpler than
//! the TCP engine: there is no handshake, so the first datagram for a
//! 4-tuple both creates the flow and triggers routing.

use std::net::Ipv4Addr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::endpoint::{Endpoint, FlowKey};
use crate::error::Error;
use crate::logging;
use crate::mux::Mux;
use crate::udp::flow::{FlowShared, UdpFlow};
use crate::udp::header::UdpHeader;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub ttl: u8,
    pub inbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ttl: crate::tcp::flow::DEFAULT_TTL,
            inbox_capacity: 64,
        }
    }
}

pub struct UdpEngine {
    flows: DashMap<FlowKey, Arc<FlowShared>>,
    mux: Arc<Mux>,
    config: EngineConfig,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl UdpEngine {
    pub fn new(mux: Arc<Mux>, config: EngineConfig, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            flows: DashMap::new(),
            mux,
            config,
            outbound,
        }
    }

    pub async fn handle_frame(
        &self,
        source_addr: Ipv4Addr,
        destination_addr: Ipv4Addr,
        datagram: &[u8],
    ) -> Result<(), Error> {
        let (header, payload) = UdpHeader::parse(datagram, source_addr, destination_addr)?;
        let key = FlowKey::new(
            Endpoint::new(source_addr, header.source_port),
            Endpoint::new(destination_addr, header.destination_port),
        );

        if let Some(entry) = self.flows.get(&key) {
            if entry.inbox_tx.try_send(payload.to_vec()).is_err() {
                logging::inbox_full(&key);
            }
            return Ok(());
        }

        let shared = FlowShared::new(
            key,
            self.config.ttl,
            self.config.inbox_capacity,
            self.outbound.clone(),
        );
        if shared.inbox_tx.try_send(payload.to_vec()).is_err() {
            logging::inbox_full(&key);
        }

        match self.mux.route_udp(key.peer) {
            Some(handler) => {
                self.flows.insert(key, Arc::clone(&shared));
                tokio::spawn(async move {
                    handler.handle(UdpFlow::new(shared)).await;
                });
            }
            None => {
                logging::flow_rejected(&key);
            }
        }
        Ok(())
    }
}
