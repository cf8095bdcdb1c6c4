//! Demultiplexes incoming TCP segments onto flow objects, running the
//! five-state handshake and teardown machine described by `FlowState`.
//!
//! A single task (the link reader) is expected to drive [`TcpEngine::handle_frame`]
//! for every inbound segment; this is the one place flow state is mutated
//! from a single writer, with `DashMap` giving lock-free lookup for the
//! handler tasks that only read and write their own flow afterward.

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::endpoint::{Endpoint, FlowKey};
use crate::error::Error;
use crate::logging;
use crate::mux::Mux;
use crate::tcp::flow::{send_segment, FlowShared, InboxItem, PendingFlow};
use crate::tcp::header::{Control, TcpHeader};
use crate::tcp::state::FlowState;

/// Tunable parameters for the engine, kept out of the hot path as named
/// fields rather than scattered literals.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub window: u16,
    pub ttl: u8,
    pub inbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: crate::tcp::flow::DEFAULT_WINDOW,
            ttl: crate::tcp::flow::DEFAULT_TTL,
            inbox_capacity: 64,
        }
    }
}

pub struct TcpEngine {
    flows: DashMap<FlowKey, Arc<FlowShared>>,
    mux: Arc<Mux>,
    config: EngineConfig,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl TcpEngine {
    pub fn new(mux: Arc<Mux>, config: EngineConfig, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            flows: DashMap::new(),
            mux,
            config,
            outbound,
        }
    }

    /// Processes one TCP segment carried inside an already-validated IPv4
    /// frame. `source_addr`/`destination_addr` come from the IP header;
    /// `segment` is the IP payload.
    pub async fn handle_frame(
        &self,
        source_addr: Ipv4Addr,
        destination_addr: Ipv4Addr,
        segment: &[u8],
    ) -> Result<(), Error> {
        let (header, payload) = TcpHeader::parse(segment, source_addr, destination_addr)?;
        let key = FlowKey::new(
            Endpoint::new(source_addr, header.source_port),
            Endpoint::new(destination_addr, header.destination_port),
        );

        let existing = self.flows.get(&key).map(|entry| Arc::clone(entry.value()));
        match existing {
            Some(shared) => self.handle_existing(shared, &header, payload),
            None => self.handle_unknown(key, &header).await,
        }
    }

    async fn handle_unknown(&self, key: FlowKey, header: &TcpHeader) -> Result<(), Error> {
        if header.control.rst {
            // A reset for a flow we never saw open; nothing to do.
            return Ok(());
        }
        if !header.control.syn || header.control.ack {
            logging::segment_for_unknown_flow(&key);
            return Err(Error::UnknownFlow(key));
        }

        let (shared, _inbox_tx) = FlowShared::new(
            key,
            0,
            header.sequence,
            self.config.window,
            self.config.ttl,
            self.config.inbox_capacity,
            self.outbound.clone(),
        );
        self.flows.insert(key, Arc::clone(&shared));

        match self.mux.route(key.peer) {
            Some(handler) => {
                tokio::spawn(async move {
                    handler.handle(PendingFlow::new(shared)).await;
                });
            }
            None => {
                PendingFlow::new(Arc::clone(&shared)).reject();
                self.flows.remove(&key);
            }
        }
        Ok(())
    }

    fn handle_existing(
        &self,
        shared: Arc<FlowShared>,
        header: &TcpHeader,
        payload: &[u8],
    ) -> Result<(), Error> {
        if header.control.rst {
            shared.set_state(FlowState::Closed);
            self.flows.remove(&shared.key);
            logging::flow_closed(&shared.key);
            return Ok(());
        }

        match shared.state() {
            FlowState::Init => {
                // Still waiting on the handler's accept/reject decision;
                // nothing arriving on the link changes that.
                Ok(())
            }
            FlowState::SynReceived => {
                if header.control.ack && !header.control.syn {
                    shared.set_state(FlowState::Connected);
                }
                Ok(())
            }
            FlowState::Connected => {
                if !payload.is_empty() {
                    shared
                        .ack_out
                        .fetch_add(payload.len() as u32, Ordering::SeqCst);
                    if shared
                        .inbox_tx
                        .try_send(InboxItem::Data(payload.to_vec()))
                        .is_err()
                    {
                        logging::inbox_full(&shared.key);
                    }
                }
                if header.control.fin {
                    shared.ack_out.fetch_add(1, Ordering::SeqCst);
                    shared.set_state(FlowState::PeerFinished);
                    let _ = shared.inbox_tx.try_send(InboxItem::PeerFinished);
                    let seq = shared.seq_out.fetch_add(1, Ordering::SeqCst);
                    send_segment(&shared, seq, Control::fin_ack(), &[])?;
                } else if !payload.is_empty() {
                    send_segment(&shared, shared.seq_out.load(Ordering::SeqCst), Control::ack(), &[])?;
                }
                Ok(())
            }
            FlowState::PeerFinished => {
                if header.control.ack {
                    // The final ACK of our own FIN, sent via `TcpFlow::close`.
                    self.flows.remove(&shared.key);
                }
                Ok(())
            }
            FlowState::Closed => Ok(()),
        }
    }
}
