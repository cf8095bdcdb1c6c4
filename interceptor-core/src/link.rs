//! Ties the virtual link to the TCP and UDP engines: one task reads IPv4
//! frames off the link and dispatches them by protocol number, another
//! drains the shared outbound queue back onto the link. The core crate
//! never knows what kind of link it is talking to; the binary crate
//! supplies a TUN device, a test harness supplies an in-memory duplex.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::ipv4::{Ipv4Header, PROTOCOL_TCP, PROTOCOL_UDP};
use crate::logging;
use crate::shutdown::Shutdown;
use crate::tcp::TcpEngine;
use crate::udp::UdpEngine;

/// Reads whole IPv4 frames off the link. Implementations own the
/// lower-level framing (a TUN device frames by read() call boundary; other
/// transports might need length-prefixing).
#[async_trait]
pub trait LinkReader: Send {
    async fn read_frame(&mut self) -> std::io::Result<Vec<u8>>;
}

/// Writes whole IPv4 frames onto the link.
#[async_trait]
pub trait LinkWriter: Send {
    async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()>;
}

/// Runs the link's read and write loops until `shutdown` fires. Returns
/// once both loops have stopped.
pub async fn run_link(
    mut reader: Box<dyn LinkReader>,
    mut writer: Box<dyn LinkWriter>,
    tcp: Arc<TcpEngine>,
    udp: Arc<UdpEngine>,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    shutdown: Shutdown,
) {
    let read_shutdown = shutdown.clone();
    let read_loop = async move {
        loop {
            tokio::select! {
                biased;
                _ = read_shutdown.wait_for_shutdown() => break,
                frame = reader.read_frame() => {
                    match frame {
                        Ok(bytes) => dispatch_frame(&tcp, &udp, &bytes).await,
                        Err(error) => {
                            logging::malformed_frame(&error.to_string());
                            break;
                        }
                    }
                }
            }
        }
    };

    let write_shutdown = shutdown.clone();
    let write_loop = async move {
        loop {
            tokio::select! {
                biased;
                _ = write_shutdown.wait_for_shutdown() => break,
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(bytes) => {
                            if let Err(error) = writer.write_frame(&bytes).await {
                                logging::malformed_frame(&error.to_string());
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    };

    tokio::join!(read_loop, write_loop);
}

async fn dispatch_frame(tcp: &TcpEngine, udp: &UdpEngine, bytes: &[u8]) {
    let (header, payload) = match Ipv4Header::parse(bytes) {
        Ok(parsed) => parsed,
        Err(error) => {
            logging::malformed_frame(&error.to_string());
            return;
        }
    };

    let result: Result<(), Error> = match header.protocol {
        PROTOCOL_TCP => {
            tcp.handle_frame(header.source, header.destination, payload)
                .await
        }
        PROTOCOL_UDP => {
            udp.handle_frame(header.source, header.destination, payload)
                .await
        }
        _ => {
            logging::malformed_frame("unsupported ip protocol");
            Ok(())
        }
    };

    if let Err(error) = result {
        logging::malformed_frame(&error.to_string());
    }
}
