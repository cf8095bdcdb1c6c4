//! A minimal IPv4/TCP/UDP interception datapath.
//!
//! This crate terminates connections that arrive on a virtual link,
//! exposing each as a [`tcp::TcpFlow`] or [`udp::UdpFlow`] byte stream to
//! handlers registered on a [`mux::Mux`]. It does not know what the link
//! actually is (a TUN device, a test harness, anything implementing
//! [`link::LinkReader`]/[`link::LinkWriter`]) and it does not speak HTTP,
//! TLS, or DNS; those live in the binary crate built on top of it.

pub mod checksum;
pub mod endpoint;
pub mod error;
pub mod ipv4;
pub mod link;
pub mod logging;
pub mod mux;
pub mod shutdown;
pub mod tcp;
pub mod udp;

pub use endpoint::{Endpoint, FlowKey};
pub use error::Error;
pub use mux::{Mux, Pattern, TcpHandler, UdpHandler};
pub use tcp::{PendingFlow, TcpFlow};
pub use udp::UdpFlow;
