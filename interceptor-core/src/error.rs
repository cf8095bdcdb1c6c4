//! The error taxonomy for the datapath. Every variant here corresponds to a
//! failure mode the engine itself can recover from by logging and
//! continuing; errors only cross a flow boundary when returned from a
//! handler-facing operation (`read`, `write`, `close`).

use crate::endpoint::FlowKey;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A frame failed to parse: wrong EtherType-equivalent, bad length, a
    /// checksum that didn't validate, or (for the handler-facing `read`) a
    /// caller buffer too small to hold the next queued payload.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// A non-SYN segment arrived for a key with no flow object.
    #[error("segment for unrecognized flow {0}")]
    UnknownFlow(FlowKey),

    /// A bounded queue (a flow's inbox, or the outbound queue) was full and
    /// the new item was dropped rather than blocking the producer.
    #[error("queue full, frame dropped")]
    BackpressureDrop,

    /// A handler tried to close a flow that never completed its handshake.
    #[error("cannot close a flow that is still in the Init state")]
    CloseInInit,

    /// Header or checksum finalization failed while building an outbound
    /// frame.
    #[error("failed to serialize outbound frame: {0}")]
    SerializeError(&'static str),

    /// The link itself failed to read or write.
    #[error("link I/O error: {0}")]
    LinkIOError(#[from] std::io::Error),
}
