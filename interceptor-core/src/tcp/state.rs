//! The simplified five-state machine this datapath runs instead of full
//! RFC 9293: there is no listen state (a flow object only exists once a
//! SYN has arrived), no simultaneous-open handling, and no TIME-WAIT.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// A SYN has arrived but the handler has not yet accepted or rejected it.
    Init,
    /// The handler accepted; SYN+ACK has gone out, waiting for the final ACK.
    SynReceived,
    /// The handshake completed; data may flow in either direction.
    Connected,
    /// The peer sent FIN; we may still write, but will read no more data.
    PeerFinished,
    /// Both directions are done, or the flow was reset.
    Closed,
}
