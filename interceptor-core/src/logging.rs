//! Structured tracing events for the datapath.
//!
//! Every event here carries the flow key (or, before a flow exists, the raw
//! endpoints) as a structured field rather than interpolating it into the
//! message string, so a JSON-formatted subscriber can filter and group by
//! flow. This module never installs a subscriber; the binary crate owns
//! that (`tracing_subscriber::fmt`/`EnvFilter`).

use crate::endpoint::FlowKey;

pub fn flow_accepted(key: &FlowKey) {
    tracing::info!(flow = %key, "flow accepted");
}

pub fn flow_rejected(key: &FlowKey) {
    tracing::info!(flow = %key, "flow rejected");
}

pub fn flow_closed(key: &FlowKey) {
    tracing::info!(flow = %key, "flow closed");
}

pub fn segment_for_unknown_flow(key: &FlowKey) {
    tracing::warn!(flow = %key, "segment for unrecognized flow, dropping");
}

pub fn inbox_full(key: &FlowKey) {
    tracing::warn!(flow = %key, "flow inbox full, segment dropped");
}

pub fn outbound_full() {
    tracing::warn!("outbound queue full, frame dropped");
}

pub fn malformed_frame(reason: &str) {
    tracing::warn!(reason, "dropping malformed frame");
}
