pub mod engine;
pub mod flow;
pub mod header;
pub mod state;

pub use engine::TcpEngine;
pub use flow::{PendingFlow, TcpFlow};
pub use state::FlowState;
