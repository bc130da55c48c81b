//! WebSocket Gateway
//!
//! Real-time delivery to per-user rooms.

pub mod gateway;
pub mod handler;
pub mod messages;
pub mod session;

pub use gateway::{ConnectedSession, Gateway};
pub use handler::ws_handler;
pub use messages::{GatewayReceive, GatewaySend, OpCode};
pub use session::SessionState;
