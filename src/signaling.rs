//! WebSocket relay hub: broadcasts each signaling payload to every other client

mod actor;
mod messages;
mod server;
mod types;

pub use actor::HubHandle;
pub use messages::{ClientMessage, ServerMessage};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use types::{ChannelId, OutboundMessage, SignalingError};
