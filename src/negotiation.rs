//! Client side of a call: drives one peer connection through the
//! offer/answer/candidate handshake over the relay.

mod coordinator;
mod engine;
pub mod loopback;
mod state;
mod transport;

pub use coordinator::{Coordinator, NegotiationError, UiCommand, UiEvent};
pub use engine::{
    CallId, EngineError, EngineEvent, EngineEventKind, IceConnectionState, MediaConstraints,
    MediaStream, MediaTrack, OfferOptions, PeerConnection, PeerEngine, TrackKind,
};
pub use state::{Affordances, CallState, Role};
pub use transport::{HubTransport, SignalTransport, TransportError, WsRelayClient, decode_frames};
