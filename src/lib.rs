//! Two-peer video call signaling: a broadcast relay hub and the
//! offer/answer negotiation coordinator that talks through it.

pub mod config;
pub mod negotiation;
pub mod protocol;
pub mod signaling;
