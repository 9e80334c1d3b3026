use std::fmt;
use std::net::SocketAddr;

use rand::Rng;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::protocol::SignalError;

/// Relay hub errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rejected payload: {0}")]
    RejectedPayload(#[from] SignalError),

    #[error("internal error: {0}")]
    Internal(String),
}

const CHANNEL_ID_PREFIX: &[u8] = b"chan_";
const CHANNEL_ID_LEN: usize = 13;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Channel ID: 13-byte fixed array ("chan_" + 8 hex).
///
/// Only used for bookkeeping and logs; routing never addresses a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    bytes: [u8; CHANNEL_ID_LEN],
}

impl ChannelId {
    pub fn generate() -> Self {
        Self::from_value(rand::rng().random())
    }

    pub(crate) fn from_value(value: u32) -> Self {
        let mut bytes = [0u8; CHANNEL_ID_LEN];
        bytes[..CHANNEL_ID_PREFIX.len()].copy_from_slice(CHANNEL_ID_PREFIX);

        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            bytes[CHANNEL_ID_PREFIX.len() + i] = HEX_CHARS[nibble];
        }
        Self { bytes }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
///
/// Cloning is a refcount bump, so one encoded message fans out to every
/// channel without copying.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

#[derive(Debug)]
pub(crate) struct ChannelState {
    pub addr: SocketAddr,
    pub tx: mpsc::UnboundedSender<OutboundMessage>,
}
