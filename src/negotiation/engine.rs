//! Seam to the WebRTC stack.
//!
//! The coordinator only ever talks to the stack through [`PeerEngine`] and
//! [`PeerConnection`]. Asynchronous notifications from a connection (new
//! local candidates, ICE state, remote media, rendering surface resizes)
//! come back as [`EngineEvent`]s tagged with the [`CallId`] of the call that
//! created the connection.

use std::fmt;
use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::{IceCandidate, SessionDescription};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("media capture failed: {0}")]
    MediaUnavailable(String),

    #[error("operation not valid in current state: {0}")]
    InvalidState(String),

    #[error("connection is closed")]
    Closed,

    #[error("engine failure: {0}")]
    Other(String),
}

/// Generation id of a call; a new one is issued for every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub(crate) u64);

impl CallId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Offer options; both flags force the offer to ask for the media kind even
/// when this side sends none of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    pub receive_audio: bool,
    pub receive_video: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            receive_audio: true,
            receive_video: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub kind: TrackKind,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    /// A local candidate was gathered and should be relayed
    IceCandidate(IceCandidate),
    IceStateChanged(IceConnectionState),
    RemoteStream(MediaStream),
    /// The remote rendering surface changed size
    RemoteVideoResized { width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub call: CallId,
    pub kind: EngineEventKind,
}

pub trait PeerEngine: Send + Sync {
    type Connection: PeerConnection;

    fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> impl Future<Output = Result<MediaStream, EngineError>> + Send;

    /// Build a connection whose notifications are sent on `events`
    fn create_connection(
        &self,
        call: CallId,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self::Connection, EngineError>;
}

pub trait PeerConnection: Send {
    fn add_stream(&mut self, stream: &MediaStream) -> Result<(), EngineError>;

    fn create_offer(
        &mut self,
        options: OfferOptions,
    ) -> impl Future<Output = Result<SessionDescription, EngineError>> + Send;

    fn create_answer(
        &mut self,
    ) -> impl Future<Output = Result<SessionDescription, EngineError>> + Send;

    fn set_local_description(
        &mut self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn ice_connection_state(&self) -> IceConnectionState;

    fn close(&mut self);
}
