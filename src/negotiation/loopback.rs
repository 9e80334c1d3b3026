//! In-memory [`PeerEngine`] with no real media or network.
//!
//! Descriptions are synthetic SDP text, a single host candidate is
//! "gathered" when a local description is applied, and the connection
//! reports remote media plus `connected` once both descriptions are in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use super::engine::{
    CallId, EngineError, EngineEvent, EngineEventKind, IceConnectionState, MediaConstraints,
    MediaStream, MediaTrack, OfferOptions, PeerConnection, PeerEngine, TrackKind,
};
use crate::protocol::{IceCandidate, SdpType, SessionDescription};

const REMOTE_VIDEO_WIDTH: u32 = 640;
const REMOTE_VIDEO_HEIGHT: u32 = 480;

#[derive(Debug, Clone, Copy)]
pub struct LoopbackOptions {
    pub media_available: bool,
    pub fail_create_offer: bool,
    pub fail_add_candidate: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            media_available: true,
            fail_create_offer: false,
            fail_add_candidate: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopbackEngine {
    name: String,
    options: LoopbackOptions,
    counter: Arc<AtomicU64>,
}

impl LoopbackEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, LoopbackOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: LoopbackOptions) -> Self {
        Self {
            name: name.into(),
            options,
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl PeerEngine for LoopbackEngine {
    type Connection = LoopbackConnection;

    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, EngineError> {
        if !self.options.media_available {
            return Err(EngineError::MediaUnavailable("NotFoundError".to_string()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack {
                kind: TrackKind::Audio,
                label: format!("{} microphone", self.name),
            });
        }
        if constraints.video {
            tracks.push(MediaTrack {
                kind: TrackKind::Video,
                label: format!("{} camera", self.name),
            });
        }
        Ok(MediaStream {
            id: format!("{}-local-{}", self.name, self.next()),
            tracks,
        })
    }

    fn create_connection(
        &self,
        call: CallId,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<LoopbackConnection, EngineError> {
        Ok(LoopbackConnection {
            call,
            engine: self.clone(),
            events,
            streams: Vec::new(),
            local: None,
            remote: None,
            remote_candidates: Vec::new(),
            ice_state: IceConnectionState::New,
        })
    }
}

#[derive(Debug)]
pub struct LoopbackConnection {
    call: CallId,
    engine: LoopbackEngine,
    events: mpsc::UnboundedSender<EngineEvent>,
    streams: Vec<MediaStream>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
    ice_state: IceConnectionState,
}

impl LoopbackConnection {
    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote.as_ref()
    }

    pub fn remote_candidates(&self) -> &[IceCandidate] {
        &self.remote_candidates
    }

    pub fn streams(&self) -> &[MediaStream] {
        &self.streams
    }

    fn emit(&self, kind: EngineEventKind) {
        // receiver gone means the coordinator shut down
        let _ = self.events.send(EngineEvent {
            call: self.call,
            kind,
        });
    }

    fn set_ice_state(&mut self, state: IceConnectionState) {
        if self.ice_state != state {
            self.ice_state = state;
            self.emit(EngineEventKind::IceStateChanged(state));
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.ice_state == IceConnectionState::Closed {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    fn synthetic_sdp(&self, kind: SdpType, options: Option<OfferOptions>) -> String {
        let mut sdp = format!(
            "v=0\r\no={} {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            self.engine.name,
            self.engine.next()
        );
        let (audio, video) = match options {
            Some(o) => (
                o.receive_audio || self.sends(TrackKind::Audio),
                o.receive_video || self.sends(TrackKind::Video),
            ),
            None => (true, true),
        };
        if audio {
            sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n");
        }
        if video {
            sdp.push_str("m=video 9 UDP/TLS/RTP/SAVPF 96\r\n");
        }
        sdp.push_str(match kind {
            SdpType::Offer => "a=setup:actpass\r\n",
            SdpType::Answer => "a=setup:active\r\n",
        });
        sdp
    }

    fn sends(&self, kind: TrackKind) -> bool {
        self.streams
            .iter()
            .any(|s| s.tracks.iter().any(|t| t.kind == kind))
    }

    fn maybe_connect(&mut self) {
        if self.local.is_none() || self.remote.is_none() {
            return;
        }
        self.set_ice_state(IceConnectionState::Checking);
        self.emit(EngineEventKind::RemoteStream(MediaStream {
            id: format!("{}-remote-{}", self.engine.name, self.call.get()),
            tracks: vec![
                MediaTrack {
                    kind: TrackKind::Audio,
                    label: "remote audio".to_string(),
                },
                MediaTrack {
                    kind: TrackKind::Video,
                    label: "remote video".to_string(),
                },
            ],
        }));
        self.emit(EngineEventKind::RemoteVideoResized {
            width: REMOTE_VIDEO_WIDTH,
            height: REMOTE_VIDEO_HEIGHT,
        });
        self.set_ice_state(IceConnectionState::Connected);
    }
}

impl PeerConnection for LoopbackConnection {
    fn add_stream(&mut self, stream: &MediaStream) -> Result<(), EngineError> {
        self.ensure_open()?;
        if !self.streams.iter().any(|s| s.id == stream.id) {
            self.streams.push(stream.clone());
        }
        Ok(())
    }

    async fn create_offer(
        &mut self,
        options: OfferOptions,
    ) -> Result<SessionDescription, EngineError> {
        self.ensure_open()?;
        if self.engine.options.fail_create_offer {
            return Err(EngineError::Other("offer creation rejected".to_string()));
        }
        Ok(SessionDescription::offer(
            self.synthetic_sdp(SdpType::Offer, Some(options)),
        ))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, EngineError> {
        self.ensure_open()?;
        match &self.remote {
            Some(desc) if desc.kind == SdpType::Offer => Ok(SessionDescription::answer(
                self.synthetic_sdp(SdpType::Answer, None),
            )),
            _ => Err(EngineError::InvalidState(
                "createAnswer without a remote offer".to_string(),
            )),
        }
    }

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), EngineError> {
        self.ensure_open()?;
        let port = 50000 + (self.engine.next() % 10000);
        self.local = Some(desc);
        self.emit(EngineEventKind::IceCandidate(IceCandidate {
            candidate: format!(
                "candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host",
                self.call.get(),
                port
            ),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        }));
        self.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), EngineError> {
        self.ensure_open()?;
        if desc.kind == SdpType::Offer && self.local.is_some() && self.remote.is_none() {
            return Err(EngineError::InvalidState(
                "remote offer while holding a local offer".to_string(),
            ));
        }
        self.remote = Some(desc);
        self.maybe_connect();
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.engine.options.fail_add_candidate {
            return Err(EngineError::Other("candidate rejected".to_string()));
        }
        if self.remote_candidates.contains(&candidate) {
            debug!("Duplicate candidate ignored: {}", candidate.candidate);
        } else {
            self.remote_candidates.push(candidate);
        }
        Ok(())
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.ice_state
    }

    fn close(&mut self) {
        self.set_ice_state(IceConnectionState::Closed);
    }
}
