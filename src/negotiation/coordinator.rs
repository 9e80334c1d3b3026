use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::engine::{
    CallId, EngineError, EngineEvent, EngineEventKind, IceConnectionState, MediaConstraints,
    MediaStream, OfferOptions, PeerConnection, PeerEngine,
};
use super::state::{Affordances, CallState, Role};
use super::transport::{SignalTransport, TransportError};
use crate::protocol::{IceCandidate, SessionDescription, Signal};
use crate::signaling::ServerMessage;

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("no active call")]
    NoSession,

    #[error("{action} not allowed in state {state}")]
    NotAllowed {
        action: &'static str,
        state: CallState,
    },
}

/// UI actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    Start,
    Call,
    Hangup,
    Rearm,
}

/// Everything the UI needs to render
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Affordances(Affordances),
    StateChanged(CallState),
    LocalStream(MediaStream),
    RemoteStream(MediaStream),
    /// Blocking notification for the user
    Alert(String),
    /// Time from "call" to the first remote video frame size
    SetupTime(Duration),
}

/// One call: the connection plus everything tied to its lifetime
struct CallSession<C> {
    id: CallId,
    role: Role,
    connection: C,
    started_at: Option<Instant>,
}

/// Drives one side of a call through the offer/answer handshake.
///
/// All work happens on the caller's task; engine notifications are queued
/// and tagged with the call they belong to, so anything emitted by a call
/// that has since been hung up is discarded instead of acting on the next one.
pub struct Coordinator<E: PeerEngine, T: SignalTransport> {
    engine: E,
    transport: T,
    state: CallState,
    affordances: Affordances,
    local_stream: Option<MediaStream>,
    session: Option<CallSession<E::Connection>>,
    next_call: u64,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    ui: async_channel::Sender<UiEvent>,
}

impl<E: PeerEngine, T: SignalTransport> Coordinator<E, T> {
    pub fn new(engine: E, transport: T) -> (Self, async_channel::Receiver<UiEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = async_channel::unbounded();

        let coordinator = Self {
            engine,
            transport,
            state: CallState::Idle,
            affordances: Affordances::INITIAL,
            local_stream: None,
            session: None,
            next_call: 1,
            events_tx,
            events_rx,
            ui: ui_tx,
        };
        (coordinator, ui_rx)
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn affordances(&self) -> Affordances {
        self.affordances
    }

    pub fn role(&self) -> Option<Role> {
        self.session.as_ref().map(|s| s.role)
    }

    pub fn call_id(&self) -> Option<CallId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn connection(&self) -> Option<&E::Connection> {
        self.session.as_ref().map(|s| &s.connection)
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local_stream.as_ref()
    }

    /// Process UI actions, relayed messages and engine notifications until
    /// both the command and relay sources are closed.
    pub async fn run(
        mut self,
        commands: async_channel::Receiver<UiCommand>,
        mut relay: mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let mut commands_open = true;
        let mut relay_open = true;

        while commands_open || relay_open {
            tokio::select! {
                cmd = commands.recv(), if commands_open => match cmd {
                    Ok(cmd) => self.handle_command(cmd).await,
                    Err(_) => commands_open = false,
                },
                msg = relay.recv(), if relay_open => match msg {
                    Some(msg) => self.handle_relay(msg).await,
                    None => relay_open = false,
                },
                Some(event) = self.events_rx.recv() => self.handle_engine_event(event).await,
            }
        }

        if self.session.is_some() {
            self.hangup();
        }
        debug!("Coordinator stopped");
    }

    pub async fn handle_command(&mut self, cmd: UiCommand) {
        let result = match cmd {
            UiCommand::Start => self.start().await,
            UiCommand::Call => self.call().await,
            UiCommand::Hangup => {
                self.hangup();
                Ok(())
            }
            UiCommand::Rearm => {
                self.rearm();
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("{:?} failed: {}", cmd, e);
        }
    }

    /// Request local media; on success the call action becomes available
    pub async fn start(&mut self) -> Result<(), NegotiationError> {
        if !self.affordances.start || !self.state.is_quiescent() {
            return Err(self.not_allowed("start"));
        }

        info!("Requesting local stream");
        self.affordances.start = false;
        self.publish_affordances();
        self.transition(CallState::AcquiringMedia);

        match self
            .engine
            .get_user_media(MediaConstraints::default())
            .await
        {
            Ok(stream) => {
                info!("Received local stream {}", stream.id);
                self.local_stream = Some(stream.clone());
                self.emit(UiEvent::LocalStream(stream));
                self.affordances.call = true;
                self.publish_affordances();
                self.transition(CallState::LocalStreamAcquired);
                Ok(())
            }
            Err(e) => {
                self.emit(UiEvent::Alert(format!("getUserMedia() error: {}", e)));
                self.transition(CallState::Idle);
                Err(e.into())
            }
        }
    }

    /// Create a connection and send an offer to the other side
    pub async fn call(&mut self) -> Result<(), NegotiationError> {
        if !self.affordances.call || self.session.is_some() {
            return Err(self.not_allowed("call"));
        }
        let Some(stream) = self.local_stream.clone() else {
            return Err(self.not_allowed("call"));
        };

        self.affordances.call = false;
        self.affordances.hangup = true;
        self.publish_affordances();

        info!("Starting call");
        if let Some(track) = stream.video_tracks().next() {
            info!("Using video device: {}", track.label);
        }
        if let Some(track) = stream.audio_tracks().next() {
            info!("Using audio device: {}", track.label);
        }

        let id = self.open_session(Role::Caller)?;
        let session = self.session.as_mut().ok_or(NegotiationError::NoSession)?;
        session.started_at = Some(Instant::now());
        session.connection.add_stream(&stream)?;
        info!("Added local stream to {}", id);

        let offer = match session
            .connection
            .create_offer(OfferOptions::default())
            .await
        {
            Ok(offer) => offer,
            Err(e) => {
                error!("Failed to create session description: {}", e);
                return Ok(());
            }
        };
        debug!("Offer from {}\n{}", id, offer.sdp);
        self.transition(CallState::OfferCreated);

        if !self.apply_local(id, offer.clone()).await {
            return Ok(());
        }
        self.send(Signal::Sdp(offer)).await;
        self.transition(CallState::AwaitingAnswer);
        Ok(())
    }

    /// Close the connection and reset the UI; start needs a [`rearm`](Self::rearm)
    pub fn hangup(&mut self) {
        info!("Ending call");
        if let Some(mut session) = self.session.take() {
            session.connection.close();
            debug!("Closed {}", session.id);
        }
        self.affordances = Affordances::HUNG_UP;
        self.publish_affordances();
        self.transition(CallState::Closed);
    }

    /// Re-enable the start action after a hangup or a failed media request
    pub fn rearm(&mut self) {
        if self.session.is_some() {
            warn!("Ignoring rearm during an active call");
            return;
        }
        self.local_stream = None;
        self.affordances = Affordances::INITIAL;
        self.publish_affordances();
        if self.state == CallState::Closed {
            self.transition(CallState::Idle);
        }
    }

    /// React to a message relayed from the other peer
    pub async fn handle_relay(&mut self, msg: ServerMessage) {
        let Some(kind) = msg.kind() else {
            warn!("Relay reported an error: {}", msg.payload());
            return;
        };

        let signal = match Signal::decode_as(kind, msg.payload()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Dropping {} message: {}", kind, e);
                return;
            }
        };

        match signal {
            Signal::Sdp(offer) => self.on_offer(offer).await,
            Signal::Answer(answer) => self.on_answer(answer).await,
            Signal::Candidate(candidate) => self.on_candidate(candidate).await,
            Signal::Final(_) => self.on_final(),
        }
    }

    /// Handle every engine notification queued so far
    pub async fn pump_engine_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_engine_event(event).await;
        }
    }

    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring {:?} from {} with no active call", event.kind, event.call);
            return;
        };
        if session.id != event.call {
            debug!(
                "Ignoring stale {:?} from {} (active {})",
                event.kind, event.call, session.id
            );
            return;
        }

        match event.kind {
            EngineEventKind::IceCandidate(candidate) => {
                self.send(Signal::Candidate(candidate)).await;
            }
            EngineEventKind::IceStateChanged(ice) => {
                info!("{} ICE state: {}", event.call, ice);
                match ice {
                    IceConnectionState::Connected | IceConnectionState::Completed => {
                        self.transition(CallState::Connected);
                    }
                    IceConnectionState::Failed => self.transition(CallState::Failed),
                    _ => {}
                }
            }
            EngineEventKind::RemoteStream(stream) => {
                info!("{} received remote stream {}", event.call, stream.id);
                self.emit(UiEvent::RemoteStream(stream));
            }
            EngineEventKind::RemoteVideoResized { width, height } => {
                info!("Remote video size changed to {}x{}", width, height);
                // first resize after "call" means video is playing out
                if let Some(started) = session.started_at.take() {
                    let elapsed = started.elapsed();
                    info!("Setup time: {:.3}ms", elapsed.as_secs_f64() * 1000.0);
                    self.emit(UiEvent::SetupTime(elapsed));
                }
            }
        }
    }

    async fn on_offer(&mut self, offer: SessionDescription) {
        // glare: our own offer is still outstanding
        if self.role() == Some(Role::Caller) && self.state.is_offering() {
            warn!("Ignoring offer in state {}", self.state);
            return;
        }
        let id = match self.get_or_open_session() {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to create connection: {}", e);
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.role != Role::Callee {
            info!("Answering on {} as callee", id);
            session.role = Role::Callee;
            session.started_at = None;
        }

        if let Err(e) = session.connection.set_remote_description(offer).await {
            error!("Failed to set session description: {}", e);
            return;
        }
        info!("{} setRemoteDescription complete", id);
        self.transition(CallState::RemoteDescriptionSet);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        match &self.local_stream {
            Some(stream) => {
                if let Err(e) = session.connection.add_stream(stream) {
                    warn!("Failed to add local stream to {}: {}", id, e);
                }
            }
            None => warn!("Answering {} without a local stream", id),
        }

        let answer = match session.connection.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Failed to create session description: {}", e);
                return;
            }
        };
        debug!("Answer from {}\n{}", id, answer.sdp);
        self.transition(CallState::AnswerCreated);

        if !self.apply_local(id, answer.clone()).await {
            return;
        }
        self.send(Signal::Answer(answer)).await;
        self.transition(CallState::CandidatesExchanging);
    }

    async fn on_answer(&mut self, answer: SessionDescription) {
        if self.state != CallState::AwaitingAnswer {
            warn!("Ignoring answer in state {}", self.state);
            return;
        }
        let Some(session) = self.session.as_mut() else {
            warn!("Ignoring answer with no active call");
            return;
        };
        let id = session.id;

        if let Err(e) = session.connection.set_remote_description(answer).await {
            error!("Failed to set session description: {}", e);
            return;
        }
        info!("{} setRemoteDescription complete", id);
        self.transition(CallState::RemoteDescriptionSet);

        info!("Sending final ack");
        self.send(Signal::final_ack()).await;
        self.transition(CallState::Connected);
    }

    async fn on_candidate(&mut self, candidate: IceCandidate) {
        // trickle from a call we already hung up
        if self.session.is_none() && self.state == CallState::Closed {
            debug!("Dropping candidate after hangup: {}", candidate.candidate);
            return;
        }
        let id = match self.get_or_open_session() {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to create connection: {}", e);
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        debug!("{} ICE candidate: {}", id, candidate.candidate);
        match session.connection.add_ice_candidate(candidate).await {
            Ok(()) => debug!("{} addIceCandidate success", id),
            Err(e) => warn!("{} failed to add ICE Candidate: {}", id, e),
        }
    }

    fn on_final(&mut self) {
        info!("Handshake acknowledged by remote peer");
        if self.session.is_some() {
            self.transition(CallState::Connected);
        }
    }

    /// Set a local description, logging failure; returns whether it applied
    async fn apply_local(&mut self, id: CallId, desc: SessionDescription) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.connection.set_local_description(desc).await {
            Ok(()) => {
                info!("{} setLocalDescription complete", id);
                self.transition(CallState::LocalDescriptionSet);
                true
            }
            Err(e) => {
                error!("Failed to set session description: {}", e);
                false
            }
        }
    }

    fn open_session(&mut self, role: Role) -> Result<CallId, NegotiationError> {
        let id = CallId(self.next_call);
        self.next_call += 1;

        let connection = self.engine.create_connection(id, self.events_tx.clone())?;
        info!("Created {:?} peer connection {}", role, id);

        self.session = Some(CallSession {
            id,
            role,
            connection,
            started_at: None,
        });
        Ok(id)
    }

    fn get_or_open_session(&mut self) -> Result<CallId, NegotiationError> {
        if let Some(session) = &self.session {
            return Ok(session.id);
        }
        let id = self.open_session(Role::Callee)?;
        self.affordances.call = false;
        self.affordances.hangup = true;
        self.publish_affordances();
        Ok(id)
    }

    async fn send(&mut self, signal: Signal) {
        let kind = signal.kind();
        let payload = match signal.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode {} payload: {}", kind, e);
                return;
            }
        };
        if let Err(e) = self.transport.send(kind, payload).await {
            warn!("Failed to relay {} payload: {}", kind, e);
        }
    }

    fn transition(&mut self, next: CallState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            debug!("Skipping transition {} -> {}", self.state, next);
            return;
        }
        debug!("State {} -> {}", self.state, next);
        self.state = next;
        self.emit(UiEvent::StateChanged(next));
    }

    fn not_allowed(&self, action: &'static str) -> NegotiationError {
        NegotiationError::NotAllowed {
            action,
            state: self.state,
        }
    }

    fn publish_affordances(&self) {
        self.emit(UiEvent::Affordances(self.affordances));
    }

    fn emit(&self, event: UiEvent) {
        // nobody rendering is fine
        let _ = self.ui.try_send(event);
    }
}
