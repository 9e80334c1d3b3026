use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::ServerMessage;
use super::types::{ChannelId, ChannelState, OutboundMessage, SignalingError};
use crate::protocol::SignalKind;

/// Commands sent to the hub actor
pub(crate) enum HubCommand {
    Connect {
        addr: SocketAddr,
        tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ChannelId>,
    },
    Disconnect {
        id: ChannelId,
    },
    Broadcast {
        from: ChannelId,
        message: OutboundMessage,
        reply: oneshot::Sender<usize>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Draw ids until one is not held by a connected channel
fn unused_id(
    channels: &HashMap<ChannelId, ChannelState>,
    mut generate: impl FnMut() -> ChannelId,
) -> ChannelId {
    loop {
        let id = generate();
        if !channels.contains_key(&id) {
            return id;
        }
    }
}

/// Owns the set of connected channels.
///
/// Commands are handled one at a time, so broadcasts from a single sender
/// reach every other channel in the order they were issued.
pub(crate) async fn hub_actor(mut rx: mpsc::Receiver<HubCommand>) {
    let mut channels: HashMap<ChannelId, ChannelState> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            HubCommand::Connect { addr, tx, reply } => {
                let id = unused_id(&channels, ChannelId::generate);
                channels.insert(id, ChannelState { addr, tx });
                info!(
                    "Channel {} connected from {} ({} total)",
                    id,
                    addr,
                    channels.len()
                );
                let _ = reply.send(id);
            }

            HubCommand::Disconnect { id } => {
                if let Some(state) = channels.remove(&id) {
                    info!(
                        "Channel {} ({}) disconnected ({} remaining)",
                        id,
                        state.addr,
                        channels.len()
                    );
                }
            }

            HubCommand::Broadcast {
                from,
                message,
                reply,
            } => {
                let mut targeted = 0;
                for (id, state) in channels.iter().filter(|(id, _)| **id != from) {
                    // a closed receiver means the channel is going away; drop silently
                    if state.tx.send(message.clone()).is_err() {
                        debug!("Dropped message for departing channel {}", id);
                    }
                    targeted += 1;
                }
                let _ = reply.send(targeted);
            }

            HubCommand::Count { reply } => {
                let _ = reply.send(channels.len());
            }
        }
    }
}

/// Handle to communicate with the hub actor
#[derive(Clone)]
pub struct HubHandle {
    pub(crate) tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Spawn a hub actor on the current runtime
    pub fn spawn(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel::<HubCommand>(buffer);
        tokio::spawn(hub_actor(rx));
        Self { tx }
    }

    /// Register a channel; it receives every broadcast not sent by itself
    pub async fn connect(
        &self,
        addr: SocketAddr,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ChannelId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubCommand::Connect {
            addr,
            tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    pub async fn disconnect(&self, id: &ChannelId) {
        let _ = self.tx.send(HubCommand::Disconnect { id: *id }).await;
    }

    /// Broadcast `payload` as a `kind` event to every channel except `from`.
    ///
    /// Returns how many channels were targeted.
    pub async fn relay(
        &self,
        from: &ChannelId,
        kind: SignalKind,
        payload: String,
    ) -> Result<usize, SignalingError> {
        let event = ServerMessage::relayed(kind, payload);
        let message = OutboundMessage::from(serde_json::to_string(&event)?);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubCommand::Broadcast {
            from: *from,
            message,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    pub async fn relay_sdp(&self, from: &ChannelId, msg: String) -> Result<usize, SignalingError> {
        self.relay(from, SignalKind::Sdp, msg).await
    }

    pub async fn relay_answer(
        &self,
        from: &ChannelId,
        msg: String,
    ) -> Result<usize, SignalingError> {
        self.relay(from, SignalKind::Answer, msg).await
    }

    pub async fn relay_candidate(
        &self,
        from: &ChannelId,
        msg: String,
    ) -> Result<usize, SignalingError> {
        self.relay(from, SignalKind::Candidate, msg).await
    }

    pub async fn relay_final(
        &self,
        from: &ChannelId,
        msg: String,
    ) -> Result<usize, SignalingError> {
        self.relay(from, SignalKind::Final, msg).await
    }

    /// Number of currently connected channels
    pub async fn connected_count(&self) -> Result<usize, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubCommand::Count { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), SignalingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }
}
