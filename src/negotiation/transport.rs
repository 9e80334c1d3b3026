//! Client side of the relay: how a coordinator sends payloads and where
//! relayed events come from.

use std::future::Future;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::protocol::SignalKind;
use crate::signaling::{
    ChannelId, ClientMessage, HubHandle, OutboundMessage, ServerMessage, SignalingError,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hub error: {0}")]
    Hub(#[from] SignalingError),
}

pub trait SignalTransport: Send {
    /// Invoke the relay operation for `kind` with an already encoded payload
    fn send(
        &mut self,
        kind: SignalKind,
        payload: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket connection to a running relay
pub struct WsRelayClient {
    sink: WsSink,
}

impl WsRelayClient {
    /// Connect to the relay; relayed events are delivered on the returned receiver
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>), TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (sink, mut stream) = ws_stream.split();
        info!("Connected to relay at {}", url);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Unrecognized relay event: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay connection error: {}", e);
                        break;
                    }
                }
            }
            debug!("Relay reader finished");
        });

        Ok((Self { sink }, rx))
    }
}

impl SignalTransport for WsRelayClient {
    async fn send(&mut self, kind: SignalKind, payload: String) -> Result<(), TransportError> {
        let json = serde_json::to_string(&ClientMessage::new(kind, payload))?;
        self.sink.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

/// In-process transport talking straight to a hub actor
pub struct HubTransport {
    hub: HubHandle,
    id: ChannelId,
}

impl HubTransport {
    /// Join the hub as a new channel; the receiver yields raw relayed frames
    pub async fn connect(
        hub: &HubHandle,
    ) -> Result<(Self, mpsc::UnboundedReceiver<OutboundMessage>), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
        let id = hub.connect(addr, tx).await?;
        Ok((
            Self {
                hub: hub.clone(),
                id,
            },
            rx,
        ))
    }

    pub fn channel_id(&self) -> ChannelId {
        self.id
    }
}

impl SignalTransport for HubTransport {
    async fn send(&mut self, kind: SignalKind, payload: String) -> Result<(), TransportError> {
        self.hub.relay(&self.id, kind, payload).await?;
        Ok(())
    }
}

/// Decode raw hub frames into events on a new receiver
pub fn decode_frames(
    mut frames: mpsc::UnboundedReceiver<OutboundMessage>,
) -> mpsc::UnboundedReceiver<ServerMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            match serde_json::from_str::<ServerMessage>(frame.as_str()) {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Unrecognized relay event: {}", e),
            }
        }
    });
    rx
}
