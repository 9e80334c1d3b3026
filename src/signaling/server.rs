use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::HubHandle;
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ChannelId, OutboundMessage, SignalingError};
use crate::config::RelayConfig;
use crate::protocol::Signal;

pub const DEFAULT_SIGNALING_PORT: u16 = 3479;

pub struct SignalingServer {
    listener: TcpListener,
    handle: HubHandle,
    config: Arc<RelayConfig>,
}

impl SignalingServer {
    /// Bind the listener and start the hub actor
    pub async fn bind(config: RelayConfig) -> std::io::Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let handle = HubHandle::spawn(config.command_buffer);

        info!("Signaling relay listening on {}", listener.local_addr()?);
        if config.validate_payloads {
            info!("Strict mode: malformed payloads are dropped");
        }

        Ok(Self {
            listener,
            handle,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, config).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: HubHandle,
    config: Arc<RelayConfig>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let channel_id = handle.connect(addr, tx.clone()).await?;
    info!("WebSocket connection from {} as {}", addr, channel_id);

    let mut ping_interval = tokio::time::interval(config.ping_interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", channel_id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + config.pong_timeout);
                debug!("Ping sent to {}", channel_id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", channel_id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let result =
                            handle_text_message(&text, &tx, &handle, &channel_id, &config).await;
                        if let Err(e) = result {
                            warn!("Message handling error from {}: {}", channel_id, e);
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", channel_id);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", channel_id);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.disconnect(&channel_id).await;
    send_task.abort();
    info!("WebSocket disconnected: {} ({})", channel_id, addr);

    Ok(())
}

async fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &HubHandle,
    channel_id: &ChannelId,
    config: &RelayConfig,
) -> Result<(), SignalingError> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let err = ServerMessage::Error(format!("Invalid message: {}", e));
            let _ = tx.send(OutboundMessage::from(serde_json::to_string(&err)?));
            return Ok(());
        }
    };

    let (kind, payload) = client_msg.into_parts();

    if config.validate_payloads {
        if let Err(e) = Signal::decode_as(kind, &payload) {
            let err = ServerMessage::Error(format!("Dropped {} payload: {}", kind, e));
            let _ = tx.send(OutboundMessage::from(serde_json::to_string(&err)?));
            return Err(SignalingError::RejectedPayload(e));
        }
    }

    let targeted = handle.relay(channel_id, kind, payload).await?;
    debug!("Relayed {} from {} to {} channel(s)", kind, channel_id, targeted);

    Ok(())
}
