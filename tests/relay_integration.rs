//! Relay tests over real WebSocket connections.

use std::net::SocketAddr;
use std::time::Duration;

use callhub::config::RelayConfig;
use callhub::negotiation::loopback::LoopbackEngine;
use callhub::negotiation::{CallState, Coordinator, UiCommand, UiEvent, WsRelayClient};
use callhub::signaling::{HubHandle, ServerMessage, SignalingServer};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Client {
    tx: SplitSink<Ws, Message>,
    rx: SplitStream<Ws>,
}

impl Client {
    async fn send(&mut self, method: &str, message: &str) {
        let envelope = serde_json::json!({ "method": method, "message": message });
        self.tx
            .send(Message::Text(envelope.to_string().into()))
            .await
            .expect("send failed");
    }

    async fn send_raw(&mut self, text: &str) {
        self.tx
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("send failed");
    }

    /// Next relay event, or None if nothing arrives in time
    async fn recv(&mut self, wait: Duration) -> Option<ServerMessage> {
        loop {
            let msg = timeout(wait, self.rx.next()).await.ok()??.ok()?;
            if let Message::Text(text) = msg {
                return Some(serde_json::from_str(&text).expect("bad event"));
            }
        }
    }
}

const SHORT: Duration = Duration::from_millis(200);
const LONG: Duration = Duration::from_secs(5);

async fn start_relay(validate_payloads: bool) -> (SocketAddr, HubHandle) {
    start_relay_with(RelayConfig {
        validate_payloads,
        ..local_config()
    })
    .await
}

fn local_config() -> RelayConfig {
    RelayConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..Default::default()
    }
}

async fn start_relay_with(config: RelayConfig) -> (SocketAddr, HubHandle) {
    let server = SignalingServer::bind(config).await.expect("bind failed");
    let addr = server.local_addr().unwrap();
    let hub = server.handle();
    tokio::spawn(server.run());
    (addr, hub)
}

async fn wait_for_channels(hub: &HubHandle, n: usize) {
    for _ in 0..200 {
        if hub.connected_count().await.unwrap() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} channels", n);
}

async fn clients(addr: SocketAddr, hub: &HubHandle, n: usize) -> Vec<Client> {
    let mut out = Vec::new();
    for _ in 0..n {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .expect("connect failed");
        let (tx, rx) = ws.split();
        out.push(Client { tx, rx });
    }
    wait_for_channels(hub, n).await;
    out
}

#[tokio::test]
async fn broadcast_reaches_everyone_but_sender() {
    let (addr, hub) = start_relay(false).await;
    let mut c = clients(addr, &hub, 3).await;

    c[0].send("sendSdp", "hello").await;

    for i in [1, 2] {
        assert_eq!(
            c[i].recv(LONG).await,
            Some(ServerMessage::SdpMessage("hello".to_string()))
        );
    }
    assert_eq!(c[0].recv(SHORT).await, None);
}

#[tokio::test]
async fn each_method_maps_to_its_event() {
    let (addr, hub) = start_relay(false).await;
    let mut c = clients(addr, &hub, 2).await;

    c[0].send("sendSdp", "1").await;
    c[0].send("sendAnswer", "2").await;
    c[0].send("sendCandidate", "3").await;
    c[0].send("sendFinal", "4").await;

    let expected = [
        ServerMessage::SdpMessage("1".to_string()),
        ServerMessage::AnswerMessage("2".to_string()),
        ServerMessage::CandidateMessage("3".to_string()),
        ServerMessage::FinalMessage("4".to_string()),
    ];
    for event in expected {
        assert_eq!(c[1].recv(LONG).await, Some(event));
    }
}

#[tokio::test]
async fn payload_is_relayed_verbatim_by_default() {
    let (addr, hub) = start_relay(false).await;
    let mut c = clients(addr, &hub, 2).await;

    c[1].send("sendCandidate", "not even json").await;
    assert_eq!(
        c[0].recv(LONG).await,
        Some(ServerMessage::CandidateMessage("not even json".to_string()))
    );
}

#[tokio::test]
async fn invalid_envelope_gets_error_reply() {
    let (addr, hub) = start_relay(false).await;
    let mut c = clients(addr, &hub, 2).await;

    c[0].send_raw(r#"{"method":"sendChat","message":"hi"}"#).await;

    assert!(matches!(c[0].recv(LONG).await, Some(ServerMessage::Error(_))));
    assert_eq!(c[1].recv(SHORT).await, None);
}

#[tokio::test]
async fn strict_mode_drops_malformed_candidate() {
    let (addr, hub) = start_relay(true).await;
    let mut c = clients(addr, &hub, 2).await;

    c[0].send("sendCandidate", r#"{"candidate":{"sdpMid":"0"}}"#).await;
    assert!(matches!(c[0].recv(LONG).await, Some(ServerMessage::Error(_))));
    assert_eq!(c[1].recv(SHORT).await, None);

    let valid = r#"{"candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 9 typ host"}}"#;
    c[0].send("sendCandidate", valid).await;
    assert_eq!(
        c[1].recv(LONG).await,
        Some(ServerMessage::CandidateMessage(valid.to_string()))
    );
}

#[tokio::test]
async fn closed_client_leaves_broadcast_set() {
    let (addr, hub) = start_relay(false).await;
    let mut c = clients(addr, &hub, 3).await;

    let mut gone = c.pop().unwrap();
    gone.tx.send(Message::Close(None)).await.unwrap();
    wait_for_channels(&hub, 2).await;

    c[0].send("sendFinal", r#"{"final":"done"}"#).await;
    assert_eq!(
        c[1].recv(LONG).await,
        Some(ServerMessage::FinalMessage(r#"{"final":"done"}"#.to_string()))
    );
}

#[tokio::test]
async fn silent_client_is_dropped_after_missing_pong() {
    let (addr, hub) = start_relay_with(RelayConfig {
        ping_interval: Duration::from_millis(300),
        pong_timeout: Duration::from_millis(300),
        ..local_config()
    })
    .await;
    let mut c = clients(addr, &hub, 2).await;

    // reading is what flushes the automatic pong
    let mut live = c.remove(0);
    let (seen_tx, mut seen) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(Ok(msg)) = live.rx.next().await {
            if let Message::Text(text) = msg {
                let _ = seen_tx.send(text.to_string());
            }
        }
    });
    let _silent = c.remove(0);

    wait_for_channels(&hub, 1).await;
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(hub.connected_count().await.unwrap(), 1);

    // the reader is the one still in the broadcast set
    let (local_tx, _local_rx) = tokio::sync::mpsc::unbounded_channel();
    let local_addr = "127.0.0.1:1".parse().unwrap();
    let local = hub.connect(local_addr, local_tx).await.unwrap();
    let payload = r#"{"final":"done"}"#.to_string();
    hub.relay_final(&local, payload).await.unwrap();
    let text = timeout(LONG, seen.recv()).await.unwrap().unwrap();
    assert_eq!(text, r#"{"event":"finalMessage","message":"{\"final\":\"done\"}"}"#);
}

#[tokio::test]
async fn zero_keepalive_interval_is_rejected_at_bind() {
    let config = RelayConfig {
        ping_interval: Duration::ZERO,
        ..local_config()
    };
    assert!(SignalingServer::bind(config).await.is_err());
}

async fn wait_for_state(ui: &async_channel::Receiver<UiEvent>, state: CallState) {
    let result = timeout(LONG, async {
        while let Ok(event) = ui.recv().await {
            if event == UiEvent::StateChanged(state) {
                return;
            }
        }
        panic!("ui channel closed");
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {}", state);
}

#[tokio::test]
async fn two_coordinators_complete_a_call() {
    let (addr, hub) = start_relay(true).await;
    let url = format!("ws://{}", addr);

    let (a_transport, a_relay) = WsRelayClient::connect(&url).await.unwrap();
    let (b_transport, b_relay) = WsRelayClient::connect(&url).await.unwrap();
    wait_for_channels(&hub, 2).await;

    let (a, a_ui) = Coordinator::new(LoopbackEngine::new("alice"), a_transport);
    let (b, b_ui) = Coordinator::new(LoopbackEngine::new("bob"), b_transport);
    let (a_cmd, a_cmd_rx) = async_channel::unbounded();
    let (b_cmd, b_cmd_rx) = async_channel::unbounded();
    tokio::spawn(a.run(a_cmd_rx, a_relay));
    tokio::spawn(b.run(b_cmd_rx, b_relay));

    b_cmd.send(UiCommand::Start).await.unwrap();
    wait_for_state(&b_ui, CallState::LocalStreamAcquired).await;
    a_cmd.send(UiCommand::Start).await.unwrap();
    wait_for_state(&a_ui, CallState::LocalStreamAcquired).await;

    a_cmd.send(UiCommand::Call).await.unwrap();
    wait_for_state(&a_ui, CallState::Connected).await;
    wait_for_state(&b_ui, CallState::Connected).await;

    a_cmd.send(UiCommand::Hangup).await.unwrap();
    wait_for_state(&a_ui, CallState::Closed).await;
}
