use serde::{Deserialize, Serialize};

use crate::protocol::SignalKind;

/// Hub invocations sent from a client to the relay.
///
/// The payload is an opaque string; the relay forwards it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "message", rename_all = "camelCase")]
pub enum ClientMessage {
    SendSdp(String),
    SendAnswer(String),
    SendCandidate(String),
    SendFinal(String),
}

impl ClientMessage {
    pub fn new(kind: SignalKind, payload: String) -> Self {
        match kind {
            SignalKind::Sdp => ClientMessage::SendSdp(payload),
            SignalKind::Answer => ClientMessage::SendAnswer(payload),
            SignalKind::Candidate => ClientMessage::SendCandidate(payload),
            SignalKind::Final => ClientMessage::SendFinal(payload),
        }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            ClientMessage::SendSdp(_) => SignalKind::Sdp,
            ClientMessage::SendAnswer(_) => SignalKind::Answer,
            ClientMessage::SendCandidate(_) => SignalKind::Candidate,
            ClientMessage::SendFinal(_) => SignalKind::Final,
        }
    }

    pub fn into_parts(self) -> (SignalKind, String) {
        let kind = self.kind();
        match self {
            ClientMessage::SendSdp(p)
            | ClientMessage::SendAnswer(p)
            | ClientMessage::SendCandidate(p)
            | ClientMessage::SendFinal(p) => (kind, p),
        }
    }
}

/// Events pushed from the relay to every other client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "message", rename_all = "camelCase")]
pub enum ServerMessage {
    SdpMessage(String),
    AnswerMessage(String),
    CandidateMessage(String),
    FinalMessage(String),

    /// Sent back to the originating client only
    Error(String),
}

impl ServerMessage {
    pub fn relayed(kind: SignalKind, payload: String) -> Self {
        match kind {
            SignalKind::Sdp => ServerMessage::SdpMessage(payload),
            SignalKind::Answer => ServerMessage::AnswerMessage(payload),
            SignalKind::Candidate => ServerMessage::CandidateMessage(payload),
            SignalKind::Final => ServerMessage::FinalMessage(payload),
        }
    }

    /// The payload kind of a relayed event, `None` for errors
    pub fn kind(&self) -> Option<SignalKind> {
        match self {
            ServerMessage::SdpMessage(_) => Some(SignalKind::Sdp),
            ServerMessage::AnswerMessage(_) => Some(SignalKind::Answer),
            ServerMessage::CandidateMessage(_) => Some(SignalKind::Candidate),
            ServerMessage::FinalMessage(_) => Some(SignalKind::Final),
            ServerMessage::Error(_) => None,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            ServerMessage::SdpMessage(p)
            | ServerMessage::AnswerMessage(p)
            | ServerMessage::CandidateMessage(p)
            | ServerMessage::FinalMessage(p)
            | ServerMessage::Error(p) => p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_send_sdp() {
        let json = r#"{"method": "sendSdp", "message": "{\"sdp\":{}}"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, ClientMessage::SendSdp(r#"{"sdp":{}}"#.to_string()));
    }

    #[test]
    fn parse_send_final() {
        let json = r#"{"method": "sendFinal", "message": "anything"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        let (kind, payload) = msg.into_parts();
        assert_eq!(kind, SignalKind::Final);
        assert_eq!(payload, "anything");
    }

    #[test]
    fn parse_unknown_method_fails() {
        let json = r#"{"method": "sendChat", "message": "hi"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn client_message_covers_every_kind() {
        for kind in SignalKind::ALL {
            let msg = ClientMessage::new(kind, String::new());
            assert_eq!(msg.kind(), kind);
        }
    }

    #[test]
    fn serialize_candidate_event() {
        let msg = ServerMessage::relayed(SignalKind::Candidate, "payload".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"event":"candidateMessage","message":"payload"}"#);
    }

    #[test]
    fn serialize_answer_event() {
        let msg = ServerMessage::relayed(SignalKind::Answer, "a".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("answerMessage"));
    }

    #[test]
    fn serialize_error() {
        let msg = ServerMessage::Error("Invalid message".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"event":"error","message":"Invalid message"}"#);
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn relayed_event_round_trips_kind() {
        for kind in SignalKind::ALL {
            let msg = ServerMessage::relayed(kind, "p".to_string());
            let json = serde_json::to_string(&msg).unwrap();
            let back: ServerMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind(), Some(kind));
            assert_eq!(back.payload(), "p");
        }
    }
}
