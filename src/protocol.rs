//! Signaling payloads exchanged between peers through the relay.
//!
//! Every payload is a JSON object with exactly one of the keys `sdp`,
//! `answer`, `candidate` or `final`. The relay itself never needs to look
//! inside them; peers decode them with [`Signal::decode_as`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value carried by the `final` acknowledgment
pub const FINAL_MARKER: &str = "done";

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected {expected} payload, got {actual}")]
    WrongKind {
        expected: SignalKind,
        actual: SignalKind,
    },

    #[error("{slot} payload carries a description of type {actual}")]
    UnexpectedSdpType { slot: SignalKind, actual: SdpType },
}

/// The four payload kinds, one per relay operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Sdp,
    Answer,
    Candidate,
    Final,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Sdp,
        SignalKind::Answer,
        SignalKind::Candidate,
        SignalKind::Final,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Sdp => "sdp",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
            SignalKind::Final => "final",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => f.write_str("offer"),
            SdpType::Answer => f.write_str("answer"),
        }
    }
}

/// Session description as produced by the WebRTC stack.
///
/// The `sdp` body is opaque here; only `type` is inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser's `RTCIceCandidateInit` JSON shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// A decoded signaling payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Offer; travels over the generic SDP channel
    Sdp(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
    /// Terminal handshake acknowledgment
    Final(String),
}

impl Signal {
    pub fn final_ack() -> Self {
        Signal::Final(FINAL_MARKER.to_string())
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Sdp(_) => SignalKind::Sdp,
            Signal::Answer(_) => SignalKind::Answer,
            Signal::Candidate(_) => SignalKind::Candidate,
            Signal::Final(_) => SignalKind::Final,
        }
    }

    /// Decode a payload, rejecting any shape other than a single known key
    pub fn decode(text: &str) -> Result<Self, SignalError> {
        let signal: Signal = serde_json::from_str(text)?;
        signal.validate()?;
        Ok(signal)
    }

    /// Decode a payload that arrived on the channel for `expected`
    pub fn decode_as(expected: SignalKind, text: &str) -> Result<Self, SignalError> {
        let signal = Self::decode(text)?;
        if signal.kind() != expected {
            return Err(SignalError::WrongKind {
                expected,
                actual: signal.kind(),
            });
        }
        Ok(signal)
    }

    pub fn encode(&self) -> Result<String, SignalError> {
        Ok(serde_json::to_string(self)?)
    }

    fn validate(&self) -> Result<(), SignalError> {
        match self {
            Signal::Sdp(desc) if desc.kind != SdpType::Offer => {
                Err(SignalError::UnexpectedSdpType {
                    slot: SignalKind::Sdp,
                    actual: desc.kind,
                })
            }
            Signal::Answer(desc) if desc.kind != SdpType::Answer => {
                Err(SignalError::UnexpectedSdpType {
                    slot: SignalKind::Answer,
                    actual: desc.kind,
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_offer_uses_sdp_key() {
        let signal = Signal::Sdp(SessionDescription::offer("v=0"));
        let json = signal.encode().unwrap();
        assert_eq!(json, r#"{"sdp":{"type":"offer","sdp":"v=0"}}"#);
    }

    #[test]
    fn encode_final_ack() {
        let json = Signal::final_ack().encode().unwrap();
        assert_eq!(json, r#"{"final":"done"}"#);
    }

    #[test]
    fn decode_browser_candidate() {
        let json = r#"{"candidate":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        let signal = Signal::decode(json).unwrap();
        if let Signal::Candidate(c) = signal {
            assert!(c.candidate.starts_with("candidate:1"));
            assert_eq!(c.sdp_mid.as_deref(), Some("0"));
            assert_eq!(c.sdp_m_line_index, Some(0));
            assert_eq!(c.username_fragment, None);
        } else {
            panic!("Expected Candidate");
        }
    }

    #[test]
    fn decode_candidate_with_null_fields() {
        let json = r#"{"candidate":{"candidate":"c","sdpMid":null,"sdpMLineIndex":null}}"#;
        assert!(matches!(Signal::decode(json), Ok(Signal::Candidate(_))));
    }

    #[test]
    fn decode_rejects_missing_candidate_field() {
        let json = r#"{"candidate":{"sdpMid":"0"}}"#;
        assert!(matches!(
            Signal::decode(json),
            Err(SignalError::Malformed(_))
        ));
    }

    #[test]
    fn decode_rejects_non_object_candidate() {
        assert!(Signal::decode(r#"{"candidate":42}"#).is_err());
    }

    #[test]
    fn decode_rejects_unknown_key() {
        assert!(Signal::decode(r#"{"hello":"world"}"#).is_err());
    }

    #[test]
    fn decode_rejects_two_keys() {
        let json = r#"{"final":"done","answer":{"type":"answer","sdp":"x"}}"#;
        assert!(Signal::decode(json).is_err());
    }

    #[test]
    fn decode_rejects_answer_in_sdp_slot() {
        let json = r#"{"sdp":{"type":"answer","sdp":"x"}}"#;
        assert!(matches!(
            Signal::decode(json),
            Err(SignalError::UnexpectedSdpType {
                slot: SignalKind::Sdp,
                actual: SdpType::Answer
            })
        ));
    }

    #[test]
    fn decode_as_checks_channel() {
        let json = r#"{"final":"done"}"#;
        assert!(Signal::decode_as(SignalKind::Final, json).is_ok());
        assert!(matches!(
            Signal::decode_as(SignalKind::Answer, json),
            Err(SignalError::WrongKind {
                expected: SignalKind::Answer,
                actual: SignalKind::Final
            })
        ));
    }

    #[test]
    fn kind_names() {
        let names: Vec<&str> = SignalKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["sdp", "answer", "candidate", "final"]);
    }
}
