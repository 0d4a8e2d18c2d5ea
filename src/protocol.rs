//! Wire protocol spoken with the remote voice agent
//!
//! Outbound: one JSON metadata frame right after the channel opens, then raw
//! utterance text. Inbound: binary audio payloads, or JSON messages tagged by
//! `type` (`state` or `response`).

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationState;

/// A frame the client sends to the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Session metadata, sent once when the channel becomes ready
    Metadata {
        agent_id: String,
        language: String,
    },
    /// A recognized utterance, sent as raw text
    Utterance(String),
}

/// JSON control frames
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ControlFrame<'a> {
    Metadata { agent_id: &'a str, language: &'a str },
}

impl OutboundFrame {
    /// Render the frame as the text payload placed on the wire
    ///
    /// # Errors
    ///
    /// Returns error if the control frame cannot be serialized
    pub fn to_text(&self) -> serde_json::Result<String> {
        match self {
            Self::Metadata { agent_id, language } => {
                serde_json::to_string(&ControlFrame::Metadata { agent_id, language })
            }
            Self::Utterance(text) => Ok(text.clone()),
        }
    }
}

/// A frame received from the agent, already classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Opaque synthesized audio
    Audio(Vec<u8>),
    /// Structured message
    Message(AgentMessage),
}

/// Structured message from the agent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Call-state announcement
    State { call_state: String },
    /// Agent reply text
    Response { content: String },
    /// Any other `type`; ignored
    #[serde(other)]
    Unknown,
}

/// Parse a structured text frame
///
/// # Errors
///
/// Returns error if the text is not a JSON object with a known shape
pub fn parse_message(text: &str) -> serde_json::Result<AgentMessage> {
    serde_json::from_str(text)
}

/// Classify a text frame, dropping malformed or unrecognized messages
///
/// Malformed messages are logged and never treated as fatal.
#[must_use]
pub fn classify_text(text: &str) -> Option<InboundFrame> {
    match parse_message(text) {
        Ok(AgentMessage::Unknown) => {
            tracing::debug!("ignoring agent message with unrecognized type");
            None
        }
        Ok(message) => Some(InboundFrame::Message(message)),
        Err(e) => {
            tracing::warn!(error = %e, bytes = text.len(), "malformed agent message dropped");
            None
        }
    }
}

/// Call states announced by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Connecting,
    Connected,
    AgentGenerating,
    AgentSpeaking,
}

impl CallState {
    /// Map a wire symbol, returning `None` for anything unrecognized
    #[must_use]
    pub fn from_wire(symbol: &str) -> Option<Self> {
        match symbol {
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            "agent_generating" => Some(Self::AgentGenerating),
            "agent_speaking" => Some(Self::AgentSpeaking),
            _ => None,
        }
    }

    /// The conversation state this announcement moves the client to
    #[must_use]
    pub const fn conversation_state(self) -> ConversationState {
        match self {
            Self::Connecting => ConversationState::Connecting,
            Self::Connected => ConversationState::Listening,
            Self::AgentGenerating => ConversationState::Thinking,
            Self::AgentSpeaking => ConversationState::Speaking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_frame_shape() {
        let frame = OutboundFrame::Metadata {
            agent_id: "abc".to_string(),
            language: "en".to_string(),
        };
        assert_eq!(
            frame.to_text().unwrap(),
            r#"{"type":"metadata","data":{"agent_id":"abc","language":"en"}}"#
        );
    }

    #[test]
    fn utterance_is_not_json_wrapped() {
        let frame = OutboundFrame::Utterance("turn on the lights".to_string());
        assert_eq!(frame.to_text().unwrap(), "turn on the lights");
    }

    #[test]
    fn parses_state_and_response() {
        assert_eq!(
            parse_message(r#"{"type":"state","call_state":"agent_speaking"}"#).unwrap(),
            AgentMessage::State {
                call_state: "agent_speaking".to_string()
            }
        );
        assert_eq!(
            parse_message(r#"{"type":"response","content":"Hello there"}"#).unwrap(),
            AgentMessage::Response {
                content: "Hello there".to_string()
            }
        );
    }

    #[test]
    fn unknown_type_is_ignored_not_malformed() {
        assert_eq!(
            parse_message(r#"{"type":"ping","at":12}"#).unwrap(),
            AgentMessage::Unknown
        );
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(parse_message("not json").is_err());
        assert!(parse_message(r#"{"call_state":"connected"}"#).is_err());
        assert!(parse_message(r#"{"type":"state"}"#).is_err());
        assert!(parse_message(r#"{"type":"response","content":5}"#).is_err());
    }

    #[test]
    fn classify_drops_unknown_and_malformed() {
        assert_eq!(classify_text(r#"{"type":"ping"}"#), None);
        assert_eq!(classify_text("{oops"), None);
        assert_eq!(
            classify_text(r#"{"type":"response","content":"ok"}"#),
            Some(InboundFrame::Message(AgentMessage::Response {
                content: "ok".to_string()
            }))
        );
    }

    #[test]
    fn call_state_mapping() {
        let table = [
            ("connecting", ConversationState::Connecting),
            ("connected", ConversationState::Listening),
            ("agent_generating", ConversationState::Thinking),
            ("agent_speaking", ConversationState::Speaking),
        ];
        for (symbol, expected) in table {
            let state = CallState::from_wire(symbol).unwrap();
            assert_eq!(state.conversation_state(), expected, "{symbol}");
        }

        assert_eq!(CallState::from_wire("on_hold"), None);
        assert_eq!(CallState::from_wire("CONNECTED"), None);
    }
}
