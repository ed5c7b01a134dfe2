//! Inbound events and outbound commands at the transport boundary.
//!
//! The engine is transport-agnostic: it consumes `InboundEvent` values
//! and produces the command types below, however they travel on the wire.

use colloquy_core::session::{AttachmentInfo, Turn};
use serde::{Deserialize, Serialize};

/// Events delivered by the transport and routed by correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// One incremental fragment of a streamed reply.
    Chunk {
        correlation_id: String,
        text_fragment: String,
        #[serde(default)]
        provider_label: Option<String>,
    },
    /// End of a streamed reply. `full_text` is authoritative; it replaces
    /// whatever the client accumulated from chunks.
    StreamEnd {
        correlation_id: String,
        full_text: String,
        #[serde(default)]
        provider_label: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Complete reply for a non-streamed request.
    DirectResponse {
        correlation_id: String,
        text: String,
        #[serde(default)]
        provider_label: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Server-side failure for a request.
    Error {
        #[serde(default)]
        correlation_id: Option<String>,
        message: String,
    },
}

/// Outbound conversational request over the persistent channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCommand {
    /// The user's current input.
    pub prompt: String,
    /// Prior resolved turns of the session, oldest first.
    pub history: Vec<Turn>,
    /// Token echoed back on every event for this request.
    pub correlation_id: String,
    /// Whether the reply should arrive as chunks.
    pub streaming: bool,
    /// Owning session, for server-side logging only.
    pub session_id: String,
}

/// Outbound request carrying an attachment, sent over the
/// request/acknowledge fallback path instead of the persistent channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCommand {
    /// The conversational request the attachment accompanies.
    pub send: SendCommand,
    /// Attachment descriptor (name and size).
    pub attachment: AttachmentInfo,
    /// Raw attachment bytes.
    pub payload: Vec<u8>,
}

/// Acknowledgment status of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Upload accepted; the reply arrives later as regular events.
    Processing,
    /// Upload rejected; no further events will arrive.
    Error,
}

/// Acknowledgment returned by the fallback path. Must echo the
/// correlation id of the command it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAck {
    pub status: AckStatus,
    pub correlation_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_event_tagging() {
        let json = r#"{"type":"chunk","correlation_id":"c1","text_fragment":"Hi "}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        match event {
            InboundEvent::Chunk {
                correlation_id,
                text_fragment,
                provider_label,
            } => {
                assert_eq!(correlation_id, "c1");
                assert_eq!(text_fragment, "Hi ");
                assert!(provider_label.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_error_event_without_correlation_id() {
        let json = r#"{"type":"error","message":"boom"}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        match event {
            InboundEvent::Error {
                correlation_id,
                message,
            } => {
                assert!(correlation_id.is_none());
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
