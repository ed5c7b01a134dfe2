//! Conversation turn types.
//!
//! This module contains types for representing entries in a session's
//! transcript, including roles and attachment descriptors.

use serde::{Deserialize, Serialize};

/// Represents the role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Turn authored by the user.
    User,
    /// Turn authored by the AI model.
    Model,
    /// System-generated turn (error notices, status messages).
    System,
}

/// Descriptor for a file attached to a turn.
///
/// Attachments are structured data, not markers embedded in the turn
/// text; the content field never encodes attachment information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// Original file name as presented by the user.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
}

/// A single turn in a session's ordered transcript.
///
/// A `model` turn starts life as a placeholder: empty content plus a
/// correlation id tying it to an in-flight request. Finalization fills
/// the content exactly once and clears the correlation id. The
/// correlation id is never serialized, so a reloaded store carries no
/// unresolved placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The role of the turn author.
    pub role: TurnRole,
    /// The turn text (empty while a placeholder is pending).
    pub content: String,
    /// Timestamp when the turn was created (ISO 8601 format).
    pub timestamp: String,
    /// Label of the provider/model that produced a model turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_label: Option<String>,
    /// Attachment descriptor, if the user attached a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentInfo>,
    /// Correlation id of the pending request this placeholder awaits.
    /// In-memory only; restarts treat in-flight requests as lost.
    #[serde(skip)]
    pub correlation_id: Option<String>,
}

impl Turn {
    /// Creates a resolved turn with the given role and content.
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            provider_label: None,
            attachment: None,
            correlation_id: None,
        }
    }

    /// Creates a pending model placeholder tied to a correlation id.
    pub fn placeholder(correlation_id: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            content: String::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            provider_label: None,
            attachment: None,
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// Whether this turn is an unresolved placeholder.
    pub fn is_pending(&self) -> bool {
        self.correlation_id.is_some()
    }
}
