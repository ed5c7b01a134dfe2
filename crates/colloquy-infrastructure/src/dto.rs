//! Data Transfer Objects (DTOs) for persistence.
//!
//! These DTOs represent the versioned schema for persisting the session
//! store. They are private to the infrastructure layer and handle the
//! evolution of the storage format over time.
//!
//! ## Schema Versioning (Semantic Versioning)
//!
//! - **MAJOR (X.0.0)**: Breaking changes (field removal, type changes)
//! - **MINOR (1.X.0)**: Backward-compatible additions (new optional fields)
//!
//! ### Store Version History
//! - **1.0.0**: Legacy schema. No `schema_version` field; turns carry a
//!   string role and encode attachments as a `[file: name]` sentinel on
//!   the last line of the turn text.
//! - **2.0.0**: Adds the `schema_version` field, typed roles, and a
//!   structured attachment descriptor per turn.

use serde::{Deserialize, Serialize};
use version_migrate::{FromDomain, IntoDomain, MigratesTo, Versioned};

use colloquy_core::session::{AttachmentInfo, Session, StoreSnapshot, Turn, TurnRole};

/// Current schema version for StoreV2.
pub const STORE_V2_VERSION: &str = "2.0.0";

// ============================================================================
// V1.0.0 (legacy) DTOs
// ============================================================================

/// Legacy turn record. The role is a free-form string and an attachment,
/// if any, lives inside the text as a trailing `[file: name]` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct TurnV1_0_0 {
    /// Author role ("user", "model"/"assistant", or "system").
    pub role: String,
    /// Turn text, possibly carrying the attachment sentinel.
    pub content: String,
    /// Timestamp when the turn was created (ISO 8601 format).
    pub timestamp: String,
    /// Provider label, when the writer recorded one.
    #[serde(default)]
    pub provider: Option<String>,
}

/// Legacy session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct SessionV1_0_0 {
    /// Unique session identifier.
    pub id: String,
    /// Human-readable session title.
    pub title: String,
    /// Timestamp when the session was created (ISO 8601 format).
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format).
    pub updated_at: String,
    /// Ordered transcript, under the legacy field name.
    #[serde(default)]
    pub messages: Vec<TurnV1_0_0>,
}

/// Legacy store root. Distinguished from V2 by the absence of a
/// `schema_version` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct StoreV1_0_0 {
    /// All persisted sessions.
    pub sessions: Vec<SessionV1_0_0>,
    /// Id of the session that was current at save time.
    #[serde(default)]
    pub current_session_id: Option<String>,
}

// ============================================================================
// V2.0.0 DTOs
// ============================================================================

/// Attachment descriptor. Size is 0 for records migrated from V1, where
/// the sentinel carried only the file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "2.0.0")]
pub struct AttachmentV2_0_0 {
    /// Original file name as presented by the user.
    pub name: String,
    /// File size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// Turn record with typed role and structured attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "2.0.0")]
pub struct TurnV2_0_0 {
    /// Author role.
    pub role: TurnRole,
    /// Turn text.
    pub content: String,
    /// Timestamp when the turn was created (ISO 8601 format).
    pub timestamp: String,
    /// Label of the provider/model that produced a model turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_label: Option<String>,
    /// Attachment descriptor, if the user attached a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentV2_0_0>,
}

/// Session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "2.0.0")]
pub struct SessionV2_0_0 {
    /// Unique session identifier.
    pub id: String,
    /// Human-readable session title.
    pub title: String,
    /// Timestamp when the session was created (ISO 8601 format).
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format).
    pub updated_at: String,
    /// Ordered transcript.
    #[serde(default)]
    pub turns: Vec<TurnV2_0_0>,
}

/// Store root, the unit of persistence. One file holds all sessions plus
/// the current-session pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "2.0.0")]
pub struct StoreV2_0_0 {
    /// The schema version of this data structure.
    pub schema_version: String,
    /// All persisted sessions.
    pub sessions: Vec<SessionV2_0_0>,
    /// Id of the session that was current at save time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_session_id: Option<String>,
}

// ============================================================================
// Migration implementations
// ============================================================================

/// Splits the legacy `[file: name]` sentinel off the last line of a turn
/// text. Returns the remaining text and the extracted file name, if any.
fn split_attachment_sentinel(content: &str) -> (String, Option<String>) {
    let Some((head, last)) = content.rsplit_once('\n').map(|(h, l)| (h, l.trim())) else {
        return match parse_sentinel(content.trim()) {
            Some(name) => (String::new(), Some(name)),
            None => (content.to_string(), None),
        };
    };
    match parse_sentinel(last) {
        Some(name) => (head.trim_end().to_string(), Some(name)),
        None => (content.to_string(), None),
    }
}

fn parse_sentinel(line: &str) -> Option<String> {
    let inner = line.strip_prefix("[file:")?.strip_suffix(']')?.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

fn parse_legacy_role(role: &str) -> TurnRole {
    match role {
        "user" => TurnRole::User,
        "system" => TurnRole::System,
        // "model", "assistant", and anything else a past writer used
        _ => TurnRole::Model,
    }
}

/// Migration from TurnV1_0_0 to TurnV2_0_0.
///
/// Changes:
/// - String role becomes a typed role
/// - The `[file: name]` sentinel is lifted out of the text into a
///   structured attachment (size unknown, recorded as 0)
impl MigratesTo<TurnV2_0_0> for TurnV1_0_0 {
    fn migrate(self) -> TurnV2_0_0 {
        let role = parse_legacy_role(&self.role);
        let (content, attachment_name) = if role == TurnRole::User {
            split_attachment_sentinel(&self.content)
        } else {
            (self.content, None)
        };
        TurnV2_0_0 {
            role,
            content,
            timestamp: self.timestamp,
            provider_label: self.provider,
            attachment: attachment_name.map(|name| AttachmentV2_0_0 { name, size: 0 }),
        }
    }
}

/// Migration from StoreV1_0_0 to StoreV2_0_0.
impl MigratesTo<StoreV2_0_0> for StoreV1_0_0 {
    fn migrate(self) -> StoreV2_0_0 {
        StoreV2_0_0 {
            schema_version: STORE_V2_VERSION.to_string(),
            sessions: self
                .sessions
                .into_iter()
                .map(|session| SessionV2_0_0 {
                    id: session.id,
                    title: session.title,
                    created_at: session.created_at,
                    updated_at: session.updated_at,
                    turns: session.messages.into_iter().map(MigratesTo::migrate).collect(),
                })
                .collect(),
            current_session_id: self.current_session_id,
        }
    }
}

// ============================================================================
// Domain model conversions
// ============================================================================

/// Convert StoreV2_0_0 DTO to the domain snapshot.
impl IntoDomain<StoreSnapshot> for StoreV2_0_0 {
    fn into_domain(self) -> StoreSnapshot {
        StoreSnapshot {
            sessions: self
                .sessions
                .into_iter()
                .map(|session| Session {
                    id: session.id,
                    title: session.title,
                    created_at: session.created_at,
                    updated_at: session.updated_at,
                    turns: session
                        .turns
                        .into_iter()
                        .map(|turn| Turn {
                            role: turn.role,
                            content: turn.content,
                            timestamp: turn.timestamp,
                            provider_label: turn.provider_label,
                            attachment: turn.attachment.map(|a| AttachmentInfo {
                                name: a.name,
                                size: a.size,
                            }),
                            correlation_id: None,
                        })
                        .collect(),
                })
                .collect(),
            current_session_id: self.current_session_id,
        }
    }
}

/// Convert the domain snapshot to StoreV2_0_0 for persistence.
///
/// Pending placeholders serialize like any resolved turn minus the
/// correlation id; the domain store drops them on reload.
impl FromDomain<StoreSnapshot> for StoreV2_0_0 {
    fn from_domain(snapshot: StoreSnapshot) -> Self {
        StoreV2_0_0 {
            schema_version: STORE_V2_VERSION.to_string(),
            sessions: snapshot
                .sessions
                .into_iter()
                .map(|session| SessionV2_0_0 {
                    id: session.id,
                    title: session.title,
                    created_at: session.created_at,
                    updated_at: session.updated_at,
                    turns: session
                        .turns
                        .into_iter()
                        .map(|turn| TurnV2_0_0 {
                            role: turn.role,
                            content: turn.content,
                            timestamp: turn.timestamp,
                            provider_label: turn.provider_label,
                            attachment: turn.attachment.map(|a| AttachmentV2_0_0 {
                                name: a.name,
                                size: a.size,
                            }),
                        })
                        .collect(),
                })
                .collect(),
            current_session_id: snapshot.current_session_id,
        }
    }
}
