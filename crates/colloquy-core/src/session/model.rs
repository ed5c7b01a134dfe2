//! Session domain model.
//!
//! This module contains the core Session entity that represents one
//! conversation in the dashboard's domain layer.

use super::turn::Turn;
use serde::{Deserialize, Serialize};

/// Represents one conversation session in the domain layer.
///
/// A session contains:
/// - A creation-time-derived id (unique, monotonic for ordering)
/// - A display title derived from the first send
/// - The ordered transcript of turns (append-mostly)
/// - Timestamps for creation and last update
///
/// This is the "pure" domain model that the engine operates on,
/// independent of any specific storage format or version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (millisecond-timestamp derived).
    pub id: String,
    /// Human-readable session title.
    pub title: String,
    /// Timestamp when the session was created (ISO 8601 format).
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format).
    pub updated_at: String,
    /// Ordered transcript; turn order is send order, never arrival order.
    pub turns: Vec<Turn>,
}

impl Session {
    /// Returns the turn carrying the given correlation id, if any.
    pub fn pending_turn(&self, correlation_id: &str) -> Option<&Turn> {
        self.turns
            .iter()
            .find(|t| t.correlation_id.as_deref() == Some(correlation_id))
    }
}
