//! In-memory session store.
//!
//! `SessionStore` owns the set of conversation sessions and the notion of
//! "current session". It performs pure data operations only; persistence
//! and event routing live behind it in other layers.

use super::model::Session;
use super::turn::{AttachmentInfo, Turn, TurnRole};
use serde::{Deserialize, Serialize};

/// Maximum number of characters of the seed text used for a session title.
const TITLE_MAX_CHARS: usize = 30;

/// Title used for sessions created without any seed text (attachment-only
/// sends).
const FALLBACK_TITLE: &str = "New conversation";

/// The durable shape of the store: the full ordered session list plus the
/// current-session pointer. Pending correlation ids are deliberately not
/// part of this shape; they never survive a reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// All sessions, newest first.
    pub sessions: Vec<Session>,
    /// Id of the session the user is currently looking at, if any.
    pub current_session_id: Option<String>,
}

/// Owns all conversation sessions and the current-session pointer.
///
/// Turn order within a session is strictly the order of
/// `append_user_turn`/`append_placeholder` calls; `finalize_turn` mutates
/// in place and never reorders. Only the reconciliation engine and the
/// store's own operations mutate turns.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<Session>,
    current_session_id: Option<String>,
    /// Last issued creation stamp, kept strictly increasing so session
    /// ids stay monotonic even when two sends land in the same millisecond.
    last_stamp: i64,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a persisted snapshot.
    ///
    /// Sessions are ordered newest first by their creation-derived ids;
    /// the id counter resumes past the largest loaded id. A current
    /// pointer referencing a session that no longer exists is dropped.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut sessions = snapshot.sessions;
        sessions.sort_by(|a, b| b.id.cmp(&a.id));

        let last_stamp = sessions
            .iter()
            .filter_map(|s| s.id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);

        let current_session_id = snapshot
            .current_session_id
            .filter(|id| sessions.iter().any(|s| &s.id == id));

        Self {
            sessions,
            current_session_id,
            last_stamp,
        }
    }

    /// Clones the store into its durable shape.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            sessions: self.sessions.clone(),
            current_session_id: self.current_session_id.clone(),
        }
    }

    /// Allocates a new session, inserts it at the head of the list, and
    /// marks it current.
    ///
    /// The title is derived from the first line of `seed_title`, truncated
    /// to 30 characters; a blank seed (attachment-only send) falls back to
    /// a generic title.
    pub fn create_session(&mut self, seed_title: &str) -> &Session {
        let now = chrono::Utc::now();
        let stamp = now.timestamp_millis().max(self.last_stamp + 1);
        self.last_stamp = stamp;

        let session = Session {
            id: stamp.to_string(),
            title: derive_title(seed_title),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
            turns: Vec::new(),
        };

        self.current_session_id = Some(session.id.clone());
        self.sessions.insert(0, session);
        &self.sessions[0]
    }

    /// Appends a `user` turn to the given session.
    ///
    /// A send with neither text nor attachment is a silent no-op and
    /// returns `None`, as does an unknown session id.
    pub fn append_user_turn(
        &mut self,
        session_id: &str,
        text: &str,
        attachment: Option<AttachmentInfo>,
    ) -> Option<&Turn> {
        if text.trim().is_empty() && attachment.is_none() {
            tracing::debug!(session_id, "ignoring empty send");
            return None;
        }

        let session = self.session_mut(session_id)?;
        let mut turn = Turn::new(TurnRole::User, text);
        turn.attachment = attachment;
        session.turns.push(turn);
        session.updated_at = chrono::Utc::now().to_rfc3339();
        session.turns.last()
    }

    /// Appends a `model` placeholder turn carrying the given correlation id.
    pub fn append_placeholder(&mut self, session_id: &str, correlation_id: &str) -> Option<&Turn> {
        let session = self.session_mut(session_id)?;
        session.turns.push(Turn::placeholder(correlation_id));
        session.updated_at = chrono::Utc::now().to_rfc3339();
        session.turns.last()
    }

    /// Resolves the unique placeholder carrying `correlation_id`: fills
    /// its content, attaches the provider label, and clears the
    /// correlation id.
    ///
    /// Idempotent: if no turn currently carries the id (already finalized,
    /// or lost to a reload) this is a no-op returning `None`. This is the
    /// primary duplicate-delivery guard.
    pub fn finalize_turn(
        &mut self,
        correlation_id: &str,
        final_text: &str,
        provider_label: Option<&str>,
    ) -> Option<(String, Turn)> {
        let (session_id, turn) = self.pending_turn_mut(correlation_id)?;
        turn.content = final_text.to_string();
        turn.provider_label = provider_label.map(str::to_string);
        turn.correlation_id = None;
        let resolved = turn.clone();
        self.touch(&session_id);
        Some((session_id, resolved))
    }

    /// Resolves the placeholder carrying `correlation_id` as failed.
    ///
    /// Policy: the placeholder is rewritten in place into a `system` turn
    /// whose content is the error message. This keeps one transcript entry
    /// per send and gives the user a visible system-style notice instead
    /// of a dangling empty model turn. Idempotent like `finalize_turn`.
    pub fn fail_turn(&mut self, correlation_id: &str, message: &str) -> Option<(String, Turn)> {
        let (session_id, turn) = self.pending_turn_mut(correlation_id)?;
        turn.role = TurnRole::System;
        turn.content = message.to_string();
        turn.provider_label = None;
        turn.correlation_id = None;
        let resolved = turn.clone();
        self.touch(&session_id);
        Some((session_id, resolved))
    }

    /// Removes a session. Clears the current pointer if it referenced the
    /// deleted session.
    pub fn delete_session(&mut self, session_id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != session_id);
        let removed = self.sessions.len() != before;

        if removed && self.current_session_id.as_deref() == Some(session_id) {
            self.current_session_id = None;
        }
        removed
    }

    /// Marks a session current. Unknown ids are ignored.
    pub fn set_current(&mut self, session_id: &str) {
        if self.sessions.iter().any(|s| s.id == session_id) {
            self.current_session_id = Some(session_id.to_string());
        }
    }

    /// Id of the current session, if any.
    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    /// The current session, if any.
    pub fn current_session(&self) -> Option<&Session> {
        let id = self.current_session_id.as_deref()?;
        self.session(id)
    }

    /// Looks up a session by id.
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// All sessions, newest first.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    fn session_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    fn touch(&mut self, session_id: &str) {
        if let Some(session) = self.session_mut(session_id) {
            session.updated_at = chrono::Utc::now().to_rfc3339();
        }
    }

    /// Finds the unique pending turn carrying `correlation_id` across all
    /// sessions, returning its owning session id.
    fn pending_turn_mut(&mut self, correlation_id: &str) -> Option<(String, &mut Turn)> {
        for session in &mut self.sessions {
            let id = session.id.clone();
            if let Some(turn) = session
                .turns
                .iter_mut()
                .find(|t| t.correlation_id.as_deref() == Some(correlation_id))
            {
                return Some((id, turn));
            }
        }
        None
    }
}

/// Derives a display title from the seed text of a session's first send.
fn derive_title(seed: &str) -> String {
    let first_line = seed.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    first_line.chars().take(TITLE_MAX_CHARS).collect()
}
