//! Request correlation bookkeeping.
//!
//! The correlator mints one collision-resistant id per outbound
//! conversational request and tracks the request's lifecycle until a
//! terminal state is reached. Entries are ephemeral: they are never
//! persisted, so a reload treats every in-flight request as lost.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How an outbound request expects its reply to arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Single `direct_response` event.
    Direct,
    /// A sequence of `chunk` events closed by `stream_end`.
    Streamed,
    /// Attachment sent over the request/acknowledge fallback path.
    Uploaded,
}

/// Lifecycle state of a pending request.
///
/// `Created -> Streaming -> Finalized | Errored`; a direct request may
/// jump from `Created` straight to `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Dispatched, no network confirmation yet.
    Created,
    /// At least one chunk received.
    Streaming,
    /// Terminal: resolved successfully.
    Finalized,
    /// Terminal: resolved as failed.
    Errored,
}

impl RequestState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Errored)
    }
}

/// One in-flight request. Ephemeral; destroyed on reaching a terminal
/// state.
#[derive(Debug)]
pub struct PendingRequest {
    /// Correlation id, unique across the client for the request lifetime.
    pub correlation_id: String,
    /// Session the placeholder turn lives in.
    pub session_id: String,
    /// Reply delivery mode.
    pub kind: RequestKind,
    /// Text accumulated from chunk events. Display-only; the final
    /// transcript uses the authoritative full text from the end event.
    pub buffer: String,
    /// Current lifecycle state.
    pub state: RequestState,
    /// When the request was dispatched, for the staleness sweep.
    pub created_at: Instant,
}

impl PendingRequest {
    /// Applies a chunk: appends to the buffer and moves to `Streaming`.
    ///
    /// Returns `false` without mutating when the request is already
    /// terminal — this covers a chunk reordered past its `stream_end`.
    pub fn absorb_chunk(&mut self, fragment: &str) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.buffer.push_str(fragment);
        self.state = RequestState::Streaming;
        true
    }

    /// Transitions to `Finalized`. Returns `false` if already terminal
    /// (duplicate delivery).
    pub fn finish(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = RequestState::Finalized;
        true
    }

    /// Transitions to `Errored`. Returns `false` if already terminal.
    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = RequestState::Errored;
        true
    }
}

/// Maps correlation ids to their in-flight requests.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: HashMap<String, PendingRequest>,
}

impl RequestCorrelator {
    /// Creates an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh correlation id (UUID v4: a 128-bit random token) and
    /// registers a `Created` request for it.
    pub fn begin(&mut self, session_id: &str, kind: RequestKind) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        self.pending.insert(
            correlation_id.clone(),
            PendingRequest {
                correlation_id: correlation_id.clone(),
                session_id: session_id.to_string(),
                kind,
                buffer: String::new(),
                state: RequestState::Created,
                created_at: Instant::now(),
            },
        );
        correlation_id
    }

    /// O(1) lookup used by the reconciliation engine.
    pub fn resolve(&self, correlation_id: &str) -> Option<&PendingRequest> {
        self.pending.get(correlation_id)
    }

    /// Mutable lookup for applying transitions.
    pub fn resolve_mut(&mut self, correlation_id: &str) -> Option<&mut PendingRequest> {
        self.pending.get_mut(correlation_id)
    }

    /// Removes the bookkeeping entry once a terminal state is reached.
    /// Does not affect persisted turns.
    pub fn end(&mut self, correlation_id: &str) -> Option<PendingRequest> {
        self.pending.remove(correlation_id)
    }

    /// Ids of non-terminal requests older than `max_age`, for the
    /// timeout sweep.
    pub fn stale_ids(&self, max_age: Duration) -> Vec<String> {
        self.pending
            .values()
            .filter(|p| !p.state.is_terminal() && p.created_at.elapsed() >= max_age)
            .map(|p| p.correlation_id.clone())
            .collect()
    }

    /// Number of tracked in-flight requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
