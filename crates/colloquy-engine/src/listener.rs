//! Presentation adapter boundary.

use colloquy_core::session::Turn;

/// A "turn updated" notification emitted by the engine.
///
/// `pending` is true for live streaming updates (partial text, transcript
/// not yet mutated) and false once the turn has been finalized or errored.
#[derive(Debug, Clone)]
pub struct TurnUpdate {
    /// Session the turn belongs to.
    pub session_id: String,
    /// The turn as it should currently be displayed.
    pub turn: Turn,
    /// Whether the underlying request is still in flight.
    pub pending: bool,
}

/// Subscriber for engine-emitted turn updates.
///
/// The engine never touches presentation state directly; rendering is a
/// pure function of the notified turns.
pub trait TurnListener: Send + Sync {
    fn turn_updated(&self, update: TurnUpdate);
}

/// Listener that discards all notifications, for headless use and tests.
#[derive(Debug, Default)]
pub struct NullListener;

impl TurnListener for NullListener {
    fn turn_updated(&self, _update: TurnUpdate) {}
}
