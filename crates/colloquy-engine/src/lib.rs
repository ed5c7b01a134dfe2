//! Conversation lifecycle and reconciliation engine.
//!
//! This crate owns everything between the user's send action and the
//! finalized transcript: correlation-id bookkeeping, the pending-request
//! state machine, and the exactly-once reconciliation of inbound events
//! into session turns. Transports and presentation layers plug in at the
//! [`TransportAdapter`] and [`TurnListener`] seams.

pub mod correlator;
pub mod engine;
pub mod event;
pub mod listener;
pub mod transport;

pub use correlator::{PendingRequest, RequestCorrelator, RequestKind, RequestState};
pub use engine::{ConversationEngine, EngineConfig};
pub use event::{AckStatus, InboundEvent, SendCommand, UploadAck, UploadCommand};
pub use listener::{NullListener, TurnListener, TurnUpdate};
pub use transport::TransportAdapter;
