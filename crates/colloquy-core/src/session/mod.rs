//! Session domain module.
//!
//! This module contains all session-related domain models, the in-memory
//! session store, and the persistence repository interface.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`)
//! - `turn`: Transcript entry types (`TurnRole`, `Turn`, `AttachmentInfo`)
//! - `store`: In-memory store (`SessionStore`, `StoreSnapshot`)
//! - `repository`: Repository trait for store persistence

mod model;
mod repository;
mod store;
mod turn;

// Re-export public API
pub use model::Session;
pub use repository::StoreRepository;
pub use store::{SessionStore, StoreSnapshot};
pub use turn::{AttachmentInfo, Turn, TurnRole};
