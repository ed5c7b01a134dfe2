//! Store repository trait.
//!
//! Defines the interface for persisting the session store.

use super::store::StoreSnapshot;
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for the durable copy of the session store.
///
/// This trait decouples the engine from the storage mechanism (TOML
/// files, browser storage, a database). Persistence is best-effort from
/// the engine's point of view: callers catch and log `save` failures
/// rather than letting them interrupt conversational flow, and
/// implementations of `load` are expected to fall back to an empty
/// snapshot on parse failure or schema mismatch rather than error.
///
/// # Implementation Notes
///
/// Implementations should handle:
/// - Schema versioning and migration of older payloads
/// - Returning an empty snapshot for a missing or unreadable store
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Writes the full snapshot (sessions + current-session pointer).
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;

    /// Reads the snapshot back.
    ///
    /// Returns an empty snapshot when nothing has been saved yet or when
    /// the stored payload cannot be understood.
    async fn load(&self) -> Result<StoreSnapshot>;
}
