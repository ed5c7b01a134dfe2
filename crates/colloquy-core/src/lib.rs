//! Domain layer of the Colloquy conversation engine.
//!
//! This crate holds the pure data model: sessions, turns, the in-memory
//! session store, and the persistence repository trait. It performs no
//! I/O and knows nothing about transports or presentation.

pub mod error;
pub mod session;

// Re-export common error type
pub use error::{ColloquyError, Result};
