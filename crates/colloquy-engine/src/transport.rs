//! Transport adapter boundary.

use crate::event::{SendCommand, UploadAck, UploadCommand};
use async_trait::async_trait;
use colloquy_core::Result;

/// The external boundary that carries commands to the remote AI service.
///
/// Implementations own reconnection and delivery; the engine only sees
/// typed commands going out and `InboundEvent`s coming back through
/// `ConversationEngine::handle_event`. A returned error means the command
/// could not be handed to the network at all, and the engine converts it
/// into a synthetic error transition for the affected request.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Dispatches a conversational request over the persistent channel.
    async fn send(&self, command: SendCommand) -> Result<()>;

    /// Dispatches an attachment over the request/acknowledge fallback
    /// path. The acknowledgment echoes the correlation id; a
    /// `processing` status means later events will resolve the request.
    async fn upload(&self, command: UploadCommand) -> Result<UploadAck>;
}
