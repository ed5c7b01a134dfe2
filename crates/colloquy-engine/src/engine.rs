//! The reconciliation engine.
//!
//! `ConversationEngine` owns a pending request's lifecycle from creation
//! through streaming to finalization or failure, and performs the
//! exactly-once mutation of the session history. Events for different
//! correlation ids are independent; events for the same id may arrive
//! reordered or duplicated, and every handler below is safe under both.

use std::sync::Arc;
use std::time::Duration;

use colloquy_core::Result;
use colloquy_core::session::{AttachmentInfo, Session, SessionStore, StoreRepository, StoreSnapshot, Turn, TurnRole};
use tokio::sync::{Mutex, RwLock};

use crate::correlator::{RequestCorrelator, RequestKind};
use crate::event::{AckStatus, InboundEvent, SendCommand, UploadCommand};
use crate::listener::{TurnListener, TurnUpdate};
use crate::transport::TransportAdapter;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Age past which a non-terminal pending request is failed by
    /// `expire_stale`. The original system never expired stuck
    /// placeholders; the default here is deliberately generous.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Conversation lifecycle and reconciliation engine.
///
/// Composition root: the store, correlator, transport, repository, and
/// listener are injected once at construction; nothing else is permitted
/// to mutate turns. Lock order is correlator before store; each public
/// operation completes its mutations before awaiting I/O, so state
/// transitions are atomic with respect to each other.
pub struct ConversationEngine {
    store: Arc<RwLock<SessionStore>>,
    correlator: Mutex<RequestCorrelator>,
    transport: Arc<dyn TransportAdapter>,
    repository: Arc<dyn StoreRepository>,
    listener: Arc<dyn TurnListener>,
    config: EngineConfig,
}

impl ConversationEngine {
    /// Creates an engine over an empty store.
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        repository: Arc<dyn StoreRepository>,
        listener: Arc<dyn TurnListener>,
    ) -> Self {
        Self::with_config(transport, repository, listener, EngineConfig::default())
    }

    /// Creates an engine with explicit tuning.
    pub fn with_config(
        transport: Arc<dyn TransportAdapter>,
        repository: Arc<dyn StoreRepository>,
        listener: Arc<dyn TurnListener>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(SessionStore::new())),
            correlator: Mutex::new(RequestCorrelator::new()),
            transport,
            repository,
            listener,
            config,
        }
    }

    /// Replaces the in-memory store with the persisted snapshot.
    ///
    /// An unreadable store yields an empty one; a reload never crashes
    /// the dashboard, it presents empty state. Placeholders are gone by
    /// construction (correlation ids are not persisted), so in-flight
    /// requests from before the reload are lost.
    pub async fn restore(&self) {
        let snapshot = match self.repository.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("failed to load session store, starting empty: {e}");
                StoreSnapshot::default()
            }
        };
        *self.store.write().await = SessionStore::from_snapshot(snapshot);
    }

    // ========================================================================
    // Outbound paths
    // ========================================================================

    /// Dispatches a user prompt over the persistent channel.
    ///
    /// Creates a session lazily when none is current, appends the user
    /// turn and a model placeholder, and hands the command to the
    /// transport. Returns the correlation id, or `None` for an empty send
    /// (no text, no attachment), which is a silent no-op.
    pub async fn send_prompt(
        &self,
        text: &str,
        attachment: Option<AttachmentInfo>,
        streaming: bool,
    ) -> Result<Option<String>> {
        let kind = if streaming {
            RequestKind::Streamed
        } else {
            RequestKind::Direct
        };
        let Some((command, _)) = self.stage_request(text, attachment, streaming, kind).await? else {
            return Ok(None);
        };
        let correlation_id = command.correlation_id.clone();

        if let Err(e) = self.transport.send(command).await {
            tracing::warn!(correlation_id, "transport rejected send: {e}");
            self.on_error(Some(&correlation_id), &format!("Failed to reach the AI service: {e}"))
                .await;
        }
        Ok(Some(correlation_id))
    }

    /// Dispatches a prompt plus attachment over the request/acknowledge
    /// fallback path.
    ///
    /// A `processing` acknowledgment is a no-op (the reply arrives later
    /// as regular events); an `error` acknowledgment resolves the
    /// placeholder immediately through the error transition.
    pub async fn send_upload(
        &self,
        text: &str,
        attachment: AttachmentInfo,
        payload: Vec<u8>,
        streaming: bool,
    ) -> Result<Option<String>> {
        let Some((send, _)) = self
            .stage_request(text, Some(attachment.clone()), streaming, RequestKind::Uploaded)
            .await?
        else {
            return Ok(None);
        };
        let correlation_id = send.correlation_id.clone();
        let command = UploadCommand {
            send,
            attachment,
            payload,
        };

        match self.transport.upload(command).await {
            Ok(ack) => {
                if ack.correlation_id != correlation_id {
                    tracing::warn!(
                        expected = correlation_id,
                        echoed = ack.correlation_id,
                        "upload acknowledgment echoed a different correlation id"
                    );
                }
                match ack.status {
                    AckStatus::Processing => {}
                    AckStatus::Error => {
                        let message = ack
                            .message
                            .unwrap_or_else(|| "Upload rejected by the server".to_string());
                        self.on_error(Some(&correlation_id), &message).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(correlation_id, "transport rejected upload: {e}");
                self.on_error(Some(&correlation_id), &format!("Upload failed: {e}"))
                    .await;
            }
        }
        Ok(Some(correlation_id))
    }

    /// Shared first half of both outbound paths: session/turn staging and
    /// correlation-id minting. Returns `None` for an empty send.
    async fn stage_request(
        &self,
        text: &str,
        attachment: Option<AttachmentInfo>,
        streaming: bool,
        kind: RequestKind,
    ) -> Result<Option<(SendCommand, String)>> {
        if text.trim().is_empty() && attachment.is_none() {
            tracing::debug!("ignoring send with neither text nor attachment");
            return Ok(None);
        }

        let mut correlator = self.correlator.lock().await;
        let mut store = self.store.write().await;

        let session_id = match store.current_session_id() {
            Some(id) => id.to_string(),
            None => store.create_session(text).id.clone(),
        };

        // History is the resolved conversation so far, captured before the
        // new turns are appended; pending placeholders and system notices
        // are not part of what the model sees.
        let history: Vec<Turn> = store
            .session(&session_id)
            .map(|s| {
                s.turns
                    .iter()
                    .filter(|t| !t.is_pending() && t.role != TurnRole::System)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        store.append_user_turn(&session_id, text, attachment);
        let correlation_id = correlator.begin(&session_id, kind);
        store.append_placeholder(&session_id, &correlation_id);
        let snapshot = store.snapshot();
        drop(store);
        drop(correlator);

        // Persist eagerly so a reload cannot lose the user turn.
        self.persist(&snapshot).await;

        let command = SendCommand {
            prompt: text.to_string(),
            history,
            correlation_id: correlation_id.clone(),
            streaming,
            session_id: session_id.clone(),
        };
        Ok(Some((command, session_id)))
    }

    // ========================================================================
    // Inbound dispatch
    // ========================================================================

    /// Single dispatch table for all inbound events.
    pub async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Chunk {
                correlation_id,
                text_fragment,
                provider_label,
            } => {
                self.on_chunk(&correlation_id, &text_fragment, provider_label.as_deref())
                    .await
            }
            InboundEvent::StreamEnd {
                correlation_id,
                full_text,
                provider_label,
                ..
            } => {
                self.on_end(&correlation_id, &full_text, provider_label.as_deref())
                    .await
            }
            InboundEvent::DirectResponse {
                correlation_id,
                text,
                provider_label,
                ..
            } => {
                self.on_direct_response(&correlation_id, &text, provider_label.as_deref())
                    .await
            }
            InboundEvent::Error {
                correlation_id,
                message,
            } => self.on_error(correlation_id.as_deref(), &message).await,
        }
    }

    /// Applies one streamed fragment.
    ///
    /// Valid from `Created` or `Streaming`; ignored (logged, not fatal)
    /// after a terminal state or for an unknown correlation id. Notifies
    /// the listener with the accumulated partial text; the transcript
    /// itself is untouched until finalization.
    pub async fn on_chunk(&self, correlation_id: &str, fragment: &str, provider_label: Option<&str>) {
        let mut correlator = self.correlator.lock().await;
        let Some(pending) = correlator.resolve_mut(correlation_id) else {
            tracing::warn!(correlation_id, "dropping chunk for unknown correlation id");
            return;
        };
        if !pending.absorb_chunk(fragment) {
            tracing::debug!(correlation_id, "chunk after terminal state ignored");
            return;
        }
        let session_id = pending.session_id.clone();
        let partial = pending.buffer.clone();
        drop(correlator);

        let store = self.store.read().await;
        let Some(placeholder) = store
            .session(&session_id)
            .and_then(|s| s.pending_turn(correlation_id))
        else {
            return;
        };
        let mut turn = placeholder.clone();
        drop(store);
        turn.content = partial;
        turn.provider_label = provider_label.map(str::to_string);
        self.listener.turn_updated(TurnUpdate {
            session_id,
            turn,
            pending: true,
        });
    }

    /// Closes a streamed reply with its authoritative full text.
    ///
    /// Valid from any non-terminal state, including `Created` (an `end`
    /// arriving before any chunk, or streaming collapsed into one event).
    /// Duplicate delivery is a no-op via `finalize_turn`'s idempotence.
    pub async fn on_end(&self, correlation_id: &str, full_text: &str, provider_label: Option<&str>) {
        self.finish_request(correlation_id, full_text, provider_label)
            .await
    }

    /// Resolves a non-streamed request; identical guarantees to `on_end`.
    pub async fn on_direct_response(
        &self,
        correlation_id: &str,
        text: &str,
        provider_label: Option<&str>,
    ) {
        self.finish_request(correlation_id, text, provider_label).await
    }

    async fn finish_request(&self, correlation_id: &str, full_text: &str, provider_label: Option<&str>) {
        let mut correlator = self.correlator.lock().await;
        let Some(pending) = correlator.resolve_mut(correlation_id) else {
            tracing::warn!(correlation_id, "dropping completion for unknown correlation id");
            return;
        };
        if !pending.finish() {
            tracing::debug!(correlation_id, "duplicate completion ignored");
            return;
        }
        if !pending.buffer.is_empty() && pending.buffer != full_text {
            // The end event is authoritative; drift is expected when the
            // transport retries or collapses chunks.
            tracing::debug!(correlation_id, "accumulated buffer differs from final text");
        }
        correlator.end(correlation_id);

        let mut store = self.store.write().await;
        let resolved = store.finalize_turn(correlation_id, full_text, provider_label);
        let snapshot = store.snapshot();
        drop(store);
        drop(correlator);

        self.persist(&snapshot).await;
        if let Some((session_id, turn)) = resolved {
            self.listener.turn_updated(TurnUpdate {
                session_id,
                turn,
                pending: false,
            });
        }
    }

    /// Fails a pending request.
    ///
    /// The placeholder is rewritten into a system-style notice carrying
    /// the message. Events without a correlation id, or referencing one
    /// the correlator does not know, are logged and dropped — after a
    /// reload the bookkeeping is gone and crashing would be strictly
    /// worse for a long-lived dashboard.
    pub async fn on_error(&self, correlation_id: Option<&str>, message: &str) {
        let Some(correlation_id) = correlation_id else {
            tracing::warn!("dropping error event without correlation id: {message}");
            return;
        };

        let mut correlator = self.correlator.lock().await;
        let Some(pending) = correlator.resolve_mut(correlation_id) else {
            tracing::warn!(correlation_id, "dropping error for unknown correlation id");
            return;
        };
        if !pending.fail() {
            tracing::debug!(correlation_id, "error after terminal state ignored");
            return;
        }
        correlator.end(correlation_id);

        let mut store = self.store.write().await;
        let resolved = store.fail_turn(correlation_id, message);
        let snapshot = store.snapshot();
        drop(store);
        drop(correlator);

        self.persist(&snapshot).await;
        if let Some((session_id, turn)) = resolved {
            self.listener.turn_updated(TurnUpdate {
                session_id,
                turn,
                pending: false,
            });
        }
    }

    /// Fails every non-terminal request older than the configured
    /// timeout. The host event loop schedules this sweep; the engine
    /// spawns no timers of its own. Returns the number of expired
    /// requests.
    pub async fn expire_stale(&self) -> usize {
        let stale = {
            let correlator = self.correlator.lock().await;
            correlator.stale_ids(self.config.request_timeout)
        };
        for correlation_id in &stale {
            tracing::warn!(correlation_id, "expiring stale pending request");
            self.on_error(Some(correlation_id), "The request timed out.").await;
        }
        stale.len()
    }

    // ========================================================================
    // Store operations surfaced to the host
    // ========================================================================

    /// Removes a session; clears the current pointer if it was current.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let mut store = self.store.write().await;
        let removed = store.delete_session(session_id);
        let snapshot = store.snapshot();
        drop(store);

        if removed {
            self.persist(&snapshot).await;
        }
        removed
    }

    /// Marks a session current.
    pub async fn select_session(&self, session_id: &str) {
        let mut store = self.store.write().await;
        store.set_current(session_id);
        let snapshot = store.snapshot();
        drop(store);
        self.persist(&snapshot).await;
    }

    /// All sessions, newest first.
    pub async fn sessions(&self) -> Vec<Session> {
        self.store.read().await.sessions().to_vec()
    }

    /// The current session, if any.
    pub async fn current_session(&self) -> Option<Session> {
        self.store.read().await.current_session().cloned()
    }

    /// Number of requests still in flight.
    pub async fn in_flight(&self) -> usize {
        self.correlator.lock().await.len()
    }

    /// Best-effort save: failures are logged and never surface into
    /// conversational flow.
    async fn persist(&self, snapshot: &StoreSnapshot) {
        if let Err(e) = self.repository.save(snapshot).await {
            tracing::warn!("failed to persist session store: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::UploadAck;
    use async_trait::async_trait;
    use colloquy_core::ColloquyError;
    use std::sync::Mutex as StdMutex;

    /// What the mock transport should do with an upload.
    enum UploadBehavior {
        Processing,
        Reject(String),
        Unreachable,
    }

    struct MockTransport {
        sent: StdMutex<Vec<SendCommand>>,
        upload_behavior: StdMutex<UploadBehavior>,
        fail_sends: StdMutex<bool>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
                upload_behavior: StdMutex::new(UploadBehavior::Processing),
                fail_sends: StdMutex::new(false),
            }
        }
    }

    #[async_trait]
    impl TransportAdapter for MockTransport {
        async fn send(&self, command: SendCommand) -> colloquy_core::Result<()> {
            if *self.fail_sends.lock().unwrap() {
                return Err(ColloquyError::transport("channel down"));
            }
            self.sent.lock().unwrap().push(command);
            Ok(())
        }

        async fn upload(&self, command: UploadCommand) -> colloquy_core::Result<UploadAck> {
            match &*self.upload_behavior.lock().unwrap() {
                UploadBehavior::Processing => Ok(UploadAck {
                    status: AckStatus::Processing,
                    correlation_id: command.send.correlation_id,
                    message: None,
                }),
                UploadBehavior::Reject(msg) => Ok(UploadAck {
                    status: AckStatus::Error,
                    correlation_id: command.send.correlation_id,
                    message: Some(msg.clone()),
                }),
                UploadBehavior::Unreachable => Err(ColloquyError::transport("upload endpoint down")),
            }
        }
    }

    struct MemoryRepository {
        snapshot: StdMutex<Option<StoreSnapshot>>,
        fail_saves: bool,
    }

    impl MemoryRepository {
        fn new() -> Self {
            Self {
                snapshot: StdMutex::new(None),
                fail_saves: false,
            }
        }

        fn failing() -> Self {
            Self {
                snapshot: StdMutex::new(None),
                fail_saves: true,
            }
        }
    }

    #[async_trait]
    impl StoreRepository for MemoryRepository {
        async fn save(&self, snapshot: &StoreSnapshot) -> colloquy_core::Result<()> {
            if self.fail_saves {
                return Err(ColloquyError::io("disk full"));
            }
            *self.snapshot.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }

        async fn load(&self) -> colloquy_core::Result<StoreSnapshot> {
            Ok(self.snapshot.lock().unwrap().clone().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        updates: StdMutex<Vec<TurnUpdate>>,
    }

    impl TurnListener for RecordingListener {
        fn turn_updated(&self, update: TurnUpdate) {
            self.updates.lock().unwrap().push(update);
        }
    }

    struct Harness {
        engine: ConversationEngine,
        transport: Arc<MockTransport>,
        repository: Arc<MemoryRepository>,
        listener: Arc<RecordingListener>,
    }

    fn harness() -> Harness {
        harness_with(MemoryRepository::new(), EngineConfig::default())
    }

    fn harness_with(repository: MemoryRepository, config: EngineConfig) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let repository = Arc::new(repository);
        let listener = Arc::new(RecordingListener::default());
        let engine = ConversationEngine::with_config(
            transport.clone(),
            repository.clone(),
            listener.clone(),
            config,
        );
        Harness {
            engine,
            transport,
            repository,
            listener,
        }
    }

    fn transcript(session: &Session) -> Vec<(TurnRole, String)> {
        session
            .turns
            .iter()
            .map(|t| (t.role, t.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_streamed_reply_end_to_end() {
        let h = harness();
        let id = h.engine.send_prompt("Hello", None, true).await.unwrap().unwrap();

        h.engine.on_chunk(&id, "Hi ", Some("openai")).await;
        h.engine.on_chunk(&id, "there!", Some("openai")).await;
        h.engine.on_end(&id, "Hi there!", Some("openai")).await;

        let session = h.engine.current_session().await.unwrap();
        assert_eq!(
            transcript(&session),
            vec![
                (TurnRole::User, "Hello".to_string()),
                (TurnRole::Model, "Hi there!".to_string()),
            ]
        );
        assert_eq!(session.turns[1].provider_label.as_deref(), Some("openai"));
        assert_eq!(h.engine.in_flight().await, 0);

        // Two pending streaming updates, then the final one.
        let updates = h.listener.updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert!(updates[0].pending && updates[0].turn.content == "Hi ");
        assert!(updates[1].pending && updates[1].turn.content == "Hi there!");
        assert!(!updates[2].pending);
    }

    #[tokio::test]
    async fn test_arrival_order_does_not_affect_transcript_order() {
        let h = harness();
        let c1 = h.engine.send_prompt("A", None, true).await.unwrap().unwrap();
        let c2 = h.engine.send_prompt("B", None, true).await.unwrap().unwrap();

        // c2 resolves first.
        h.engine.on_end(&c2, "reply B", None).await;
        h.engine.on_end(&c1, "reply A", None).await;

        let session = h.engine.current_session().await.unwrap();
        assert_eq!(
            transcript(&session),
            vec![
                (TurnRole::User, "A".to_string()),
                (TurnRole::Model, "reply A".to_string()),
                (TurnRole::User, "B".to_string()),
                (TurnRole::Model, "reply B".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_stream_end_is_noop() {
        let h = harness();
        let id = h.engine.send_prompt("hi", None, true).await.unwrap().unwrap();

        h.engine.on_end(&id, "first", Some("gemini")).await;
        let before = h.engine.current_session().await.unwrap();

        h.engine.on_end(&id, "second", Some("gemini")).await;
        let after = h.engine.current_session().await.unwrap();

        assert_eq!(before, after);
        assert_eq!(after.turns[1].content, "first");
    }

    #[tokio::test]
    async fn test_chunk_after_end_is_noop() {
        let h = harness();
        let id = h.engine.send_prompt("hi", None, true).await.unwrap().unwrap();
        h.engine.on_end(&id, "done", None).await;

        let before = h.engine.current_session().await.unwrap();
        let updates_before = h.listener.updates.lock().unwrap().len();

        h.engine.on_chunk(&id, "trailing", None).await;

        assert_eq!(h.engine.current_session().await.unwrap(), before);
        assert_eq!(h.listener.updates.lock().unwrap().len(), updates_before);
    }

    #[tokio::test]
    async fn test_direct_response_skips_streaming() {
        let h = harness();
        let id = h.engine.send_prompt("2+2?", None, false).await.unwrap().unwrap();
        assert!(!h.transport.sent.lock().unwrap()[0].streaming);

        h.engine.on_direct_response(&id, "4", Some("openai")).await;
        let session = h.engine.current_session().await.unwrap();
        assert_eq!(session.turns[1].content, "4");
        assert_eq!(h.engine.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_correlation_id_is_dropped() {
        let h = harness();
        h.engine.send_prompt("hi", None, true).await.unwrap();
        let before = h.engine.current_session().await.unwrap();

        h.engine
            .handle_event(InboundEvent::StreamEnd {
                correlation_id: "who-is-this".to_string(),
                full_text: "???".to_string(),
                provider_label: None,
                session_id: None,
            })
            .await;
        h.engine.on_chunk("who-is-this", "???", None).await;

        assert_eq!(h.engine.current_session().await.unwrap(), before);
        assert_eq!(h.engine.in_flight().await, 1);
    }

    #[tokio::test]
    async fn test_error_event_becomes_system_notice() {
        let h = harness();
        let id = h.engine.send_prompt("hi", None, true).await.unwrap().unwrap();

        h.engine
            .handle_event(InboundEvent::Error {
                correlation_id: Some(id.clone()),
                message: "model overloaded".to_string(),
            })
            .await;

        let session = h.engine.current_session().await.unwrap();
        assert_eq!(
            transcript(&session)[1],
            (TurnRole::System, "model overloaded".to_string())
        );
        assert_eq!(h.engine.in_flight().await, 0);

        // A reply that straggles in after the error finds nothing pending.
        h.engine.on_end(&id, "late", None).await;
        assert_eq!(session, h.engine.current_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_error_without_correlation_id_is_dropped() {
        let h = harness();
        h.engine.send_prompt("hi", None, true).await.unwrap();
        let before = h.engine.current_session().await.unwrap();

        h.engine
            .handle_event(InboundEvent::Error {
                correlation_id: None,
                message: "socket hiccup".to_string(),
            })
            .await;

        assert_eq!(h.engine.current_session().await.unwrap(), before);
        assert_eq!(h.engine.in_flight().await, 1);
    }

    #[tokio::test]
    async fn test_transport_send_failure_errors_the_request() {
        let h = harness();
        *h.transport.fail_sends.lock().unwrap() = true;

        let id = h.engine.send_prompt("hi", None, true).await.unwrap().unwrap();
        let session = h.engine.current_session().await.unwrap();
        assert_eq!(session.turns[1].role, TurnRole::System);
        assert!(session.turns[1].content.contains("channel down"));
        assert_eq!(h.engine.in_flight().await, 0);

        // The id is still returned so callers can log it.
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn test_upload_error_ack_resolves_placeholder() {
        let h = harness();
        *h.transport.upload_behavior.lock().unwrap() =
            UploadBehavior::Reject("unsupported file type".to_string());

        let attachment = AttachmentInfo {
            name: "shot.png".to_string(),
            size: 2048,
        };
        h.engine
            .send_upload("", attachment, vec![0u8; 16], false)
            .await
            .unwrap()
            .unwrap();

        let session = h.engine.current_session().await.unwrap();
        // Attachment-only send: generic title, user turn carries the file.
        assert_eq!(session.title, "New conversation");
        assert_eq!(session.turns[0].attachment.as_ref().unwrap().name, "shot.png");
        assert_eq!(
            transcript(&session)[1],
            (TurnRole::System, "unsupported file type".to_string())
        );
        assert_eq!(h.engine.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_upload_processing_ack_awaits_later_events() {
        let h = harness();
        let attachment = AttachmentInfo {
            name: "shot.png".to_string(),
            size: 2048,
        };
        let id = h
            .engine
            .send_upload("what is this?", attachment, vec![0u8; 16], false)
            .await
            .unwrap()
            .unwrap();

        // Ack was processing: still in flight until events resolve it.
        assert_eq!(h.engine.in_flight().await, 1);
        h.engine.on_direct_response(&id, "a screenshot", Some("gemini")).await;
        assert_eq!(h.engine.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_upload_unreachable_errors_the_request() {
        let h = harness();
        *h.transport.upload_behavior.lock().unwrap() = UploadBehavior::Unreachable;

        let attachment = AttachmentInfo {
            name: "shot.png".to_string(),
            size: 2048,
        };
        h.engine
            .send_upload("", attachment, Vec::new(), false)
            .await
            .unwrap();

        let session = h.engine.current_session().await.unwrap();
        assert_eq!(session.turns[1].role, TurnRole::System);
        assert_eq!(h.engine.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_empty_send_is_silent_noop() {
        let h = harness();
        assert!(h.engine.send_prompt("   ", None, true).await.unwrap().is_none());
        assert!(h.engine.sessions().await.is_empty());
        assert!(h.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_excludes_pending_and_system_turns() {
        let h = harness();
        let c1 = h.engine.send_prompt("first", None, true).await.unwrap().unwrap();
        h.engine.on_end(&c1, "answer one", None).await;

        let c2 = h.engine.send_prompt("second", None, true).await.unwrap().unwrap();
        h.engine.on_error(Some(&c2), "failed").await;

        // Third send: history carries the resolved pair only, not the
        // system notice and not its own placeholder.
        h.engine.send_prompt("third", None, true).await.unwrap();
        let sent = h.transport.sent.lock().unwrap();
        let history = &sent.last().unwrap().history;
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "answer one", "second"]);
    }

    #[tokio::test]
    async fn test_expire_stale_fails_old_requests() {
        let h = harness_with(
            MemoryRepository::new(),
            EngineConfig {
                request_timeout: Duration::ZERO,
            },
        );
        h.engine.send_prompt("hi", None, true).await.unwrap();

        assert_eq!(h.engine.expire_stale().await, 1);
        assert_eq!(h.engine.in_flight().await, 0);

        let session = h.engine.current_session().await.unwrap();
        assert_eq!(
            transcript(&session)[1],
            (TurnRole::System, "The request timed out.".to_string())
        );

        // Nothing left to expire.
        assert_eq!(h.engine.expire_stale().await, 0);
    }

    #[tokio::test]
    async fn test_restore_round_trips_through_repository() {
        let h = harness();
        let id = h.engine.send_prompt("Hello", None, true).await.unwrap().unwrap();
        h.engine.on_end(&id, "Hi there!", Some("openai")).await;
        let saved_sessions = h.engine.sessions().await;

        // Fresh engine over the same repository.
        let listener = Arc::new(RecordingListener::default());
        let engine2 = ConversationEngine::new(h.transport.clone(), h.repository.clone(), listener);
        engine2.restore().await;

        assert_eq!(engine2.sessions().await, saved_sessions);
        assert_eq!(
            engine2.current_session().await.map(|s| s.id),
            saved_sessions.first().map(|s| s.id.clone())
        );
    }

    #[tokio::test]
    async fn test_save_failures_never_surface() {
        let h = harness_with(MemoryRepository::failing(), EngineConfig::default());
        let id = h.engine.send_prompt("hi", None, true).await.unwrap().unwrap();
        h.engine.on_end(&id, "still works", None).await;

        // In-memory store is authoritative even when every save failed.
        let session = h.engine.current_session().await.unwrap();
        assert_eq!(session.turns[1].content, "still works");
    }

    #[tokio::test]
    async fn test_delete_session_clears_current_and_persists() {
        let h = harness();
        let id = h.engine.send_prompt("bye", None, true).await.unwrap().unwrap();
        h.engine.on_end(&id, "ok", None).await;

        let session_id = h.engine.current_session().await.unwrap().id;
        assert!(h.engine.delete_session(&session_id).await);
        assert!(h.engine.current_session().await.is_none());
        assert!(!h.engine.delete_session(&session_id).await);

        let persisted = h.repository.snapshot.lock().unwrap().clone().unwrap();
        assert!(persisted.sessions.is_empty());
        assert!(persisted.current_session_id.is_none());
    }
}
