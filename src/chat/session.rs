//! Core chat session management.
//!
//! This module provides the `ChatController`, which drives one
//! request/response cycle at a time per persona, appends completed turns to
//! the conversation store, and broadcasts lifecycle events to observers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::accumulating_stream::{AccumulatedTurn, AccumulatingStream};
use crate::client::ChatTransport;
use crate::error::Result;
use crate::observability::{
    TURN_DURATION, TURNS_CANCELLED, TURNS_COMMITTED, TURNS_FAILED, TURNS_REJECTED,
};
use crate::store::ConversationStore;
use crate::types::{
    ChatRequest, DEFAULT_TEMPERATURE, FeedbackRequest, FinishReason, Message, PersonaId, Rating,
    Role, StreamEvent, Usage, validate_temperature,
};
use crate::Error;

/// Number of lifecycle events buffered for slow observers before they lag.
pub const EVENT_CAPACITY: usize = 256;

/// Where a persona's turn currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No turn in flight.
    Idle,
    /// The request is sent and no response has arrived yet.
    AwaitingResponse,
    /// Stream events are arriving.
    Streaming,
    /// The assistant message is being appended to history.
    Committing,
    /// The turn failed and is being torn down.
    Errored,
}

/// Lifecycle events broadcast to observers of the controller.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A turn was accepted and its request is being issued.
    Started {
        /// The persona answering.
        persona: PersonaId,
        /// Whether the answer is streamed.
        stream: bool,
    },
    /// A non-empty fragment of the answer arrived.
    Fragment {
        /// The persona answering.
        persona: PersonaId,
        /// The text of the fragment.
        text: String,
    },
    /// The answer was appended to history.
    Committed {
        /// The persona that answered.
        persona: PersonaId,
        /// The committed assistant message.
        message: Message,
        /// Why the model stopped, if reported.
        finish_reason: Option<FinishReason>,
    },
    /// The turn failed; nothing was committed for it.
    Failed {
        /// The persona whose turn failed.
        persona: PersonaId,
        /// What went wrong.
        error: Error,
    },
    /// The turn was cancelled; nothing was committed for it.
    Cancelled {
        /// The persona whose turn was cancelled.
        persona: PersonaId,
    },
}

impl TurnEvent {
    /// The persona this event concerns.
    pub fn persona(&self) -> &PersonaId {
        match self {
            TurnEvent::Started { persona, .. }
            | TurnEvent::Fragment { persona, .. }
            | TurnEvent::Committed { persona, .. }
            | TurnEvent::Failed { persona, .. }
            | TurnEvent::Cancelled { persona } => persona,
        }
    }
}

/// A turn that completed and was appended to history.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTurn {
    /// The persona that answered.
    pub persona: PersonaId,
    /// The assistant message now at the end of the persona's history.
    pub message: Message,
    /// Why the model stopped, if reported.
    pub finish_reason: Option<FinishReason>,
    /// Token accounting, if reported.
    pub usage: Option<Usage>,
}

/// Options applied to every request the controller issues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Request an event stream instead of a single response.
    pub stream: bool,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stream: true,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

struct Slot {
    state: TurnState,
    cancel: CancellationToken,
}

type Slots = Mutex<HashMap<PersonaId, Slot>>;

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<PersonaId, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds a persona's in-flight slot; dropping it returns the persona to idle.
struct InFlight<'a> {
    slots: &'a Slots,
    persona: PersonaId,
}

impl InFlight<'_> {
    fn set_state(&self, state: TurnState) {
        if let Some(slot) = lock_slots(self.slots).get_mut(&self.persona) {
            tracing::debug!(
                persona = %self.persona,
                from = ?slot.state,
                to = ?state,
                "turn transition"
            );
            slot.state = state;
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_slots(self.slots).remove(&self.persona);
    }
}

/// Drives chat turns against a transport, one in flight per persona.
///
/// The controller is `Send + Sync`; share it in an `Arc` to submit turns for
/// different personas concurrently or to cancel a turn from another task.
pub struct ChatController<T: ChatTransport> {
    transport: Arc<T>,
    store: Arc<dyn ConversationStore>,
    options: Mutex<SessionOptions>,
    slots: Slots,
    events: broadcast::Sender<TurnEvent>,
}

impl<T: ChatTransport> ChatController<T> {
    /// Creates a new controller.
    pub fn new(
        transport: Arc<T>,
        store: Arc<dyn ConversationStore>,
        options: SessionOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            store,
            options: Mutex::new(options),
            slots: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// The transport requests are issued on.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The store histories are kept in.
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Subscribe to lifecycle events of every persona.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.events.subscribe()
    }

    /// The persona's current turn state.
    pub fn state(&self, persona: &PersonaId) -> TurnState {
        lock_slots(&self.slots)
            .get(persona)
            .map(|slot| slot.state)
            .unwrap_or(TurnState::Idle)
    }

    /// Returns true if any persona has a turn in flight.
    pub fn is_busy(&self) -> bool {
        !lock_slots(&self.slots).is_empty()
    }

    /// The options applied to the next request.
    pub fn options(&self) -> SessionOptions {
        *self.options.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Switch between streamed and single-response turns.
    pub fn set_stream(&self, stream: bool) {
        self.options.lock().unwrap_or_else(|p| p.into_inner()).stream = stream;
    }

    /// Set the sampling temperature for subsequent turns.
    pub fn set_temperature(&self, temperature: f32) -> Result<()> {
        let temperature = validate_temperature(temperature)?;
        self.options.lock().unwrap_or_else(|p| p.into_inner()).temperature = temperature;
        Ok(())
    }

    /// A snapshot of the persona's history.
    pub fn history(&self, persona: &PersonaId) -> Result<Vec<Message>> {
        self.store.history(persona)
    }

    /// Every persona with a history.
    pub fn personas(&self) -> Result<Vec<PersonaId>> {
        self.store.personas()
    }

    /// Empty the persona's history. Rejected while the persona has a turn in flight.
    pub fn clear(&self, persona: &PersonaId) -> Result<()> {
        // Hold the registry so no turn can start while the store is cleared.
        let slots = lock_slots(&self.slots);
        if slots.contains_key(persona) {
            return Err(Error::already_in_flight(persona.as_str()));
        }
        self.store.clear(persona)
    }

    /// Remove every history. Rejected while any turn is in flight.
    pub fn clear_all(&self) -> Result<()> {
        let slots = lock_slots(&self.slots);
        if let Some(persona) = slots.keys().next() {
            return Err(Error::already_in_flight(persona.as_str()));
        }
        self.store.clear_all()
    }

    /// Build a feedback submission rating the persona's conversation.
    pub fn feedback_request(
        &self,
        persona: &PersonaId,
        user_id: impl Into<String>,
        overall_rating: u8,
        comment: Option<String>,
    ) -> Result<FeedbackRequest> {
        let rating = Rating::new(overall_rating, comment)?;
        FeedbackRequest::new(user_id, rating, self.store.history(persona)?)
    }

    /// Cancel the persona's in-flight turn.
    ///
    /// Returns false if no turn was in flight.
    pub fn cancel(&self, persona: &PersonaId) -> bool {
        match lock_slots(&self.slots).get(persona) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight turn, returning how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let slots = lock_slots(&self.slots);
        for slot in slots.values() {
            slot.cancel.cancel();
        }
        slots.len()
    }

    /// Send the user's text to the persona and commit the answer.
    ///
    /// The user message is appended to history before the request is issued
    /// and stays there whatever happens to the turn. The answer is appended
    /// only if the turn completes; failures and cancellation commit nothing.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInFlight` without touching any state if the persona is
    /// busy, `Cancelled` if [`cancel`](Self::cancel) was called, and otherwise
    /// the transport, envelope, or store error that ended the turn.
    pub async fn submit(
        &self,
        persona: &PersonaId,
        user_text: impl Into<String>,
    ) -> Result<CommittedTurn> {
        let user_text = user_text.into();
        if user_text.trim().is_empty() {
            return Err(Error::validation(
                "message must not be empty",
                Some("content".to_string()),
            ));
        }

        let (slot, cancel) = self.begin(persona)?;
        let options = self.options();
        let start = Instant::now();
        self.emit(TurnEvent::Started {
            persona: persona.clone(),
            stream: options.stream,
        });

        let outcome = match self.append(persona, Message::user(user_text)).await {
            Ok(()) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::cancelled(persona.as_str())),
                outcome = self.request_turn(&slot, persona, options) => outcome,
            },
            Err(err) => Err(err),
        };
        // Once the answer is complete the commit is no longer cancellable.
        let outcome = match outcome {
            Ok(turn) => self.commit(&slot, persona, turn).await,
            Err(err) => Err(err),
        };
        TURN_DURATION.add(start.elapsed().as_secs_f64());

        match outcome {
            Ok(turn) => {
                TURNS_COMMITTED.click();
                tracing::debug!(
                    persona = %persona,
                    chars = turn.message.content.len(),
                    "turn committed"
                );
                self.emit(TurnEvent::Committed {
                    persona: persona.clone(),
                    message: turn.message.clone(),
                    finish_reason: turn.finish_reason.clone(),
                });
                Ok(CommittedTurn {
                    persona: persona.clone(),
                    message: turn.message,
                    finish_reason: turn.finish_reason,
                    usage: turn.usage,
                })
            }
            Err(err) if err.is_cancelled() => {
                TURNS_CANCELLED.click();
                tracing::debug!(persona = %persona, "turn cancelled");
                self.emit(TurnEvent::Cancelled {
                    persona: persona.clone(),
                });
                Err(err)
            }
            Err(err) => {
                slot.set_state(TurnState::Errored);
                TURNS_FAILED.click();
                tracing::warn!(persona = %persona, error = %err, "turn failed");
                self.emit(TurnEvent::Failed {
                    persona: persona.clone(),
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    fn begin(&self, persona: &PersonaId) -> Result<(InFlight<'_>, CancellationToken)> {
        let mut slots = lock_slots(&self.slots);
        if slots.contains_key(persona) {
            TURNS_REJECTED.click();
            return Err(Error::already_in_flight(persona.as_str()));
        }
        let cancel = CancellationToken::new();
        slots.insert(
            persona.clone(),
            Slot {
                state: TurnState::AwaitingResponse,
                cancel: cancel.clone(),
            },
        );
        tracing::debug!(persona = %persona, "turn started");
        Ok((
            InFlight {
                slots: &self.slots,
                persona: persona.clone(),
            },
            cancel,
        ))
    }

    async fn request_turn(
        &self,
        slot: &InFlight<'_>,
        persona: &PersonaId,
        options: SessionOptions,
    ) -> Result<AccumulatedTurn> {
        let request = ChatRequest::new(
            persona.clone(),
            self.store.history(persona)?,
            options.stream,
            options.temperature,
        )?;

        if options.stream {
            return self.receive_stream(slot, persona, request).await;
        }
        let response = self.transport.send(request).await?;
        if response.result.message.role != Role::Assistant {
            tracing::warn!(
                persona = %persona,
                role = %response.result.message.role,
                "full response carried a non-assistant role"
            );
        }
        Ok(AccumulatedTurn {
            message: Message::assistant(response.result.message.content),
            finish_reason: Some(response.result.finish_reason),
            usage: Some(response.usage),
            saw_terminal: true,
            fragments: 0,
        })
    }

    async fn commit(
        &self,
        slot: &InFlight<'_>,
        persona: &PersonaId,
        turn: AccumulatedTurn,
    ) -> Result<AccumulatedTurn> {
        slot.set_state(TurnState::Committing);
        self.append(persona, turn.message.clone()).await?;
        Ok(turn)
    }

    /// Append on the blocking pool; file-backed stores fsync before returning.
    async fn append(&self, persona: &PersonaId, message: Message) -> Result<()> {
        let store = Arc::clone(&self.store);
        let persona = persona.clone();
        tokio::task::spawn_blocking(move || store.append(&persona, message))
            .await
            .map_err(|e| {
                Error::store_write(format!("store append did not finish: {e}"), Some(Box::new(e)))
            })?
    }

    async fn receive_stream(
        &self,
        slot: &InFlight<'_>,
        persona: &PersonaId,
        request: ChatRequest,
    ) -> Result<AccumulatedTurn> {
        let events = self.transport.stream(request).await?;
        let (mut events, drained) = AccumulatingStream::new(events);
        let mut streaming = false;
        loop {
            let event = match events.next().await {
                Some(event) => event?,
                None => {
                    return drained.await.map_err(|_| {
                        Error::transport("stream ended without a result", None)
                    });
                }
            };
            if !streaming {
                slot.set_state(TurnState::Streaming);
                streaming = true;
            }
            if event.is_terminal() {
                return Ok(events.finalize_partial());
            }
            if let Some(text) = event.fragment().filter(|text| !text.is_empty()) {
                self.emit(TurnEvent::Fragment {
                    persona: persona.clone(),
                    text: text.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: TurnEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EventStream;
    use crate::store::MemoryStore;
    use crate::types::{ChatResponse, DeltaEvent, Role};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    enum Script {
        Full(ChatResponse),
        Events(Vec<Result<StreamEvent>>),
        Channel(mpsc::UnboundedReceiver<Result<StreamEvent>>),
        Fail(Error),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn with(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, request: ChatRequest) -> Script {
            self.requests.lock().unwrap().push(request);
            self.scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request")
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(&self, request: ChatRequest) -> Result<ChatResponse> {
            match self.next(request) {
                Script::Full(response) => Ok(response),
                Script::Fail(err) => Err(err),
                _ => panic!("streaming script used for a full request"),
            }
        }

        async fn stream(&self, request: ChatRequest) -> Result<EventStream> {
            match self.next(request) {
                Script::Events(events) => Ok(Box::pin(futures::stream::iter(events))),
                Script::Channel(rx) => Ok(Box::pin(futures::stream::unfold(
                    rx,
                    |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
                ))),
                Script::Fail(err) => Err(err),
                Script::Full(_) => panic!("full script used for a streaming request"),
            }
        }
    }

    fn tocqueville() -> PersonaId {
        PersonaId::new("tocqueville").unwrap()
    }

    fn delta(content: &str) -> Result<StreamEvent> {
        Ok(StreamEvent::Delta(DeltaEvent::new(content)))
    }

    fn controller(
        transport: Arc<ScriptedTransport>,
        options: SessionOptions,
    ) -> Arc<ChatController<ScriptedTransport>> {
        Arc::new(ChatController::new(
            transport,
            Arc::new(MemoryStore::new()),
            options,
        ))
    }

    async fn wait_for_state(
        controller: &ChatController<ScriptedTransport>,
        persona: &PersonaId,
        state: TurnState,
    ) {
        for _ in 0..2000 {
            if controller.state(persona) == state {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        panic!("persona never reached {state:?}");
    }

    #[tokio::test]
    async fn streamed_turn_commits_accumulated_text() {
        let transport = ScriptedTransport::with(vec![Script::Events(vec![
            delta(""),
            delta("A"),
            Ok(StreamEvent::Delta(
                DeltaEvent::new("B").with_finish_reason(FinishReason::Stop),
            )),
            Ok(StreamEvent::Terminal),
        ])]);
        let controller = controller(transport.clone(), SessionOptions::default());
        let mut events = controller.subscribe();
        let persona = tocqueville();

        let turn = controller.submit(&persona, "Q").await.unwrap();
        assert_eq!(turn.message, Message::assistant("AB"));
        assert_eq!(turn.finish_reason, Some(FinishReason::Stop));
        assert_eq!(
            controller.history(&persona).unwrap(),
            vec![Message::user("Q"), Message::assistant("AB")]
        );
        assert_eq!(controller.state(&persona), TurnState::Idle);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].stream);
        assert_eq!(requests[0].messages, vec![Message::user("Q")]);

        assert!(matches!(events.recv().await.unwrap(), TurnEvent::Started { stream: true, .. }));
        for expected in ["A", "B"] {
            match events.recv().await.unwrap() {
                TurnEvent::Fragment { text, .. } => assert_eq!(text, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
        match events.recv().await.unwrap() {
            TurnEvent::Committed { message, .. } => assert_eq!(message.content, "AB"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_closed_without_terminal_commits() {
        let transport = ScriptedTransport::with(vec![Script::Events(vec![
            delta("Hel"),
            delta("lo"),
        ])]);
        let controller = controller(transport, SessionOptions::default());
        let turn = controller.submit(&tocqueville(), "Q").await.unwrap();
        assert_eq!(turn.message.content, "Hello");
        assert_eq!(turn.finish_reason, None);
    }

    #[tokio::test]
    async fn empty_stream_commits_empty_message() {
        let transport =
            ScriptedTransport::with(vec![Script::Events(vec![Ok(StreamEvent::Terminal)])]);
        let controller = controller(transport, SessionOptions::default());
        let persona = tocqueville();
        controller.submit(&persona, "Q").await.unwrap();
        assert_eq!(
            controller.history(&persona).unwrap(),
            vec![Message::user("Q"), Message::assistant("")]
        );
    }

    #[tokio::test]
    async fn full_response_turn() {
        let response = ChatResponse::from_json(
            r#"{"result":{"message":{"role":"assistant","content":"Bonjour"},"finish_reason":"stop"},
                "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4},
                "created":1762669782,"id":"toc-2"}"#,
        )
        .unwrap();
        let transport = ScriptedTransport::with(vec![Script::Full(response)]);
        let options = SessionOptions {
            stream: false,
            temperature: 0.7,
        };
        let controller = controller(transport.clone(), options);
        let persona = tocqueville();

        let turn = controller.submit(&persona, "Salut").await.unwrap();
        assert_eq!(turn.message, Message::assistant("Bonjour"));
        assert_eq!(turn.usage, Some(Usage::new(3, 1)));

        let request = &transport.requests()[0];
        assert!(!request.stream);
        assert_eq!(request.temperature, 0.7);
    }

    #[tokio::test]
    async fn full_response_is_committed_as_assistant() {
        let response = ChatResponse::from_json(
            r#"{"result":{"message":{"role":"user","content":"X"},"finish_reason":"stop"},
                "usage":{},"created":1762669782,"id":"toc-3"}"#,
        )
        .unwrap();
        let transport = ScriptedTransport::with(vec![Script::Full(response)]);
        let options = SessionOptions {
            stream: false,
            temperature: 0.5,
        };
        let controller = controller(transport, options);
        let persona = tocqueville();

        let turn = controller.submit(&persona, "Q").await.unwrap();
        assert_eq!(turn.message, Message::assistant("X"));
        let roles: Vec<Role> = controller
            .history(&persona)
            .unwrap()
            .into_iter()
            .map(|message| message.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    /// A memory store whose appends start failing after `remaining` successes.
    struct FailingStore {
        inner: MemoryStore,
        remaining: Mutex<usize>,
    }

    impl ConversationStore for FailingStore {
        fn history(&self, persona: &PersonaId) -> Result<Vec<Message>> {
            self.inner.history(persona)
        }

        fn append(&self, persona: &PersonaId, message: Message) -> Result<()> {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(Error::store_write("disk full", None));
            }
            *remaining -= 1;
            self.inner.append(persona, message)
        }

        fn clear(&self, persona: &PersonaId) -> Result<()> {
            self.inner.clear(persona)
        }

        fn clear_all(&self) -> Result<()> {
            self.inner.clear_all()
        }

        fn personas(&self) -> Result<Vec<PersonaId>> {
            self.inner.personas()
        }
    }

    #[tokio::test]
    async fn store_failure_at_commit_fails_the_turn() {
        let transport = ScriptedTransport::with(vec![Script::Events(vec![
            delta("A"),
            Ok(StreamEvent::Terminal),
        ])]);
        let store = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            remaining: Mutex::new(1),
        });
        let controller = ChatController::new(transport, store, SessionOptions::default());
        let mut events = controller.subscribe();
        let persona = tocqueville();

        let err = controller.submit(&persona, "Q").await.unwrap_err();
        assert!(err.is_store_write());
        assert_eq!(controller.state(&persona), TurnState::Idle);
        assert_eq!(controller.history(&persona).unwrap(), vec![Message::user("Q")]);

        let mut failed = false;
        let mut committed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                TurnEvent::Failed { error, .. } => failed = error.is_store_write(),
                TurnEvent::Committed { .. } => committed = true,
                _ => {}
            }
        }
        assert!(failed);
        assert!(!committed);
    }

    #[tokio::test]
    async fn store_failure_for_user_message_sends_nothing() {
        let transport = ScriptedTransport::with(Vec::new());
        let store = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            remaining: Mutex::new(0),
        });
        let controller = ChatController::new(transport.clone(), store, SessionOptions::default());
        let persona = tocqueville();

        let err = controller.submit(&persona, "Q").await.unwrap_err();
        assert!(err.is_store_write());
        assert!(transport.requests().is_empty());
        assert!(controller.history(&persona).unwrap().is_empty());
        assert_eq!(controller.state(&persona), TurnState::Idle);
    }

    #[tokio::test]
    async fn history_is_sent_in_transcript_order() {
        let transport = ScriptedTransport::with(vec![
            Script::Events(vec![delta("A1")]),
            Script::Events(vec![delta("A2")]),
        ]);
        let controller = controller(transport.clone(), SessionOptions::default());
        let persona = tocqueville();
        controller.submit(&persona, "Q1").await.unwrap();
        controller.submit(&persona, "Q2").await.unwrap();

        let requests = transport.requests();
        assert_eq!(
            requests[1].messages,
            vec![
                Message::user("Q1"),
                Message::assistant("A1"),
                Message::user("Q2")
            ]
        );
    }

    #[tokio::test]
    async fn second_submit_while_streaming_is_rejected() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::with(vec![Script::Channel(rx)]);
        let controller = controller(transport.clone(), SessionOptions::default());
        let persona = tocqueville();

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            let persona = persona.clone();
            async move { controller.submit(&persona, "Q").await }
        });

        tx.send(delta("A")).unwrap();
        wait_for_state(&controller, &persona, TurnState::Streaming).await;

        let err = controller.submit(&persona, "again").await.unwrap_err();
        assert!(err.is_already_in_flight());
        assert!(controller.clear(&persona).unwrap_err().is_already_in_flight());
        assert!(controller.clear_all().unwrap_err().is_already_in_flight());
        assert_eq!(controller.history(&persona).unwrap(), vec![Message::user("Q")]);
        assert_eq!(transport.requests().len(), 1);

        tx.send(delta("B")).unwrap();
        tx.send(Ok(StreamEvent::Terminal)).unwrap();
        let turn = first.await.unwrap().unwrap();
        assert_eq!(turn.message.content, "AB");
        assert_eq!(controller.history(&persona).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn personas_are_independent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::with(vec![
            Script::Channel(rx),
            Script::Events(vec![delta("hello")]),
        ]);
        let controller = controller(transport, SessionOptions::default());
        let toc = tocqueville();
        let common = PersonaId::new("common").unwrap();

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            let toc = toc.clone();
            async move { controller.submit(&toc, "Q").await }
        });
        wait_for_state(&controller, &toc, TurnState::AwaitingResponse).await;

        let turn = controller.submit(&common, "hi").await.unwrap();
        assert_eq!(turn.message.content, "hello");

        tx.send(Ok(StreamEvent::Terminal)).unwrap();
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_mid_stream_keeps_only_user_message() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::with(vec![Script::Channel(rx)]);
        let controller = controller(transport, SessionOptions::default());
        let mut events = controller.subscribe();
        let persona = tocqueville();

        let turn = tokio::spawn({
            let controller = Arc::clone(&controller);
            let persona = persona.clone();
            async move { controller.submit(&persona, "Q").await }
        });
        tx.send(delta("partial")).unwrap();
        wait_for_state(&controller, &persona, TurnState::Streaming).await;

        assert!(controller.cancel(&persona));
        let err = turn.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(controller.state(&persona), TurnState::Idle);
        assert_eq!(controller.history(&persona).unwrap(), vec![Message::user("Q")]);
        // The stream was dropped with the turn.
        assert!(tx.send(delta("late")).is_err());

        let mut saw_cancelled = false;
        while let Ok(event) = events.try_recv() {
            saw_cancelled |= matches!(event, TurnEvent::Cancelled { .. });
            assert!(!matches!(event, TurnEvent::Committed { .. }));
        }
        assert!(saw_cancelled);
        assert!(!controller.cancel(&persona));
    }

    #[tokio::test]
    async fn transport_error_mid_stream_keeps_only_user_message() {
        let transport = ScriptedTransport::with(vec![Script::Events(vec![
            delta("A"),
            Err(Error::transport("connection reset", None)),
        ])]);
        let controller = controller(transport, SessionOptions::default());
        let mut events = controller.subscribe();
        let persona = tocqueville();

        let err = controller.submit(&persona, "Q").await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(controller.state(&persona), TurnState::Idle);
        assert_eq!(controller.history(&persona).unwrap(), vec![Message::user("Q")]);

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            failed |= matches!(event, TurnEvent::Failed { .. });
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn request_failure_keeps_user_message() {
        let transport = ScriptedTransport::with(vec![Script::Fail(Error::not_found(
            "Character 'nobody' not found",
            None,
        ))]);
        let controller = controller(transport, SessionOptions::default());
        let persona = PersonaId::new("nobody").unwrap();
        let err = controller.submit(&persona, "Q").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(controller.history(&persona).unwrap(), vec![Message::user("Q")]);
    }

    #[tokio::test]
    async fn aborted_submit_releases_persona() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::with(vec![Script::Channel(rx)]);
        let controller = controller(transport, SessionOptions::default());
        let persona = tocqueville();

        let turn = tokio::spawn({
            let controller = Arc::clone(&controller);
            let persona = persona.clone();
            async move { controller.submit(&persona, "Q").await }
        });
        wait_for_state(&controller, &persona, TurnState::AwaitingResponse).await;
        turn.abort();
        assert!(turn.await.unwrap_err().is_cancelled());
        assert_eq!(controller.state(&persona), TurnState::Idle);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_state_change() {
        let controller = controller(ScriptedTransport::with(Vec::new()), SessionOptions::default());
        let persona = tocqueville();
        let err = controller.submit(&persona, "   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(controller.personas().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_and_options() {
        let transport = ScriptedTransport::with(vec![Script::Events(vec![delta("A")])]);
        let controller = controller(transport, SessionOptions::default());
        let persona = tocqueville();
        controller.submit(&persona, "Q").await.unwrap();

        let feedback = controller
            .feedback_request(&persona, "reader-1", 9, Some("vivid".to_string()))
            .unwrap();
        assert_eq!(feedback.messages.len(), 2);
        assert_eq!(feedback.messages[1].role, Role::Assistant);
        assert!(controller.feedback_request(&persona, "reader-1", 11, None).is_err());

        controller.clear(&persona).unwrap();
        assert!(controller.history(&persona).unwrap().is_empty());
        assert_eq!(controller.personas().unwrap(), vec![persona.clone()]);
        assert!(controller.feedback_request(&persona, "reader-1", 5, None).is_err());

        controller.clear_all().unwrap();
        assert!(controller.personas().unwrap().is_empty());

        controller.set_stream(false);
        assert!(!controller.options().stream);
        controller.set_temperature(1.2).unwrap();
        assert_eq!(controller.options().temperature, 1.2);
        assert!(controller.set_temperature(2.5).unwrap_err().is_validation());
        assert_eq!(controller.options().temperature, 1.2);
    }
}
