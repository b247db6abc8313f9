use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use futures::FutureExt;
use serde_json::json;
use tokio::sync::mpsc::{
    self,
    error::TryRecvError,
    UnboundedReceiver,
    UnboundedSender,
};

pub mod buttons;
pub mod context;
pub mod events;

#[cfg(test)]
mod session_tests;

pub use buttons::{
    ButtonState,
    ButtonUiState,
    EntryButtons,
};
use buttons::COULD_NOT_VERIFY_TITLE;
pub use context::{
    Generation,
    TokenContext,
};
use events::SessionEvent;
pub use events::{
    EventOutcome,
    HostLink,
    HostMessage,
    Notice,
};

use crate::{
    anki::{
        FlashcardConnector,
        PrecheckResult,
    },
    core::{
        debug::{
            DebugLog,
            DebugScope,
        },
        utils::{
            code_point_preview,
            normalize_source_lines,
            normalize_source_text,
        },
        DictionaryEntry,
        ReaderError,
        Token,
        VolumeMetadata,
    },
    dictionary::{
        DictionaryEngine,
        EnabledDictionaries,
        RenderOptions,
    },
    segmentation::tokenize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Tokenizing,
    TokensReady,
    LookingUp,
    PrecheckingDuplicates,
    Settled,
}

/// What the entry pane shows for the active token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryView {
    Empty,
    Loading,
    NoEntries,
    Unavailable(String),
    Rendered { html: String },
}

/// One open drawer: a tokenized selection and at most one active token.
///
/// Work is spawned onto the tokio runtime and reports back through a channel;
/// `poll_events`, `process_next` or `settle` apply the results. Every result is
/// checked against the live generation before it can touch state.
pub struct LookupSession {
    engine: Arc<dyn DictionaryEngine>,
    connector: Option<Arc<dyn FlashcardConnector>>,
    dictionaries: Arc<EnabledDictionaries>,
    metadata: Option<VolumeMetadata>,
    debug: DebugLog,

    sender: UnboundedSender<SessionEvent>,
    receiver: UnboundedReceiver<SessionEvent>,
    in_flight: usize,

    generation: Generation,
    phase: SessionPhase,
    source_text: String,
    tokens: Vec<Token>,
    active: Option<TokenContext>,
    entries: Vec<DictionaryEntry>,
    buttons: EntryButtons,
    issued_revision: u64,
    applied_revision: u64,
    view: EntryView,
    frame_height: Option<f64>,
    notices: Vec<Notice>,
}

impl LookupSession {
    pub fn new(engine: Arc<dyn DictionaryEngine>, dictionaries: EnabledDictionaries) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            engine,
            connector: None,
            dictionaries: Arc::new(dictionaries),
            metadata: None,
            debug: DebugLog::default(),
            sender,
            receiver,
            in_flight: 0,
            generation: Generation::default(),
            phase: SessionPhase::Idle,
            source_text: String::new(),
            tokens: Vec::new(),
            active: None,
            entries: Vec::new(),
            buttons: EntryButtons::default(),
            issued_revision: 0,
            applied_revision: 0,
            view: EntryView::Empty,
            frame_height: None,
            notices: Vec::new(),
        }
    }

    /// Enables the add buttons and duplicate precheck.
    pub fn with_connector(mut self, connector: Arc<dyn FlashcardConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_metadata(mut self, metadata: VolumeMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_debug_log(mut self, debug: DebugLog) -> Self {
        self.debug = debug;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn active(&self) -> Option<&TokenContext> {
        self.active.as_ref()
    }

    pub fn active_token_index(&self) -> Option<usize> {
        self.active.as_ref().map(|context| context.token_index)
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    pub fn button_states(&self) -> &[ButtonUiState] {
        self.buttons.states()
    }

    pub fn view(&self) -> &EntryView {
        &self.view
    }

    pub fn frame_height(&self) -> Option<f64> {
        self.frame_height
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.debug
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn host_link(&self) -> HostLink {
        HostLink::new(self.sender.clone())
    }

    /// Start over with a new selection. Anything still running for the old one is abandoned.
    pub fn open(&mut self, text: &str) {
        self.begin_tokenizing(normalize_source_text(text));
    }

    pub fn open_lines<S: AsRef<str>>(&mut self, lines: &[S]) {
        self.begin_tokenizing(normalize_source_lines(lines));
    }

    fn begin_tokenizing(&mut self, source_text: String) {
        self.reset();
        self.phase = SessionPhase::Tokenizing;
        self.source_text = source_text;

        self.debug.record(
            DebugScope::Drawer,
            "Tokenizing selection",
            Some(json!({
                "generation": self.generation.value(),
                "codePoints": code_point_preview(&self.source_text, 16),
            })),
        );

        let engine = self.engine.clone();
        let dictionaries = self.dictionaries.clone();
        let text = self.source_text.clone();
        let generation = self.generation;
        self.spawn(
            async move {
                let result = tokenize(engine.as_ref(), &text, &dictionaries).await;
                SessionEvent::Tokenized { generation, result }
            },
            move || SessionEvent::Tokenized { generation, result: Err(task_panicked("tokenize")) },
        );
    }

    /// Close the drawer. In-flight work is left to finish and its results are dropped.
    pub fn close(&mut self) {
        self.reset();
        self.source_text.clear();
        self.frame_height = None;
        tracing::debug!(generation = %self.generation, "Session closed");
    }

    fn reset(&mut self) {
        self.generation = self.generation.next();
        self.phase = SessionPhase::Idle;
        self.tokens.clear();
        self.clear_active();
    }

    fn clear_active(&mut self) {
        self.active = None;
        self.entries.clear();
        self.buttons = EntryButtons::default();
        self.issued_revision = 0;
        self.applied_revision = 0;
        self.view = EntryView::Empty;
    }

    /// Make the token at `index` active and start its lookup. Returns `None`, and
    /// issues nothing, for non-selectable or missing tokens.
    pub fn activate(&mut self, index: usize) -> Option<TokenContext> {
        let token = self.tokens.get(index)?;
        if !token.selectable {
            tracing::debug!(index, text = %token.text, "Ignoring non-selectable token");
            return None;
        }
        let lookup_text = token.lookup_text();

        self.generation = self.generation.next();
        self.clear_active();

        let context =
            TokenContext { generation: self.generation, token_index: index, lookup_text };
        self.active = Some(context.clone());
        self.phase = SessionPhase::LookingUp;
        self.view = EntryView::Loading;

        self.debug.record(
            DebugScope::Drawer,
            "Token activated",
            Some(json!({
                "generation": context.generation.value(),
                "index": index,
                "term": context.lookup_text,
            })),
        );

        let engine = self.engine.clone();
        let dictionaries = self.dictionaries.clone();
        let task_context = context.clone();
        let fallback_context = context.clone();
        self.spawn(
            async move {
                let result = engine.lookup(&task_context.lookup_text, &dictionaries).await;
                SessionEvent::LookedUp { context: task_context, result }
            },
            move || SessionEvent::LookedUp {
                context: fallback_context,
                result: Err(task_panicked("lookup")),
            },
        );

        Some(context)
    }

    /// Add the active token's entry `entry_index` as a flashcard. Returns false if the
    /// button is not clickable right now.
    pub fn request_add(&mut self, entry_index: usize) -> bool {
        let (Some(connector), Some(context)) = (self.connector.clone(), self.active.clone()) else {
            return false;
        };
        let Some(entry) = self.entries.get(entry_index).cloned() else {
            return false;
        };
        if !self.buttons.begin_add(entry_index) {
            return false;
        }

        tracing::info!(entry_index, term = %entry.expression, "Adding note");
        self.request_render();

        let source_text = self.source_text.clone();
        let metadata = self.metadata.clone();
        let fallback_context = context.clone();
        let fallback_term = entry.expression.clone();
        self.spawn(
            async move {
                let result = connector.add_note(&entry, &source_text, metadata.as_ref()).await;
                SessionEvent::NoteAdded { context, entry_index, term: entry.expression, result }
            },
            move || SessionEvent::NoteAdded {
                context: fallback_context,
                entry_index,
                term: fallback_term,
                result: Err(task_panicked("add note")),
            },
        );
        true
    }

    /// Apply every event that is already waiting, without blocking.
    pub fn poll_events(&mut self) -> Vec<EventOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => outcomes.push(self.apply(event)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Wait for and apply the next event. `None` when nothing is queued or running.
    pub async fn process_next(&mut self) -> Option<EventOutcome> {
        if let Ok(event) = self.receiver.try_recv() {
            return Some(self.apply(event));
        }
        if self.in_flight == 0 {
            return None;
        }
        let event = self.receiver.recv().await?;
        Some(self.apply(event))
    }

    /// Run until every spawned task has reported back.
    pub async fn settle(&mut self) {
        while self.process_next().await.is_some() {}
    }

    /// Every spawned task reports exactly once. A panicking task reports `on_panic()`
    /// instead, so `in_flight` always drains.
    fn spawn<F, P>(&mut self, task: F, on_panic: P)
    where
        F: Future<Output = SessionEvent> + Send + 'static,
        P: FnOnce() -> SessionEvent + Send + 'static,
    {
        let sender = self.sender.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let event = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(event) => event,
                Err(_) => {
                    tracing::error!("Session task panicked");
                    on_panic()
                }
            };
            let _ = sender.send(event);
        });
    }

    fn is_live(&self, context: &TokenContext) -> bool {
        context.is_current(self.generation)
    }

    fn discard(&self, event: &SessionEvent, generation: Generation) -> EventOutcome {
        tracing::debug!(
            kind = event.kind(),
            stale = %generation,
            live = %self.generation,
            "Discarding stale result"
        );
        self.debug.record(
            DebugScope::Drawer,
            "Discarded stale result",
            Some(json!({
                "kind": event.kind(),
                "generation": generation.value(),
                "live": self.generation.value(),
            })),
        );
        EventOutcome::Discarded
    }

    fn apply(&mut self, event: SessionEvent) -> EventOutcome {
        if event.is_task_completion() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        match event {
            SessionEvent::Tokenized { generation, .. } if generation != self.generation => {
                self.discard(&event, generation)
            }
            SessionEvent::Tokenized { result, .. } => {
                match result {
                    Ok(tokens) => {
                        self.tokens = tokens;
                        self.phase = SessionPhase::TokensReady;
                    }
                    Err(err) => {
                        tracing::warn!("Tokenization failed: {}", err);
                        self.phase = SessionPhase::Settled;
                        self.view = EntryView::Unavailable(err.to_string());
                        self.notices.push(Notice::LookupUnavailable { message: err.to_string() });
                    }
                }
                EventOutcome::Applied
            }

            SessionEvent::LookedUp { ref context, .. }
            | SessionEvent::Rendered { ref context, .. }
            | SessionEvent::Prechecked { ref context, .. }
                if !self.is_live(context) =>
            {
                let generation = context.generation;
                self.discard(&event, generation)
            }
            SessionEvent::LookedUp { result, .. } => {
                match result {
                    Ok(lookup) => self.apply_entries(lookup.entries),
                    Err(err) => {
                        tracing::warn!("Dictionary lookup failed: {}", err);
                        self.phase = SessionPhase::Settled;
                        self.view = EntryView::Unavailable(err.to_string());
                        self.notices.push(Notice::LookupUnavailable { message: err.to_string() });
                    }
                }
                EventOutcome::Applied
            }
            SessionEvent::Rendered { revision, .. } if revision <= self.applied_revision => {
                tracing::debug!(revision, applied = self.applied_revision, "Dropping outdated render");
                EventOutcome::Discarded
            }
            SessionEvent::Rendered { revision, result, .. } => {
                self.applied_revision = revision;
                self.view = match result {
                    Ok(html) => EntryView::Rendered { html },
                    Err(err) => {
                        tracing::warn!("Rendering entries failed: {}", err);
                        EntryView::Unavailable(err.to_string())
                    }
                };
                EventOutcome::Applied
            }
            SessionEvent::Prechecked { result, .. } => {
                if result.had_connection_error {
                    self.notices.push(Notice::ConnectionWarning);
                }
                self.buttons.apply_precheck(result.button_states);
                self.phase = SessionPhase::Settled;
                self.request_render();
                EventOutcome::Applied
            }

            SessionEvent::NoteAdded { context, entry_index, term, result } => {
                let ui_result = match &result {
                    Ok(_) => Ok(()),
                    Err(err) => Err(err.to_string()),
                };
                self.notices.push(match result {
                    Ok(outcome) => {
                        Notice::NoteAdded { term, note_id: outcome.note_id, errors: outcome.errors }
                    }
                    Err(err) => {
                        tracing::warn!("Adding note failed: {}", err);
                        Notice::AddFailed { term, message: err.to_string() }
                    }
                });

                if !self.is_live(&context) {
                    tracing::info!(
                        entry_index,
                        generation = %context.generation,
                        "Note add finished after the token changed"
                    );
                    return EventOutcome::Discarded;
                }
                self.buttons.finish_add(entry_index, ui_result);
                self.request_render();
                EventOutcome::Applied
            }

            SessionEvent::Host(HostMessage::FrameHeight { height }) => {
                self.frame_height = Some(height);
                EventOutcome::Applied
            }
            SessionEvent::Host(HostMessage::AddNote { entry_index }) => {
                // a click can only come from entries that are on screen
                if !matches!(self.view, EntryView::Rendered { .. }) {
                    tracing::debug!(entry_index, "Dropping add click without rendered entries");
                    return EventOutcome::Discarded;
                }
                if self.request_add(entry_index) {
                    EventOutcome::Applied
                } else {
                    EventOutcome::Discarded
                }
            }
        }
    }

    fn apply_entries(&mut self, entries: Vec<DictionaryEntry>) {
        if entries.is_empty() {
            self.phase = SessionPhase::Settled;
            self.view = EntryView::NoEntries;
            return;
        }

        self.entries = entries;
        let Some(connector) = self.connector.clone() else {
            self.phase = SessionPhase::Settled;
            self.request_render();
            return;
        };
        let Some(context) = self.active.clone() else {
            return;
        };

        self.buttons = EntryButtons::checking(self.entries.len());
        self.phase = SessionPhase::PrecheckingDuplicates;
        // show "checking" right away instead of waiting on AnkiConnect
        self.request_render();

        let entries = self.entries.clone();
        let source_text = self.source_text.clone();
        let metadata = self.metadata.clone();
        let fallback_context = context.clone();
        let count = entries.len();
        self.spawn(
            async move {
                let result = connector.precheck(&entries, &source_text, metadata.as_ref()).await;
                SessionEvent::Prechecked { context, result }
            },
            move || SessionEvent::Prechecked {
                context: fallback_context,
                result: PrecheckResult {
                    button_states: vec![
                        ButtonUiState::new(ButtonState::Unknown)
                            .with_title(COULD_NOT_VERIFY_TITLE);
                        count
                    ],
                    had_connection_error: true,
                },
            },
        );
    }

    fn request_render(&mut self) {
        let Some(context) = self.active.clone() else {
            return;
        };
        self.issued_revision += 1;
        let revision = self.issued_revision;

        let engine = self.engine.clone();
        let entries = self.entries.clone();
        let options = RenderOptions {
            anki_enabled: self.connector.is_some(),
            anki_button_states: self.buttons.states().to_vec(),
        };
        let fallback_context = context.clone();
        self.spawn(
            async move {
                let result = engine.render_entries(&entries, &options).await;
                SessionEvent::Rendered { context, revision, result }
            },
            move || SessionEvent::Rendered {
                context: fallback_context,
                revision,
                result: Err(task_panicked("render")),
            },
        );
    }
}

fn task_panicked(task: &str) -> ReaderError {
    ReaderError::Custom(format!("{task} task failed unexpectedly"))
}
