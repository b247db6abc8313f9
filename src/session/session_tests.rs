use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    sync::Semaphore,
    time::timeout,
};

use super::*;
use crate::{
    anki::{
        AddNoteOutcome,
        FlashcardConnector,
        PrecheckResult,
    },
    core::{
        LookupResult,
        ReaderError,
        TextSegment,
    },
    session::buttons::{
        ALREADY_EXISTS_TITLE,
        COULD_NOT_VERIFY_TITLE,
    },
};

/// One segment per character; lookups answer from a table and can be held on a gate.
#[derive(Default)]
struct FakeEngine {
    entries: Mutex<HashMap<String, Vec<DictionaryEntry>>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    lookup_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    checking_render_gate: Mutex<Option<Arc<Semaphore>>>,
    lookups: Mutex<Vec<String>>,
    renders: Mutex<Vec<RenderOptions>>,
}

impl FakeEngine {
    fn with_words(words: &[&str]) -> Arc<Self> {
        let engine = Self::default();
        for word in words {
            engine.entries.lock().unwrap().insert(word.to_string(), vec![entry(word)]);
        }
        Arc::new(engine)
    }

    fn gate_lookup(&self, term: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.lookup_gates.lock().unwrap().insert(term.to_string(), gate.clone());
        gate
    }

    fn gate_checking_renders(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.checking_render_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }
}

impl DictionaryEngine for FakeEngine {
    fn tokenize<'a>(
        &'a self,
        text: &'a str,
        _dictionaries: &'a EnabledDictionaries,
    ) -> BoxFuture<'a, Result<Vec<TextSegment>, ReaderError>> {
        let segments = text
            .chars()
            .map(|c| TextSegment { text: c.to_string(), ..Default::default() })
            .collect();
        Box::pin(async move { Ok(segments) })
    }

    fn lookup<'a>(
        &'a self,
        term: &'a str,
        _dictionaries: &'a EnabledDictionaries,
    ) -> BoxFuture<'a, Result<LookupResult, ReaderError>> {
        self.lookups.lock().unwrap().push(term.to_string());
        let gate = self.lookup_gates.lock().unwrap().get(term).cloned();
        let panics = self.panicking.lock().unwrap().contains(term);
        let result = if self.failing.lock().unwrap().contains(term) {
            Err(ReaderError::Engine("dictionary database unavailable".to_string()))
        } else {
            let entries = self.entries.lock().unwrap().get(term).cloned().unwrap_or_default();
            Ok(LookupResult { entries, original_text_length: term.chars().count() })
        };
        Box::pin(async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.unwrap();
            }
            if panics {
                panic!("dictionary engine crashed");
            }
            result
        })
    }

    fn render_entries<'a>(
        &'a self,
        entries: &'a [DictionaryEntry],
        options: &'a RenderOptions,
    ) -> BoxFuture<'a, Result<String, ReaderError>> {
        self.renders.lock().unwrap().push(options.clone());
        let checking = options.anki_button_states.iter().any(|s| s.state == ButtonState::Checking);
        let gate = if checking { self.checking_render_gate.lock().unwrap().clone() } else { None };
        let html = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| match options.anki_button_states.get(index) {
                Some(button) => format!("{}:{}", entry.expression, button.state.as_str()),
                None => entry.expression.clone(),
            })
            .collect::<Vec<_>>()
            .join(",");
        Box::pin(async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.unwrap();
            }
            Ok(html)
        })
    }
}

/// Answers prechecks per expression (default `ready`); prechecks and adds can be gated.
#[derive(Default)]
struct FakeConnector {
    duplicates: Mutex<HashSet<String>>,
    connection_error: Mutex<bool>,
    panic_on_precheck: Mutex<bool>,
    precheck_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    add_gate: Mutex<Option<Arc<Semaphore>>>,
    add_error: Mutex<Option<String>>,
    prechecks: Mutex<Vec<String>>,
    adds: Mutex<Vec<(String, String)>>,
}

impl FakeConnector {
    fn gate_precheck(&self, expression: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.precheck_gates.lock().unwrap().insert(expression.to_string(), gate.clone());
        gate
    }

    fn gate_adds(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.add_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn prechecks(&self) -> Vec<String> {
        self.prechecks.lock().unwrap().clone()
    }

    fn adds(&self) -> Vec<(String, String)> {
        self.adds.lock().unwrap().clone()
    }
}

impl FlashcardConnector for FakeConnector {
    fn precheck<'a>(
        &'a self,
        entries: &'a [DictionaryEntry],
        _source_text: &'a str,
        _metadata: Option<&'a VolumeMetadata>,
    ) -> BoxFuture<'a, PrecheckResult> {
        let key = entries.first().map(|e| e.expression.clone()).unwrap_or_default();
        self.prechecks.lock().unwrap().push(key.clone());
        let gate = self.precheck_gates.lock().unwrap().get(&key).cloned();
        let panics = *self.panic_on_precheck.lock().unwrap();

        let result = if *self.connection_error.lock().unwrap() {
            PrecheckResult {
                button_states: entries
                    .iter()
                    .map(|_| ButtonUiState::new(ButtonState::Unknown).with_title(COULD_NOT_VERIFY_TITLE))
                    .collect(),
                had_connection_error: true,
            }
        } else {
            let duplicates = self.duplicates.lock().unwrap();
            PrecheckResult {
                button_states: entries
                    .iter()
                    .map(|entry| {
                        if duplicates.contains(&entry.expression) {
                            ButtonUiState::new(ButtonState::Duplicate).with_title(ALREADY_EXISTS_TITLE)
                        } else {
                            ButtonUiState::new(ButtonState::Ready)
                        }
                    })
                    .collect(),
                had_connection_error: false,
            }
        };

        Box::pin(async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.unwrap();
            }
            if panics {
                panic!("connector crashed");
            }
            result
        })
    }

    fn add_note<'a>(
        &'a self,
        entry: &'a DictionaryEntry,
        source_text: &'a str,
        _metadata: Option<&'a VolumeMetadata>,
    ) -> BoxFuture<'a, Result<AddNoteOutcome, ReaderError>> {
        self.adds.lock().unwrap().push((entry.expression.clone(), source_text.to_string()));
        let gate = self.add_gate.lock().unwrap().clone();
        let error = self.add_error.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.unwrap();
            }
            match error {
                Some(_) => Err(ReaderError::NoteRejected),
                None => Ok(AddNoteOutcome { note_id: 42, errors: Vec::new() }),
            }
        })
    }
}

fn entry(expression: &str) -> DictionaryEntry {
    DictionaryEntry {
        expression: expression.to_string(),
        definitions: vec![format!("definition of {expression}")],
        ..Default::default()
    }
}

fn states(session: &LookupSession) -> Vec<ButtonState> {
    session.button_states().iter().map(|s| s.state).collect()
}

/// Apply exactly `count` task results, failing instead of hanging if one never arrives.
async fn next_events(session: &mut LookupSession, count: usize) -> Vec<EventOutcome> {
    let mut outcomes = Vec::with_capacity(count);
    for _ in 0..count {
        let outcome = timeout(Duration::from_secs(5), session.process_next())
            .await
            .expect("timed out waiting for a task result")
            .expect("no task left to report");
        outcomes.push(outcome);
    }
    outcomes
}

async fn settled(session: &mut LookupSession) {
    timeout(Duration::from_secs(5), session.settle()).await.expect("session never settled");
}

async fn opened(
    engine: &Arc<FakeEngine>,
    connector: Option<&Arc<FakeConnector>>,
    text: &str,
) -> LookupSession {
    let mut session = LookupSession::new(engine.clone(), EnabledDictionaries::default());
    if let Some(connector) = connector {
        session = session.with_connector(connector.clone());
    }
    session.open(text);
    session.settle().await;
    assert_eq!(session.phase(), SessionPhase::TokensReady);
    session
}

#[tokio::test]
async fn tokens_are_ready_without_an_active_token() {
    let engine = FakeEngine::with_words(&["猫"]);
    let session = opened(&engine, None, "猫、\n").await;

    let selectable: Vec<bool> = session.tokens().iter().map(|t| t.selectable).collect();
    assert_eq!(selectable, vec![true, false]);
    assert_eq!(session.active_token_index(), None);
    assert!(engine.lookups().is_empty());
}

#[tokio::test]
async fn non_selectable_tokens_never_issue_work() {
    let engine = FakeEngine::with_words(&["猫"]);
    let connector = Arc::new(FakeConnector::default());
    let mut session = opened(&engine, Some(&connector), "猫、").await;
    let generation = session.generation();

    assert_eq!(session.activate(1), None);
    assert_eq!(session.activate(7), None);
    session.settle().await;

    assert_eq!(session.generation(), generation);
    assert!(engine.lookups().is_empty());
    assert!(connector.prechecks().is_empty());
    assert_eq!(session.in_flight(), 0);
}

#[tokio::test]
async fn single_token_goes_ready_then_added() {
    let engine = FakeEngine::with_words(&["猫"]);
    let connector = Arc::new(FakeConnector::default());
    let mut session = opened(&engine, Some(&connector), "猫").await;

    let context = session.activate(0).unwrap();
    assert_eq!(context.lookup_text, "猫");
    assert_eq!(session.view(), &EntryView::Loading);
    session.settle().await;

    assert_eq!(session.phase(), SessionPhase::Settled);
    assert_eq!(states(&session), vec![ButtonState::Ready]);
    assert_eq!(session.view(), &EntryView::Rendered { html: "猫:ready".to_string() });

    assert!(session.request_add(0));
    assert_eq!(states(&session), vec![ButtonState::Adding]);
    assert!(session.button_states()[0].disabled);
    assert!(!session.request_add(0), "no second submission while adding");

    session.settle().await;
    assert_eq!(states(&session), vec![ButtonState::Added]);
    assert_eq!(session.view(), &EntryView::Rendered { html: "猫:added".to_string() });
    assert_eq!(connector.adds(), vec![("猫".to_string(), "猫".to_string())]);
    assert_eq!(
        session.take_notices(),
        vec![Notice::NoteAdded { term: "猫".to_string(), note_id: 42, errors: Vec::new() }]
    );
}

#[tokio::test]
async fn stale_precheck_is_ignored_after_switching_tokens() {
    let engine = FakeEngine::with_words(&["猫", "犬"]);
    let connector = Arc::new(FakeConnector::default());
    connector.duplicates.lock().unwrap().insert("猫".to_string());
    let cat_gate = connector.gate_precheck("猫");
    let mut session = opened(&engine, Some(&connector), "猫犬").await;

    // lookup, then the "checking" render
    session.activate(0).unwrap();
    next_events(&mut session, 2).await;
    assert_eq!(states(&session), vec![ButtonState::Checking]);
    assert_eq!(session.in_flight(), 1);

    // the outstanding precheck for 猫 does not hold up 犬
    session.activate(1).unwrap();
    next_events(&mut session, 4).await;
    assert_eq!(states(&session), vec![ButtonState::Ready]);

    cat_gate.add_permits(1);
    assert_eq!(next_events(&mut session, 1).await, vec![EventOutcome::Discarded]);
    assert_eq!(session.process_next().await, None);

    let mut prechecked = connector.prechecks();
    prechecked.sort();
    assert_eq!(prechecked, vec!["犬".to_string(), "猫".to_string()]);
    assert_eq!(session.active_token_index(), Some(1));
    assert_eq!(session.entries()[0].expression, "犬");
    assert_eq!(states(&session), vec![ButtonState::Ready]);
    assert_eq!(session.view(), &EntryView::Rendered { html: "犬:ready".to_string() });
}

#[tokio::test]
async fn late_lookup_for_an_abandoned_token_is_discarded() {
    let engine = FakeEngine::with_words(&["猫", "犬"]);
    let cat_gate = engine.gate_lookup("猫");
    let connector = Arc::new(FakeConnector::default());
    let mut session = opened(&engine, Some(&connector), "猫犬").await;

    session.activate(0).unwrap();
    session.activate(1).unwrap();
    next_events(&mut session, 4).await;
    assert_eq!(session.entries()[0].expression, "犬");
    assert_eq!(session.in_flight(), 1);

    cat_gate.add_permits(1);
    let mut outcomes = Vec::new();
    while let Some(outcome) = session.process_next().await {
        outcomes.push(outcome);
    }

    assert_eq!(outcomes, vec![EventOutcome::Discarded]);
    assert_eq!(connector.prechecks(), vec!["犬".to_string()]);
    assert_eq!(session.entries().len(), 1);
    assert_eq!(session.entries()[0].expression, "犬");
}

#[tokio::test]
async fn empty_lookup_shows_no_entries() {
    let engine = FakeEngine::with_words(&[]);
    let connector = Arc::new(FakeConnector::default());
    let mut session = opened(&engine, Some(&connector), "ぬ").await;

    session.activate(0).unwrap();
    session.settle().await;

    assert_eq!(session.view(), &EntryView::NoEntries);
    assert_eq!(session.phase(), SessionPhase::Settled);
    assert!(connector.prechecks().is_empty());
    assert_eq!(engine.render_count(), 0);
}

#[tokio::test]
async fn lookup_failure_is_reported_as_unavailable() {
    let engine = FakeEngine::with_words(&[]);
    engine.failing.lock().unwrap().insert("鳥".to_string());
    let mut session = opened(&engine, None, "鳥").await;

    session.activate(0).unwrap();
    session.settle().await;

    assert!(matches!(session.view(), EntryView::Unavailable(_)));
    let notices = session.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message().starts_with("Lookup unavailable"));
}

#[tokio::test]
async fn connection_error_raises_a_warning() {
    let engine = FakeEngine::with_words(&["猫"]);
    let connector = Arc::new(FakeConnector::default());
    *connector.connection_error.lock().unwrap() = true;
    let mut session = opened(&engine, Some(&connector), "猫").await;

    session.activate(0).unwrap();
    session.settle().await;

    assert_eq!(states(&session), vec![ButtonState::Unknown]);
    assert!(!session.button_states()[0].disabled);
    assert_eq!(session.take_notices(), vec![Notice::ConnectionWarning]);
}

#[tokio::test]
async fn checking_render_never_overwrites_a_newer_render() {
    let engine = FakeEngine::with_words(&["猫"]);
    let checking_gate = engine.gate_checking_renders();
    let connector = Arc::new(FakeConnector::default());
    let mut session = opened(&engine, Some(&connector), "猫").await;

    // lookup, precheck and the "ready" render; the "checking" render stays held
    session.activate(0).unwrap();
    next_events(&mut session, 3).await;
    assert_eq!(session.view(), &EntryView::Rendered { html: "猫:ready".to_string() });

    checking_gate.add_permits(1);
    assert_eq!(session.process_next().await, Some(EventOutcome::Discarded));
    assert_eq!(session.view(), &EntryView::Rendered { html: "猫:ready".to_string() });
}

#[tokio::test]
async fn add_finishing_after_a_token_switch_is_still_reported() {
    let engine = FakeEngine::with_words(&["猫", "犬"]);
    let connector = Arc::new(FakeConnector::default());
    let add_gate = connector.gate_adds();
    let mut session = opened(&engine, Some(&connector), "猫犬").await;

    session.activate(0).unwrap();
    session.settle().await;
    assert!(session.request_add(0));

    // the stale "adding" render, then 犬's lookup, precheck and both renders
    session.activate(1).unwrap();
    next_events(&mut session, 5).await;
    assert_eq!(states(&session), vec![ButtonState::Ready]);
    assert_eq!(session.in_flight(), 1);

    add_gate.add_permits(1);
    session.settle().await;

    assert_eq!(connector.adds().len(), 1);
    assert_eq!(states(&session), vec![ButtonState::Ready], "犬's buttons are untouched");
    assert_eq!(
        session.take_notices(),
        vec![Notice::NoteAdded { term: "猫".to_string(), note_id: 42, errors: Vec::new() }]
    );
}

#[tokio::test]
async fn failed_add_can_be_retried() {
    let engine = FakeEngine::with_words(&["猫"]);
    let connector = Arc::new(FakeConnector::default());
    *connector.add_error.lock().unwrap() = Some("rejected".to_string());
    let mut session = opened(&engine, Some(&connector), "猫").await;

    session.activate(0).unwrap();
    session.settle().await;
    assert!(session.request_add(0));
    session.settle().await;

    let button = &session.button_states()[0];
    assert_eq!(button.state, ButtonState::Error);
    assert_eq!(button.title, "Failed to add note to Anki.");
    assert!(!button.disabled);

    *connector.add_error.lock().unwrap() = None;
    assert!(session.request_add(0));
    session.settle().await;
    assert_eq!(states(&session), vec![ButtonState::Added]);
    assert_eq!(connector.adds().len(), 2);
}

#[tokio::test]
async fn host_messages_resize_and_add() {
    let engine = FakeEngine::with_words(&["猫"]);
    let connector = Arc::new(FakeConnector::default());
    let mut session = opened(&engine, Some(&connector), "猫").await;
    session.activate(0).unwrap();
    session.settle().await;

    let link = session.host_link();
    assert!(link.post(r#"{"type":"yomitan-iframe-height","height":320}"#));
    assert!(link.post(r#"{"type":"yomitan-add-note","entryIndex":0}"#));
    assert!(!link.post(r#"{"type":"something-else"}"#));

    assert_eq!(session.poll_events(), vec![EventOutcome::Applied, EventOutcome::Applied]);
    assert_eq!(session.frame_height(), Some(320.0));
    assert_eq!(states(&session), vec![ButtonState::Adding]);

    session.settle().await;
    assert_eq!(states(&session), vec![ButtonState::Added]);
}

#[tokio::test]
async fn add_click_from_a_previous_token_is_dropped() {
    let engine = FakeEngine::with_words(&["猫", "犬"]);
    let connector = Arc::new(FakeConnector::default());
    let mut session = opened(&engine, Some(&connector), "猫犬").await;
    session.activate(0).unwrap();
    session.settle().await;

    // 猫's entries are gone from the screen; 犬 is still loading
    session.activate(1).unwrap();
    assert_eq!(session.view(), &EntryView::Loading);
    let link = session.host_link();
    assert!(link.post(r#"{"type":"yomitan-add-note","entryIndex":0}"#));
    assert_eq!(session.poll_events(), vec![EventOutcome::Discarded]);

    session.settle().await;
    assert!(connector.adds().is_empty());
    assert_eq!(states(&session), vec![ButtonState::Ready]);
    assert_eq!(session.view(), &EntryView::Rendered { html: "犬:ready".to_string() });
}

#[tokio::test]
async fn panicking_precheck_fails_open_to_unknown() {
    let engine = FakeEngine::with_words(&["猫"]);
    let connector = Arc::new(FakeConnector::default());
    *connector.panic_on_precheck.lock().unwrap() = true;
    let mut session = opened(&engine, Some(&connector), "猫").await;

    session.activate(0).unwrap();
    settled(&mut session).await;

    assert_eq!(session.in_flight(), 0);
    assert_eq!(session.phase(), SessionPhase::Settled);
    assert_eq!(states(&session), vec![ButtonState::Unknown]);
    assert_eq!(session.button_states()[0].title, COULD_NOT_VERIFY_TITLE);
    assert_eq!(session.view(), &EntryView::Rendered { html: "猫:unknown".to_string() });
    assert_eq!(session.take_notices(), vec![Notice::ConnectionWarning]);
}

#[tokio::test]
async fn panicking_lookup_leaves_the_session_usable() {
    let engine = FakeEngine::with_words(&["犬"]);
    engine.panicking.lock().unwrap().insert("猫".to_string());
    let mut session = opened(&engine, None, "猫犬").await;

    session.activate(0).unwrap();
    settled(&mut session).await;

    assert_eq!(session.in_flight(), 0);
    assert!(matches!(session.view(), EntryView::Unavailable(_)));
    let notices = session.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(matches!(notices[0], Notice::LookupUnavailable { .. }));

    session.activate(1).unwrap();
    settled(&mut session).await;
    assert_eq!(session.view(), &EntryView::Rendered { html: "犬".to_string() });
}

#[tokio::test]
async fn without_a_connector_entries_render_without_buttons() {
    let engine = FakeEngine::with_words(&["猫"]);
    let mut session = opened(&engine, None, "猫").await;

    session.activate(0).unwrap();
    session.settle().await;

    assert!(session.button_states().is_empty());
    assert_eq!(session.view(), &EntryView::Rendered { html: "猫".to_string() });
    assert!(!session.request_add(0));
    let renders = engine.renders.lock().unwrap().clone();
    assert_eq!(renders, vec![RenderOptions::default()]);
}

#[tokio::test]
async fn closing_abandons_in_flight_lookups() {
    let engine = FakeEngine::with_words(&["猫"]);
    let gate = engine.gate_lookup("猫");
    let mut session = opened(&engine, None, "猫").await;

    session.activate(0).unwrap();
    session.close();
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(session.tokens().is_empty());

    gate.add_permits(1);
    session.settle().await;

    assert_eq!(session.view(), &EntryView::Empty);
    assert!(session.entries().is_empty());
    assert_eq!(engine.render_count(), 0);
}

#[tokio::test]
async fn reopening_discards_the_previous_tokenization() {
    let engine = FakeEngine::with_words(&[]);
    let mut session = LookupSession::new(engine.clone(), EnabledDictionaries::default());

    session.open("猫犬");
    session.open_lines(&["  鳥\n", "", "魚 "]);
    session.settle().await;

    assert_eq!(session.source_text(), "鳥魚");
    let texts: Vec<&str> = session.tokens().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["鳥", "魚"]);
}

#[tokio::test]
async fn debug_log_records_discards() {
    let engine = FakeEngine::with_words(&["猫", "犬"]);
    let gate = engine.gate_lookup("猫");
    let mut session = LookupSession::new(engine.clone(), EnabledDictionaries::default())
        .with_debug_log(DebugLog::new(true));
    session.open("猫犬");
    session.settle().await;

    session.activate(0).unwrap();
    session.activate(1).unwrap();
    gate.add_permits(1);
    session.settle().await;

    let messages: Vec<String> =
        session.debug_log().recent(10).into_iter().map(|event| event.message).collect();
    assert!(messages.contains(&"Token activated".to_string()));
    assert!(messages.contains(&"Discarded stale result".to_string()));
}
