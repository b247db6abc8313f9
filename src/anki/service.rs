use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use super::{
    api::AnkiBackend,
    duplicates::{
        DuplicateDetector,
        DuplicateStatus,
    },
    note::NoteBuilder,
    types::{
        AddNoteOutcome,
        NotePayload,
    },
};
use crate::{
    core::{
        DictionaryEntry,
        ReaderError,
        VolumeMetadata,
    },
    session::buttons::{
        ButtonState,
        ButtonUiState,
        ALREADY_EXISTS_TITLE,
        COULD_NOT_VERIFY_TITLE,
        LIKELY_DUPLICATE_TITLE,
    },
    settings::AnkiConnectSettings,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckResult {
    pub button_states: Vec<ButtonUiState>,
    pub had_connection_error: bool,
}

/// The two flashcard operations the drawer needs.
pub trait FlashcardConnector: Send + Sync {
    /// Never fails: backend problems degrade to `unknown` states and `had_connection_error`.
    fn precheck<'a>(
        &'a self,
        entries: &'a [DictionaryEntry],
        source_text: &'a str,
        metadata: Option<&'a VolumeMetadata>,
    ) -> BoxFuture<'a, PrecheckResult>;

    fn add_note<'a>(
        &'a self,
        entry: &'a DictionaryEntry,
        source_text: &'a str,
        metadata: Option<&'a VolumeMetadata>,
    ) -> BoxFuture<'a, Result<AddNoteOutcome, ReaderError>>;
}

pub struct AnkiNoteService {
    backend: Arc<dyn AnkiBackend>,
    builder: NoteBuilder,
    detector: DuplicateDetector,
}

impl AnkiNoteService {
    pub fn new(backend: Arc<dyn AnkiBackend>, settings: AnkiConnectSettings) -> Self {
        Self {
            detector: DuplicateDetector::new(backend.clone()),
            builder: NoteBuilder::new(settings),
            backend,
        }
    }

    pub fn builder(&self) -> &NoteBuilder {
        &self.builder
    }

    pub fn detector(&self) -> &DuplicateDetector {
        &self.detector
    }

    async fn run_precheck(
        &self,
        entries: &[DictionaryEntry],
        source_text: &str,
        metadata: Option<&VolumeMetadata>,
    ) -> PrecheckResult {
        if entries.is_empty() {
            return PrecheckResult::default();
        }

        // `build_errors[i]` is `Some` when entry `i` produced no note
        let mut build_errors = Vec::with_capacity(entries.len());
        let mut notes: Vec<NotePayload> = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            match self.builder.build(entry, source_text, metadata) {
                Ok(built) => {
                    notes.push(built.note);
                    build_errors.push(None);
                }
                Err(err) => {
                    tracing::debug!(index, "Note build failed during precheck: {}", err);
                    build_errors.push(Some(err.to_string()));
                }
            }
        }

        let statuses =
            if notes.is_empty() { Ok(Vec::new()) } else { self.detector.classify(&notes).await };
        merge_statuses(build_errors, statuses)
    }

    async fn run_add_note(
        &self,
        entry: &DictionaryEntry,
        source_text: &str,
        metadata: Option<&VolumeMetadata>,
    ) -> Result<AddNoteOutcome, ReaderError> {
        let built = self.builder.build(entry, source_text, metadata)?;

        self.backend.create_deck(&built.note.deck_name).await?;
        let note_id = self.backend.add_note(&built.note).await?.ok_or(ReaderError::NoteRejected)?;

        if let Err(err) = self.backend.sync().await {
            tracing::warn!("AnkiWeb sync after add failed: {}", err);
        }

        tracing::info!(note_id, deck = %built.note.deck_name, "Added note to Anki");
        Ok(AddNoteOutcome { note_id, errors: built.errors })
    }
}

/// Lay duplicate statuses for the built notes back over the full entry list.
/// `statuses` covers only entries whose `build_errors` slot is `None`, in order.
pub fn merge_statuses(
    build_errors: Vec<Option<String>>,
    statuses: Result<Vec<DuplicateStatus>, ReaderError>,
) -> PrecheckResult {
    let (statuses, had_connection_error) = match statuses {
        Ok(statuses) => (statuses, false),
        Err(err) => {
            tracing::warn!("Duplicate precheck failed: {}", err);
            (Vec::new(), true)
        }
    };
    let mut statuses = statuses.into_iter();

    let button_states = build_errors
        .into_iter()
        .map(|build_error| match build_error {
            Some(message) => ButtonUiState::new(ButtonState::Unknown).with_title(message),
            None if had_connection_error => {
                ButtonUiState::new(ButtonState::Unknown).with_title(COULD_NOT_VERIFY_TITLE)
            }
            None => match statuses.next() {
                Some(DuplicateStatus::Existing(_)) => {
                    ButtonUiState::new(ButtonState::Duplicate).with_title(ALREADY_EXISTS_TITLE)
                }
                Some(DuplicateStatus::Likely) => {
                    ButtonUiState::new(ButtonState::Duplicate).with_title(LIKELY_DUPLICATE_TITLE)
                }
                Some(DuplicateStatus::Unique) | None => ButtonUiState::new(ButtonState::Ready),
            },
        })
        .collect();

    PrecheckResult { button_states, had_connection_error }
}

impl FlashcardConnector for AnkiNoteService {
    fn precheck<'a>(
        &'a self,
        entries: &'a [DictionaryEntry],
        source_text: &'a str,
        metadata: Option<&'a VolumeMetadata>,
    ) -> BoxFuture<'a, PrecheckResult> {
        Box::pin(self.run_precheck(entries, source_text, metadata))
    }

    fn add_note<'a>(
        &'a self,
        entry: &'a DictionaryEntry,
        source_text: &'a str,
        metadata: Option<&'a VolumeMetadata>,
    ) -> BoxFuture<'a, Result<AddNoteOutcome, ReaderError>> {
        Box::pin(self.run_add_note(entry, source_text, metadata))
    }
}
