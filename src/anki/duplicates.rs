use std::sync::{
    Arc,
    Mutex,
};

use futures::future::try_join;

use super::{
    api::AnkiBackend,
    types::NotePayload,
};
use crate::core::ReaderError;

/// Which duplicate check the connected AnkiConnect supports. Learned from the
/// first detailed-check attempt and remembered for the detector's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateCheckCapability {
    Unknown,
    DetailedCheckSupported,
    DetailedCheckUnsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateStrategy {
    /// `canAddNotesWithErrorDetail` on notes with duplicates disallowed.
    DetailedCheck,
    /// `canAddNotes` with and without duplicates allowed, compared per note.
    BooleanComparison,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateStatus {
    Unique,
    /// Existing notes were found for the note's first field.
    Existing(Vec<u64>),
    /// Flagged by Anki, but no matching note ids came back.
    Likely,
}

impl DuplicateStatus {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, DuplicateStatus::Unique)
    }
}

pub struct DuplicateDetector {
    backend: Arc<dyn AnkiBackend>,
    capability: Mutex<DuplicateCheckCapability>,
}

impl DuplicateDetector {
    pub fn new(backend: Arc<dyn AnkiBackend>) -> Self {
        Self { backend, capability: Mutex::new(DuplicateCheckCapability::Unknown) }
    }

    pub fn capability(&self) -> DuplicateCheckCapability {
        self.capability.lock().map(|c| *c).unwrap_or(DuplicateCheckCapability::Unknown)
    }

    fn set_capability(&self, capability: DuplicateCheckCapability) {
        if let Ok(mut current) = self.capability.lock() {
            *current = capability;
        }
    }

    fn strategy(&self) -> DuplicateStrategy {
        match self.capability() {
            DuplicateCheckCapability::DetailedCheckUnsupported => {
                DuplicateStrategy::BooleanComparison
            }
            _ => DuplicateStrategy::DetailedCheck,
        }
    }

    /// One flag per input note, in order. Notes are compared on their first field only.
    pub async fn detect(&self, notes: &[NotePayload]) -> Result<Vec<bool>, ReaderError> {
        if notes.is_empty() {
            return Ok(Vec::new());
        }

        let stripped: Vec<NotePayload> =
            notes.iter().map(NotePayload::stripped_to_first_field).collect();
        let disallowed: Vec<NotePayload> =
            stripped.iter().map(|note| note.with_allow_duplicate(false)).collect();

        if self.strategy() == DuplicateStrategy::DetailedCheck {
            match self.backend.can_add_notes_with_error_detail(&disallowed).await {
                Ok(details) => {
                    self.set_capability(DuplicateCheckCapability::DetailedCheckSupported);
                    return Ok(details
                        .iter()
                        .map(|detail| is_duplicate_error_message(detail.error.as_deref()))
                        .collect());
                }
                Err(err) if err.is_unsupported_action() => {
                    tracing::info!("Detailed duplicate check unsupported, comparing canAddNotes");
                    self.set_capability(DuplicateCheckCapability::DetailedCheckUnsupported);
                }
                Err(err) => return Err(err),
            }
        }

        let allowed: Vec<NotePayload> =
            stripped.iter().map(|note| note.with_allow_duplicate(true)).collect();
        let (with_duplicates, without_duplicates) = try_join(
            self.backend.can_add_notes(&allowed),
            self.backend.can_add_notes(&disallowed),
        )
        .await?;

        Ok(with_duplicates
            .iter()
            .enumerate()
            .map(|(index, allowed)| without_duplicates.get(index) != Some(allowed))
            .collect())
    }

    /// Duplicate flags plus, for flagged notes only, whether a matching note exists.
    pub async fn classify(&self, notes: &[NotePayload]) -> Result<Vec<DuplicateStatus>, ReaderError> {
        let flags = self.detect(notes).await?;

        let duplicate_notes: Vec<NotePayload> = notes
            .iter()
            .zip(&flags)
            .filter(|(_, duplicate)| **duplicate)
            .map(|(note, _)| note.stripped_to_first_field())
            .collect();
        let mut duplicate_ids = if duplicate_notes.is_empty() {
            Vec::new()
        } else {
            self.backend.find_note_ids(&duplicate_notes).await?
        }
        .into_iter();

        Ok(flags
            .into_iter()
            .map(|duplicate| {
                if !duplicate {
                    return DuplicateStatus::Unique;
                }
                match duplicate_ids.next() {
                    Some(ids) if !ids.is_empty() => DuplicateStatus::Existing(ids),
                    _ => DuplicateStatus::Likely,
                }
            })
            .collect())
    }
}

pub fn is_duplicate_error_message(error: Option<&str>) -> bool {
    error.map(|message| message.to_lowercase().contains("duplicate")).unwrap_or(false)
}
