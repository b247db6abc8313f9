pub mod api;
pub mod duplicates;
pub mod note;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{
    wait_awake,
    AnkiBackend,
    AnkiConnectClient,
};
pub use duplicates::{
    DuplicateCheckCapability,
    DuplicateDetector,
    DuplicateStatus,
};
pub use note::NoteBuilder;
pub use service::{
    AnkiNoteService,
    FlashcardConnector,
    PrecheckResult,
};
pub use types::{
    AddNoteOutcome,
    FieldMap,
    NotePayload,
};
