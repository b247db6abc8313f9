pub mod anki;
pub mod core;
pub mod dictionary;
pub mod persistence;
pub mod segmentation;
pub mod session;
pub mod settings;

pub use anki::{
    AnkiConnectClient,
    AnkiNoteService,
    FlashcardConnector,
    PrecheckResult,
};
pub use crate::core::{
    ReaderError,
    Token,
    TokenKind,
};
pub use dictionary::{
    DictionaryEngine,
    EnabledDictionaries,
    SharedEngine,
};
pub use session::{
    LookupSession,
    SessionPhase,
};
pub use settings::ReaderSettings;
