pub mod debug;
pub mod errors;
pub mod models;
pub mod utils;

pub use errors::ReaderError;
pub use models::{
    DictionaryEntry,
    LookupResult,
    TextSegment,
    Token,
    TokenKind,
    VolumeMetadata,
};
