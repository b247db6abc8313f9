use futures::future::BoxFuture;
use serde::Serialize;

use crate::{
    core::{
        DictionaryEntry,
        LookupResult,
        ReaderError,
        TextSegment,
    },
    session::buttons::ButtonUiState,
};

pub mod preferences;
pub mod shared;

pub use preferences::{
    DictionaryPreference,
    EnabledDictionaries,
};
pub use shared::SharedEngine;

/// Options handed to the renderer alongside the entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub anki_enabled: bool,
    pub anki_button_states: Vec<ButtonUiState>,
}

/// The external dictionary engine: segmentation, term lookup and entry rendering.
pub trait DictionaryEngine: Send + Sync {
    fn tokenize<'a>(
        &'a self,
        text: &'a str,
        dictionaries: &'a EnabledDictionaries,
    ) -> BoxFuture<'a, Result<Vec<TextSegment>, ReaderError>>;

    fn lookup<'a>(
        &'a self,
        term: &'a str,
        dictionaries: &'a EnabledDictionaries,
    ) -> BoxFuture<'a, Result<LookupResult, ReaderError>>;

    /// Returns a complete HTML document for the isolated rendering surface.
    fn render_entries<'a>(
        &'a self,
        entries: &'a [DictionaryEntry],
        options: &'a RenderOptions,
    ) -> BoxFuture<'a, Result<String, ReaderError>>;
}
