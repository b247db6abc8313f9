use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use super::{
    DictionaryEngine,
    EnabledDictionaries,
    RenderOptions,
};
use crate::core::{
    DictionaryEntry,
    LookupResult,
    ReaderError,
    TextSegment,
};

type EngineFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn DictionaryEngine>, ReaderError>> + Send + Sync>;

/// Process-wide engine that is only built on first use. Loading the dictionary
/// database is slow, so the first caller pays for it and everyone else shares it.
pub struct SharedEngine {
    instance: OnceCell<Arc<dyn DictionaryEngine>>,
    factory: EngineFactory,
}

impl SharedEngine {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn DictionaryEngine>, ReaderError>>
            + Send
            + Sync
            + 'static,
    {
        Self { instance: OnceCell::new(), factory: Box::new(factory) }
    }

    pub fn is_initialized(&self) -> bool {
        self.instance.initialized()
    }

    /// Failed initializations are not cached; the next call tries again.
    pub async fn instance(&self) -> Result<Arc<dyn DictionaryEngine>, ReaderError> {
        let engine = self
            .instance
            .get_or_try_init(|| async {
                tracing::info!("Initializing dictionary engine");
                (self.factory)().await
            })
            .await?;
        Ok(engine.clone())
    }
}

impl DictionaryEngine for SharedEngine {
    fn tokenize<'a>(
        &'a self,
        text: &'a str,
        dictionaries: &'a EnabledDictionaries,
    ) -> BoxFuture<'a, Result<Vec<TextSegment>, ReaderError>> {
        Box::pin(async move { self.instance().await?.tokenize(text, dictionaries).await })
    }

    fn lookup<'a>(
        &'a self,
        term: &'a str,
        dictionaries: &'a EnabledDictionaries,
    ) -> BoxFuture<'a, Result<LookupResult, ReaderError>> {
        Box::pin(async move { self.instance().await?.lookup(term, dictionaries).await })
    }

    fn render_entries<'a>(
        &'a self,
        entries: &'a [DictionaryEntry],
        options: &'a RenderOptions,
    ) -> BoxFuture<'a, Result<String, ReaderError>> {
        Box::pin(async move { self.instance().await?.render_entries(entries, options).await })
    }
}
