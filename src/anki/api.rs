use std::time::Duration;

use futures::future::{
    try_join_all,
    BoxFuture,
};
use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Value,
};
use tokio::time::sleep;

use super::types::{
    CanAddDetail,
    NotePayload,
};
use crate::core::ReaderError;

const API_VERSION: u32 = 6;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self, action: &str) -> Result<Option<T>, ReaderError> {
        match self.error {
            Some(message) => {
                Err(ReaderError::AnkiConnect { action: action.to_string(), message })
            }
            None => Ok(self.result),
        }
    }
}

/// The flashcard backend operations the reader relies on.
pub trait AnkiBackend: Send + Sync {
    fn create_deck<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), ReaderError>>;

    /// `None` when Anki accepted the request but created nothing.
    fn add_note<'a>(&'a self, note: &'a NotePayload)
        -> BoxFuture<'a, Result<Option<u64>, ReaderError>>;

    /// Not available on older AnkiConnect builds ("unsupported action").
    fn can_add_notes_with_error_detail<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<CanAddDetail>, ReaderError>>;

    fn can_add_notes<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<bool>, ReaderError>>;

    /// Ids of existing notes matching each note's first field, one list per note.
    fn find_note_ids<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<Vec<u64>>, ReaderError>>;

    fn sync(&self) -> BoxFuture<'_, Result<(), ReaderError>>;
}

#[derive(Debug, Clone)]
pub struct AnkiConnectClient {
    client: Client,
    url: String,
}

impl AnkiConnectClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ReaderError> {
        let client = Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS)).build()?;
        Ok(Self { client, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn make_request<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        params: Option<Value>,
    ) -> Result<Option<T>, ReaderError> {
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), Value::String(action.to_string()));
        body.insert("version".to_string(), Value::Number(API_VERSION.into()));

        if let Some(params) = params {
            body.insert("params".to_string(), params);
        }

        tracing::trace!(action, url = %self.url, "AnkiConnect request");
        let response: ApiResponse<T> =
            self.client.post(&self.url).json(&body).send().await?.json().await?;

        response.into_result(action)
    }

    async fn request<T: for<'de> Deserialize<'de> + Default>(
        &self,
        action: &str,
        params: Option<Value>,
    ) -> Result<T, ReaderError> {
        Ok(self.make_request(action, params).await?.unwrap_or_default())
    }

    //Will just use to check if ankiconnect is online
    pub async fn version(&self) -> Result<u32, ReaderError> {
        self.request("version", None).await
    }

    pub async fn find_notes(&self, query: &str) -> Result<Vec<u64>, ReaderError> {
        self.request("findNotes", Some(json!({ "query": query }))).await
    }
}

impl AnkiBackend for AnkiConnectClient {
    fn create_deck<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), ReaderError>> {
        Box::pin(async move {
            self.make_request::<Value>("createDeck", Some(json!({ "deck": name }))).await?;
            Ok(())
        })
    }

    fn add_note<'a>(
        &'a self,
        note: &'a NotePayload,
    ) -> BoxFuture<'a, Result<Option<u64>, ReaderError>> {
        Box::pin(async move { self.make_request("addNote", Some(json!({ "note": note }))).await })
    }

    fn can_add_notes_with_error_detail<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<CanAddDetail>, ReaderError>> {
        Box::pin(async move {
            self.request("canAddNotesWithErrorDetail", Some(json!({ "notes": notes }))).await
        })
    }

    fn can_add_notes<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<bool>, ReaderError>> {
        Box::pin(async move { self.request("canAddNotes", Some(json!({ "notes": notes }))).await })
    }

    fn find_note_ids<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<Vec<u64>>, ReaderError>> {
        Box::pin(async move {
            let queries: Vec<String> = notes.iter().map(duplicate_query).collect();
            try_join_all(queries.iter().map(|query| self.find_notes(query))).await
        })
    }

    fn sync(&self) -> BoxFuture<'_, Result<(), ReaderError>> {
        Box::pin(async move {
            self.make_request::<Value>("sync", None).await?;
            Ok(())
        })
    }
}

/// Search query matching notes that would collide with `note` on its first field.
pub fn duplicate_query(note: &NotePayload) -> String {
    let mut terms = Vec::new();

    let scope = &note.duplicate_options;
    if scope.duplicate_scope == "deck" {
        let deck = scope.duplicate_scope_options.deck_name.as_deref().unwrap_or(&note.deck_name);
        terms.push(quote_term(&format!("deck:{deck}")));
    }
    if !scope.duplicate_scope_options.check_all_models {
        terms.push(quote_term(&format!("note:{}", note.model_name)));
    }
    if let Some((field, value)) = note.fields.first() {
        terms.push(quote_term(&format!("{field}:{value}")));
    }

    terms.join(" ")
}

fn quote_term(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

pub async fn wait_awake(
    client: &AnkiConnectClient,
    wait_time: u64,
    max_attempts: u32,
) -> Result<bool, ReaderError> {
    for attempt in 1..=max_attempts {
        match client.version().await {
            Ok(version) => {
                tracing::info!(version, "AnkiConnect is online");
                return Ok(true);
            }
            Err(err) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    "AnkiConnect unreachable, retrying in {}s: {}",
                    wait_time,
                    err
                );
                if attempt < max_attempts {
                    sleep(Duration::from_secs(wait_time)).await;
                }
            }
        }
    }
    Ok(false)
}
