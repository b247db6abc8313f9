use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::mpsc::UnboundedSender;

use super::context::{
    Generation,
    TokenContext,
};
use crate::{
    anki::{
        AddNoteOutcome,
        PrecheckResult,
    },
    core::{
        LookupResult,
        ReaderError,
        Token,
    },
};

/// Completions of work spawned by the session, plus messages from the rendering surface.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Tokenized {
        generation: Generation,
        result: Result<Vec<Token>, ReaderError>,
    },
    LookedUp {
        context: TokenContext,
        result: Result<LookupResult, ReaderError>,
    },
    Rendered {
        context: TokenContext,
        revision: u64,
        result: Result<String, ReaderError>,
    },
    Prechecked {
        context: TokenContext,
        result: PrecheckResult,
    },
    NoteAdded {
        context: TokenContext,
        entry_index: usize,
        term: String,
        result: Result<AddNoteOutcome, ReaderError>,
    },
    Host(HostMessage),
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Tokenized { .. } => "tokenized",
            SessionEvent::LookedUp { .. } => "looked_up",
            SessionEvent::Rendered { .. } => "rendered",
            SessionEvent::Prechecked { .. } => "prechecked",
            SessionEvent::NoteAdded { .. } => "note_added",
            SessionEvent::Host(_) => "host_message",
        }
    }

    /// Host messages are posted from outside and are not tracked as in-flight work.
    pub fn is_task_completion(&self) -> bool {
        !matches!(self, SessionEvent::Host(_))
    }
}

/// Messages posted by the isolated dictionary view to its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "yomitan-iframe-height")]
    FrameHeight { height: f64 },
    #[serde(rename = "yomitan-add-note")]
    AddNote {
        #[serde(rename = "entryIndex")]
        entry_index: usize,
    },
}

impl HostMessage {
    /// Anything that is not one of the two known messages is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let message: HostMessage = serde_json::from_str(raw).ok()?;
        match message {
            HostMessage::FrameHeight { height } if !height.is_finite() || height < 0.0 => None,
            message => Some(message),
        }
    }
}

/// Handle given to the rendering surface. Delivery is best effort and at most once.
#[derive(Debug, Clone)]
pub struct HostLink {
    sender: UnboundedSender<SessionEvent>,
}

impl HostLink {
    pub(crate) fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }

    pub fn send(&self, message: HostMessage) -> bool {
        self.sender.send(SessionEvent::Host(message)).is_ok()
    }

    pub fn post(&self, raw: &str) -> bool {
        match HostMessage::parse(raw) {
            Some(message) => self.send(message),
            None => {
                tracing::debug!(raw, "Dropping unrecognized host message");
                false
            }
        }
    }
}

/// User-facing notifications the UI drains with `LookupSession::take_notices`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    ConnectionWarning,
    #[serde(rename_all = "camelCase")]
    NoteAdded {
        term: String,
        note_id: u64,
        errors: Vec<String>,
    },
    AddFailed {
        term: String,
        message: String,
    },
    LookupUnavailable {
        message: String,
    },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::ConnectionWarning => {
                "Could not reach AnkiConnect; duplicate status is unknown.".to_string()
            }
            Notice::NoteAdded { term, errors, .. } if errors.is_empty() => {
                format!("Added {term} to Anki.")
            }
            Notice::NoteAdded { term, errors, .. } => {
                format!("Added {term} to Anki with warnings: {}", errors.join("; "))
            }
            Notice::AddFailed { term, message } => format!("Could not add {term}: {message}"),
            Notice::LookupUnavailable { message } => format!("Lookup unavailable: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    /// The result belonged to an abandoned generation or an outdated render.
    Discarded,
}
