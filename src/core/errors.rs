use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("Anki error: {message}")]
    AnkiConnect { action: String, message: String },

    #[error("No popup field mappings configured. Configure fields in Settings > Anki Connect.")]
    MissingFieldMappings,

    #[error("No popup model configured. Configure model in Settings > Anki Connect.")]
    MissingModel,

    #[error("Failed to add note to Anki.")]
    NoteRejected,

    #[error("Dictionary engine error: {0}")]
    Engine(String),

    #[error("ReaderError: {0}")]
    Custom(String),
}

impl ReaderError {
    /// AnkiConnect has no error codes, so the only signal that an action is
    /// missing from an older add-on build is the message text.
    pub fn is_unsupported_action(&self) -> bool {
        match self {
            ReaderError::AnkiConnect { message, .. } => {
                message == "unsupported action" || message.contains("unsupported action")
            }
            other => other.to_string().contains("unsupported action"),
        }
    }

    /// Errors that need the user to edit settings; never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ReaderError::MissingFieldMappings | ReaderError::MissingModel)
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(error: std::io::Error) -> Self {
        ReaderError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for ReaderError {
    fn from(error: reqwest::Error) -> Self {
        ReaderError::Reqwest(Box::new(error))
    }
}
