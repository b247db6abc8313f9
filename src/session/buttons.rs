use serde::{
    Deserialize,
    Serialize,
};

pub const COULD_NOT_VERIFY_TITLE: &str = "Could not verify duplicates; add may create a duplicate.";
pub const ALREADY_EXISTS_TITLE: &str = "Already exists in Anki; adding another copy.";
pub const LIKELY_DUPLICATE_TITLE: &str = "Likely duplicate in Anki; adding another copy.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    Checking,
    Ready,
    Duplicate,
    Adding,
    Added,
    Error,
    Unknown,
}

impl ButtonState {
    pub fn label(self) -> &'static str {
        match self {
            ButtonState::Checking => "Checking...",
            ButtonState::Ready => "Add to Anki",
            ButtonState::Duplicate => "Add duplicate",
            ButtonState::Adding => "Adding...",
            ButtonState::Added => "Added ✓",
            ButtonState::Error => "Retry",
            ButtonState::Unknown => "Add to Anki",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            ButtonState::Checking => "Checking Anki for duplicates...",
            ButtonState::Ready => "Add this entry to Anki.",
            ButtonState::Duplicate => LIKELY_DUPLICATE_TITLE,
            ButtonState::Adding => "Adding to Anki...",
            ButtonState::Added => "Added to Anki.",
            ButtonState::Error => "Adding failed; click to retry.",
            ButtonState::Unknown => COULD_NOT_VERIFY_TITLE,
        }
    }

    pub fn is_disabled(self) -> bool {
        matches!(self, ButtonState::Checking | ButtonState::Adding | ButtonState::Added)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ButtonState::Checking => "checking",
            ButtonState::Ready => "ready",
            ButtonState::Duplicate => "duplicate",
            ButtonState::Adding => "adding",
            ButtonState::Added => "added",
            ButtonState::Error => "error",
            ButtonState::Unknown => "unknown",
        }
    }

    /// Allowed edges of the per-entry state machine.
    pub fn can_transition_to(self, next: ButtonState) -> bool {
        use ButtonState::*;
        match (self, next) {
            (Checking, Ready | Duplicate | Unknown) => true,
            (Ready | Duplicate | Unknown | Error, Adding) => true,
            (Adding, Added | Error) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonUiState {
    pub state: ButtonState,
    pub disabled: bool,
    pub label: String,
    pub title: String,
}

impl ButtonUiState {
    pub fn new(state: ButtonState) -> Self {
        Self {
            state,
            disabled: state.is_disabled(),
            label: state.label().to_string(),
            title: state.default_title().to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Per-entry button states for the active token. Replaced wholesale when the token changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryButtons {
    states: Vec<ButtonUiState>,
}

impl EntryButtons {
    pub fn checking(count: usize) -> Self {
        Self { states: vec![ButtonUiState::new(ButtonState::Checking); count] }
    }

    pub fn states(&self) -> &[ButtonUiState] {
        &self.states
    }

    pub fn get(&self, index: usize) -> Option<&ButtonUiState> {
        self.states.get(index)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Install precheck results. The list is padded or cut to the entry count so
    /// positions always line up with the rendered entries.
    pub fn apply_precheck(&mut self, states: Vec<ButtonUiState>) {
        let count = self.states.len();
        let mut states = states;
        states.resize(count, ButtonUiState::new(ButtonState::Unknown));
        self.states = states;
    }

    /// `checking -> ready` etc. Returns false and leaves the state alone for an illegal edge.
    pub fn transition(&mut self, index: usize, next: ButtonUiState) -> bool {
        match self.states.get_mut(index) {
            Some(current) if current.state.can_transition_to(next.state) => {
                *current = next;
                true
            }
            Some(current) => {
                tracing::warn!(
                    index,
                    from = current.state.as_str(),
                    to = next.state.as_str(),
                    "Ignoring invalid button transition"
                );
                false
            }
            None => false,
        }
    }

    pub fn begin_add(&mut self, index: usize) -> bool {
        match self.states.get(index) {
            Some(current) if !current.disabled => {
                self.transition(index, ButtonUiState::new(ButtonState::Adding))
            }
            _ => false,
        }
    }

    pub fn finish_add(&mut self, index: usize, result: Result<(), String>) -> bool {
        let next = match result {
            Ok(()) => ButtonUiState::new(ButtonState::Added),
            Err(message) => ButtonUiState::new(ButtonState::Error).with_title(message),
        };
        self.transition(index, next)
    }
}
