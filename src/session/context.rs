use std::fmt;

/// Monotonic id of a token activation. Async results carry the generation they
/// were issued under and are dropped if it is no longer current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Created once per activation and moved into every task issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub generation: Generation,
    pub token_index: usize,
    pub lookup_text: String,
}

impl TokenContext {
    pub fn is_current(&self, live: Generation) -> bool {
        self.generation == live
    }
}
