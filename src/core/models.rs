use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    Punct,
    Other,
}

/// One segment of a tokenized selection. Only `selectable` tokens can be looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub reading: String,
    pub term: String,
    pub selectable: bool,
    pub kind: TokenKind,
}

impl Token {
    /// Text sent to the dictionary lookup, whitespace removed.
    pub fn lookup_text(&self) -> String {
        let source = if self.term.trim().is_empty() { &self.text } else { &self.term };
        source.split_whitespace().collect()
    }
}

/// Raw segment as produced by the dictionary engine's parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    #[serde(default)]
    pub reading: String,
    #[serde(default)]
    pub term: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryEntry {
    pub expression: String,
    #[serde(default)]
    pub reading: String,
    #[serde(default)]
    pub dictionary: String,
    #[serde(default)]
    pub definitions: Vec<String>,
    // Engine-specific data, passed back untouched to the renderer
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub entries: Vec<DictionaryEntry>,
    pub original_text_length: usize,
}

/// Context about the page the selection came from, used for deck and tag placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMetadata {
    pub series_title: Option<String>,
    pub volume_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_text_prefers_term_and_strips_whitespace() {
        let token = Token {
            text: "食べた".to_string(),
            reading: "たべた".to_string(),
            term: "食べる".to_string(),
            selectable: true,
            kind: TokenKind::Word,
        };
        assert_eq!(token.lookup_text(), "食べる");

        let spaced = Token { term: String::new(), text: "日本 語".to_string(), ..token };
        assert_eq!(spaced.lookup_text(), "日本語");
    }
}
