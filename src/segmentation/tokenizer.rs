use wana_kana::utils::{
    is_char_kana,
    is_char_kanji,
};

use crate::{
    core::{
        utils::normalize_source_text,
        ReaderError,
        TextSegment,
        Token,
        TokenKind,
    },
    dictionary::{
        DictionaryEngine,
        EnabledDictionaries,
    },
};

/// Segment a text selection into tokens. Multi-line input is normalized first.
/// Engine failures are returned as-is; the caller shows them as "lookup unavailable".
pub async fn tokenize(
    engine: &dyn DictionaryEngine,
    text: &str,
    dictionaries: &EnabledDictionaries,
) -> Result<Vec<Token>, ReaderError> {
    let normalized = normalize_source_text(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let segments = engine.tokenize(&normalized, dictionaries).await?;
    let tokens: Vec<Token> = segments.into_iter().filter_map(segment_to_token).collect();

    tracing::debug!(
        chars = normalized.chars().count(),
        tokens = tokens.len(),
        selectable = tokens.iter().filter(|t| t.selectable).count(),
        "Tokenized selection"
    );
    Ok(tokens)
}

pub fn segment_to_token(segment: TextSegment) -> Option<Token> {
    let text = segment.text.trim();
    if text.is_empty() {
        return None;
    }

    let term = match segment.term.trim() {
        "" => text.to_string(),
        term => term.to_string(),
    };
    let kind = classify(text);

    Some(Token {
        text: text.to_string(),
        reading: segment.reading.trim().to_string(),
        term,
        selectable: kind == TokenKind::Word,
        kind,
    })
}

pub fn classify(text: &str) -> TokenKind {
    if text.chars().any(|c| is_char_kana(c) || is_char_kanji(c) || c.is_alphanumeric()) {
        TokenKind::Word
    } else if text.chars().all(is_punctuation) {
        TokenKind::Punct
    } else {
        TokenKind::Other
    }
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c,
            '\u{2010}'..='\u{206F}' // general punctuation: ‥ … ― ‼
            | '\u{3000}'..='\u{303F}' // 、。「」『』〜
            | '\u{FF01}'..='\u{FF0F}'
            | '\u{FF1A}'..='\u{FF20}'
            | '\u{FF3B}'..='\u{FF40}'
            | '\u{FF5B}'..='\u{FF65}')
}
