use std::sync::OnceLock;

use regex::Regex;

fn whitespace_regex() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Trim each line, drop empty ones, join and strip the remaining whitespace.
/// OCR'd Japanese text boxes wrap mid-word, so no separator is inserted.
pub fn normalize_source_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let joined: String = lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .collect();

    whitespace_regex().replace_all(&joined, "").trim().to_string()
}

pub fn normalize_source_text(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    normalize_source_lines(&lines)
}

pub fn code_point_preview(value: &str, limit: usize) -> Vec<String> {
    value.chars().take(limit).map(|c| format!("U+{:04X}", c as u32)).collect()
}
