use std::{
    collections::HashMap,
    sync::OnceLock,
};

use regex::{
    Captures,
    Regex,
};

use super::types::{
    BuiltNote,
    DuplicateOptions,
    FieldMap,
    NotePayload,
};
use crate::{
    core::{
        DictionaryEntry,
        ReaderError,
        VolumeMetadata,
    },
    settings::AnkiConnectSettings,
};

const DEFAULT_DECK: &str = "Default";

pub const FIELD_MARKERS: &[&str] = &[
    "dictionary",
    "expression",
    "furigana-plain",
    "glossary",
    "glossary-first",
    "reading",
    "search-query",
    "sentence",
];

/// Markers usable in field templates, sorted.
pub fn field_markers() -> Vec<&'static str> {
    let mut markers = FIELD_MARKERS.to_vec();
    markers.sort_unstable();
    markers
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_-]+)\}").expect("static regex"))
}

/// Substitute `{series}` / `{volume}` in deck names and tag strings. Whitespace in
/// values becomes `_` so a title stays one tag. Unknown or missing values stay literal.
pub fn resolve_dynamic_tags(template: &str, metadata: &VolumeMetadata) -> String {
    marker_regex()
        .replace_all(template, |captures: &Captures| {
            let value = match &captures[1] {
                "series" => metadata.series_title.as_deref(),
                "volume" => metadata.volume_title.as_deref(),
                _ => None,
            };
            match value.map(str::trim).filter(|value| !value.is_empty()) {
                Some(value) => value.split_whitespace().collect::<Vec<_>>().join("_"),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// Builds flashcard notes from dictionary entries using the popup field mappings.
#[derive(Debug, Clone)]
pub struct NoteBuilder {
    settings: AnkiConnectSettings,
}

impl NoteBuilder {
    pub fn new(settings: AnkiConnectSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnkiConnectSettings {
        &self.settings
    }

    /// Configuration problems are returned as errors and must not be retried;
    /// template problems are collected in `BuiltNote::errors`.
    pub fn build(
        &self,
        entry: &DictionaryEntry,
        source_text: &str,
        metadata: Option<&VolumeMetadata>,
    ) -> Result<BuiltNote, ReaderError> {
        let mappings: Vec<(String, String)> = self
            .settings
            .popup_field_mappings
            .iter()
            .map(|(field, template)| (field.trim().to_string(), template.trim().to_string()))
            .filter(|(field, template)| !field.is_empty() && !template.is_empty())
            .collect();

        if mappings.is_empty() {
            return Err(ReaderError::MissingFieldMappings);
        }

        let model_name = self.settings.popup_model_name.trim();
        if model_name.is_empty() {
            return Err(ReaderError::MissingModel);
        }

        let deck_name = match metadata {
            Some(metadata) => resolve_dynamic_tags(&self.settings.popup_deck_name, metadata),
            None => self.settings.popup_deck_name.clone(),
        };
        let deck_name = match deck_name.trim() {
            "" => DEFAULT_DECK.to_string(),
            name => name.to_string(),
        };

        let tags_text = match metadata {
            Some(metadata) => resolve_dynamic_tags(&self.settings.tags, metadata),
            None => self.settings.tags.clone(),
        };
        let tags: Vec<String> = tags_text
            .split(' ')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();

        let values = marker_values(entry, source_text);
        let mut errors = Vec::new();
        let fields: FieldMap = mappings
            .iter()
            .map(|(field, template)| {
                (field.as_str(), render_template(template, &values, &mut errors))
            })
            .collect();

        Ok(BuiltNote {
            note: NotePayload {
                deck_name,
                model_name: model_name.to_string(),
                fields,
                tags,
                duplicate_options: DuplicateOptions::default(),
            },
            errors,
        })
    }
}

fn marker_values(entry: &DictionaryEntry, source_text: &str) -> HashMap<&'static str, String> {
    let reading = if entry.reading.is_empty() { entry.expression.clone() } else { entry.reading.clone() };
    let furigana = if reading == entry.expression {
        entry.expression.clone()
    } else {
        format!("{}[{}]", entry.expression, reading)
    };
    let glossary = match entry.definitions.len() {
        0 => String::new(),
        1 => entry.definitions[0].clone(),
        _ => format!(
            "<ol>{}</ol>",
            entry.definitions.iter().map(|d| format!("<li>{d}</li>")).collect::<String>()
        ),
    };

    HashMap::from([
        ("dictionary", entry.dictionary.clone()),
        ("expression", entry.expression.clone()),
        ("furigana-plain", furigana),
        ("glossary", glossary),
        ("glossary-first", entry.definitions.first().cloned().unwrap_or_default()),
        ("reading", reading),
        ("search-query", source_text.to_string()),
        ("sentence", source_text.to_string()),
    ])
}

fn render_template(
    template: &str,
    values: &HashMap<&'static str, String>,
    errors: &mut Vec<String>,
) -> String {
    marker_regex()
        .replace_all(template, |captures: &Captures| match values.get(&captures[1]) {
            Some(value) => value.clone(),
            None => {
                let message = format!("Unknown field marker: {}", &captures[0]);
                if !errors.contains(&message) {
                    errors.push(message);
                }
                String::new()
            }
        })
        .into_owned()
}
