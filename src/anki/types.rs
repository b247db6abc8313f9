use std::fmt;

use serde::{
    de::{
        MapAccess,
        Visitor,
    },
    ser::SerializeMap,
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

/// Field name to value map that keeps insertion order. AnkiConnect treats the
/// first field of a note as the one duplicates are keyed on, so order matters
/// both in settings and in note payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(Vec<(String, String)>);

impl FieldMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Replaces the value of an existing field in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(existing, _)| existing == name).map(|(_, value)| value.as_str())
    }

    pub fn first(&self) -> Option<(&str, &str)> {
        self.0.first().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct FieldMapVisitor;

impl<'de> Visitor<'de> for FieldMapVisitor {
    type Value = FieldMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of field names to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
        let mut map = FieldMap::new();
        while let Some((name, value)) = access.next_entry::<String, String>()? {
            map.insert(name, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldMapVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateScopeOptions {
    pub deck_name: Option<String>,
    pub check_children: bool,
    pub check_all_models: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
    pub duplicate_scope_options: DuplicateScopeOptions,
}

impl Default for DuplicateOptions {
    fn default() -> Self {
        Self {
            allow_duplicate: true,
            duplicate_scope: "collection".to_string(),
            duplicate_scope_options: DuplicateScopeOptions {
                deck_name: None,
                check_children: false,
                check_all_models: false,
            },
        }
    }
}

/// A note as sent to AnkiConnect's `addNote` / `canAddNotes` family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    pub deck_name: String,
    pub model_name: String,
    pub fields: FieldMap,
    pub tags: Vec<String>,
    #[serde(rename = "options")]
    pub duplicate_options: DuplicateOptions,
}

impl NotePayload {
    /// Copy keyed only on the first field, so incidental fields (sentence,
    /// glossary) don't make near-identical notes look distinct.
    pub fn stripped_to_first_field(&self) -> NotePayload {
        let mut stripped = self.clone();
        if let Some((name, value)) = self.fields.first() {
            stripped.fields = FieldMap::from_iter([(name, value)]);
        }
        stripped
    }

    pub fn with_allow_duplicate(&self, allow_duplicate: bool) -> NotePayload {
        let mut note = self.clone();
        note.duplicate_options.allow_duplicate = allow_duplicate;
        note
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanAddDetail {
    pub can_add: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// A note built from a dictionary entry, with any template problems found on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltNote {
    pub note: NotePayload,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNoteOutcome {
    pub note_id: u64,
    pub errors: Vec<String>,
}
