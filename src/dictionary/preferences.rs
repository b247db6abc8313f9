use std::collections::{
    HashMap,
    HashSet,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::persistence::DataDir;

pub const PREFERENCES_FILE: &str = "dictionary_preferences.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryPreference {
    pub title: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryPreferencesStore {
    pub version: u32,
    #[serde(default)]
    pub dictionaries: Vec<DictionaryPreference>,
}

impl Default for DictionaryPreferencesStore {
    fn default() -> Self {
        Self { version: 1, dictionaries: Vec::new() }
    }
}

pub fn load_preferences(data_dir: &DataDir) -> Vec<DictionaryPreference> {
    data_dir.load_json_or_default::<DictionaryPreferencesStore>(PREFERENCES_FILE).dictionaries
}

pub fn save_preferences(
    data_dir: &DataDir,
    preferences: &[DictionaryPreference],
) -> Result<(), crate::core::ReaderError> {
    let store = DictionaryPreferencesStore { version: 1, dictionaries: preferences.to_vec() };
    data_dir.save_json(&store, PREFERENCES_FILE)
}

/// Align stored preferences with what is actually installed. Installed order wins;
/// dictionaries without a stored preference start enabled.
pub fn normalize_preferences(
    installed_titles: &[String],
    existing: &[DictionaryPreference],
) -> Vec<DictionaryPreference> {
    let existing_map: HashMap<&str, &DictionaryPreference> =
        existing.iter().map(|item| (item.title.as_str(), item)).collect();
    let mut seen = HashSet::new();

    installed_titles
        .iter()
        .filter(|title| seen.insert(title.as_str()))
        .map(|title| DictionaryPreference {
            title: title.clone(),
            enabled: existing_map.get(title.as_str()).map(|item| item.enabled).unwrap_or(true),
        })
        .collect()
}

pub fn move_preference(
    preferences: &[DictionaryPreference],
    from_index: usize,
    to_index: usize,
) -> Vec<DictionaryPreference> {
    let mut next = preferences.to_vec();
    if from_index >= next.len() || to_index >= next.len() || from_index == to_index {
        return next;
    }

    let item = next.remove(from_index);
    next.insert(to_index, item);
    next
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnabledDictionary {
    pub name: String,
    pub index: usize,
    pub priority: i32,
}

/// Ranked set of dictionaries the engine should consult. Rank is the `index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnabledDictionaries {
    dictionaries: Vec<EnabledDictionary>,
}

impl EnabledDictionaries {
    pub fn from_preferences(preferences: &[DictionaryPreference]) -> Self {
        let dictionaries = preferences
            .iter()
            .filter(|item| item.enabled)
            .enumerate()
            .map(|(index, item)| EnabledDictionary { name: item.title.clone(), index, priority: 0 })
            .collect();
        Self { dictionaries }
    }

    pub fn get(&self, name: &str) -> Option<&EnabledDictionary> {
        self.dictionaries.iter().find(|item| item.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnabledDictionary> {
        self.dictionaries.iter()
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }
}
