use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    anki::types::FieldMap,
    core::ReaderError,
    persistence::DataDir,
};

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_ANKI_CONNECT_URL: &str = "http://127.0.0.1:8765";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnkiConnectSettings {
    pub enabled: bool,
    pub url: String,
    pub popup_deck_name: String,
    pub popup_model_name: String,
    /// Anki field name -> template with markers such as `{expression}`.
    pub popup_field_mappings: FieldMap,
    /// Space separated, may contain `{series}` / `{volume}` placeholders.
    pub tags: String,
}

impl Default for AnkiConnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_ANKI_CONNECT_URL.to_string(),
            popup_deck_name: "Default".to_string(),
            popup_model_name: "Basic".to_string(),
            popup_field_mappings: FieldMap::new(),
            tags: String::new(),
        }
    }
}

impl AnkiConnectSettings {
    pub fn url_or_default(&self) -> &str {
        match self.url.trim() {
            "" => DEFAULT_ANKI_CONNECT_URL,
            url => url,
        }
    }
}

// Every field defaults so settings written by older versions keep loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderSettings {
    pub yomitan_popup_on_text_box_tap: bool,
    pub anki_connect_settings: AnkiConnectSettings,
}

impl ReaderSettings {
    pub fn load(data_dir: &DataDir) -> Self {
        data_dir.load_json_or_default(SETTINGS_FILE)
    }

    pub fn save(&self, data_dir: &DataDir) -> Result<(), ReaderError> {
        data_dir.save_json(self, SETTINGS_FILE)
    }
}
