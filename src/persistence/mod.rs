use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::core::ReaderError;

const APP_NAME: &str = "yomine-reader";

/// Directory holding the reader's JSON data files.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn app_default() -> Self {
        let root = match dirs::data_local_dir() {
            Some(data_dir) => data_dir.join(APP_NAME),
            None => PathBuf::from("."),
        };
        Self { root }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn save_json<T: Serialize>(&self, data: &T, filename: &str) -> Result<(), ReaderError> {
        fs::create_dir_all(&self.root)?;
        let file_path = self.file_path(filename);
        let json = serde_json::to_string_pretty(data)?;
        fs::write(&file_path, json)?;
        tracing::debug!(path = %file_path.display(), "Data saved");
        Ok(())
    }

    pub fn load_json<T: for<'de> Deserialize<'de> + Default>(
        &self,
        filename: &str,
    ) -> Result<T, ReaderError> {
        let file_path = self.file_path(filename);

        if !file_path.exists() {
            return Ok(T::default());
        }

        let json = fs::read_to_string(&file_path)?;
        let data: T = serde_json::from_str(&json)?;
        tracing::debug!(path = %file_path.display(), "Data loaded");
        Ok(data)
    }

    pub fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(&self, filename: &str) -> T {
        match self.load_json::<T>(filename) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed to load {}: {}. Using defaults.", filename, e);
                T::default()
            }
        }
    }

    pub fn delete_data_file(&self, filename: &str) -> Result<(), ReaderError> {
        let file_path = self.file_path(filename);
        if file_path.exists() {
            fs::remove_file(&file_path)?;
            tracing::debug!(path = %file_path.display(), "Deleted data file");
        }
        Ok(())
    }

    pub fn data_file_exists(&self, filename: &str) -> bool {
        self.file_path(filename).exists()
    }
}

#[cfg(test)]
pub(crate) fn scratch_dir(name: &str) -> DataDir {
    let root = std::env::temp_dir().join(format!("yomine-reader-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&root);
    DataDir::at(root)
}
