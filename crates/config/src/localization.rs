//! User-facing string catalogs.
//!
//! A catalog is a flat JSON object mapping the English message (the key) to
//! its translation, stored as `<locales_dir>/<language>.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Loaded translations for one language.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    language: String,
    entries: HashMap<String, String>,
}

impl Translations {
    /// Load `<dir>/<language>.json`.
    pub fn load(dir: &Path, language: &str) -> Result<Self, LocaleError> {
        let path = dir.join(format!("{language}.json"));
        let content = std::fs::read_to_string(&path).map_err(|e| LocaleError::ReadError {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let entries: HashMap<String, String> =
            serde_json::from_str(&content).map_err(|e| LocaleError::ParseError {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(language, entries = entries.len(), "Localization loaded");
        Ok(Self {
            language: language.to_string(),
            entries,
        })
    }

    /// Build a catalog from in-memory pairs.
    pub fn from_pairs<I, K, V>(language: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            language: language.to_string(),
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The translated string, or the key itself when there is no entry.
    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocaleError {
    #[error("Failed to read localization {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse localization {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },
}
