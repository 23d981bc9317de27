use crate::errors::{WikiError, WikiResult};
use crate::host::SettingsStore;
use crate::models::{default_categories, Category, Entry};
use std::sync::Arc;

pub const ENTRIES_KEY: &str = "wikiEntries";
pub const CATEGORIES_KEY: &str = "wikiCategories";

// Sole owner of the canonical collection. Every read decodes a fresh copy,
// so callers can mutate the result without touching shared state; the only
// way back in is a whole-collection write through the gateway.
#[derive(Clone)]
pub struct EntryStore {
    settings: Arc<dyn SettingsStore>,
}

impl EntryStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub fn read(&self) -> WikiResult<Vec<Entry>> {
        let raw = self
            .settings
            .get(ENTRIES_KEY)
            .map_err(|err| WikiError::Storage(err.to_string()))?;

        match raw {
            None => Ok(Vec::new()),
            Some(value) if value.is_null() => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|err| WikiError::Storage(format!("stored entries failed to decode: {err}"))),
        }
    }

    pub(crate) fn write(&self, entries: &[Entry]) -> WikiResult<()> {
        let value = serde_json::to_value(entries)?;
        self.settings
            .put(ENTRIES_KEY, value)
            .map_err(|err| WikiError::Storage(err.to_string()))
    }

    pub fn read_categories(&self) -> Vec<Category> {
        let raw = match self.settings.get(CATEGORIES_KEY) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "category read failed, using built-in defaults");
                return default_categories();
            }
        };

        let Some(value) = raw else {
            return default_categories();
        };

        match serde_json::from_value::<Vec<Category>>(value) {
            Ok(categories) if !categories.is_empty() => categories,
            Ok(_) => default_categories(),
            Err(err) => {
                tracing::warn!(error = %err, "stored categories failed to decode, using built-in defaults");
                default_categories()
            }
        }
    }

    pub(crate) fn write_categories(&self, categories: &[Category]) -> WikiResult<()> {
        let value = serde_json::to_value(categories)?;
        self.settings
            .put(CATEGORIES_KEY, value)
            .map_err(|err| WikiError::Storage(err.to_string()))
    }
}
