use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::{read_json, write_json};

/// One successful generation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub url: String,
    pub prompt: String,
    pub timestamp: i64,
}

/// Past generations, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationHistory {
    pub path: PathBuf,
    pub schema_version: u64,
    pub items: Vec<HistoryItem>,
}

impl GenerationHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema_version: 1,
            items: Vec::new(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut history = Self::new(path.clone());
        let payload = read_json(&path).unwrap_or(Value::Object(Map::new()));
        let Some(obj) = payload.as_object() else {
            return history;
        };

        history.schema_version = obj
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(history.schema_version);
        if let Some(items) = obj.get("items").and_then(Value::as_array) {
            for item in items {
                if let Ok(parsed) = serde_json::from_value::<HistoryItem>(item.clone()) {
                    history.items.push(parsed);
                }
            }
        }
        history
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let mut payload = Map::new();
        payload.insert(
            "schema_version".to_string(),
            Value::Number(self.schema_version.into()),
        );
        payload.insert("items".to_string(), serde_json::to_value(&self.items)?);
        write_json(&self.path, Value::Object(payload))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Prepends a new entry. The id is the creation time in epoch
    /// milliseconds, suffixed when another entry already holds that id.
    pub fn record(
        &mut self,
        url: impl Into<String>,
        prompt: impl Into<String>,
        timestamp: i64,
    ) -> HistoryItem {
        let item = HistoryItem {
            id: self.unique_id(timestamp),
            url: url.into(),
            prompt: prompt.into(),
            timestamp,
        };
        self.items.insert(0, item.clone());
        item
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn delete(&mut self, id: &str) -> Option<HistoryItem> {
        let idx = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(idx))
    }

    pub fn navigator(&self) -> HistoryNavigator<'_> {
        HistoryNavigator::new(&self.items)
    }

    fn unique_id(&self, timestamp: i64) -> String {
        let base = timestamp.to_string();
        if self.get(&base).is_none() {
            return base;
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}-{suffix}");
            if self.get(&candidate).is_none() {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// Undo/redo over past generations, positioned by whichever entry's url
/// matches the image on display. Holds no state of its own.
#[derive(Debug, Clone, Copy)]
pub struct HistoryNavigator<'a> {
    items: &'a [HistoryItem],
}

impl<'a> HistoryNavigator<'a> {
    pub fn new(items: &'a [HistoryItem]) -> Self {
        Self { items }
    }

    pub fn position(&self, displayed_url: Option<&str>) -> Option<usize> {
        let url = displayed_url?;
        self.items.iter().position(|item| item.url == url)
    }

    pub fn can_undo(&self, displayed_url: Option<&str>) -> bool {
        self.position(displayed_url)
            .is_some_and(|idx| idx + 1 < self.items.len())
    }

    pub fn can_redo(&self, displayed_url: Option<&str>) -> bool {
        self.position(displayed_url).is_some_and(|idx| idx > 0)
    }

    /// The next older entry, if any.
    pub fn undo(&self, displayed_url: Option<&str>) -> Option<&'a HistoryItem> {
        let idx = self.position(displayed_url)?;
        self.items.get(idx + 1)
    }

    /// The next newer entry, if any.
    pub fn redo(&self, displayed_url: Option<&str>) -> Option<&'a HistoryItem> {
        let idx = self.position(displayed_url)?;
        idx.checked_sub(1).and_then(|newer| self.items.get(newer))
    }
}
