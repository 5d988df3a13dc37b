use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::scan::Placeholder;

/// Placeholder → column-name table. One column per placeholder (last write
/// wins); a column may serve any number of placeholders.
#[derive(Clone, Debug, Default)]
pub struct MappingStore {
    entries: BTreeMap<String, String>,
}

/// Serialized form of the store. Tolerant on load: entries naming
/// placeholders absent from the current template are kept and stay inert
/// until a matching placeholder reappears.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingConfig {
    pub version: u32,
    pub mappings: BTreeMap<String, String>,
}

impl MappingStore {
    pub fn set(&mut self, placeholder: &str, column: &str) {
        self.entries
            .insert(placeholder.to_string(), column.to_string());
    }

    pub fn clear(&mut self, placeholder: &str) {
        self.entries.remove(placeholder);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.entries.get(placeholder).map(|s| s.as_str())
    }

    pub fn mapped_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn unmapped_placeholders(&self, all: &[Placeholder]) -> Vec<String> {
        all.iter()
            .filter(|p| !self.entries.contains_key(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MergeError> {
        let config = MappingConfig {
            version: 1,
            mappings: self.entries.clone(),
        };
        serde_json::to_vec_pretty(&config)
            .map_err(|e| MergeError::MalformedDocument(format!("serialize mapping: {e}")))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, MergeError> {
        let config: MappingConfig = serde_json::from_slice(bytes)
            .map_err(|e| MergeError::MalformedDocument(format!("parse mapping config: {e}")))?;
        Ok(Self {
            entries: config.mappings,
        })
    }
}
