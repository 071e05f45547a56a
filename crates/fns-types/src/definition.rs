//! Exported descriptions of registered functions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Optional JSON schemas describing a function's input and signal payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signals: BTreeMap<String, Value>,
}

/// What the dry run discovered about one function, plus its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSummary {
    pub name: String,
    pub version: u32,
    /// Declared state keys and their initial values.
    pub states: BTreeMap<String, Value>,
    pub queries: Vec<String>,
    pub signals: Vec<String>,
    pub schema: Schema,
}

/// The `{checksum, definitions}` document served to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub checksum: String,
    pub definitions: Vec<DefinitionSummary>,
}
