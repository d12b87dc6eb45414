//! The stored derivation-file record.
//!
//! Instantiation resolves an in-memory derivation graph into one JSON file
//! per node, with every input reference replaced by a store path. The file
//! is a build recipe for the realizer; its bytes are not part of any hash.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::HashMode;

/// A single named output of a derivation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrvOutput {
    /// Absolute store path the build must populate.
    pub path: String,
}

/// The resolved derivation record persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrvFile {
    /// Outputs by name; always the single key "out".
    pub outputs: BTreeMap<String, DrvOutput>,
    /// Derivation-file path of each input, mapped to the output names
    /// consumed (always `["out"]`).
    pub input_drvs: BTreeMap<String, Vec<String>>,
    /// Store paths of ingested source files.
    pub input_srcs: Vec<String>,
    /// Target system tag.
    pub system: String,
    /// Resolved builder executable.
    pub builder: String,
    /// Builder arguments.
    pub args: Vec<String>,
    /// Build environment, user bindings overlaid by the standard ones.
    pub env: BTreeMap<String, String>,
    /// Declared content hash, present iff this is a fixed-output
    /// derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    /// Hash mode accompanying `output_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash_mode: Option<HashMode>,
}

impl DrvFile {
    /// The path of the default output.
    pub fn out_path(&self) -> Option<&str> {
        self.outputs.get("out").map(|o| o.path.as_str())
    }

    /// Check if this records a fixed-output derivation.
    pub fn is_fixed_output(&self) -> bool {
        self.output_hash.is_some()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
