//! The structured document a transformed script writes on completion.
//!
//! The document is a JSON object with exactly two top-level keys:
//! `model` (opaque, built by the simulation bindings) and `simulation`
//! (`inputs`, `outputs`, `run`). Its canonical text form sorts keys at every
//! level, indents by two spaces and ends with three newlines.

mod ncb;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{IntrospectError, Result};

pub use ncb::{ncb_skeleton, NCB_MODEL_KEYS, NCB_RUN_KEYS};

pub const DOCUMENT_EXTENSION: &str = "json";
pub const DOCUMENT_TRAILER: &str = "\n\n\n";

const TOP_LEVEL_KEYS: [&str; 2] = ["model", "simulation"];
const SIMULATION_KEYS: [&str; 3] = ["inputs", "outputs", "run"];

/// A validated captured document.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedDocument {
    model: Value,
    simulation: Map<String, Value>,
}

impl CapturedDocument {
    /// Validate a parsed JSON value against the document shape.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(IntrospectError::InvalidDocument(
                "top level is not an object".into(),
            ));
        };

        let mut keys: Vec<&str> = root.keys().map(String::as_str).collect();
        keys.sort_unstable();
        if keys != TOP_LEVEL_KEYS {
            return Err(IntrospectError::InvalidDocument(format!(
                "expected top-level keys {:?}, found {:?}",
                TOP_LEVEL_KEYS, keys
            )));
        }

        let model = root.remove("model").unwrap_or(Value::Null);
        let Some(Value::Object(simulation)) = root.remove("simulation") else {
            return Err(IntrospectError::InvalidDocument(
                "`simulation` is not an object".into(),
            ));
        };
        if let Some(missing) = SIMULATION_KEYS
            .iter()
            .find(|k| !simulation.contains_key(**k))
        {
            return Err(IntrospectError::InvalidDocument(format!(
                "`simulation` is missing `{missing}`"
            )));
        }

        Ok(Self { model, simulation })
    }

    /// Read the document a child process wrote.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(IntrospectError::MissingOutput {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(IntrospectError::io(path, e)),
        };
        text.parse()
    }

    pub fn model(&self) -> &Value {
        &self.model
    }

    pub fn simulation(&self) -> &Map<String, Value> {
        &self.simulation
    }

    pub fn inputs(&self) -> &Value {
        &self.simulation["inputs"]
    }

    pub fn outputs(&self) -> &Value {
        &self.simulation["outputs"]
    }

    pub fn run(&self) -> &Value {
        &self.simulation["run"]
    }

    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert("model".to_string(), self.model.clone());
        root.insert(
            "simulation".to_string(),
            Value::Object(self.simulation.clone()),
        );
        Value::Object(root)
    }

    /// Sorted keys, two-space indentation, three trailing newlines.
    pub fn to_canonical_string(&self) -> Result<String> {
        canonical_string(&self.to_value())
    }

    /// Overlay the captured structure onto the NCB default document.
    pub fn to_ncb(&self) -> Value {
        let mut doc = ncb_skeleton();

        if let (Some(model), Some(target)) =
            (self.model.as_object(), doc["model"].as_object_mut())
        {
            for key in NCB_MODEL_KEYS {
                if let Some(v) = model.get(key) {
                    target.insert(key.to_string(), v.clone());
                }
            }
        }

        if let Some(target) = doc["simulation"].as_object_mut() {
            for key in ["inputs", "outputs"] {
                if let Some(v) = self.simulation.get(key).filter(|v| v.is_array()) {
                    target.insert(key.to_string(), v.clone());
                }
            }
            if let Some(run) = self.simulation.get("run").and_then(Value::as_object) {
                for key in NCB_RUN_KEYS {
                    if let Some(v) = run.get(key) {
                        target.insert(key.to_string(), v.clone());
                    }
                }
            }
        }

        doc
    }
}

impl FromStr for CapturedDocument {
    type Err = IntrospectError;

    fn from_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }
}

/// Canonical text of any JSON value.
///
/// `serde_json::Map` is ordered by key, so pretty printing already sorts.
pub fn canonical_string(value: &Value) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push_str(DOCUMENT_TRAILER);
    Ok(text)
}
