//! Workflow definitions
//!
//! Loads step trees from JSON or TOML. A document is either a bare array of
//! steps or an object with a `steps` array and an optional `name`:
//!
//! ```toml
//! name = "onboarding"
//!
//! [[steps]]
//! type = "task"
//! name = "create_account"
//! input = { email = "${input.email}" }
//! ```

use std::path::Path;

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::executor::{Step, StepError};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported workflow file extension: {0}")]
    UnsupportedFormat(String),

    #[error("invalid workflow: {0}")]
    Invalid(#[from] StepError),
}

/// A parsed workflow with its version hash
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub name: Option<String>,
    pub steps: Vec<Step>,
    /// SHA-256 hex digest of the source text
    pub version_hash: String,
}

impl WorkflowDefinition {
    pub fn from_json_str(source: &str) -> Result<Self, DefinitionError> {
        let document: JsonValue = serde_json::from_str(source)?;
        Self::from_document(document, source)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, DefinitionError> {
        let document: toml::Value = toml::from_str(source)?;
        Self::from_document(toml_to_json(document), source)
    }

    /// Load a `.json` or `.toml` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut definition = match extension.as_str() {
            "json" => Self::from_json_str(&source)?,
            "toml" => Self::from_toml_str(&source)?,
            other => return Err(DefinitionError::UnsupportedFormat(other.to_string())),
        };

        if definition.name.is_none() {
            definition.name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string);
        }

        tracing::debug!(
            path = %path.display(),
            version = &definition.version_hash[..8],
            steps = definition.steps.len(),
            "loaded workflow definition"
        );
        Ok(definition)
    }

    fn from_document(document: JsonValue, source: &str) -> Result<Self, DefinitionError> {
        let (name, steps) = match document {
            JsonValue::Object(mut fields) => {
                let name = fields
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string);
                let steps = fields.remove("steps").ok_or_else(|| {
                    StepError::UnknownStepShape("workflow document has no 'steps'".to_string())
                })?;
                (name, steps)
            }
            steps => (None, steps),
        };

        Ok(Self {
            name,
            steps: Step::list_from_value(steps)?,
            version_hash: hash_source(source),
        })
    }
}

/// Hash workflow source using SHA256
fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn toml_to_json(value: toml::Value) -> JsonValue {
    match value {
        toml::Value::String(s) => JsonValue::String(s),
        toml::Value::Integer(i) => JsonValue::from(i),
        toml::Value::Float(f) => crate::resolver::value::number_value(f),
        toml::Value::Boolean(b) => JsonValue::Bool(b),
        toml::Value::Datetime(dt) => JsonValue::String(dt.to_string()),
        toml::Value::Array(items) => JsonValue::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => JsonValue::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}
