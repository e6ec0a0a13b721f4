//! Executor error types

use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

use crate::resolver::ResolveError;

/// A failure raised while running one step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{step}' expected an array of items, found {found}")]
    ItemsTypeMismatch { step: String, found: String },

    #[error("while loop '{step}' exceeded maximum iterations ({max})")]
    LoopCeilingExceeded { step: String, max: usize },

    #[error("unrecognized step: {0}")]
    UnknownStepShape(String),

    #[error("step '{step}': {source}")]
    Resolve {
        step: String,
        #[source]
        source: ResolveError,
    },

    #[error("task '{task}' failed: {source}")]
    Callback {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("all {count} branches of '{step}' failed")]
    BranchesExhausted {
        step: String,
        count: usize,
        #[source]
        source: Box<StepError>,
    },
}

impl StepError {
    /// Taxonomy name, exposed to catch blocks as `error.name`
    pub fn name(&self) -> &'static str {
        match self {
            StepError::ItemsTypeMismatch { .. } => "ItemsTypeMismatch",
            StepError::LoopCeilingExceeded { .. } => "LoopCeilingExceeded",
            StepError::UnknownStepShape(_) => "UnknownStepShape",
            StepError::Resolve { source, .. } => source.kind(),
            StepError::Callback { .. } => "UpstreamCallbackFailure",
            StepError::BranchesExhausted { .. } => "BranchesExhausted",
        }
    }

    /// The `{message, name, stack}` record bound as `error` in a catch block
    ///
    /// `stack` lists this error and each of its causes, one per line.
    pub fn to_error_value(&self) -> JsonValue {
        let mut stack = vec![format!("{}: {}", self.name(), self)];
        let mut cause = StdError::source(self);
        while let Some(err) = cause {
            stack.push(format!("caused by: {}", err));
            cause = err.source();
        }

        json!({
            "message": self.to_string(),
            "name": self.name(),
            "stack": stack.join("\n"),
        })
    }
}

/// A failed workflow run
///
/// Carries the run identity, the step failure that ended it and the top-level
/// results completed before the failure.
#[derive(Debug, Error)]
#[error("workflow run {run_id} failed: {source}")]
pub struct ExecutionError {
    pub run_id: Uuid,
    pub failed_at: DateTime<Utc>,
    #[source]
    pub source: StepError,
    pub partial_results: IndexMap<String, JsonValue>,
}

impl ExecutionError {
    pub fn new(run_id: Uuid, source: StepError, partial_results: IndexMap<String, JsonValue>) -> Self {
        Self {
            run_id,
            failed_at: Utc::now(),
            source,
            partial_results,
        }
    }

    pub fn step_error(&self) -> &StepError {
        &self.source
    }

    /// Top-level step outputs completed before the failure
    pub fn partial_results(&self) -> &IndexMap<String, JsonValue> {
        &self.partial_results
    }
}
