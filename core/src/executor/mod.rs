//! Graph executor
//!
//! Walks a list of [`Step`]s in order. Control-flow nodes recurse into their
//! nested lists; task nodes have their guard and input resolved and are handed
//! to the host's [`TaskHandler`].
//!
//! ```rust,ignore
//! use stepwise_core::executor::{Executor, RunInput};
//!
//! let executor = Executor::new(MyHandler);
//! let output = executor.execute(&steps, RunInput::new(json!({"user": 1}))).await?;
//! println!("{:?}", output.results);
//! ```

pub mod concurrent;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod handler;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::ExecutorSettings;
use crate::resolver::{FilterRegistry, Resolver};

pub use context::ExecutionContext;
pub use errors::{ExecutionError, StepError};
pub use handler::{ResolvedTask, TaskHandler, TaskOutput};
pub use types::{JoinPolicy, Step};

/// Initial values for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInput {
    #[serde(default)]
    pub input: JsonValue,
    #[serde(default)]
    pub state: Map<String, JsonValue>,
}

impl RunInput {
    pub fn new(input: JsonValue) -> Self {
        Self {
            input,
            state: Map::new(),
        }
    }

    /// Initial state; anything other than an object leaves state empty
    pub fn with_state(mut self, state: JsonValue) -> Self {
        if let JsonValue::Object(map) = state {
            self.state = map;
        }
        self
    }
}

/// A completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    /// One entry per top-level step, in execution order
    pub results: IndexMap<String, JsonValue>,
    /// State after every write has been applied
    pub state: Map<String, JsonValue>,
}

/// Runs workflow step trees against a task handler
#[derive(Clone)]
pub struct Executor {
    handler: Arc<dyn TaskHandler>,
    resolver: Resolver,
    settings: ExecutorSettings,
}

impl Executor {
    /// Executor using the settings loaded by [`initialize`](crate::init::initialize),
    /// or the defaults when the crate has not been initialized
    pub fn new(handler: impl TaskHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            resolver: Resolver::default(),
            settings: crate::init::config().executor,
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.resolver = Resolver::new(filters);
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Filter registry used by this executor; filters registered here are
    /// visible to subsequent runs
    pub fn filters(&self) -> &FilterRegistry {
        self.resolver.filters()
    }

    /// Run a step list to completion
    pub async fn execute(&self, steps: &[Step], run: RunInput) -> Result<RunOutput, ExecutionError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("workflow_run", %run_id);
        self.execute_run(run_id, steps, run).instrument(span).await
    }

    /// Parse a raw JSON step list, then run it
    pub async fn execute_json(&self, steps: &JsonValue, run: RunInput) -> Result<RunOutput, ExecutionError> {
        match Step::list_from_value(steps.clone()) {
            Ok(steps) => self.execute(&steps, run).await,
            Err(source) => {
                let run_id = Uuid::new_v4();
                warn!(%run_id, error = %source, "rejected workflow definition");
                Err(ExecutionError::new(run_id, source, IndexMap::new()))
            }
        }
    }

    async fn execute_run(
        &self,
        run_id: Uuid,
        steps: &[Step],
        run: RunInput,
    ) -> Result<RunOutput, ExecutionError> {
        let started = Instant::now();
        info!(steps = steps.len(), "workflow run started");

        let mut ctx = ExecutionContext::new(run_id, run.input, run.state);
        let mut results = IndexMap::with_capacity(steps.len());

        match self.run_steps_in(steps, &mut ctx, &mut results).await {
            Ok(()) => {
                let (_, state) = ctx.into_parts();
                info!(
                    steps = results.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "workflow run completed"
                );
                Ok(RunOutput {
                    run_id,
                    results,
                    state,
                })
            }
            Err(source) => {
                warn!(
                    error = %source,
                    kind = source.name(),
                    completed = results.len(),
                    "workflow run failed"
                );
                Err(ExecutionError::new(run_id, source, results))
            }
        }
    }
}
