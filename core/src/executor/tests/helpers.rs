//! Test helpers for executor tests
//!
//! A recording task handler plus shortcuts for parsing and running step lists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use crate::executor::{
    ExecutionContext, ExecutionError, Executor, ResolvedTask, RunInput, RunOutput, Step,
    TaskHandler, TaskOutput,
};

/// Task handler that records every call
///
/// Behaviour is chosen by task name:
/// - `fail*` returns an error "<name> exploded"
/// - `hang*` never completes
/// - `slow*` yields to the scheduler longer than other tasks
/// - `increment` adds one to `state.count` and returns the new value
/// - names registered with [`RecordingHandler::respond`] return that value
/// - anything else echoes its input, or its name when there is no input
#[derive(Default)]
pub struct RecordingHandler {
    responses: HashMap<String, JsonValue>,
    calls: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    inputs: Mutex<Vec<(String, JsonValue)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_responses(responses: HashMap<String, JsonValue>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            ..Self::default()
        })
    }

    /// Task names in the order they were invoked
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Task names whose callback ran to the end, in completion order
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Resolved inputs passed to every call of `name`
    pub fn inputs_for(&self, name: &str) -> Vec<JsonValue> {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .filter(|(task, _)| task == name)
            .map(|(_, input)| input.clone())
            .collect()
    }

    /// Highest number of calls that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn run(&self, task: &ResolvedTask, ctx: &ExecutionContext) -> Result<TaskOutput> {
        self.calls.lock().unwrap().push(task.name.clone());
        self.inputs
            .lock()
            .unwrap()
            .push((task.name.clone(), task.input.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let yields = if task.name.starts_with("slow") { 20 } else { 3 };
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
        if task.name.starts_with("hang") {
            std::future::pending::<()>().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(task.name.clone());

        if task.name.starts_with("fail") {
            bail!("{} exploded", task.name);
        }

        if task.name == "increment" {
            let count = ctx.state().get("count").and_then(JsonValue::as_i64).unwrap_or(0) + 1;
            return Ok(TaskOutput::new(json!(count)).with_state("count", json!(count)));
        }

        if let Some(response) = self.responses.get(&task.name) {
            return Ok(response.clone().into());
        }

        let output = if task.input.is_null() {
            json!(task.name)
        } else {
            task.input.clone()
        };
        Ok(output.into())
    }
}

/// Parse a JSON step list
pub fn steps(value: JsonValue) -> Vec<Step> {
    Step::list_from_value(value).expect("invalid step list")
}

/// Run a JSON step list with the given input
pub async fn run(
    handler: &Arc<RecordingHandler>,
    step_list: JsonValue,
    input: JsonValue,
) -> Result<RunOutput, ExecutionError> {
    run_with_state(handler, step_list, input, json!({})).await
}

/// Run a JSON step list with the given input and initial state
pub async fn run_with_state(
    handler: &Arc<RecordingHandler>,
    step_list: JsonValue,
    input: JsonValue,
    state: JsonValue,
) -> Result<RunOutput, ExecutionError> {
    Executor::new(handler.clone())
        .execute(&steps(step_list), RunInput::new(input).with_state(state))
        .await
}
