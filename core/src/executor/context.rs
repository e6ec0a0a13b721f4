//! Execution context
//!
//! The context threaded through every step: the run's read-only input, its view
//! of `state`, the ordered results recorded so far and any ambient bindings
//! (`item`, `index`, `error`, ...) introduced by enclosing control nodes.
//!
//! Concurrent branches never share a context. Each branch gets a [`fork`], and
//! every state write is recorded as a delta that the parent applies with
//! [`merge`] once the branch has finished.
//!
//! [`fork`]: ExecutionContext::fork
//! [`merge`]: ExecutionContext::merge

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    run_id: Uuid,
    input: Arc<JsonValue>,
    state: Map<String, JsonValue>,
    state_delta: Map<String, JsonValue>,
    results: IndexMap<String, JsonValue>,
    bindings: Map<String, JsonValue>,
}

impl ExecutionContext {
    pub fn new(run_id: Uuid, input: JsonValue, state: Map<String, JsonValue>) -> Self {
        Self {
            run_id,
            input: Arc::new(input),
            state,
            state_delta: Map::new(),
            results: IndexMap::new(),
            bindings: Map::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn input(&self) -> &JsonValue {
        &self.input
    }

    pub fn state(&self) -> &Map<String, JsonValue> {
        &self.state
    }

    pub fn results(&self) -> &IndexMap<String, JsonValue> {
        &self.results
    }

    pub fn binding(&self, name: &str) -> Option<&JsonValue> {
        self.bindings.get(name)
    }

    /// Child context for a nested list or concurrent branch
    ///
    /// The child starts from this context's results, state and bindings, with
    /// an empty delta.
    pub fn fork(&self) -> Self {
        Self {
            run_id: self.run_id,
            input: Arc::clone(&self.input),
            state: self.state.clone(),
            state_delta: Map::new(),
            results: self.results.clone(),
            bindings: self.bindings.clone(),
        }
    }

    /// Apply a finished child's state writes
    ///
    /// Only state flows back; the child's results and bindings are dropped.
    pub fn merge(&mut self, child: ExecutionContext) {
        self.write_state(child.state_delta);
    }

    /// Write keys into `state`, recording them for the parent's merge
    pub fn write_state(&mut self, delta: Map<String, JsonValue>) {
        for (key, value) in delta {
            self.state.insert(key.clone(), value.clone());
            self.state_delta.insert(key, value);
        }
    }

    /// Record a step output; a reused key overwrites the earlier output
    pub fn record(&mut self, key: impl Into<String>, output: JsonValue) {
        self.results.insert(key.into(), output);
    }

    /// Bind an ambient name (`item`, `index`, `error`, ...)
    pub fn bind(&mut self, name: impl Into<String>, value: JsonValue) {
        self.bindings.insert(name.into(), value);
    }

    /// Flattened view handed to the resolver, rebuilt on every call
    ///
    /// Step outputs come first, then `input`, `state` and `results`, then the
    /// ambient bindings. Later entries shadow earlier ones.
    pub fn resolution_scope(&self) -> JsonValue {
        let mut scope = Map::new();
        for (key, output) in &self.results {
            scope.insert(key.clone(), output.clone());
        }

        let results: Map<String, JsonValue> = self
            .results
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        scope.insert("input".to_string(), (*self.input).clone());
        scope.insert("state".to_string(), JsonValue::Object(self.state.clone()));
        scope.insert("results".to_string(), JsonValue::Object(results));

        for (name, value) in &self.bindings {
            scope.insert(name.clone(), value.clone());
        }

        JsonValue::Object(scope)
    }

    /// Consume the context, returning its results and final state
    pub fn into_parts(self) -> (IndexMap<String, JsonValue>, Map<String, JsonValue>) {
        (self.results, self.state)
    }
}
