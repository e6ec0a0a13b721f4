//! Step dispatch
//!
//! Sequential handlers (task, branch, try, switch, while) and the recursion
//! point shared with the concurrent handlers in `concurrent.rs`.

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, warn};

use super::context::ExecutionContext;
use super::errors::StepError;
use super::handler::{ResolvedTask, TaskOutput};
use super::types::{BranchStep, Step, SwitchStep, TaskStep, TryStep, WhileStep};
use super::Executor;
use crate::resolver::{to_display_string, ResolveError};

/// Ordered keyed outputs as a JSON object
pub(crate) fn results_object(results: IndexMap<String, JsonValue>) -> JsonValue {
    JsonValue::Object(results.into_iter().collect::<Map<_, _>>())
}

impl Executor {
    /// Run `steps` in order in `ctx`, recording each output under its key
    pub(crate) async fn run_steps_in(
        &self,
        steps: &[Step],
        ctx: &mut ExecutionContext,
        produced: &mut IndexMap<String, JsonValue>,
    ) -> Result<(), StepError> {
        for (position, step) in steps.iter().enumerate() {
            let key = step.key_at(position);
            let output = self.run_step(step, &key, ctx).await?;
            ctx.record(key.clone(), output.clone());
            produced.insert(key, output);
        }
        Ok(())
    }

    /// Run a nested list in a child scope
    ///
    /// Nested outputs are visible to later nested steps but are returned
    /// rather than recorded in `ctx`. State writes are merged back even when
    /// the list fails part way.
    pub(crate) async fn run_sequence(
        &self,
        steps: &[Step],
        ctx: &mut ExecutionContext,
    ) -> Result<IndexMap<String, JsonValue>, StepError> {
        let mut child = ctx.fork();
        let mut produced = IndexMap::new();
        let outcome = self.run_steps_in(steps, &mut child, &mut produced).await;
        ctx.merge(child);
        outcome.map(|()| produced)
    }

    pub(crate) fn run_step<'a>(
        &'a self,
        step: &'a Step,
        key: &'a str,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<JsonValue, StepError>> {
        async move {
            debug!(step = key, kind = step.type_tag(), "dispatching step");
            match step {
                Step::Task(task) => self.run_task(task, key, ctx).await,
                Step::Parallel(parallel) => self.run_parallel(parallel, key, ctx).await,
                Step::Branch(branch) => self.run_branch(branch, key, ctx).await,
                Step::Foreach(foreach) => self.run_foreach(foreach, key, ctx).await,
                Step::Try(try_step) => self.run_try(try_step, key, ctx).await,
                Step::Switch(switch) => self.run_switch(switch, key, ctx).await,
                Step::While(while_step) => self.run_while(while_step, key, ctx).await,
                Step::MapReduce(map_reduce) => self.run_map_reduce(map_reduce, key, ctx).await,
            }
        }
        .boxed()
    }

    /* ===================== Resolver helpers ===================== */

    pub(crate) fn check_guard(
        &self,
        guard: &JsonValue,
        key: &str,
        scope: &JsonValue,
    ) -> Result<bool, StepError> {
        self.resolver()
            .evaluate_guard(guard, scope)
            .map_err(|source| resolve_error(key, source))
    }

    pub(crate) fn resolve_value(
        &self,
        template: &JsonValue,
        key: &str,
        scope: &JsonValue,
    ) -> Result<Option<JsonValue>, StepError> {
        self.resolver()
            .resolve_optional(template, scope)
            .map_err(|source| resolve_error(key, source))
    }

    /* ===================== Handlers ===================== */

    async fn run_task(
        &self,
        task: &TaskStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let scope = ctx.resolution_scope();

        if let Some(guard) = &task.when {
            if !self.check_guard(guard, key, &scope)? {
                debug!(step = key, "guard is false, skipping task");
                return Ok(json!({ "skipped": true }));
            }
        }

        let input = match &task.input {
            Some(template) => self.resolve_value(template, key, &scope)?.unwrap_or(JsonValue::Null),
            None => JsonValue::Null,
        };

        let resolved = ResolvedTask {
            key: key.to_string(),
            id: task.id.clone(),
            name: task.name.clone(),
            input,
        };

        let TaskOutput { output, state } =
            self.handler.run(&resolved, ctx).await.map_err(|source| {
                warn!(step = key, task = %task.name, error = %source, "task failed");
                StepError::Callback {
                    task: task.name.clone(),
                    source,
                }
            })?;

        if !state.is_empty() {
            ctx.write_state(state);
        }
        Ok(output)
    }

    async fn run_branch(
        &self,
        branch: &BranchStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let taken = self.check_guard(&branch.condition, key, &ctx.resolution_scope())?;
        debug!(step = key, taken, "branch condition evaluated");

        let chosen = if taken {
            Some(&branch.then_steps)
        } else {
            branch.else_steps.as_ref()
        };

        match chosen {
            Some(steps) => Ok(results_object(self.run_sequence(steps, ctx).await?)),
            None => Ok(JsonValue::Null),
        }
    }

    async fn run_try(
        &self,
        try_step: &TryStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let outcome = match self.run_sequence(&try_step.steps, ctx).await {
            Ok(produced) => Ok(results_object(produced)),
            Err(error) => match &try_step.catch {
                Some(catch) => {
                    warn!(step = key, error = %error, kind = error.name(), "caught step failure");
                    let mut scope = ctx.fork();
                    scope.bind("error", error.to_error_value());
                    let handled = self.run_sequence(catch, &mut scope).await;
                    ctx.merge(scope);
                    handled.map(results_object)
                }
                None => Err(error),
            },
        };

        if let Some(finally) = &try_step.finally {
            debug!(step = key, "running finally block");
            self.run_sequence(finally, ctx).await?;
        }

        outcome
    }

    async fn run_switch(
        &self,
        switch: &SwitchStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let value = self.resolve_value(&switch.value, key, &ctx.resolution_scope())?;
        let label = value
            .as_ref()
            .map(to_display_string)
            .unwrap_or_else(|| "undefined".to_string());

        let chosen = switch.cases.get(&label).or(switch.default.as_ref());
        debug!(step = key, label = %label, matched = chosen.is_some(), "switch evaluated");

        match chosen {
            Some(steps) => Ok(results_object(self.run_sequence(steps, ctx).await?)),
            None => Ok(JsonValue::Null),
        }
    }

    async fn run_while(
        &self,
        while_step: &WhileStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let max = while_step
            .max_iterations
            .unwrap_or(self.settings().max_iterations);
        let mut iterations = Vec::new();
        let mut last = JsonValue::Null;

        loop {
            let iteration = iterations.len();
            let mut pass = ctx.fork();
            pass.bind("iteration", json!(iteration));
            pass.bind("lastIterationResults", last.clone());

            if !self.check_guard(&while_step.condition, key, &pass.resolution_scope())? {
                break;
            }
            if iteration >= max {
                warn!(step = key, max, "while loop hit its iteration ceiling");
                return Err(StepError::LoopCeilingExceeded {
                    step: key.to_string(),
                    max,
                });
            }

            let outcome = self.run_sequence(&while_step.body, &mut pass).await;
            ctx.merge(pass);
            last = results_object(outcome?);
            iterations.push(last.clone());
        }

        debug!(step = key, iterations = iterations.len(), "while loop finished");
        Ok(JsonValue::Array(iterations))
    }
}

fn resolve_error(key: &str, source: ResolveError) -> StepError {
    StepError::Resolve {
        step: key.to_string(),
        source,
    }
}
