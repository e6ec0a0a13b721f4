//! Concurrent handlers: parallel, foreach and map-reduce
//!
//! Every branch runs in its own forked context. Branch futures are polled
//! together on the current task; once the join completes, finished branches'
//! state deltas are merged into the parent in declaration (or item) order.
//!
//! Branches still pending when the join settles are dropped, so their task
//! callbacks stop at their next await point. That covers the losers of `any`
//! and `first` and the siblings of a failing branch under `all` or in a batch.

use futures::future::{select_all, select_ok, try_join_all, FutureExt};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use super::context::ExecutionContext;
use super::errors::StepError;
use super::types::{ForeachStep, JoinPolicy, MapReduceStep, ParallelStep, Step};
use super::Executor;
use crate::resolver::value::type_name;

impl Executor {
    pub(crate) async fn run_parallel(
        &self,
        parallel: &ParallelStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let count = parallel.steps.len();
        if count == 0 {
            return Ok(match parallel.join_policy {
                JoinPolicy::All => json!([]),
                JoinPolicy::Any | JoinPolicy::First => JsonValue::Null,
            });
        }

        debug!(step = key, branches = count, policy = ?parallel.join_policy, "fanning out");

        let keys: Vec<String> = parallel
            .steps
            .iter()
            .enumerate()
            .map(|(position, step)| step.key_at(position))
            .collect();
        let mut children: Vec<ExecutionContext> = (0..count).map(|_| ctx.fork()).collect();

        match parallel.join_policy {
            JoinPolicy::All => {
                let branches = parallel
                    .steps
                    .iter()
                    .zip(&keys)
                    .zip(children.iter_mut())
                    .map(|((step, branch_key), child)| self.run_step(step, branch_key, child));
                let outcome = try_join_all(branches).await;

                for child in children {
                    ctx.merge(child);
                }
                outcome.map(JsonValue::Array)
            }
            JoinPolicy::Any => {
                let branches: Vec<_> = parallel
                    .steps
                    .iter()
                    .zip(&keys)
                    .zip(children.iter_mut())
                    .enumerate()
                    .map(|(index, ((step, branch_key), child))| {
                        self.run_step(step, branch_key, child)
                            .map(move |result| (index, result))
                            .boxed()
                    })
                    .collect();
                let ((winner, result), _, _) = select_all(branches).await;

                debug!(step = key, winner = %keys[winner], ok = result.is_ok(), "first branch settled");
                if let Some(child) = children.into_iter().nth(winner) {
                    ctx.merge(child);
                }
                result
            }
            JoinPolicy::First => {
                let branches: Vec<_> = parallel
                    .steps
                    .iter()
                    .zip(&keys)
                    .zip(children.iter_mut())
                    .enumerate()
                    .map(|(index, ((step, branch_key), child))| {
                        self.run_step(step, branch_key, child)
                            .map(move |result| result.map(|output| (index, output)))
                            .boxed()
                    })
                    .collect();

                let settled = select_ok(branches).await.map(|(won, _)| won);
                match settled {
                    Ok((winner, output)) => {
                        debug!(step = key, winner = %keys[winner], "first successful branch");
                        if let Some(child) = children.into_iter().nth(winner) {
                            ctx.merge(child);
                        }
                        Ok(output)
                    }
                    Err(last) => Err(StepError::BranchesExhausted {
                        step: key.to_string(),
                        count,
                        source: Box::new(last),
                    }),
                }
            }
        }
    }

    pub(crate) async fn run_foreach(
        &self,
        foreach: &ForeachStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let items = self.resolve_items(&foreach.items, key, ctx)?;
        let batch_size = self.batch_size(foreach.max_concurrency, items.len());
        let outputs = self
            .run_batches(
                &foreach.body,
                key,
                &items,
                batch_size,
                foreach.break_when.as_ref(),
                ctx,
            )
            .await?;
        Ok(JsonValue::Array(outputs))
    }

    pub(crate) async fn run_map_reduce(
        &self,
        map_reduce: &MapReduceStep,
        key: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<JsonValue, StepError> {
        let items = self.resolve_items(&map_reduce.items, key, ctx)?;
        let batch_size = self.batch_size(map_reduce.max_concurrency, items.len());
        let map_results = self
            .run_batches(&map_reduce.map, key, &items, batch_size, None, ctx)
            .await?;

        debug!(step = key, mapped = map_results.len(), "reducing");
        let mut reduce_ctx = ctx.fork();
        reduce_ctx.bind("mapResults", JsonValue::Array(map_results));
        let reduce_key = map_reduce.reduce.key_at(0);
        let outcome = self
            .run_step(&map_reduce.reduce, &reduce_key, &mut reduce_ctx)
            .await;
        ctx.merge(reduce_ctx);
        outcome
    }

    fn resolve_items(
        &self,
        items: &JsonValue,
        key: &str,
        ctx: &ExecutionContext,
    ) -> Result<Vec<JsonValue>, StepError> {
        match self.resolve_value(items, key, &ctx.resolution_scope())? {
            Some(JsonValue::Array(items)) => Ok(items),
            other => Err(StepError::ItemsTypeMismatch {
                step: key.to_string(),
                found: other.as_ref().map_or("undefined", type_name).to_string(),
            }),
        }
    }

    fn batch_size(&self, requested: Option<usize>, item_count: usize) -> usize {
        requested
            .or(self.settings().max_concurrency)
            .unwrap_or(item_count)
            .max(1)
    }

    /// Run `body` once per item, `batch_size` items at a time
    ///
    /// Each run sees `item` and its absolute `index`. A batch starts only after
    /// the previous one has fully joined. When `break_when` is given it is
    /// checked after each batch with `batchResults` bound, and a true result
    /// stops before the next batch.
    async fn run_batches(
        &self,
        body: &Step,
        key: &str,
        items: &[JsonValue],
        batch_size: usize,
        break_when: Option<&JsonValue>,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<JsonValue>, StepError> {
        let body_key = body.key_at(0);
        let mut outputs = Vec::with_capacity(items.len());

        for (batch_index, batch) in items.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            let mut children: Vec<ExecutionContext> = batch
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut child = ctx.fork();
                    child.bind("item", item.clone());
                    child.bind("index", json!(offset + i));
                    child
                })
                .collect();

            let runs = children
                .iter_mut()
                .map(|child| self.run_step(body, &body_key, child));
            let outcome = try_join_all(runs).await;

            for child in children {
                ctx.merge(child);
            }
            let batch_results = outcome?;
            outputs.extend(batch_results.iter().cloned());

            if let Some(condition) = break_when {
                let mut probe = ctx.fork();
                probe.bind("batchResults", JsonValue::Array(batch_results));
                if self.check_guard(condition, key, &probe.resolution_scope())? {
                    debug!(step = key, processed = outputs.len(), "break condition met");
                    break;
                }
            }
        }

        Ok(outputs)
    }
}
