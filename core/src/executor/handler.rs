//! Task handler seam
//!
//! The executor never performs a task's side effects itself. Hosts implement
//! [`TaskHandler`] and the executor calls it with the task's resolved input.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::context::ExecutionContext;

/// A task step after guard and input resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTask {
    /// Result key the output will be recorded under
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub input: JsonValue,
}

/// What a task handler returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub output: JsonValue,
    /// Keys to write into `state`
    pub state: Map<String, JsonValue>,
}

impl TaskOutput {
    pub fn new(output: JsonValue) -> Self {
        Self {
            output,
            state: Map::new(),
        }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.state.insert(key.into(), value);
        self
    }
}

impl From<JsonValue> for TaskOutput {
    fn from(output: JsonValue) -> Self {
        Self::new(output)
    }
}

/// Performs the real work of task steps
///
/// Errors are treated as step failures and propagate under the usual rules
/// (caught by an enclosing `try`, otherwise failing the run).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, task: &ResolvedTask, ctx: &ExecutionContext) -> Result<TaskOutput>;
}

#[async_trait]
impl<T: TaskHandler + ?Sized> TaskHandler for Arc<T> {
    async fn run(&self, task: &ResolvedTask, ctx: &ExecutionContext) -> Result<TaskOutput> {
        (**self).run(task, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_ok, block_on};
    use uuid::Uuid;

    struct Upper;

    #[async_trait]
    impl TaskHandler for Upper {
        async fn run(&self, task: &ResolvedTask, _ctx: &ExecutionContext) -> Result<TaskOutput> {
            let text = task.input.as_str().unwrap_or_default().to_uppercase();
            Ok(TaskOutput::new(json!(text)).with_state("last", json!(task.key)))
        }
    }

    #[test]
    fn test_shared_handler_delegates() {
        let handler: Arc<dyn TaskHandler> = Arc::new(Upper);
        let ctx = ExecutionContext::new(Uuid::new_v4(), json!({}), Map::new());
        let task = ResolvedTask {
            key: "shout".to_string(),
            id: None,
            name: "shout".to_string(),
            input: json!("hi"),
        };

        let output = assert_ok!(block_on(Arc::new(handler).run(&task, &ctx)));
        assert_eq!(output.output, json!("HI"));
        assert_eq!(output.state["last"], json!("shout"));
    }

    #[test]
    fn test_output_from_value() {
        let output: TaskOutput = json!({"ok": true}).into();
        assert_eq!(output.output, json!({"ok": true}));
        assert!(output.state.is_empty());
    }

    #[test]
    fn test_resolved_task_serializes_without_missing_id() {
        let task = ResolvedTask {
            key: "k".to_string(),
            id: None,
            name: "n".to_string(),
            input: json!(null),
        };
        assert_eq!(
            serde_json::to_value(&task).unwrap(),
            json!({"key": "k", "name": "n", "input": null})
        );
    }
}
