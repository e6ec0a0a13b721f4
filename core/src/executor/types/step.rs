//! Step node types
//!
//! A workflow is a list of [`Step`]s. Every variant is a plain record so step
//! trees deserialize from JSON (or anything that converts to JSON) with the
//! `type` field selecting the variant.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::executor::errors::StepError;
use crate::resolver::value::type_name;

/// One node of a workflow tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Task(TaskStep),
    Parallel(ParallelStep),
    Branch(BranchStep),
    Foreach(ForeachStep),
    Try(TryStep),
    Switch(SwitchStep),
    While(WhileStep),
    #[serde(alias = "mapReduce")]
    MapReduce(MapReduceStep),
}

/// Plain task invocation handed to the host's task handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonValue>,
    /// Guard; the task is skipped when it evaluates to false
    #[serde(default, alias = "condition", skip_serializing_if = "Option::is_none")]
    pub when: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    /// Wait for every substep; fail on the first failure
    #[default]
    All,
    /// Take whichever substep settles first, success or failure
    Any,
    /// Take the first substep to succeed; fail only if all fail
    First,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelStep {
    pub steps: Vec<Step>,
    #[serde(default, alias = "wait_for", alias = "waitFor", alias = "joinPolicy")]
    pub join_policy: JoinPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStep {
    pub condition: JsonValue,
    #[serde(rename = "then")]
    pub then_steps: Vec<Step>,
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub else_steps: Option<Vec<Step>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachStep {
    pub items: JsonValue,
    pub body: Box<Step>,
    #[serde(default, alias = "maxConcurrency", skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default, alias = "breakWhen", skip_serializing_if = "Option::is_none")]
    pub break_when: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStep {
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch: Option<Vec<Step>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finally: Option<Vec<Step>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStep {
    pub value: JsonValue,
    #[serde(default)]
    pub cases: IndexMap<String, Vec<Step>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Vec<Step>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStep {
    pub condition: JsonValue,
    pub body: Vec<Step>,
    #[serde(default, alias = "maxIterations", skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapReduceStep {
    pub items: JsonValue,
    pub map: Box<Step>,
    pub reduce: Box<Step>,
    #[serde(default, alias = "maxConcurrency", skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl Step {
    /// The `type` tag this variant serializes with
    pub fn type_tag(&self) -> &'static str {
        match self {
            Step::Task(_) => "task",
            Step::Parallel(_) => "parallel",
            Step::Branch(_) => "branch",
            Step::Foreach(_) => "foreach",
            Step::Try(_) => "try",
            Step::Switch(_) => "switch",
            Step::While(_) => "while",
            Step::MapReduce(_) => "map_reduce",
        }
    }

    /// Result key for this step at `position` within its list
    ///
    /// Tasks use their `id`, then their `name`. Control nodes are keyed by type
    /// and position, so the key is stable across runs of the same tree.
    pub fn key_at(&self, position: usize) -> String {
        match self {
            Step::Task(task) => task.id.clone().unwrap_or_else(|| task.name.clone()),
            other => format!("{}_{}", other.type_tag(), position),
        }
    }

    /// Parse one step node
    pub fn from_value(value: JsonValue) -> Result<Self, StepError> {
        serde_json::from_value(value).map_err(|e| StepError::UnknownStepShape(e.to_string()))
    }

    /// Parse a list of step nodes
    pub fn list_from_value(value: JsonValue) -> Result<Vec<Self>, StepError> {
        match value {
            JsonValue::Array(nodes) => nodes
                .into_iter()
                .enumerate()
                .map(|(position, node)| {
                    Step::from_value(node).map_err(|e| match e {
                        StepError::UnknownStepShape(reason) => {
                            StepError::UnknownStepShape(format!("step {}: {}", position, reason))
                        }
                        other => other,
                    })
                })
                .collect(),
            other => Err(StepError::UnknownStepShape(format!(
                "expected an array of steps, found {}",
                type_name(&other)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_task_with_condition_alias() {
        let step = Step::from_value(json!({
            "type": "task",
            "id": "fetch_1",
            "name": "fetch",
            "input": {"url": "${input.url}"},
            "condition": "${input.enabled}"
        }))
        .unwrap();

        match &step {
            Step::Task(task) => {
                assert_eq!(task.id.as_deref(), Some("fetch_1"));
                assert_eq!(task.when, Some(json!("${input.enabled}")));
            }
            other => panic!("expected task, got {:?}", other),
        }
        assert_eq!(step.key_at(3), "fetch_1");
    }

    #[test]
    fn test_parse_camel_case_fields() {
        let step = Step::from_value(json!({
            "type": "parallel",
            "waitFor": "first",
            "steps": [{"type": "task", "name": "a"}]
        }))
        .unwrap();
        assert!(matches!(&step, Step::Parallel(p) if p.join_policy == JoinPolicy::First));

        let step = Step::from_value(json!({
            "type": "mapReduce",
            "items": [1, 2],
            "maxConcurrency": 1,
            "map": {"type": "task", "name": "m"},
            "reduce": {"type": "task", "name": "r"}
        }))
        .unwrap();
        assert!(matches!(&step, Step::MapReduce(m) if m.max_concurrency == Some(1)));
        assert_eq!(step.key_at(2), "map_reduce_2");
    }

    #[test]
    fn test_parallel_defaults_to_all() {
        let step = Step::from_value(json!({"type": "parallel", "steps": []})).unwrap();
        assert!(matches!(step, Step::Parallel(p) if p.join_policy == JoinPolicy::All));
    }

    #[test]
    fn test_branch_then_else() {
        let step = Step::from_value(json!({
            "type": "branch",
            "condition": true,
            "then": [{"type": "task", "name": "yes"}]
        }))
        .unwrap();
        match step {
            Step::Branch(b) => {
                assert_eq!(b.then_steps.len(), 1);
                assert!(b.else_steps.is_none());
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_task_key_falls_back_to_name() {
        let step = Step::from_value(json!({"type": "task", "name": "send"})).unwrap();
        assert_eq!(step.key_at(0), "send");
    }

    #[test]
    fn test_unknown_shapes() {
        let err = Step::from_value(json!({"type": "teleport"})).unwrap_err();
        assert_eq!(err.name(), "UnknownStepShape");

        let err = Step::from_value(json!({"type": "while", "body": []})).unwrap_err();
        assert!(err.to_string().contains("condition"));

        let err = Step::list_from_value(json!([{"type": "task", "name": "a"}, {"name": "b"}])).unwrap_err();
        assert!(err.to_string().contains("step 1"));

        assert!(Step::list_from_value(json!({"type": "task"})).is_err());
    }
}
