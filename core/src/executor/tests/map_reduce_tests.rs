//! Tests for map-reduce steps

use maplit::hashmap;
use serde_json::json;

use super::helpers::{run, RecordingHandler};

#[tokio::test]
async fn test_reduce_sees_map_results_in_order() {
    let handler = RecordingHandler::new();
    let output = run(
        &handler,
        json!([{
            "type": "map_reduce",
            "items": "${input.words}",
            "maxConcurrency": 2,
            "map": {"type": "task", "name": "shout", "input": "${item | upper}"},
            "reduce": {"type": "task", "name": "combine", "input": "${mapResults | join('-')}"}
        }]),
        json!({"words": ["a", "b", "c"]}),
    )
    .await
    .unwrap();

    assert_eq!(output.results["map_reduce_0"], json!("A-B-C"));
    assert_eq!(handler.calls().last().map(String::as_str), Some("combine"));
}

#[tokio::test]
async fn test_map_batches_bound_concurrency() {
    let handler = RecordingHandler::with_responses(hashmap! {
        "total".to_string() => json!("reduced"),
    });
    run(
        &handler,
        json!([{
            "type": "mapReduce",
            "items": [1, 2, 3, 4, 5],
            "max_concurrency": 2,
            "map": {"type": "task", "name": "slow_map", "input": "${item}"},
            "reduce": {"type": "task", "name": "total", "input": {"all": "${mapResults}"}}
        }]),
        json!({}),
    )
    .await
    .unwrap();

    assert_eq!(handler.peak_in_flight(), 2);
    assert_eq!(handler.inputs_for("total"), vec![json!({"all": [1, 2, 3, 4, 5]})]);
}

#[tokio::test]
async fn test_map_failure_skips_reduce() {
    let handler = RecordingHandler::new();
    let err = run(
        &handler,
        json!([{
            "type": "map_reduce",
            "items": [1, 2],
            "map": {"type": "task", "name": "fail_map"},
            "reduce": {"type": "task", "name": "combine"}
        }]),
        json!({}),
    )
    .await
    .unwrap_err();

    assert!(!handler.calls().contains(&"combine".to_string()));
    assert_eq!(err.step_error().name(), "UpstreamCallbackFailure");
}

#[tokio::test]
async fn test_non_array_items_fail() {
    let handler = RecordingHandler::new();
    let err = run(
        &handler,
        json!([{
            "type": "map_reduce",
            "items": "${input.count}",
            "map": {"type": "task", "name": "m"},
            "reduce": {"type": "task", "name": "r"}
        }]),
        json!({"count": 3}),
    )
    .await
    .unwrap_err();

    assert_eq!(err.step_error().name(), "ItemsTypeMismatch");
    assert!(err.to_string().contains("found number"));
}
