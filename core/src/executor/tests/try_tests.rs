//! Tests for try/catch/finally steps

use serde_json::json;

use super::helpers::{run, RecordingHandler};

#[tokio::test]
async fn test_catch_then_finally_order() {
    let handler = RecordingHandler::new();
    let output = run(
        &handler,
        json!([{
            "type": "try",
            "steps": [{"type": "task", "name": "fail"}],
            "catch": [{"type": "task", "name": "handle"}],
            "finally": [{"type": "task", "name": "cleanup"}]
        }]),
        json!({}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["fail", "handle", "cleanup"]);
    assert_eq!(output.results["try_0"], json!({"handle": "handle"}));
}

#[tokio::test]
async fn test_catch_sees_error_record() {
    let handler = RecordingHandler::new();
    run(
        &handler,
        json!([{
            "type": "try",
            "steps": [
                {"type": "task", "name": "ok"},
                {"type": "task", "name": "fail_payment"},
                {"type": "task", "name": "never"}
            ],
            "catch": [{"type": "task", "name": "handle", "input": {
                "message": "${error.message}",
                "name": "${error.name}",
                "has_stack": "${error.stack | length | boolean}"
            }}]
        }]),
        json!({}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["ok", "fail_payment", "handle"]);
    let input = &handler.inputs_for("handle")[0];
    assert_eq!(input["name"], json!("UpstreamCallbackFailure"));
    assert_eq!(input["message"], json!("task 'fail_payment' failed: fail_payment exploded"));
    assert_eq!(input["has_stack"], json!(true));
}

#[tokio::test]
async fn test_success_skips_catch_and_runs_finally() {
    let handler = RecordingHandler::new();
    let output = run(
        &handler,
        json!([{
            "type": "try",
            "steps": [{"type": "task", "name": "work"}],
            "catch": [{"type": "task", "name": "handle"}],
            "finally": [{"type": "task", "name": "cleanup"}]
        }]),
        json!({}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["work", "cleanup"]);
    assert_eq!(output.results["try_0"], json!({"work": "work"}));
}

#[tokio::test]
async fn test_without_catch_finally_runs_before_propagating() {
    let handler = RecordingHandler::new();
    let err = run(
        &handler,
        json!([
            {
                "type": "try",
                "steps": [{"type": "task", "name": "fail_db"}],
                "finally": [{"type": "task", "name": "release"}]
            },
            {"type": "task", "name": "next"}
        ]),
        json!({}),
    )
    .await
    .unwrap_err();

    assert_eq!(handler.calls(), vec!["fail_db", "release"]);
    assert!(err.to_string().contains("fail_db exploded"));
}

#[tokio::test]
async fn test_failing_catch_propagates_after_finally() {
    let handler = RecordingHandler::new();
    let err = run(
        &handler,
        json!([{
            "type": "try",
            "steps": [{"type": "task", "name": "fail_first"}],
            "catch": [{"type": "task", "name": "fail_handler"}],
            "finally": [{"type": "task", "name": "cleanup"}]
        }]),
        json!({}),
    )
    .await
    .unwrap_err();

    assert_eq!(handler.calls(), vec!["fail_first", "fail_handler", "cleanup"]);
    assert!(err.to_string().contains("fail_handler exploded"));
}

#[tokio::test]
async fn test_failing_finally_supersedes() {
    let handler = RecordingHandler::new();
    let err = run(
        &handler,
        json!([{
            "type": "try",
            "steps": [{"type": "task", "name": "work"}],
            "finally": [{"type": "task", "name": "fail_cleanup"}]
        }]),
        json!({}),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("fail_cleanup exploded"));
}

#[tokio::test]
async fn test_try_does_not_catch_sibling_failures() {
    let handler = RecordingHandler::new();
    let err = run(
        &handler,
        json!([
            {
                "type": "try",
                "steps": [{"type": "task", "name": "work"}],
                "catch": [{"type": "task", "name": "handle"}]
            },
            {"type": "task", "name": "fail_later"}
        ]),
        json!({}),
    )
    .await
    .unwrap_err();

    assert_eq!(handler.calls(), vec!["work", "fail_later"]);
    assert!(err.to_string().contains("fail_later"));
}

#[tokio::test]
async fn test_catch_handles_resolver_errors() {
    let handler = RecordingHandler::new();
    run(
        &handler,
        json!([{
            "type": "try",
            "steps": [{"type": "task", "name": "t", "input": "${input.x | nope}"}],
            "catch": [{"type": "task", "name": "handle", "input": "${error.name}"}]
        }]),
        json!({"x": 1}),
    )
    .await
    .unwrap();

    assert_eq!(handler.inputs_for("handle"), vec![json!("UnknownFilter")]);
}
