//! Tests for branch and switch steps

use serde_json::json;

use super::helpers::{run, RecordingHandler};

/* ===================== Branch ===================== */

#[tokio::test]
async fn test_branch_takes_then() {
    let handler = RecordingHandler::new();
    let output = run(
        &handler,
        json!([{
            "type": "branch",
            "condition": "${input.vip}",
            "then": [
                {"type": "task", "name": "upgrade"},
                {"type": "task", "name": "notify", "input": "${upgrade}"}
            ],
            "else": [{"type": "task", "name": "standard"}]
        }]),
        json!({"vip": true}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["upgrade", "notify"]);
    assert_eq!(
        output.results["branch_0"],
        json!({"upgrade": "upgrade", "notify": "upgrade"})
    );
    // nested keys stay inside the branch output
    assert!(output.results.get("upgrade").is_none());
}

#[tokio::test]
async fn test_branch_takes_else_with_fallback_condition() {
    let handler = RecordingHandler::new();
    run(
        &handler,
        json!([{
            "type": "branch",
            "condition": "input.total > 100",
            "then": [{"type": "task", "name": "review"}],
            "else": [{"type": "task", "name": "approve"}]
        }]),
        json!({"total": 40}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["approve"]);
}

#[tokio::test]
async fn test_branch_without_else_is_noop() {
    let handler = RecordingHandler::new();
    let output = run(
        &handler,
        json!([{
            "type": "branch",
            "condition": false,
            "then": [{"type": "task", "name": "never"}]
        }]),
        json!({}),
    )
    .await
    .unwrap();

    assert!(handler.calls().is_empty());
    assert_eq!(output.results["branch_0"], json!(null));
}

/* ===================== Switch ===================== */

#[tokio::test]
async fn test_switch_matches_stringified_value() {
    let handler = RecordingHandler::new();
    let output = run(
        &handler,
        json!([{
            "type": "switch",
            "value": "${input.tier}",
            "cases": {
                "1": [{"type": "task", "name": "bronze"}],
                "2": [{"type": "task", "name": "silver"}]
            },
            "default": [{"type": "task", "name": "unranked"}]
        }]),
        json!({"tier": 2}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["silver"]);
    assert_eq!(output.results["switch_0"], json!({"silver": "silver"}));
}

#[tokio::test]
async fn test_switch_falls_back_to_default() {
    let handler = RecordingHandler::new();
    run(
        &handler,
        json!([{
            "type": "switch",
            "value": "${input.region}",
            "cases": {"eu": [{"type": "task", "name": "eu"}]},
            "default": [{"type": "task", "name": "global"}]
        }]),
        json!({"region": "apac"}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["global"]);
}

#[tokio::test]
async fn test_switch_without_match_or_default_is_null() {
    let handler = RecordingHandler::new();
    let output = run(
        &handler,
        json!([
            {
                "type": "switch",
                "value": "${input.region}",
                "cases": {"eu": [{"type": "task", "name": "eu"}]}
            },
            {"type": "task", "name": "after"}
        ]),
        json!({"region": "apac"}),
    )
    .await
    .unwrap();

    assert_eq!(output.results["switch_0"], json!(null));
    assert_eq!(handler.calls(), vec!["after"]);
}

#[tokio::test]
async fn test_switch_on_undefined_value() {
    let handler = RecordingHandler::new();
    run(
        &handler,
        json!([{
            "type": "switch",
            "value": "${input.missing}",
            "cases": {
                "undefined": [{"type": "task", "name": "unset"}],
                "null": [{"type": "task", "name": "null_case"}]
            }
        }]),
        json!({}),
    )
    .await
    .unwrap();

    assert_eq!(handler.calls(), vec!["unset"]);
}
