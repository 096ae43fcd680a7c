//! End-to-end runs against a scripted model

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tooleval::prelude::*;
use tooleval::{ScriptedModel, group_by_tier};

#[tokio::test]
async fn test_weather_exact_match() {
    let model = Arc::new(ScriptedModel::new("local").with_response(
        ModelResponse::tool_call("get_weather", json!({"city": "San Francisco"})).with_latency(850),
    ));
    let runner = TierRunner::new(common::registry(), model.clone(), common::quick_config());
    let prompt = "What's the weather in San Francisco?";
    let case = ExpectedCase::new("t1_weather", 1, prompt, "get_weather")
        .with_args(json!({"city": "San Francisco"}));

    let record = runner.run_case(&case).await;
    assert!(record.tool_match);
    assert_eq!(record.argument_score, 1.0);
    assert!(record.mismatches.is_empty());
    assert_eq!(record.latency_ms, 850);
    assert_eq!(record.attempts, 1);

    // Every tool is offered, not just the expected one
    assert_eq!(model.requests()[0].tool_names.len(), common::catalog().len());
}

#[tokio::test]
async fn test_order_with_missing_item() {
    let mut observed = common::two_item_order();
    observed["items"].as_array_mut().unwrap().truncate(1);
    let model = Arc::new(
        ScriptedModel::new("local")
            .with_response(ModelResponse::tool_call("create_order", observed)),
    );
    let runner = TierRunner::new(common::registry(), model, common::quick_config());
    let case = ExpectedCase::new("t3_order", 3, "Order two things", "create_order")
        .with_args(common::two_item_order());

    let record = runner.run_case(&case).await;
    assert!(record.tool_match);
    // customer 1.0, items 0.5, shipping 1.0
    assert!((record.argument_score - 2.5 / 3.0).abs() < 1e-12);
    assert_eq!(record.mismatches.len(), 1);
    assert_eq!(record.mismatches[0].path.to_string(), "items[1]");
    assert_eq!(record.mismatches[0].kind, MismatchKind::Missing);
}

#[tokio::test]
async fn test_shipping_default_country() {
    let mut observed = common::two_item_order();
    observed["shipping"]["country"] = json!("USA");
    observed["customer"]["phone"] = json!(null);
    let model = Arc::new(
        ScriptedModel::new("local")
            .with_response(ModelResponse::tool_call("create_order", observed)),
    );
    let runner = TierRunner::new(common::registry(), model, common::quick_config());
    let case = ExpectedCase::new("t3_default", 3, "p", "create_order")
        .with_args(common::two_item_order());

    let record = runner.run_case(&case).await;
    assert_eq!(record.argument_score, 1.0);
}

#[tokio::test]
async fn test_union_wrong_discriminator() {
    let model = Arc::new(ScriptedModel::new("local").with_response(ModelResponse::tool_call(
        "execute_action",
        json!({"action": {"action_type": "update", "resource_id": "cmt_1", "updates": {}}}),
    )));
    let runner = TierRunner::new(common::registry(), model, common::quick_config());
    let case = ExpectedCase::new("t4_delete", 4, "Delete comment cmt_1", "execute_action")
        .with_args(json!({"action": {"action_type": "delete", "resource_id": "cmt_1"}}));

    let record = runner.run_case(&case).await;
    assert!(record.tool_match);
    assert_eq!(record.argument_score, 0.0);
    assert_eq!(record.mismatches[0].kind, MismatchKind::WrongVariant);
}

#[tokio::test]
async fn test_invalid_call_retried_then_accepted() {
    let model = Arc::new(
        ScriptedModel::new("local")
            .with_response(ModelResponse::no_call().with_tokens(30, 60))
            .with_response(ModelResponse::tool_call("add_numbers", json!({"a": "two", "b": 3})))
            .with_response(
                ModelResponse::tool_call("add_numbers", json!({"a": 2, "b": 3}))
                    .with_tokens(10, 40),
            ),
    );
    let runner = TierRunner::new(common::registry(), model.clone(), common::quick_config());
    let case = ExpectedCase::new("t1_add", 1, "Add 2 and 3", "add_numbers")
        .with_args(json!({"a": 2, "b": 3}));

    let record = runner.run_case(&case).await;
    assert_eq!(record.attempts, 3);
    assert!(record.tool_match);
    assert_eq!(record.argument_score, 1.0);
    assert_eq!(record.reasoning_tokens, 40);
    assert_eq!(record.total_tokens, 100);
    assert_eq!(model.calls(), 3);
}

#[tokio::test]
async fn test_distractor_selected() {
    let model = Arc::new(ScriptedModel::new("local").with_response(ModelResponse::tool_call(
        "get_weather",
        json!({"city": "Boston"}),
    )));
    let runner = TierRunner::new(common::registry(), model, common::quick_config());
    let case = ExpectedCase::new("t5_msg", 5, "Tell Bob it is sunny", "send_message")
        .with_args(json!({"to": "bob@example.com", "subject": "Weather", "body": "It is sunny"}));

    let record = runner.run_case(&case).await;
    assert!(!record.tool_match);
    assert_eq!(record.argument_score, 0.0);
    assert_eq!(record.observed_tool.as_deref(), Some("get_weather"));
    assert!(record.failure.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_recorded_as_failure() {
    let model = Arc::new(ScriptedModel::new("slow").with_delayed_response(
        Duration::from_secs(600),
        ModelResponse::tool_call("get_weather", json!({"city": "Paris"})),
    ));
    let config = common::quick_config()
        .with_retry(RetryPolicy::default().with_timeout(Duration::from_secs(30)));
    let runner = TierRunner::new(common::registry(), model, config);
    let case = ExpectedCase::new("t1_slow", 1, "Weather in Paris?", "get_weather")
        .with_args(json!({"city": "Paris"}));

    let record = runner.run_case(&case).await;
    assert!(!record.tool_match);
    assert_eq!(record.observed_tool, None);
    assert_eq!(record.failure, Some(FailureReason::CollaboratorTimeout { timeout_ms: 30_000 }));
}

fn mixed_cases() -> Vec<ExpectedCase> {
    vec![
        ExpectedCase::new("t1_weather", 1, "weather", "get_weather")
            .with_args(json!({"city": "Paris"})),
        ExpectedCase::new("t1_add", 1, "add", "add_numbers").with_args(json!({"a": 1, "b": 2})),
        ExpectedCase::new("t2_search", 2, "search", "search_products")
            .with_args(json!({"query": "laptop", "max_price": 1000.0})),
        ExpectedCase::new("t2_event", 2, "event", "create_event")
            .with_args(json!({"title": "Sync", "date": "2024-03-15", "attendees": ["ann", "bo"]})),
        ExpectedCase::new("t3_broken", 3, "broken", "create_order").with_args(json!({"items": []})),
        ExpectedCase::new("t4_unknown", 4, "unknown", "archive_everything"),
    ]
}

fn mixed_model() -> ScriptedModel {
    ScriptedModel::new("local")
        .with_response_for(
            "weather",
            ModelResponse::tool_call("get_weather", json!({"city": "Paris"})),
        )
        .with_response_for("add", ModelResponse::tool_call("add_numbers", json!({"a": 1, "b": 2})))
        .with_response_for(
            "search",
            ModelResponse::tool_call(
                "search_products",
                json!({"query": "laptop", "max_price": 999.0}),
            ),
        )
        .with_response_for(
            "event",
            ModelResponse::tool_call(
                "create_event",
                json!({"title": "Sync", "date": "2024-03-15", "attendees": ["bo", "ann"]}),
            ),
        )
}

#[tokio::test]
async fn test_run_all_one_record_per_case() {
    let cases = mixed_cases();
    let runner =
        TierRunner::new(common::registry(), Arc::new(mixed_model()), common::quick_config());

    let report = runner.run_all(&cases).await;
    assert_eq!(report.total_cases(), cases.len());
    assert_eq!(report.tiers.iter().map(|t| t.tier).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert!(report.run_id.starts_with("local_"));

    let overall = &report.summary.overall;
    assert_eq!(overall.total, 6);
    assert_eq!(overall.successes, 2);
    assert_eq!(overall.failures.get("schema"), Some(&2));

    let broken = report.records().find(|r| r.test_id == "t3_broken").unwrap();
    assert!(broken.failure.as_ref().is_some_and(FailureReason::is_schema_defect));
    assert_eq!(broken.attempts, 0);

    let summary = report.format_summary();
    assert!(summary.contains("Tool-call evaluation: local"));
    assert!(summary.contains("Tier 1: 2/2 passed"));
}

#[tokio::test]
async fn test_run_into_jsonl_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs").join("local.jsonl");
    let cases = mixed_cases();
    let runner =
        TierRunner::new(common::registry(), Arc::new(mixed_model()), common::quick_config());

    let mut sink = JsonlSink::new(&path).unwrap();
    let report = runner.run_into_sink(&cases, &mut sink).await.unwrap();
    drop(sink);

    let lines: Vec<serde_json::Value> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let records = lines.iter().filter(|l| l["type"] == "record").count();
    let summaries = lines.iter().filter(|l| l["type"] == "summary").count();
    assert_eq!(records, cases.len());
    assert_eq!(summaries, group_by_tier(&cases).len());
    assert_eq!(report.tiers.len(), summaries);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["model"], "local");
}

#[tokio::test]
async fn test_memory_sink_and_counters() {
    let cases = mixed_cases();
    let runner = TierRunner::new(
        common::registry(),
        Arc::new(mixed_model()),
        common::quick_config().with_concurrency(1),
    );

    let mut sink = MemorySink::new();
    runner.run_into_sink(&cases, &mut sink).await.unwrap();
    assert_eq!(sink.records().count(), cases.len());

    // Schema defects never reach the model
    assert_eq!(runner.counters().snapshot().cases, 4);
}

#[tokio::test]
async fn test_case_and_registry_files() {
    let dir = tempfile::tempdir().unwrap();
    let tools_path = dir.path().join("tools.json");
    let cases_path = dir.path().join("cases.json");
    std::fs::write(&tools_path, serde_json::to_string(&common::catalog()).unwrap()).unwrap();
    CaseFile { cases: mixed_cases() }.save(&cases_path).unwrap();

    let registry = ToolRegistry::load(&tools_path).unwrap();
    assert_eq!(registry.len(), common::catalog().len());
    let cases = CaseFile::load(&cases_path).unwrap();
    assert_eq!(cases.cases, mixed_cases());

    let runner =
        TierRunner::new(Arc::new(registry), Arc::new(mixed_model()), common::quick_config());
    let report = runner.run_all(&cases.cases).await;
    assert_eq!(report.total_cases(), 6);
}
