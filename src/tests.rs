//! End-to-end turn tests for Orchestrator

use crate::orchestrator::{APOLOGY_REPLY, EMPTY_INPUT_REPLY, FAREWELL_REPLY};
use crate::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    retriever: Arc<StaticRetriever>,
    search: Arc<StaticWebSearch>,
    model: Arc<ScriptedModel>,
    orchestrator: Orchestrator,
    _dir: TempDir,
}

fn search_results() -> SearchResults {
    SearchResults {
        organic: (1..=5)
            .map(|i| SearchEntry {
                title: format!("Result {}", i),
                snippet: format!("Snippet {}", i),
                link: None,
            })
            .collect(),
        error: None,
    }
}

fn harness_with(search: StaticWebSearch, model: ScriptedModel) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = RouterConfig {
        snapshot_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let retriever = Arc::new(StaticRetriever::from_triples(&[
        ("The home buying process starts with pre-approval.", "general_knowledge.txt", 0.2),
        ("Brickell is Miami's financial district.", "miami_neighborhoods.txt", 0.5),
    ]));
    let search = Arc::new(search);
    let model = Arc::new(model);
    let orchestrator = Orchestrator::new(retriever.clone(), search.clone(), model.clone(), config);
    Harness {
        retriever,
        search,
        model,
        orchestrator,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(StaticWebSearch::new(search_results()), ScriptedModel::new("Here is what I found."))
}

#[tokio::test]
async fn test_buying_process_uses_knowledge_base_only() {
    let mut h = harness();
    let reply = h.orchestrator.turn("What's the home buying process in Miami?").await;

    assert_eq!(reply, "Here is what I found.");
    assert_eq!(h.search.calls(), 0);
    assert_eq!(h.retriever.calls(), 1);

    let prompt = &h.model.prompts()[0];
    assert!(prompt.contains("Information Sources Used: Knowledge Base\n"));
    assert!(prompt.contains("Based on knowledge base:\n[From general_knowledge.txt]"));
    assert!(prompt.contains("This is the start of our conversation."));
    assert!(prompt.contains("User Question: What's the home buying process in Miami?"));

    let recorded = h.orchestrator.memory().recent(1)[0];
    assert_eq!(recorded.sources_used, "Knowledge Base");
}

#[tokio::test]
async fn test_mortgage_rates_search_rewritten() {
    let mut h = harness();
    h.orchestrator.turn("Current mortgage rates in Miami").await;

    let queries = h.search.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].0.starts_with("Current mortgage rates in Miami"));
    assert!(queries[0].0.contains("2024 real estate"));

    // only the top three results reach the prompt
    let prompt = &h.model.prompts()[0];
    assert!(prompt.contains("Current information:\nResult 1: Snippet 1\nResult 2: Snippet 2\nResult 3: Snippet 3"));
    assert!(!prompt.contains("Result 4"));
}

#[tokio::test]
async fn test_comparison_investment_uses_both() {
    let mut h = harness();
    h.orchestrator.turn("Compare Brickell vs Aventura for investment").await;

    assert_eq!(h.retriever.calls(), 1);
    assert_eq!(h.search.calls(), 1);
    let recorded = h.orchestrator.memory().recent(1)[0];
    assert_eq!(recorded.sources_used, "Knowledge Base, Current Web Data");
    assert!(h.model.prompts()[0].contains("From Knowledge Base:"));
}

#[tokio::test]
async fn test_blank_input_short_circuits() {
    let mut h = harness();
    assert_eq!(h.orchestrator.turn("   ").await, EMPTY_INPUT_REPLY);
    assert_eq!(h.orchestrator.turn("").await, EMPTY_INPUT_REPLY);

    assert_eq!(h.retriever.calls(), 0);
    assert_eq!(h.search.calls(), 0);
    assert_eq!(h.model.calls(), 0);
    assert!(h.orchestrator.memory().is_empty());
}

#[tokio::test]
async fn test_exit_keyword_snapshots_without_generation() {
    let mut h = harness();
    h.orchestrator.turn("Explain closing costs").await;

    let reply = h.orchestrator.turn("Bye").await;
    assert_eq!(reply, FAREWELL_REPLY);
    assert_eq!(h.model.calls(), 1);

    let path = h.orchestrator.snapshot_path().to_path_buf();
    assert!(path.exists());
    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("session_") && file_name.ends_with(".json"));

    let snapshot = SnapshotStore::load(&path).unwrap();
    assert_eq!(snapshot.conversation_memory.len(), 1);
    assert_eq!(snapshot.conversation_memory[0].user_text, "Explain closing costs");
}

#[tokio::test]
async fn test_generation_failure_apologizes_without_recording() {
    let model = ScriptedModel::new("ok").then_fail("quota exceeded");
    let mut h = harness_with(StaticWebSearch::new(search_results()), model);

    let reply = h.orchestrator.turn("Explain escrow").await;
    assert_eq!(reply, APOLOGY_REPLY);
    assert!(h.orchestrator.memory().is_empty());

    // next turn recovers
    assert_eq!(h.orchestrator.turn("Explain escrow").await, "ok");
    assert_eq!(h.orchestrator.memory().len(), 1);
}

#[tokio::test]
async fn test_search_failure_degrades_to_knowledge_base() {
    let mut h = harness_with(StaticWebSearch::failing(), ScriptedModel::new("fine"));
    let reply = h.orchestrator.turn("What are the latest prices in Brickell?").await;

    assert_eq!(reply, "fine");
    assert_eq!(h.search.calls(), 1);
    let recorded = h.orchestrator.memory().recent(1)[0];
    assert_eq!(recorded.sources_used, "Knowledge Base");
    assert!(h.model.prompts()[0].contains("Based on knowledge base:"));
}

#[tokio::test]
async fn test_all_sources_empty_uses_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let config = RouterConfig {
        snapshot_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let model = Arc::new(ScriptedModel::new("general answer"));
    let mut orchestrator = Orchestrator::new(
        Arc::new(FailingRetriever),
        Arc::new(StaticWebSearch::new(SearchResults::failed("no key"))),
        model.clone(),
        config,
    );

    let reply = orchestrator.turn("Current mortgage rates for investment").await;
    assert_eq!(reply, "general answer");
    let prompt = &model.prompts()[0];
    assert!(prompt.contains("Information Sources Used: General Knowledge"));
    assert!(prompt.contains(crate::combiner::NO_INFORMATION));
    assert_eq!(orchestrator.memory().recent(1)[0].sources_used, "");
}

#[tokio::test]
async fn test_location_appended_once() {
    let mut h = harness();
    let mut ctx = ContextMap::new();
    ctx.insert("location".into(), json!("Miami-Dade County, FL"));
    h.orchestrator.update_context(ctx);

    h.orchestrator.turn("Homes for sale near the beach").await;
    h.orchestrator.turn("Anything new in Miami-Dade County, FL today?").await;

    let queries = h.search.queries();
    assert_eq!(queries[0].0, "Homes for sale near the beach MLS listings Miami-Dade County, FL");
    assert_eq!(queries[0].1.as_deref(), Some("Miami-Dade County, FL"));
    assert_eq!(queries[1].0, "Anything new in Miami-Dade County, FL today?");

    let prompt = &h.model.prompts()[1];
    assert!(prompt.contains(r#"Current Context: {"location":"Miami-Dade County, FL"}"#));
}

#[tokio::test]
async fn test_prompt_history_window_and_truncation() {
    let long_reply = "x".repeat(500);
    let model = ScriptedModel::new("short")
        .then_reply("first reply")
        .then_reply(long_reply.clone())
        .then_reply("third reply");
    let mut h = harness_with(StaticWebSearch::new(search_results()), model);

    h.orchestrator.turn("Explain HOA fees").await;
    h.orchestrator.turn("Explain PMI").await;
    h.orchestrator.turn("Explain escrow").await;
    h.orchestrator.turn("Explain title insurance").await;

    let last_prompt = h.model.prompts().pop().unwrap();
    // last two exchanges only, oldest first
    assert!(!last_prompt.contains("User: Explain HOA fees"));
    let pmi = last_prompt.find("User: Explain PMI").unwrap();
    let escrow = last_prompt.find("User: Explain escrow").unwrap();
    assert!(pmi < escrow);
    assert!(last_prompt.contains(&format!("Assistant: {}...", "x".repeat(200))));
    assert!(!last_prompt.contains(&"x".repeat(201)));
}

#[tokio::test]
async fn test_memory_bounded_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let config = RouterConfig {
        snapshot_dir: dir.path().to_path_buf(),
        memory_capacity: 3,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(
        Arc::new(StaticRetriever::default()),
        Arc::new(StaticWebSearch::default()),
        Arc::new(ScriptedModel::new("noted")),
        config,
    );
    for i in 0..5 {
        orchestrator.turn(&format!("Explain term {}", i)).await;
    }
    let users: Vec<_> = orchestrator.memory().iter().map(|e| e.user_text.clone()).collect();
    assert_eq!(users, vec!["Explain term 2", "Explain term 3", "Explain term 4"]);
}

#[tokio::test]
async fn test_shutdown_and_resume() {
    let mut h = harness();
    let mut ctx = ContextMap::new();
    ctx.insert("budget".into(), json!(650000));
    h.orchestrator.update_context(ctx);
    h.orchestrator.turn("Explain closing costs").await;
    h.orchestrator.turn("What is PMI?").await;
    h.orchestrator.shutdown();

    let path = h.orchestrator.snapshot_path().to_path_buf();
    let mut resumed = harness();
    resumed.orchestrator.resume(&path).unwrap();

    let before: Vec<_> = h.orchestrator.memory().iter().cloned().collect();
    let after: Vec<_> = resumed.orchestrator.memory().iter().cloned().collect();
    assert_eq!(before, after);
    assert_eq!(resumed.orchestrator.context()["budget"], 650000);
    assert_eq!(resumed.orchestrator.snapshot_path(), path.as_path());
}

#[tokio::test]
async fn test_resumed_context_survives_defaults() {
    let mut h = harness();
    let mut ctx = ContextMap::new();
    ctx.insert("location".into(), json!("Orlando, FL"));
    h.orchestrator.update_context(ctx);
    h.orchestrator.shutdown();

    let mut resumed = harness();
    resumed.orchestrator.resume(h.orchestrator.snapshot_path()).unwrap();

    let mut defaults = ContextMap::new();
    defaults.insert("location".into(), json!("Miami-Dade County, FL"));
    defaults.insert("service_area".into(), json!("South Florida"));
    resumed.orchestrator.seed_context(defaults);

    assert_eq!(resumed.orchestrator.context()["location"], "Orlando, FL");
    assert_eq!(resumed.orchestrator.context()["service_area"], "South Florida");

    resumed.orchestrator.turn("Homes for sale near the lake").await;
    assert_eq!(resumed.search.queries()[0].1.as_deref(), Some("Orlando, FL"));
}

#[tokio::test]
async fn test_shutdown_swallows_write_failure() {
    let dir = tempfile::tempdir().unwrap();
    // a regular file where the snapshot directory should be
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "x").unwrap();
    let config = RouterConfig {
        snapshot_dir: blocker.join("nested"),
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(
        Arc::new(StaticRetriever::default()),
        Arc::new(StaticWebSearch::default()),
        Arc::new(ScriptedModel::new("ok")),
        config,
    );

    orchestrator.shutdown();
    assert_eq!(orchestrator.turn("quit").await, FAREWELL_REPLY);
    assert!(!orchestrator.snapshot_path().exists());
}

#[tokio::test]
async fn test_persist_every_turn() {
    let dir = tempfile::tempdir().unwrap();
    let config = RouterConfig {
        snapshot_dir: dir.path().to_path_buf(),
        persist_every_turn: true,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(
        Arc::new(StaticRetriever::default()),
        Arc::new(StaticWebSearch::default()),
        Arc::new(ScriptedModel::new("ok")),
        config,
    );
    orchestrator.turn("Explain escrow").await;
    let snapshot = SnapshotStore::load(orchestrator.snapshot_path()).unwrap();
    assert_eq!(snapshot.conversation_memory.len(), 1);
}
