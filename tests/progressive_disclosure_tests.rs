//! Progressive disclosure: metadata-first discovery, lazy activation.

use overseer::{CoreConfig, CoreServer};
use serde_json::json;

async fn server() -> (tempfile::TempDir, CoreServer) {
    let dir = tempfile::tempdir().unwrap();
    let server = CoreServer::new(CoreConfig::for_project(dir.path()))
        .await
        .unwrap();
    (dir, server)
}

#[tokio::test]
async fn tool_find_ranks_by_relevance() {
    // S4: "list tasks" surfaces registry_list first; agent_spawn stays out
    // of the top results.
    let (_guard, server) = server().await;

    let response = server
        .dispatch("tool_find", json!({"query": "list tasks", "limit": 3}))
        .await;
    assert!(response.ok);

    let data = response.data.unwrap();
    let results = data["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["name"], "registry_list");
    assert!(results.iter().all(|r| r["name"] != "agent_spawn"));
}

#[tokio::test]
async fn find_is_deterministic() {
    let (_guard, server) = server().await;

    let first = server
        .dispatch("tool_find", json!({"query": "budget cost"}))
        .await;
    let second = server
        .dispatch("tool_find", json!({"query": "budget cost"}))
        .await;
    assert_eq!(
        serde_json::to_string(&first.data).unwrap(),
        serde_json::to_string(&second.data).unwrap()
    );
}

#[tokio::test]
async fn empty_query_returns_nothing() {
    let (_guard, server) = server().await;
    let response = server.dispatch("tool_find", json!({"query": ""})).await;
    assert!(response.ok);
    assert!(
        response.data.unwrap()["results"]
            .as_array()
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn load_activates_exactly_once() {
    let (_guard, server) = server().await;

    let response = server
        .dispatch("tool_load", json!({"names": ["registry_next"]}))
        .await;
    assert_eq!(response.data.as_ref().unwrap()["newly_activated_count"], 1);

    let response = server
        .dispatch("tool_load", json!({"names": ["registry_next"]}))
        .await;
    let data = response.data.unwrap();
    assert_eq!(data["newly_activated_count"], 0);
    assert_eq!(data["already_active_count"], 1);
}

#[tokio::test]
async fn describe_reveals_schema_without_activation() {
    let (_guard, server) = server().await;

    let response = server
        .dispatch("tool_describe", json!({"name": "engine_execute"}))
        .await;
    assert!(response.ok);

    let data = response.data.unwrap();
    assert_eq!(data["active"], false);
    assert!(data["input_schema"].is_object());
    assert_eq!(data["category"], "engine");
}

#[tokio::test]
async fn loaded_tool_becomes_dispatchable() {
    let (_guard, server) = server().await;

    // Before load: refused with guidance.
    let response = server.dispatch("spec_list", json!({"type": "spec"})).await;
    assert!(!response.ok);

    server
        .dispatch("tool_load", json!({"names": ["spec_init", "spec_list"]}))
        .await;
    let response = server.dispatch("spec_init", json!({})).await;
    assert!(response.ok);

    let response = server.dispatch("spec_list", json!({"type": "spec"})).await;
    assert!(response.ok);
}

#[tokio::test]
async fn tool_active_tracks_activation() {
    let (_guard, server) = server().await;

    let active_names = |response: overseer::ToolResponse| -> Vec<String> {
        response.data.unwrap()["active"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap().to_string())
            .collect()
    };

    let before = active_names(server.dispatch("tool_active", json!({})).await);
    assert!(before.contains(&"tool_find".to_string()));
    assert!(!before.contains(&"plugin_list".to_string()));

    server
        .dispatch("tool_load", json!({"names": ["plugin_list"]}))
        .await;
    let after = active_names(server.dispatch("tool_active", json!({})).await);
    assert!(after.contains(&"plugin_list".to_string()));
}
