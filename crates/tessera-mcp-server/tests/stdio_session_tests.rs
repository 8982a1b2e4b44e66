//! End-to-end tests: a client talking to the engine through the stdio
//! transport.

mod common;

use std::time::Duration;

use serde_json::json;
use tessera_mcp_server::{ServerEvent, SessionConfig};

use common::{BURST_CHUNKS, STREAM_CHUNKS, TestClient, quiet_config, test_server};

#[tokio::test]
async fn test_initialize_reports_registered_capabilities() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());

    let response = client.initialize(json!({})).await;
    let result = &response["result"];
    assert_eq!(result["protocolVersion"], "2025-06-18");
    assert_eq!(result["serverInfo"]["name"], "integration-server");
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["resources"].is_object());
    assert!(result["capabilities"].get("prompts").is_none());

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_add_returns_sum_as_text() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let response = client.call_tool("add", json!({"a": 1, "b": 2})).await;
    assert_eq!(response["result"]["content"][0]["type"], "text");
    assert_eq!(response["result"]["content"][0]["text"], "3");
    assert!(response["result"].get("isError").is_none());

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_argument_is_rejected_before_the_tool_runs() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let response = client.call_tool("add", json!({"a": 1, "b": "x"})).await;
    let error = &response["error"];
    assert_eq!(error["code"], -32602);
    let message = error["message"].as_str().unwrap();
    assert!(message.contains("'add'"), "{message}");
    assert!(message.contains("b: expected number, received string"), "{message}");
    assert_eq!(error["data"]["tool"], "add");
    assert_eq!(error["data"]["issues"][0]["path"], "b");

    let response = client.call_tool("add", json!({"a": 1})).await;
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("b: required property is missing")
    );

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let response = client.call_tool("subtract", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
    assert!(response["error"]["message"].as_str().unwrap().contains("subtract"));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_timeout_reports_error_and_session_keeps_serving() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let response = client.call_tool("slow", json!({})).await;
    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Tool 'slow' timed out after 50 ms"
    );

    let response = client.call_tool("add", json!({"a": 20, "b": 22})).await;
    assert_eq!(response["result"]["content"][0]["text"], "42");

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_streamed_chunks_precede_final_result_in_order() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let id = client
        .request("tools/call", json!({"name": "chunks", "arguments": {}}))
        .await;
    let (response, before) = client.response_for(id).await;

    let chunks: Vec<_> = before
        .iter()
        .filter(|frame| frame["method"] == "notifications/tools/streamContent")
        .collect();
    assert_eq!(chunks.len(), STREAM_CHUNKS);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk["params"]["toolName"], "chunks");
        assert_eq!(chunk["params"]["content"]["text"], format!("chunk-{i}"));
    }
    assert_eq!(response["result"]["content"][0]["text"], "done");

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_last_chunk_without_suspension_is_flushed() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let id = client
        .request("tools/call", json!({"name": "burst", "arguments": {}}))
        .await;
    let (response, before) = client.response_for(id).await;

    let texts: Vec<_> = before
        .iter()
        .filter(|frame| frame["method"] == "notifications/tools/streamContent")
        .map(|frame| frame["params"]["content"]["text"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<_> = (0..BURST_CHUNKS).map(|i| format!("c{i}")).collect();
    assert_eq!(texts, expected);
    assert_eq!(response["result"]["content"][0]["text"], "final");
    assert_eq!(response["result"]["content"].as_array().unwrap().len(), 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_roots_list_changed_refetches_full_list() {
    let server = test_server();
    let mut events = server.subscribe();
    let config = SessionConfig {
        capability_poll_attempts: 100,
        ..quiet_config()
    };
    let mut client = TestClient::connect(&server, config);
    client
        .initialize(json!({"roots": {"listChanged": true}}))
        .await;

    let initial = client.recv().await;
    assert_eq!(initial["method"], "roots/list");
    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": initial["id"],
            "result": {"roots": [{"uri": "file:///a"}]}
        }))
        .await;
    let connected = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(connected, ServerEvent::Connect { .. }));

    client
        .notify("notifications/roots/list_changed", json!({}))
        .await;
    let refetch = client.recv().await;
    assert_eq!(refetch["method"], "roots/list");
    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": refetch["id"],
            "result": {"roots": [{"uri": "file:///b"}, {"uri": "file:///c", "name": "c"}]}
        }))
        .await;

    let changed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    let ServerEvent::RootsChanged { session_id, roots } = changed else {
        panic!("expected RootsChanged, got {changed:?}");
    };
    assert_eq!(session_id, connected.session_id());
    let uris: Vec<_> = roots.iter().map(|root| root.uri.as_str()).collect();
    assert_eq!(uris, ["file:///b", "file:///c"]);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_call_gets_no_response() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let id = client
        .request(
            "tools/call",
            json!({"name": "wait", "arguments": {}, "_meta": {"progressToken": "w1"}}),
        )
        .await;
    let progress = client.recv().await;
    assert_eq!(progress["method"], "notifications/progress");
    assert_eq!(progress["params"]["progressToken"], "w1");

    client
        .notify("notifications/cancelled", json!({"requestId": id, "reason": "user"}))
        .await;
    let ping = client.request("ping", json!({})).await;
    let (pong, before) = client.response_for(ping).await;
    assert_eq!(pong["result"], json!({}));
    assert!(before.iter().all(|frame| frame["id"] != json!(id)));
    assert!(client.try_recv(Duration::from_millis(100)).await.is_none());

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exact_resource_wins_over_template() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let direct = client
        .call("resources/read", json!({"uri": "user://admin/profile"}))
        .await;
    assert_eq!(direct["result"]["contents"][0]["text"], "direct");

    let templated = client
        .call("resources/read", json!({"uri": "user://42/profile"}))
        .await;
    assert_eq!(templated["result"]["contents"][0]["text"], "template:42");
    assert_eq!(templated["result"]["contents"][0]["uri"], "user://42/profile");

    let missing = client
        .call("resources/read", json!({"uri": "user://42/settings"}))
        .await;
    assert_eq!(missing["error"]["code"], -32002);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listings_are_stable_across_calls() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let first = client.call("tools/list", json!({})).await;
    let second = client.call("tools/list", json!({})).await;
    assert_eq!(first["result"], second["result"]);
    let names: Vec<_> = first["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["add", "slow", "wait", "chunks", "burst"]);
    assert_eq!(first["result"]["tools"][0]["inputSchema"]["type"], "object");

    let resources = client.call("resources/list", json!({})).await;
    assert_eq!(resources["result"]["resources"].as_array().unwrap().len(), 2);
    let templates = client.call("resources/templates/list", json!({})).await;
    assert_eq!(
        templates["result"]["resourceTemplates"][0]["uriTemplate"],
        "user://{id}/profile"
    );

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_frame_gets_parse_error_with_null_id() {
    let server = test_server();
    let mut client = TestClient::connect(&server, quiet_config());

    client.send_raw("{not json").await;
    let frame = client.recv().await;
    assert_eq!(frame["error"]["code"], -32700);
    assert!(frame["id"].is_null());

    // The session survives the bad frame.
    let response = client.initialize(json!({})).await;
    assert!(response["result"].is_object());

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_eof_closes_session_and_announces_disconnect() {
    let server = test_server();
    let mut events = server.subscribe();
    let mut client = TestClient::connect(&server, quiet_config());
    client.initialize(json!({})).await;

    let connected = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(connected, ServerEvent::Connect { .. }));

    client.shutdown().await.unwrap();
    let disconnected = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(disconnected, ServerEvent::Disconnect { .. }));
    assert_eq!(connected.session_id(), disconnected.session_id());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_follow_interval() {
    let interval = Duration::from_secs(1);
    let server = test_server();
    let config = SessionConfig {
        ping_interval: Some(interval),
        ..quiet_config()
    };
    let mut client = TestClient::connect(&server, config);
    client.initialize(json!({})).await;

    tokio::time::sleep(interval * 2).await;
    let mut pings = 0;
    while let Some(frame) = client.try_recv(Duration::from_millis(1)).await {
        if frame["method"] == "ping" {
            pings += 1;
        }
    }
    assert!((1..=3).contains(&pings), "saw {pings} pings");

    client.shutdown().await.unwrap();
}
