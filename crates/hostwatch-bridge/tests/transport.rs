//! Provider client against in-memory and subprocess providers.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{attach_endpoint, attach_scripted, handshake_reply, FixedSnapshot, Reply};
use hostwatch_bridge::{BridgeError, ProviderClient, ProviderCommand};
use hostwatch_provider::ToolTable;
use serde_json::json;

#[tokio::test]
async fn test_handshake_against_endpoint() {
    let client = ProviderClient::detached();
    attach_endpoint(&client, ToolTable::new().with(FixedSnapshot::new(json!({}))))
        .await
        .unwrap();

    assert!(client.is_connected());
    let tools = client.tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "get_system_info");

    let schemas = client.registry();
    assert_eq!(schemas.schemas()[0].kind, "function");
}

#[tokio::test]
async fn test_fetch_telemetry_decodes_snapshot() {
    let client = ProviderClient::detached();
    let snapshot = json!({"cpu": {"cores": 8, "usage_percent": 42.5}});
    attach_endpoint(&client, ToolTable::new().with(FixedSnapshot::new(snapshot.clone())))
        .await
        .unwrap();

    assert_eq!(client.fetch_telemetry().await.unwrap(), snapshot);
}

#[tokio::test]
async fn test_unknown_tool_comes_back_as_text() {
    let client = ProviderClient::detached();
    attach_endpoint(&client, ToolTable::new()).await.unwrap();

    let text = client.call_tool("nonexistent", json!({})).await.unwrap();
    assert!(text.contains("nonexistent"));
    assert!(text.contains("-32601"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_raw_send_reports_rpc_error() {
    let client = ProviderClient::detached();
    attach_endpoint(&client, ToolTable::new()).await.unwrap();

    let err = client
        .send("tools/call", json!({"name": "nonexistent", "arguments": {}}))
        .await
        .unwrap_err();

    let BridgeError::Rpc(error) = err else {
        panic!("expected rpc error, got {:?}", err);
    };
    assert_eq!(error.code, -32601);
    assert!(error.message.contains("nonexistent"));
}

#[tokio::test(start_paused = true)]
async fn test_silent_provider_times_out_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let client = ProviderClient::detached().with_timeout(Duration::from_secs(10));
    attach_scripted(&client, move |message| {
        handshake_reply(message).unwrap_or_else(|| {
            seen.fetch_add(1, Ordering::SeqCst);
            Reply::Silent
        })
    })
    .await
    .unwrap();

    let started = tokio::time::Instant::now();
    let err = client
        .call_tool("get_system_info", json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::TransportTimeout(d) if d == Duration::from_secs(10)));
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mismatched_id_is_protocol_error() {
    let client = ProviderClient::detached();
    attach_scripted(&client, |message| {
        handshake_reply(message).unwrap_or_else(|| {
            Reply::Raw(r#"{"jsonrpc":"2.0","id":9999,"result":{"content":[]}}"#.to_string())
        })
    })
    .await
    .unwrap();

    let err = client.call_tool("get_system_info", json!({})).await.unwrap_err();
    let BridgeError::Protocol(message) = err else {
        panic!("expected protocol error, got {:?}", err);
    };
    assert!(message.contains("9999"));
    assert!(!client.is_connected());
}

fn text_result(text: &str) -> serde_json::Value {
    json!({"content": [{"type": "text", "text": text}]})
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_is_skipped_by_next_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let client = ProviderClient::detached().with_timeout(Duration::from_secs(1));
    attach_scripted(&client, move |message| {
        handshake_reply(message).unwrap_or_else(|| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Reply::Delayed(Duration::from_millis(1500), text_result("first"))
            } else {
                Reply::Result(text_result("second"))
            }
        })
    })
    .await
    .unwrap();

    let err = client.call_tool("get_system_info", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::TransportTimeout(_)));
    assert!(client.is_connected());

    let text = client.call_tool("get_system_info", json!({})).await.unwrap();
    assert_eq!(text, "second");
    assert!(client.is_connected());

    let text = client.call_tool("get_system_info", json!({})).await.unwrap();
    assert_eq!(text, "second");
}

#[tokio::test(start_paused = true)]
async fn test_line_cut_by_timeout_is_resumed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let client = ProviderClient::detached().with_timeout(Duration::from_secs(1));
    attach_scripted(&client, move |message| {
        handshake_reply(message).unwrap_or_else(|| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Reply::Stalled(Duration::from_millis(1500), text_result("first"))
            } else {
                Reply::Result(text_result("second"))
            }
        })
    })
    .await
    .unwrap();

    let err = client.call_tool("get_system_info", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::TransportTimeout(_)));

    let text = client.call_tool("get_system_info", json!({})).await.unwrap();
    assert_eq!(text, "second");
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_concurrent_calls_each_get_their_own_reply() {
    let client = Arc::new(ProviderClient::detached());
    attach_scripted(&client, |message| {
        handshake_reply(message).unwrap_or_else(|| {
            let params = message.params.clone().unwrap_or_default();
            if params["name"] == "get_system_info" {
                let id = message.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
                return Reply::Result(text_result(&json!({"request_id": id}).to_string()));
            }
            let n = params["arguments"]["n"].as_u64().unwrap_or(u64::MAX);
            Reply::Delayed(Duration::from_millis(n % 4 * 3), text_result(&format!("reply {}", n)))
        })
    })
    .await
    .unwrap();

    let mut calls = tokio::task::JoinSet::new();
    for n in 0..24u64 {
        let client = client.clone();
        calls.spawn(async move {
            let text = client.call_tool("echo", json!({"n": n})).await.unwrap();
            assert_eq!(text, format!("reply {}", n));
            None
        });
    }
    for _ in 0..6 {
        let client = client.clone();
        calls.spawn(async move {
            let snapshot = client.fetch_telemetry().await.unwrap();
            snapshot["request_id"].as_str().map(str::to_string)
        });
    }

    let mut telemetry_ids = std::collections::HashSet::new();
    while let Some(outcome) = calls.join_next().await {
        if let Some(id) = outcome.unwrap() {
            assert!(telemetry_ids.insert(id));
        }
    }
    assert_eq!(telemetry_ids.len(), 6);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_garbage_reply_is_protocol_error() {
    let client = ProviderClient::detached();
    attach_scripted(&client, |message| {
        handshake_reply(message).unwrap_or_else(|| Reply::Raw("not json at all".to_string()))
    })
    .await
    .unwrap();

    let err = client.send("tools/list", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
}

#[tokio::test]
async fn test_reply_without_result_or_error_is_protocol_error() {
    let client = ProviderClient::detached();
    attach_scripted(&client, |message| {
        handshake_reply(message).unwrap_or_else(|| {
            Reply::Raw(format!(
                r#"{{"jsonrpc":"2.0","id":{}}}"#,
                message.id.as_ref().map(|id| id.to_string()).unwrap_or_default()
            ))
        })
    })
    .await
    .unwrap();

    let err = client.send("tools/list", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
}

#[tokio::test]
async fn test_hangup_is_transport_closed() {
    let client = ProviderClient::detached();
    attach_scripted(&client, |message| handshake_reply(message).unwrap_or(Reply::Hangup))
        .await
        .unwrap();
    assert!(client.is_connected());

    let err = client.call_tool("get_system_info", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::TransportClosed));
    assert!(!client.is_connected());

    let err = client.fetch_telemetry().await.unwrap_err();
    assert!(matches!(err, BridgeError::TelemetryUnavailable(_)));
}

#[tokio::test]
async fn test_error_payload_is_telemetry_unavailable() {
    let client = ProviderClient::detached();
    attach_scripted(&client, |message| {
        handshake_reply(message).unwrap_or_else(|| {
            Reply::Result(json!({
                "content": [{"type": "text", "text": "{\"error\": \"df not found\"}"}]
            }))
        })
    })
    .await
    .unwrap();

    let err = client.fetch_telemetry().await.unwrap_err();
    let BridgeError::TelemetryUnavailable(message) = err else {
        panic!("expected telemetry unavailable, got {:?}", err);
    };
    assert!(message.contains("df not found"));
}

#[tokio::test]
async fn test_failed_handshake_leaves_client_disconnected() {
    let client = ProviderClient::detached();
    let err = attach_scripted(&client, |message| match message.method.as_str() {
        "initialize" => Reply::Raw(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32603,"message":"boom"}}"#.to_string()),
        _ => Reply::Silent,
    })
    .await
    .unwrap_err();

    assert!(matches!(err, BridgeError::Handshake(ref cause) if matches!(**cause, BridgeError::Rpc(_))));
    assert!(!client.is_connected());
    assert!(client.tools().is_empty());
}

#[tokio::test]
async fn test_close_clears_connectivity() {
    let client = ProviderClient::detached();
    attach_endpoint(&client, ToolTable::new().with(FixedSnapshot::new(json!({}))))
        .await
        .unwrap();

    client.close().await;
    assert!(!client.is_connected());
    assert!(client.tools().is_empty());
    assert!(matches!(
        client.send("tools/list", json!({})).await,
        Err(BridgeError::NotStarted)
    ));

    client.close().await;
}

#[tokio::test]
async fn test_spawn_failure() {
    let client = ProviderClient::new(ProviderCommand::new("/nonexistent/hostwatch-provider"));
    let err = client.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::ProcessSpawn { .. }));
    assert!(!client.is_connected());
}

#[cfg(unix)]
mod subprocess {
    use super::*;

    const INIT_REPLY: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"sh","version":"0"}}}"#;
    const LIST_REPLY: &str = r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"get_system_info","description":"Host metrics"}]}}"#;

    fn shell(script: String) -> ProviderClient {
        ProviderClient::new(ProviderCommand::new("sh").arg("-c").arg(script))
            .with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_child_exiting_after_handshake() {
        // initialize, the initialized notification, tools/list, then exit
        let client = shell(format!(
            "read -r _; echo '{}'; read -r _; read -r _; echo '{}'; echo 'bye' >&2",
            INIT_REPLY, LIST_REPLY
        ));

        client.start().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.tools()[0].name, "get_system_info");

        let err = client.call_tool("get_system_info", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::TransportClosed));
        assert!(!client.is_connected());

        client.close().await;
    }

    #[tokio::test]
    async fn test_child_exiting_before_handshake() {
        let client = shell("exit 0".to_string());

        let err = client.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::Handshake(ref cause) if cause.is_disconnect()));
        assert!(!client.is_connected());

        client.close().await;
    }
}
