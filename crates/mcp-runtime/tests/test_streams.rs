//! End-to-end coverage of the streaming tool-call manager: a full
//! `tools/stream_call` -> `tools/stream_chunk` -> `tools/stream_complete`
//! round trip wired through a live `Engine`, plus direct `StreamManager`
//! coverage for cancellation, unknown-stream/argument errors, and the
//! idle/warning timer supervisor (the merge-strategy and chunk-validation
//! happy paths already have unit tests alongside `StreamManager` itself).

use std::sync::Arc;
use std::time::Duration;

use mcp_runtime::engine::Engine;
use mcp_runtime::model::{JsonObject, MergeStrategy, StreamingArgument};
use mcp_runtime::streams::{StreamCallbacks, StreamConfig, StreamManager, StreamStatus};
use mcp_runtime::transport::duplex;
use serde_json::{Value, json};
use tokio::sync::Mutex;

#[tokio::test]
async fn stream_call_chunk_complete_round_trips_through_the_engine() {
    let manager = Arc::new(StreamManager::new(StreamCallbacks::default()));

    let server = Engine::new();
    {
        let manager = manager.clone();
        server
            .set_request_handler(
                "tools/stream_call",
                Arc::new(move |params, _ctx| {
                    let manager = manager.clone();
                    Box::pin(async move {
                        let params = params.unwrap_or_default();
                        let call_id = params.get("callId").and_then(|v| v.as_str()).unwrap().to_string();
                        let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap().to_string();
                        manager
                            .open(
                                call_id,
                                tool_name,
                                vec![StreamingArgument {
                                    name: "text".to_string(),
                                    merge_strategy: MergeStrategy::Concatenate,
                                }],
                                StreamConfig::default(),
                            )
                            .await;
                        Ok(JsonObject::new())
                    })
                }),
            )
            .await;
    }
    {
        let manager = manager.clone();
        server
            .set_request_handler(
                "tools/stream_chunk",
                Arc::new(move |params, _ctx| {
                    let manager = manager.clone();
                    Box::pin(async move {
                        let params = params.unwrap_or_default();
                        let call_id = params.get("callId").and_then(|v| v.as_str()).unwrap().to_string();
                        let argument = params.get("argument").and_then(|v| v.as_str()).unwrap().to_string();
                        let data = params.get("data").cloned().unwrap_or(Value::Null);
                        let is_final = params.get("isFinal").and_then(|v| v.as_bool()).unwrap_or(false);
                        manager.chunk(&call_id, &argument, data, is_final).await?;
                        Ok(JsonObject::new())
                    })
                }),
            )
            .await;
    }
    {
        let manager = manager.clone();
        server
            .set_request_handler(
                "tools/stream_complete",
                Arc::new(move |params, _ctx| {
                    let manager = manager.clone();
                    Box::pin(async move {
                        let params = params.unwrap_or_default();
                        let call_id = params.get("callId").and_then(|v| v.as_str()).unwrap().to_string();
                        match manager.complete(&call_id).await? {
                            Some(merged) => Ok(merged),
                            None => {
                                let mut pending = JsonObject::new();
                                pending.insert("pending".to_string(), json!(true));
                                Ok(pending)
                            }
                        }
                    })
                }),
            )
            .await;
    }
    let (server_transport, client_transport) = duplex::pair();
    let mut server_handle = server.connect(Box::new(server_transport)).await;

    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;
    let peer = client.peer();

    let mut open_params = JsonObject::new();
    open_params.insert("callId".to_string(), json!("call-1"));
    open_params.insert("name".to_string(), json!("echo"));
    peer.send_request("tools/stream_call", Some(open_params)).await.unwrap();

    for (chunk, is_final) in [("Hello ", false), ("World", true)] {
        let mut chunk_params = JsonObject::new();
        chunk_params.insert("callId".to_string(), json!("call-1"));
        chunk_params.insert("argument".to_string(), json!("text"));
        chunk_params.insert("data".to_string(), json!(chunk));
        chunk_params.insert("isFinal".to_string(), json!(is_final));
        peer.send_request("tools/stream_chunk", Some(chunk_params)).await.unwrap();
    }

    let mut complete_params = JsonObject::new();
    complete_params.insert("callId".to_string(), json!("call-1"));
    let result = peer
        .send_request("tools/stream_complete", Some(complete_params))
        .await
        .unwrap();
    assert_eq!(result.get("text"), Some(&json!("Hello World")));

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn cancelling_a_stream_removes_it_and_fires_the_callback() {
    let cancelled = Arc::new(Mutex::new(Vec::new()));
    let callbacks = StreamCallbacks {
        on_cancellation: Some({
            let cancelled = cancelled.clone();
            Arc::new(move |call_id: &str| {
                let cancelled = cancelled.clone();
                let call_id = call_id.to_string();
                tokio::spawn(async move {
                    cancelled.lock().await.push(call_id);
                });
            })
        }),
        ..Default::default()
    };
    let manager = StreamManager::new(callbacks);

    manager
        .open(
            "call-2",
            "echo",
            vec![StreamingArgument {
                name: "text".to_string(),
                merge_strategy: MergeStrategy::Concatenate,
            }],
            StreamConfig::default(),
        )
        .await;
    assert_eq!(manager.active_count().await, 1);

    manager.cancel("call-2").await;
    assert_eq!(manager.active_count().await, 0);
    assert_eq!(manager.status("call-2").await, None);

    for _ in 0..50 {
        if !cancelled.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(cancelled.lock().await.as_slice(), ["call-2".to_string()]);
}

#[tokio::test]
async fn unknown_stream_and_argument_are_rejected() {
    let manager = StreamManager::new(StreamCallbacks::default());

    let err = manager
        .chunk("does-not-exist", "text", json!("x"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, mcp_runtime::streams::StreamValidationError::UnknownStream(_)));

    manager
        .open(
            "call-3",
            "echo",
            vec![StreamingArgument {
                name: "text".to_string(),
                merge_strategy: MergeStrategy::Concatenate,
            }],
            StreamConfig::default(),
        )
        .await;
    let err = manager
        .chunk("call-3", "not_an_argument", json!("x"), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        mcp_runtime::streams::StreamValidationError::UnknownArgument { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn idle_stream_warns_then_times_out_on_a_paused_clock() {
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let callbacks = StreamCallbacks {
        on_warning: Some({
            let warnings = warnings.clone();
            Arc::new(move |call_id: &str| {
                let warnings = warnings.clone();
                let call_id = call_id.to_string();
                tokio::spawn(async move {
                    warnings.lock().await.push(call_id);
                });
            })
        }),
        on_timeout: Some({
            let timeouts = timeouts.clone();
            Arc::new(move |call_id: &str| {
                let timeouts = timeouts.clone();
                let call_id = call_id.to_string();
                tokio::spawn(async move {
                    timeouts.lock().await.push(call_id);
                });
            })
        }),
        ..Default::default()
    };
    let manager = StreamManager::new(callbacks);
    manager
        .open(
            "call-4",
            "echo",
            vec![StreamingArgument {
                name: "text".to_string(),
                merge_strategy: MergeStrategy::Concatenate,
            }],
            StreamConfig {
                warning_threshold_ms: 50,
                default_timeout_ms: 100,
                max_timeout_ms: 200,
            },
        )
        .await;

    tokio::time::advance(Duration::from_millis(60)).await;
    tokio::task::yield_now().await;
    assert_eq!(manager.status("call-4").await, Some(StreamStatus::Warning));

    tokio::time::advance(Duration::from_millis(60)).await;
    tokio::task::yield_now().await;
    assert_eq!(manager.status("call-4").await, Some(StreamStatus::Timeout));

    assert_eq!(warnings.lock().await.as_slice(), ["call-4".to_string()]);
    assert_eq!(timeouts.lock().await.as_slice(), ["call-4".to_string()]);
}
