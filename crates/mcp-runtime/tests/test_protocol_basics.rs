//! End-to-end coverage of the protocol engine: request/response correlation,
//! notification delivery, per-request timeouts, cancellation, and progress.
//! Two `Engine`s are wired over `transport::duplex::pair()`, the same way
//! `rmcp`'s own tests run a `Service` against an in-memory transport instead
//! of a socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mcp_runtime::engine::{Engine, RequestOptions};
use mcp_runtime::error::ProtocolError;
use mcp_runtime::model::{JsonObject, PROGRESS_NOTIFICATION_METHOD, ProgressNotificationParam};
use mcp_runtime::transport::duplex;
use serde_json::json;
use tokio::sync::Mutex;

fn obj(pairs: &[(&str, serde_json::Value)]) -> JsonObject {
    let mut map = JsonObject::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v.clone());
    }
    map
}

#[tokio::test]
async fn request_response_roundtrips_through_the_registry() {
    let (server_transport, client_transport) = duplex::pair();

    let server = Engine::new();
    server
        .set_request_handler(
            "echo",
            Arc::new(|params, _ctx| Box::pin(async move { Ok(params.unwrap_or_default()) })),
        )
        .await;
    let mut server_handle = server.connect(Box::new(server_transport)).await;

    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let params = obj(&[("x", json!(1)), ("y", json!("hello"))]);
    let result = client
        .peer()
        .send_request("echo", Some(params.clone()))
        .await
        .expect("echo should succeed");

    assert_eq!(result, params);

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn unknown_method_comes_back_as_method_not_found() {
    let (server_transport, client_transport) = duplex::pair();

    let server = Engine::new();
    let mut server_handle = server.connect(Box::new(server_transport)).await;
    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let err = client
        .peer()
        .send_request("does/not/exist", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Wire(_)));
    assert_eq!(err.code(), mcp_runtime::error::METHOD_NOT_FOUND);

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn notifications_reach_the_registered_handler_with_no_response_expected() {
    let (server_transport, client_transport) = duplex::pair();

    let received = Arc::new(Mutex::new(None));
    let server = Engine::new();
    {
        let received = received.clone();
        server
            .set_notification_handler(
                "ping",
                Arc::new(move |params, _ctx| {
                    let received = received.clone();
                    Box::pin(async move {
                        *received.lock().await = Some(params);
                        Ok(())
                    })
                }),
            )
            .await;
    }
    let mut server_handle = server.connect(Box::new(server_transport)).await;
    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let payload = obj(&[("seq", json!(7))]);
    client
        .peer()
        .send_notification("ping", Some(payload.clone()))
        .await
        .unwrap();

    // Notifications are one-way; poll briefly rather than assume a response cycle.
    for _ in 0..50 {
        if received.lock().await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*received.lock().await, Some(payload));

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn request_without_a_listening_peer_times_out() {
    // Connect the client side only; the other half of the pair is never
    // read from, so no response can ever arrive.
    let (client_transport, _unread_peer_half) = duplex::pair();

    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let handle = client
        .peer()
        .send_cancellable_request(
            "anything",
            None,
            RequestOptions {
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = handle.await_response().await.unwrap_err();
    assert!(matches!(err, ProtocolError::RequestTimeout(_)));

    client_handle.close().await.unwrap();
}

#[tokio::test]
async fn cancelling_a_request_cancels_the_handlers_token() {
    let (server_transport, client_transport) = duplex::pair();

    let was_cancelled = Arc::new(AtomicBool::new(false));
    let server = Engine::new();
    {
        let was_cancelled = was_cancelled.clone();
        server
            .set_request_handler(
                "slow",
                Arc::new(move |_params, ctx| {
                    let was_cancelled = was_cancelled.clone();
                    Box::pin(async move {
                        tokio::select! {
                            _ = ctx.ct.cancelled() => {
                                was_cancelled.store(true, Ordering::SeqCst);
                                Err(ProtocolError::RequestCancelled { reason: None })
                            }
                            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                                Ok(JsonObject::new())
                            }
                        }
                    })
                }),
            )
            .await;
    }
    let mut server_handle = server.connect(Box::new(server_transport)).await;
    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let request_handle = client
        .peer()
        .send_cancellable_request("slow", None, RequestOptions::default())
        .await
        .unwrap();
    request_handle.cancel(Some("no longer needed".to_string())).await.unwrap();

    for _ in 0..50 {
        if was_cancelled.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(was_cancelled.load(Ordering::SeqCst));

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn progress_notifications_are_delivered_to_the_caller_before_the_response() {
    let (server_transport, client_transport) = duplex::pair();

    let server = Engine::new();
    server
        .set_request_handler(
            "report",
            Arc::new(|_params, ctx| {
                Box::pin(async move {
                    if let Some(token) = ctx.meta.progress_token() {
                        let param = ProgressNotificationParam {
                            progress_token: token,
                            progress: 0.5,
                            total: Some(1.0),
                            message: Some("halfway".to_string()),
                        };
                        if let Ok(serde_json::Value::Object(params)) = serde_json::to_value(param) {
                            let _ = ctx
                                .peer
                                .send_notification(PROGRESS_NOTIFICATION_METHOD, Some(params))
                                .await;
                        }
                    }
                    Ok(obj(&[("status", json!("done"))]))
                })
            }),
        )
        .await;
    let mut server_handle = server.connect(Box::new(server_transport)).await;

    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let on_progress = {
        let events = events.clone();
        Arc::new(move |progress: f64, total: Option<f64>, message: Option<String>| {
            let events = events.clone();
            tokio::spawn(async move {
                events.lock().await.push((progress, total, message));
            });
        })
    };

    let handle = client
        .peer()
        .send_cancellable_request(
            "report",
            None,
            RequestOptions {
                on_progress: Some(on_progress),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let result = handle.await_response().await.unwrap();
    assert_eq!(result.get("status").and_then(|v| v.as_str()), Some("done"));

    // The progress callback is dispatched from the transport loop via a
    // spawned task; give it a moment to land.
    for _ in 0..50 {
        if !events.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let recorded = events.lock().await.clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, 0.5);
    assert_eq!(recorded[0].1, Some(1.0));
    assert_eq!(recorded[0].2.as_deref(), Some("halfway"));

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}
