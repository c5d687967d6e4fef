//! End-to-end coverage of the protocol-level onion middleware: registration
//! order, operation scoping, the double-`next()` guard, and the
//! post-`connect()` freeze, all exercised through a live `Engine` dispatch
//! rather than `MiddlewareManager` alone (see `middleware::protocol`'s own
//! unit tests for the chain-composition internals this builds on).

use std::sync::Arc;

use mcp_runtime::engine::Engine;
use mcp_runtime::error::ProtocolError;
use mcp_runtime::middleware::protocol::{Direction, DirectionKey, MiddlewareScope, OperationKind};
use mcp_runtime::model::JsonObject;
use mcp_runtime::transport::duplex;
use serde_json::json;
use tokio::sync::Mutex;

fn tracer(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> mcp_runtime::middleware::protocol::MiddlewareFn {
    Arc::new(move |_ctx, params, next| {
        let log = log.clone();
        Box::pin(async move {
            log.lock().await.push(format!("enter:{tag}"));
            let result = next.run(params).await?;
            log.lock().await.push(format!("exit:{tag}"));
            Ok(result)
        })
    })
}

#[tokio::test]
async fn universal_direction_and_operation_middleware_run_outer_to_inner() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let server = Engine::new();
    server
        .register_middleware(MiddlewareScope::Universal, tracer("universal", log.clone()))
        .await
        .unwrap();
    server
        .register_middleware(
            MiddlewareScope::Direction(DirectionKey::Incoming),
            tracer("incoming", log.clone()),
        )
        .await
        .unwrap();
    server
        .register_middleware(
            MiddlewareScope::Operation(OperationKind::ToolCall),
            tracer("tool_call", log.clone()),
        )
        .await
        .unwrap();
    server
        .set_request_handler(
            "tools/call",
            Arc::new(|params, _ctx| Box::pin(async move { Ok(params.unwrap_or_default()) })),
        )
        .await;

    let (server_transport, client_transport) = duplex::pair();
    let mut server_handle = server.connect(Box::new(server_transport)).await;
    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    client.peer().send_request("tools/call", None).await.unwrap();

    let observed = log.lock().await.clone();
    assert_eq!(
        observed,
        vec![
            "enter:universal",
            "enter:incoming",
            "enter:tool_call",
            "exit:tool_call",
            "exit:incoming",
            "exit:universal",
        ]
    );

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn operation_scoped_middleware_does_not_fire_for_other_methods() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let server = Engine::new();
    server
        .register_middleware(
            MiddlewareScope::Operation(OperationKind::ToolCall),
            tracer("tool_call", log.clone()),
        )
        .await
        .unwrap();
    server
        .set_request_handler(
            "resources/read",
            Arc::new(|_params, _ctx| Box::pin(async move { Ok(JsonObject::new()) })),
        )
        .await;

    let (server_transport, client_transport) = duplex::pair();
    let mut server_handle = server.connect(Box::new(server_transport)).await;
    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    client.peer().send_request("resources/read", None).await.unwrap();
    assert!(log.lock().await.is_empty());

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn double_calling_next_surfaces_as_a_middleware_error() {
    let server = Engine::new();
    server
        .register_middleware(
            MiddlewareScope::Universal,
            Arc::new(|_ctx, params: JsonObject, next| {
                Box::pin(async move {
                    let _ = next.run(params.clone()).await?;
                    next.run(params).await
                })
            }),
        )
        .await
        .unwrap();
    server
        .set_request_handler(
            "echo",
            Arc::new(|params, _ctx| Box::pin(async move { Ok(params.unwrap_or_default()) })),
        )
        .await;

    let (server_transport, client_transport) = duplex::pair();
    let mut server_handle = server.connect(Box::new(server_transport)).await;
    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let err = client.peer().send_request("echo", None).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Wire(_)));
    assert!(err.to_string().contains("next() called multiple times"));

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn registering_middleware_after_connect_is_rejected() {
    let server = Engine::new();
    let (server_transport, _client_transport) = duplex::pair();
    let mut server_handle = server.connect(Box::new(server_transport)).await;

    let err = server
        .register_middleware(
            MiddlewareScope::Universal,
            Arc::new(|_ctx, params, next| Box::pin(async move { next.run(params).await })),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Cannot register middleware"));

    server_handle.close().await.unwrap();
}

#[tokio::test]
async fn middleware_can_short_circuit_by_replacing_params_without_calling_next() {
    let server = Engine::new();
    server
        .register_middleware(
            MiddlewareScope::Universal,
            Arc::new(|_ctx, _params, _next: mcp_runtime::middleware::protocol::Next| {
                Box::pin(async move {
                    let mut short_circuited = JsonObject::new();
                    short_circuited.insert("short_circuited".to_string(), json!(true));
                    Ok(short_circuited)
                })
            }),
        )
        .await
        .unwrap();
    server
        .set_request_handler(
            "echo",
            Arc::new(|_params, _ctx| {
                Box::pin(async move { panic!("handler should never run when middleware short-circuits") })
            }),
        )
        .await;

    let (server_transport, client_transport) = duplex::pair();
    let mut server_handle = server.connect(Box::new(server_transport)).await;
    let client = Engine::new();
    let mut client_handle = client.connect(Box::new(client_transport)).await;

    let result = client.peer().send_request("echo", None).await.unwrap();
    assert_eq!(result.get("short_circuited").and_then(|v| v.as_bool()), Some(true));

    client_handle.close().await.unwrap();
    server_handle.close().await.unwrap();
}
