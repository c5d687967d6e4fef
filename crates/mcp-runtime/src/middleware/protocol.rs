//! Protocol-level onion middleware.
//!
//! `rmcp::service` dispatches straight to `Service::handle_request` with no
//! interception layer, so this is new: an onion-model chain reusing the
//! `ProtocolResult`/`JsonObject` vocabulary already established by
//! `model::jsonrpc` and `error`, so a chain can wrap the same handler
//! signature `HandlerRegistry` stores.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;

use crate::error::{ProtocolError, ProtocolResult};
use crate::model::JsonObject;

/// The operation-scoped categories middleware can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ToolCall,
    ResourceRead,
    Sampling,
    Elicitation,
}

/// Which side of a message this middleware instance runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Where a middleware is registered: universal (every operation),
/// direction-scoped, or operation-scoped. Execution order is universal →
/// direction-scoped → operation-scoped → handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiddlewareScope {
    Universal,
    Direction(DirectionKey),
    Operation(OperationKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectionKey {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    pub method: String,
    pub operation: Option<OperationKind>,
    pub direction: Direction,
}

type HandlerFn = Arc<dyn Fn(JsonObject) -> BoxFuture<'static, ProtocolResult<JsonObject>> + Send + Sync>;
type NextFn = Arc<dyn Fn(JsonObject) -> BoxFuture<'static, ProtocolResult<JsonObject>> + Send + Sync>;

/// Passed to each middleware; calling it advances to the next layer (or the
/// handler, for the innermost middleware). Calling it twice errors.
pub struct Next {
    inner: NextFn,
    called: Arc<AtomicBool>,
}

impl Next {
    pub async fn run(&self, params: JsonObject) -> ProtocolResult<JsonObject> {
        if self.called.swap(true, Ordering::SeqCst) {
            return Err(ProtocolError::Middleware(
                "next() called multiple times".to_string(),
            ));
        }
        (self.inner)(params).await
    }
}

pub type MiddlewareFn =
    Arc<dyn Fn(MiddlewareContext, JsonObject, Next) -> BoxFuture<'static, ProtocolResult<JsonObject>> + Send + Sync>;

fn run_chain(
    middlewares: Arc<Vec<MiddlewareFn>>,
    index: usize,
    handler: HandlerFn,
    ctx: MiddlewareContext,
    params: JsonObject,
) -> BoxFuture<'static, ProtocolResult<JsonObject>> {
    Box::pin(async move {
        if index >= middlewares.len() {
            return handler(params).await;
        }
        let mw = middlewares[index].clone();
        let called = Arc::new(AtomicBool::new(false));
        let middlewares_rest = middlewares.clone();
        let handler_rest = handler.clone();
        let ctx_rest = ctx.clone();
        let next = Next {
            inner: Arc::new(move |p: JsonObject| {
                run_chain(middlewares_rest.clone(), index + 1, handler_rest.clone(), ctx_rest.clone(), p)
            }),
            called: called.clone(),
        };
        mw(ctx, params, next).await
    })
}

/// Owns the universal / direction-scoped / operation-scoped middleware
/// lists for one side (client or server) and composes them per call.
#[derive(Default)]
pub struct MiddlewareManager {
    universal: Vec<MiddlewareFn>,
    direction: HashMap<DirectionKey, Vec<MiddlewareFn>>,
    operation: HashMap<OperationKind, Vec<MiddlewareFn>>,
    started: bool,
}

impl MiddlewareManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering middleware after `connect()` is rejected.
    pub fn register(&mut self, scope: MiddlewareScope, middleware: MiddlewareFn) -> ProtocolResult<()> {
        if self.started {
            return Err(ProtocolError::Middleware(
                "Cannot register middleware after the server has started".to_string(),
            ));
        }
        match scope {
            MiddlewareScope::Universal => self.universal.push(middleware),
            MiddlewareScope::Direction(d) => self.direction.entry(d).or_default().push(middleware),
            MiddlewareScope::Operation(op) => self.operation.entry(op).or_default().push(middleware),
        }
        Ok(())
    }

    /// Called once the engine connects; freezes further registration.
    pub fn freeze(&mut self) {
        self.started = true;
    }

    pub async fn dispatch(
        &self,
        ctx: MiddlewareContext,
        params: JsonObject,
        handler: HandlerFn,
    ) -> ProtocolResult<JsonObject> {
        let direction_key = match ctx.direction {
            Direction::Outgoing => DirectionKey::Outgoing,
            Direction::Incoming => DirectionKey::Incoming,
        };
        let mut chain = self.universal.clone();
        if let Some(dir_mw) = self.direction.get(&direction_key) {
            chain.extend(dir_mw.iter().cloned());
        }
        if let Some(op) = ctx.operation {
            if let Some(op_mw) = self.operation.get(&op) {
                chain.extend(op_mw.iter().cloned());
            }
        }
        run_chain(Arc::new(chain), 0, handler, ctx, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough_handler() -> HandlerFn {
        Arc::new(|params: JsonObject| Box::pin(async move { Ok(params) }))
    }

    fn tracer(tag: &'static str, log: Arc<tokio::sync::Mutex<Vec<String>>>) -> MiddlewareFn {
        Arc::new(move |ctx: MiddlewareContext, params: JsonObject, next: Next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().await.push(format!("start_{tag}"));
                let _ = &ctx;
                let result = next.run(params).await?;
                log.lock().await.push(format!("end_{tag}"));
                Ok(result)
            })
        })
    }

    #[tokio::test]
    async fn onion_order_matches_registration_then_reverse() {
        let log = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let mut manager = MiddlewareManager::new();
        manager
            .register(MiddlewareScope::Universal, tracer("1", log.clone()))
            .unwrap();
        manager
            .register(MiddlewareScope::Universal, tracer("2", log.clone()))
            .unwrap();

        let ctx = MiddlewareContext {
            method: "tools/call".to_string(),
            operation: Some(OperationKind::ToolCall),
            direction: Direction::Incoming,
        };
        manager
            .dispatch(ctx, JsonObject::new(), passthrough_handler())
            .await
            .unwrap();

        let observed = log.lock().await.clone();
        assert_eq!(observed, vec!["start_1", "start_2", "end_2", "end_1"]);
    }

    #[tokio::test]
    async fn double_next_fails() {
        let mut manager = MiddlewareManager::new();
        manager
            .register(
                MiddlewareScope::Universal,
                Arc::new(|_ctx, params: JsonObject, next: Next| {
                    Box::pin(async move {
                        let _ = next.run(params.clone()).await?;
                        next.run(params).await
                    })
                }),
            )
            .unwrap();

        let ctx = MiddlewareContext {
            method: "tools/call".to_string(),
            operation: None,
            direction: Direction::Incoming,
        };
        let err = manager
            .dispatch(ctx, JsonObject::new(), passthrough_handler())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("next() called multiple times"));
    }

    #[test]
    fn registration_after_freeze_is_rejected() {
        let mut manager = MiddlewareManager::new();
        manager.freeze();
        let err = manager
            .register(MiddlewareScope::Universal, Arc::new(|_ctx, params, next| {
                Box::pin(async move { next.run(params).await })
            }))
            .unwrap_err();
        assert!(err.to_string().contains("Cannot register middleware"));
    }
}
