//! The protocol engine: owns one `Transport`, demultiplexes inbound
//! messages, and drives the handler registry / plugin / middleware stack
//! around dispatch.
//!
//! A direct generalization of `rmcp::service::serve_inner`'s event loop:
//! the `tokio::select!` over `peer_rx` / `transport.receive()` / `sink_rx`
//! survives in shape (resolve one `Event` per iteration, then act on it
//! with sole ownership of `&mut transport`, matching its habit of handling
//! inline rather than spawning onto the transport), but `ServiceRole`'s
//! compile-time `Req`/`Resp`/`Not` triple is replaced by a single
//! `JsonRpcMessage` plus string-keyed dispatch through `HandlerRegistry`,
//! so one `Engine` type serves both client and server roles.
//! `Peer`/`RequestHandle`/`EngineHandle` keep `rmcp`'s
//! `Peer`/`RequestHandle`/`RunningService` names and responsibilities,
//! generalized the same way.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::instrument;

use crate::error::{ProtocolError, ProtocolResult};
use crate::middleware::protocol::{
    Direction, MiddlewareContext, MiddlewareFn, MiddlewareManager, MiddlewareScope, OperationKind,
};
use crate::model::jsonrpc::{
    CANCELLED_NOTIFICATION_METHOD, CancelledNotificationParam, JsonRpcError, JsonRpcErrorMessage,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROGRESS_NOTIFICATION_METHOD,
    ProgressNotificationParam,
};
use crate::model::meta::{
    Extensions, GetExtensions, GetMeta, JsonObject, Meta, NumberOrString, ProgressToken, RelatedTask, RequestId,
};
use crate::plugin::{Plugin, PluginContext, PluginManager};
use crate::progress::{ProgressCallback, ProgressManager};
use crate::registry::HandlerRegistry;
use crate::tasks::manager::TaskContext;
use crate::timeout::{ResetOutcome, TimeoutManager, TimeoutOptions};
use crate::transport::BoxTransport;

/// Request-scoped context handed to a registered request handler. Mirrors
/// `rmcp`'s `RequestContext<R>`, minus the `ServiceRole` type parameter.
#[derive(Clone)]
pub struct HandlerContext {
    /// Cancelled when a matching `notifications/cancelled` arrives, or on
    /// engine close.
    pub ct: CancellationToken,
    pub id: RequestId,
    pub meta: Meta,
    pub extensions: Extensions,
    pub peer: Peer,
    /// Present when this request was invoked with task-augmented execution;
    /// lets the handler report progress and stamp `relatedTask` on messages
    /// it sends.
    pub task: Option<TaskContext>,
}

/// Notification-scoped context, mirroring `rmcp`'s `NotificationContext<R>`.
#[derive(Clone)]
pub struct NotificationContext {
    pub meta: Meta,
    pub extensions: Extensions,
    pub peer: Peer,
}

type Responder<T> = oneshot::Sender<T>;

enum PeerSinkMessage {
    Request {
        method: String,
        params: Option<JsonObject>,
        meta: Meta,
        id: RequestId,
        responder: Responder<ProtocolResult<JsonObject>>,
    },
    Notification {
        method: String,
        params: Option<JsonObject>,
        meta: Meta,
        responder: Responder<ProtocolResult<()>>,
    },
}

/// Per-call options for an outgoing request.
#[derive(Default, Clone)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub max_total_timeout: Option<Duration>,
    pub reset_on_progress: bool,
    pub meta: Option<Meta>,
    pub on_progress: Option<ProgressCallback>,
    /// Requests task-augmented execution; stamped onto `params.task` before
    /// send (e.g. `{"ttl": 60000}`).
    pub task: Option<JsonObject>,
    /// Ties this request to an in-flight task, stamped onto
    /// `_meta.mcp/relatedTask`.
    pub related_task: Option<String>,
}

const REQUEST_TIMEOUT_REASON: &str = "request timeout";

/// A handle to an in-flight outgoing request: await its response or cancel
/// it early (cf. `rmcp`'s `RequestHandle<R>`).
pub struct RequestHandle {
    id: RequestId,
    rx: oneshot::Receiver<ProtocolResult<JsonObject>>,
    peer: Peer,
    timeouts: Arc<Mutex<TimeoutManager>>,
    progress: Arc<Mutex<ProgressManager>>,
}

impl RequestHandle {
    /// Awaits the response, racing the per-request timeout and looping on
    /// every `reset()` so a concurrent progress notification never blocks
    /// behind this wait (see `TimeoutManager::snapshot`).
    pub async fn await_response(mut self) -> ProtocolResult<JsonObject> {
        loop {
            let snapshot = self.timeouts.lock().await.snapshot(&self.id);
            let Some((deadline, notify)) = snapshot else {
                return (&mut self.rx).await.map_err(|_| ProtocolError::TransportClosed)?;
            };
            tokio::select! {
                biased;
                result = &mut self.rx => {
                    self.timeouts.lock().await.cleanup(&self.id);
                    return result.map_err(|_| ProtocolError::TransportClosed)?;
                }
                _ = tokio::time::sleep_until(deadline.into()) => {
                    let elapsed = self.timeouts.lock().await.get_elapsed(&self.id).unwrap_or_default();
                    self.timeouts.lock().await.cleanup(&self.id);
                    self.progress.lock().await.remove_handler(&self.id);
                    let _ = self
                        .peer
                        .send_notification(
                            CANCELLED_NOTIFICATION_METHOD,
                            Some(cancelled_params(&self.id, Some(REQUEST_TIMEOUT_REASON.to_string()))),
                        )
                        .await;
                    return Err(ProtocolError::RequestTimeout(elapsed));
                }
                _ = notify.notified() => {
                    continue;
                }
            }
        }
    }

    pub async fn cancel(self, reason: Option<String>) -> ProtocolResult<()> {
        self.timeouts.lock().await.cleanup(&self.id);
        self.peer
            .send_notification(CANCELLED_NOTIFICATION_METHOD, Some(cancelled_params(&self.id, reason)))
            .await
    }
}

fn cancelled_params(id: &RequestId, reason: Option<String>) -> JsonObject {
    let param = CancelledNotificationParam {
        request_id: id.clone(),
        reason,
    };
    match serde_json::to_value(param) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => JsonObject::new(),
    }
}

fn progress_token_to_request_id(token: &ProgressToken) -> RequestId {
    match &token.0 {
        NumberOrString::Number(n) => RequestId::Number(*n),
        NumberOrString::String(s) => RequestId::String(s.clone()),
    }
}

fn request_id_to_progress_token(id: &RequestId) -> ProgressToken {
    match id {
        RequestId::Number(n) => ProgressToken(NumberOrString::Number(*n)),
        RequestId::String(s) => ProgressToken(NumberOrString::String(s.clone())),
    }
}

/// An interface to the remote peer: send requests/notifications, mirroring
/// `rmcp`'s `Peer<R>` generalized to string methods.
#[derive(Clone)]
pub struct Peer {
    tx: mpsc::Sender<PeerSinkMessage>,
    next_id: Arc<AtomicU64>,
    timeouts: Arc<Mutex<TimeoutManager>>,
    progress: Arc<Mutex<ProgressManager>>,
    peer_capabilities: Arc<Mutex<Option<JsonObject>>>,
}

impl Peer {
    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst) as i64)
    }

    pub async fn send_notification(&self, method: impl Into<String>, params: Option<JsonObject>) -> ProtocolResult<()> {
        let (responder, rx) = oneshot::channel();
        self.tx
            .send(PeerSinkMessage::Notification {
                method: method.into(),
                params,
                meta: Meta::new(),
                responder,
            })
            .await
            .map_err(|_| ProtocolError::NotConnected)?;
        rx.await.map_err(|_| ProtocolError::TransportClosed)?
    }

    pub async fn send_request(&self, method: impl Into<String>, params: Option<JsonObject>) -> ProtocolResult<JsonObject> {
        self.send_cancellable_request(method, params, RequestOptions::default())
            .await?
            .await_response()
            .await
    }

    /// Sends a request with timeout/progress options and returns a handle
    /// the caller can await or cancel independently. Rejects without
    /// sending if the peer hasn't advertised the capability the method
    /// requires (see `required_capability_for`).
    pub async fn send_cancellable_request(
        &self,
        method: impl Into<String>,
        params: Option<JsonObject>,
        options: RequestOptions,
    ) -> ProtocolResult<RequestHandle> {
        let method = method.into();
        if let Some(capability) = required_capability_for(&method) {
            let peer_caps = self.peer_capabilities.lock().await;
            if let Some(caps) = peer_caps.as_ref() {
                if !caps.contains_key(capability) {
                    return Err(ProtocolError::CapabilityNotSupported(capability.to_string()));
                }
            }
        }

        let id = self.next_request_id();
        let progress_token = request_id_to_progress_token(&id);
        let mut meta = Meta::new();
        meta.set_progress_token(progress_token);
        if let Some(extra) = options.meta.clone() {
            meta.extend(extra);
        }
        if let Some(task_id) = options.related_task.clone() {
            meta.set_related_task(RelatedTask { task_id });
        }

        let mut params = params;
        if let Some(task_opts) = options.task.clone() {
            let mut p = params.unwrap_or_default();
            p.insert("task".to_string(), serde_json::Value::Object(task_opts));
            params = Some(p);
        }

        self.timeouts.lock().await.setup(
            id.clone(),
            TimeoutOptions {
                timeout: options.timeout.unwrap_or(crate::timeout::DEFAULT_TIMEOUT),
                max_total_timeout: options.max_total_timeout,
                reset_on_progress: options.reset_on_progress,
            },
        );
        if let Some(cb) = options.on_progress.clone() {
            self.progress.lock().await.register_handler(id.clone(), cb);
        }

        let (responder, rx) = oneshot::channel();
        self.tx
            .send(PeerSinkMessage::Request {
                method,
                params,
                meta,
                id: id.clone(),
                responder,
            })
            .await
            .map_err(|_| ProtocolError::NotConnected)?;

        Ok(RequestHandle {
            id,
            rx,
            peer: self.clone(),
            timeouts: self.timeouts.clone(),
            progress: self.progress.clone(),
        })
    }

    /// Resets an in-flight request's timeout, bounded by its
    /// `max_total_timeout`.
    pub async fn reset_timeout(&self, id: &RequestId) -> Option<ResetOutcome> {
        self.timeouts.lock().await.reset(id)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn operation_kind_for(method: &str) -> Option<OperationKind> {
    match method {
        "tools/call" | "tools/stream_call" | "tools/stream_chunk" | "tools/stream_complete" => {
            Some(OperationKind::ToolCall)
        }
        "resources/read" => Some(OperationKind::ResourceRead),
        "sampling/createMessage" => Some(OperationKind::Sampling),
        m if m.starts_with("elicitation/") => Some(OperationKind::Elicitation),
        _ => None,
    }
}

/// The capability key (as it appears in `ClientCapabilities`/`ServerCapabilities`,
/// e.g. `tools`, `sampling`, `roots`, `tasks`) a method requires on the peer.
/// Methods with no entry (`initialize`, the built-in notification methods,
/// custom application methods) are never capability-gated.
const CAPABILITY_TABLE: &[(&str, &str)] = &[
    ("tools/list", "tools"),
    ("tools/call", "tools"),
    ("tools/stream_call", "tools"),
    ("tools/stream_chunk", "tools"),
    ("tools/stream_complete", "tools"),
    ("prompts/list", "prompts"),
    ("prompts/get", "prompts"),
    ("resources/list", "resources"),
    ("resources/read", "resources"),
    ("resources/subscribe", "resources"),
    ("sampling/createMessage", "sampling"),
    ("roots/list", "roots"),
    ("tasks/get", "tasks"),
    ("tasks/result", "tasks"),
    ("tasks/list", "tasks"),
    ("tasks/cancel", "tasks"),
];

fn required_capability_for(method: &str) -> Option<&'static str> {
    if method.starts_with("elicitation/") {
        return Some("elicitation");
    }
    CAPABILITY_TABLE
        .iter()
        .find(|(m, _)| *m == method)
        .map(|(_, capability)| *capability)
}

type ChainHandlerFn = Arc<dyn Fn(JsonObject) -> futures::future::BoxFuture<'static, ProtocolResult<JsonObject>> + Send + Sync>;

/// The innermost step of an outgoing middleware chain: there's no local
/// result to produce (the actual send happens after the chain returns), so
/// this just hands the (possibly rewritten) params back unchanged.
fn passthrough_handler() -> ChainHandlerFn {
    Arc::new(|params: JsonObject| Box::pin(async move { Ok(params) }))
}

/// Bundles the shared, connection-lifetime state an `Engine` owns.
struct EngineState {
    registry: Arc<Mutex<HandlerRegistry>>,
    timeouts: Arc<Mutex<TimeoutManager>>,
    progress: Arc<Mutex<ProgressManager>>,
    plugins: Arc<Mutex<PluginManager>>,
    middleware: Arc<Mutex<MiddlewareManager>>,
    /// Capabilities this side advertised at `initialize`; `None` until
    /// negotiation completes, in which case incoming capability-gated
    /// methods are not yet enforced.
    local_capabilities: Arc<Mutex<Option<JsonObject>>>,
    /// Capabilities the peer advertised at `initialize`; shared with `Peer`
    /// so outgoing requests can be asserted before send.
    peer_capabilities: Arc<Mutex<Option<JsonObject>>>,
}

/// Owns the handler registry, plugin chain, and middleware chain for one
/// side (client or server) of a connection, and can `connect()` a transport
/// to start dispatching (cf. `rmcp`'s `serve_directly`/`serve_inner`).
#[derive(Clone)]
pub struct Engine {
    state: Arc<EngineState>,
    peer: Peer,
    peer_rx: Arc<Mutex<Option<mpsc::Receiver<PeerSinkMessage>>>>,
}

impl Engine {
    pub fn new() -> Self {
        let timeouts = Arc::new(Mutex::new(TimeoutManager::new()));
        let progress = Arc::new(Mutex::new(ProgressManager::new()));
        let peer_capabilities = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::channel(1024);
        let peer = Peer {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
            timeouts: timeouts.clone(),
            progress: progress.clone(),
            peer_capabilities: peer_capabilities.clone(),
        };
        Self {
            state: Arc::new(EngineState {
                registry: Arc::new(Mutex::new(HandlerRegistry::new())),
                timeouts,
                progress,
                plugins: Arc::new(Mutex::new(PluginManager::new())),
                middleware: Arc::new(Mutex::new(MiddlewareManager::new())),
                local_capabilities: Arc::new(Mutex::new(None)),
                peer_capabilities,
            }),
            peer,
            peer_rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    pub fn peer(&self) -> Peer {
        self.peer.clone()
    }

    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        self.state.plugins.lock().await.register(plugin);
    }

    /// Records the capabilities this side advertised at `initialize`, so
    /// incoming requests for unadvertised methods can be rejected with
    /// `MethodNotFound` instead of reaching a handler.
    pub async fn set_local_capabilities(&self, capabilities: JsonObject) {
        *self.state.local_capabilities.lock().await = Some(capabilities);
    }

    /// Records the capabilities the peer advertised at `initialize`, so
    /// outgoing requests for methods it doesn't support are rejected before
    /// `transport.send` is ever reached.
    pub async fn set_peer_capabilities(&self, capabilities: JsonObject) {
        *self.state.peer_capabilities.lock().await = Some(capabilities);
    }

    pub async fn register_middleware(&self, scope: MiddlewareScope, middleware: MiddlewareFn) -> ProtocolResult<()> {
        self.state.middleware.lock().await.register(scope, middleware)
    }

    pub async fn set_request_handler(&self, method: impl Into<String>, handler: crate::registry::RequestHandlerFn) {
        self.state.registry.lock().await.set_request_handler(method, handler);
    }

    pub async fn set_notification_handler(
        &self,
        method: impl Into<String>,
        handler: crate::registry::NotificationHandlerFn,
    ) {
        self.state
            .registry
            .lock()
            .await
            .set_notification_handler(method, handler);
    }

    fn plugin_context(&self, outbound: mpsc::Sender<JsonRpcMessage>) -> PluginContext {
        PluginContext {
            registry: self.state.registry.clone(),
            timeouts: self.state.timeouts.clone(),
            progress: self.state.progress.clone(),
            outbound,
        }
    }

    /// Connects a transport and spawns the dispatch loop (cf. `rmcp`'s
    /// `serve_directly` + `serve_inner`). Freezes middleware registration.
    #[instrument(skip_all)]
    pub async fn connect(&self, transport: BoxTransport) -> EngineHandle {
        self.state.middleware.lock().await.freeze();

        let peer_rx = self
            .peer_rx
            .lock()
            .await
            .take()
            .expect("Engine::connect called more than once");

        let ct = CancellationToken::new();
        let serve_loop_ct = ct.child_token();
        let state = self.state.clone();
        let peer = self.peer.clone();

        const SINK_BUFFER: usize = 64;
        let (sink_tx, mut sink_rx) = mpsc::channel::<JsonRpcMessage>(SINK_BUFFER);
        let plugin_ctx = self.plugin_context(sink_tx.clone());

        state.plugins.lock().await.on_connect(&plugin_ctx).await;

        let handle = tokio::spawn(async move {
            let mut transport = transport;
            let mut peer_rx = peer_rx;
            let mut local_responders = HashMap::<RequestId, Responder<ProtocolResult<JsonObject>>>::new();

            let quit_reason = loop {
                let event = tokio::select! {
                    m = sink_rx.recv() => match m {
                        Some(message) => LoopEvent::ToSink(message),
                        None => continue,
                    },
                    m = transport.receive() => match m {
                        Some(message) => LoopEvent::Inbound(message),
                        None => LoopEvent::Closed,
                    },
                    m = peer_rx.recv() => match m {
                        Some(message) => LoopEvent::Outbound(message),
                        None => continue,
                    },
                    _ = serve_loop_ct.cancelled() => LoopEvent::Cancelled,
                };

                match event {
                    LoopEvent::ToSink(message) => {
                        if let JsonRpcMessage::Response(JsonRpcResponse { id, .. })
                        | JsonRpcMessage::Error(JsonRpcErrorMessage { id, .. }) = &message
                        {
                            state.registry.lock().await.clear_pending(id);
                        }
                        if let Err(error) = transport.send(message).await {
                            tracing::error!(%error, "failed to send response");
                        }
                    }
                    LoopEvent::Inbound(message) => {
                        handle_inbound(message, &state, &peer, &plugin_ctx, &sink_tx, &mut local_responders).await;
                    }
                    LoopEvent::Outbound(message) => match message {
                        PeerSinkMessage::Request { method, params, meta, id, responder } => {
                            local_responders.insert(id.clone(), responder);

                            let rewritten = {
                                let plugins = state.plugins.lock().await;
                                plugins.on_before_send_request(&method, params, &plugin_ctx).await
                            };
                            let middleware_ctx = MiddlewareContext {
                                method: method.clone(),
                                operation: operation_kind_for(&method),
                                direction: Direction::Outgoing,
                            };
                            let middleware_result = {
                                let middleware = state.middleware.lock().await;
                                middleware
                                    .dispatch(middleware_ctx, rewritten.unwrap_or_default(), passthrough_handler())
                                    .await
                            };
                            let final_params = match middleware_result {
                                Ok(params) => params,
                                Err(error) => {
                                    if let Some(responder) = local_responders.remove(&id) {
                                        let _ = responder.send(Err(error));
                                    }
                                    continue;
                                }
                            };

                            let mut wire = JsonRpcRequest {
                                jsonrpc: crate::model::jsonrpc::JSONRPC_VERSION.to_string(),
                                id: id.clone(),
                                method,
                                params: Some(final_params),
                                meta: Meta::new(),
                                extensions: Extensions::new(),
                            };
                            *wire.get_meta_mut() = meta;
                            let wire_message = JsonRpcMessage::Request(wire);

                            let routed = {
                                let plugins = state.plugins.lock().await;
                                plugins.route_target(&wire_message)
                            };
                            if let Some(plugin) = routed {
                                plugin.route_message(wire_message, &plugin_ctx).await;
                            } else if let Err(error) = transport.send(wire_message).await {
                                tracing::error!(%error, "failed to send request");
                            }
                        }
                        PeerSinkMessage::Notification { method, params, meta, responder } => {
                            let rewritten = {
                                let plugins = state.plugins.lock().await;
                                plugins.on_before_send_notification(&method, params, &plugin_ctx).await
                            };
                            let middleware_ctx = MiddlewareContext {
                                method: method.clone(),
                                operation: operation_kind_for(&method),
                                direction: Direction::Outgoing,
                            };
                            let middleware_result = {
                                let middleware = state.middleware.lock().await;
                                middleware
                                    .dispatch(middleware_ctx, rewritten.unwrap_or_default(), passthrough_handler())
                                    .await
                            };
                            let final_params = match middleware_result {
                                Ok(params) => params,
                                Err(error) => {
                                    let _ = responder.send(Err(error));
                                    continue;
                                }
                            };

                            let mut wire = JsonRpcNotification {
                                jsonrpc: crate::model::jsonrpc::JSONRPC_VERSION.to_string(),
                                method,
                                params: Some(final_params),
                                meta: Meta::new(),
                                extensions: Extensions::new(),
                            };
                            *wire.get_meta_mut() = meta;
                            let wire_message = JsonRpcMessage::Notification(wire);

                            let routed = {
                                let plugins = state.plugins.lock().await;
                                plugins.route_target(&wire_message)
                            };
                            if let Some(plugin) = routed {
                                plugin.route_message(wire_message, &plugin_ctx).await;
                                let _ = responder.send(Ok(()));
                            } else {
                                let result = transport.send(wire_message).await;
                                let _ =
                                    responder.send(result.map_err(|e| ProtocolError::TransportSend(e.to_string())));
                            }
                        }
                    },
                    LoopEvent::Closed => break EngineQuitReason::Closed,
                    LoopEvent::Cancelled => break EngineQuitReason::Cancelled,
                }
            };

            for (_, responder) in local_responders.drain() {
                let _ = responder.send(Err(ProtocolError::RequestCancelled {
                    reason: Some("engine closed".to_string()),
                }));
            }
            state.registry.lock().await.abort_all_pending_requests();
            state.timeouts.lock().await.clear_all();
            state.plugins.lock().await.on_close(&plugin_ctx).await;

            if let Err(error) = transport.close().await {
                tracing::error!(%error, "failed to close transport");
            }
            tracing::info!(?quit_reason, "engine stopped");
        });

        EngineHandle {
            handle: Some(handle),
            ct: ct.clone(),
            _drop_guard: ct.drop_guard(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

enum LoopEvent {
    ToSink(JsonRpcMessage),
    Inbound(JsonRpcMessage),
    Outbound(PeerSinkMessage),
    Closed,
    Cancelled,
}

async fn handle_inbound(
    message: JsonRpcMessage,
    state: &Arc<EngineState>,
    peer: &Peer,
    plugin_ctx: &PluginContext,
    sink: &mpsc::Sender<JsonRpcMessage>,
    local_responders: &mut HashMap<RequestId, Responder<ProtocolResult<JsonObject>>>,
) {
    let routed = {
        let plugins = state.plugins.lock().await;
        plugins.route_target(&message)
    };
    if let Some(plugin) = routed {
        plugin.route_message(message, plugin_ctx).await;
        return;
    }

    match message {
        JsonRpcMessage::Request(mut request) => {
            let id = request.id.clone();
            let method = request.method.clone();
            let mut meta = Meta::new();
            let mut extensions = Extensions::new();
            std::mem::swap(&mut meta, request.get_meta_mut());
            std::mem::swap(&mut extensions, request.extensions_mut());

            let ct = CancellationToken::new();
            state.registry.lock().await.register_pending(id.clone(), ct.clone());

            if let Some(capability) = required_capability_for(&method) {
                let local_caps = state.local_capabilities.lock().await;
                let advertised = local_caps.as_ref().map(|c| c.contains_key(capability)).unwrap_or(true);
                drop(local_caps);
                if !advertised {
                    state.registry.lock().await.clear_pending(&id);
                    let error = ProtocolError::method_not_found(method.clone());
                    let _ = sink.send(JsonRpcMessage::error(error, id)).await;
                    return;
                }
            }

            let params = {
                let plugins = state.plugins.lock().await;
                match plugins.on_request(&method, request.params.clone(), plugin_ctx).await {
                    Ok(params) => params,
                    Err(error) => {
                        state.registry.lock().await.clear_pending(&id);
                        let _ = sink.send(JsonRpcMessage::error(error, id)).await;
                        return;
                    }
                }
            };

            let mut handler_ctx = HandlerContext {
                ct,
                id: id.clone(),
                meta,
                extensions,
                peer: peer.clone(),
                task: None,
            };
            state
                .plugins
                .lock()
                .await
                .on_build_handler_context(plugin_ctx, &mut handler_ctx)
                .await;

            let handler = {
                let registry = state.registry.lock().await;
                registry.request_handler(&method)
            };
            let Some(handler) = handler else {
                state.registry.lock().await.clear_pending(&id);
                let error = ProtocolError::method_not_found(method.clone());
                let _ = sink.send(JsonRpcMessage::error(error, id)).await;
                return;
            };

            let operation = operation_kind_for(&method);
            let middleware_ctx = MiddlewareContext {
                method: method.clone(),
                operation,
                direction: Direction::Incoming,
            };
            let handler_for_chain: std::sync::Arc<
                dyn Fn(JsonObject) -> futures::future::BoxFuture<'static, ProtocolResult<JsonObject>>
                    + Send
                    + Sync,
            > = {
                let handler = handler.clone();
                let handler_ctx = handler_ctx.clone();
                std::sync::Arc::new(move |params: JsonObject| {
                    let handler = handler.clone();
                    let handler_ctx = handler_ctx.clone();
                    Box::pin(async move { handler(Some(params), handler_ctx).await })
                })
            };

            let middleware_result = {
                let middleware = state.middleware.lock().await;
                middleware
                    .dispatch(middleware_ctx, params.unwrap_or_default(), handler_for_chain)
                    .await
            };

            let response = match middleware_result {
                Ok(result) => {
                    let final_result = {
                        let plugins = state.plugins.lock().await;
                        plugins.on_request_result(&method, result, plugin_ctx).await
                    };
                    match final_result {
                        Ok(result) => JsonRpcMessage::response(result, id),
                        Err(error) => JsonRpcMessage::error(error, id),
                    }
                }
                Err(error) => {
                    let error = {
                        let plugins = state.plugins.lock().await;
                        plugins.on_request_error(&method, error, plugin_ctx).await
                    };
                    JsonRpcMessage::error(error, id)
                }
            };
            let _ = sink.send(response).await;
        }
        JsonRpcMessage::Notification(mut notification) => {
            let method = notification.method.clone();
            let mut meta = Meta::new();
            let mut extensions = Extensions::new();
            std::mem::swap(&mut meta, notification.get_meta_mut());
            std::mem::swap(&mut extensions, notification.extensions_mut());

            if method == CANCELLED_NOTIFICATION_METHOD {
                if let Some(params) = notification.params.clone() {
                    if let Ok(param) =
                        serde_json::from_value::<CancelledNotificationParam>(serde_json::Value::Object(params))
                    {
                        state.registry.lock().await.cancel_pending(&param.request_id);
                        if let Some(responder) = local_responders.remove(&param.request_id) {
                            let _ = responder.send(Err(ProtocolError::RequestCancelled {
                                reason: param.reason,
                            }));
                        }
                    }
                }
                return;
            }

            if method == PROGRESS_NOTIFICATION_METHOD {
                if let Some(params) = notification.params.clone() {
                    if let Ok(param) =
                        serde_json::from_value::<ProgressNotificationParam>(serde_json::Value::Object(params))
                    {
                        let request_id = progress_token_to_request_id(&param.progress_token);
                        state
                            .progress
                            .lock()
                            .await
                            .dispatch(&request_id, param.progress, param.total, param.message);
                        if let Some(ResetOutcome::MaxTotalTimeoutExceeded { .. }) =
                            state.timeouts.lock().await.reset(&request_id)
                        {
                            if let Some(responder) = local_responders.remove(&request_id) {
                                let _ = responder.send(Err(ProtocolError::internal(
                                    "max total timeout exceeded during progress reset",
                                )));
                            }
                        }
                    }
                }
                return;
            }

            let params = {
                let plugins = state.plugins.lock().await;
                plugins
                    .on_notification(&method, notification.params.clone(), plugin_ctx)
                    .await
            };

            let handler = {
                let registry = state.registry.lock().await;
                registry.notification_handler(&method)
            };
            if let Some(handler) = handler {
                let context = NotificationContext {
                    meta,
                    extensions,
                    peer: peer.clone(),
                };
                if let Err(error) = handler(params, context).await {
                    tracing::warn!(%error, method, "notification handler failed");
                }
            }
        }
        JsonRpcMessage::Response(JsonRpcResponse { id, result, .. }) => {
            if let Some(responder) = local_responders.remove(&id) {
                if !result.contains_key("task") {
                    state.progress.lock().await.remove_handler(&id);
                }
                state.timeouts.lock().await.cleanup(&id);
                let _ = responder.send(Ok(result));
            }
        }
        JsonRpcMessage::Error(JsonRpcErrorMessage { id, error, .. }) => {
            if let Some(responder) = local_responders.remove(&id) {
                state.progress.lock().await.remove_handler(&id);
                state.timeouts.lock().await.cleanup(&id);
                let JsonRpcError { code, message, data } = error;
                let _ = responder.send(Err(ProtocolError::Wire(crate::error::ProtocolErrorData {
                    code,
                    message,
                    data,
                })));
            }
        }
    }
}

#[derive(Debug)]
enum EngineQuitReason {
    Cancelled,
    Closed,
}

/// A running engine's handle: mirrors `rmcp`'s `RunningService`
/// (drop-guarded cancellation, `close()`/`waiting()`).
pub struct EngineHandle {
    handle: Option<tokio::task::JoinHandle<()>>,
    ct: CancellationToken,
    _drop_guard: DropGuard,
}

impl EngineHandle {
    pub async fn waiting(mut self) -> Result<(), tokio::task::JoinError> {
        match self.handle.take() {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }

    pub async fn close(&mut self) -> Result<(), tokio::task::JoinError> {
        if let Some(handle) = self.handle.take() {
            self.ct.cancel();
            handle.await
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none() || self.ct.is_cancelled()
    }
}
