//! `HandlerRegistry`.
//!
//! Shaped after the `local_responder_pool`/`local_ct_pool` maps kept inline
//! inside `rmcp::service::serve_inner`; here they're pulled out into a
//! standalone, reusable component keyed by method string instead of a
//! compile-time `ServiceRole`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::engine::{HandlerContext, NotificationContext};
use crate::error::ProtocolResult;
use crate::model::{JsonObject, RequestId};

pub type RequestHandlerFn = Arc<
    dyn Fn(Option<JsonObject>, HandlerContext) -> BoxFuture<'static, ProtocolResult<JsonObject>>
        + Send
        + Sync,
>;

pub type NotificationHandlerFn = Arc<
    dyn Fn(Option<JsonObject>, NotificationContext) -> BoxFuture<'static, ProtocolResult<()>>
        + Send
        + Sync,
>;

/// Per-method request/notification handlers, plus the in-flight
/// cancellation handles the engine needs to abort a handler on
/// `notifications/cancelled` or on `close()`.
#[derive(Default)]
pub struct HandlerRegistry {
    request_handlers: HashMap<String, RequestHandlerFn>,
    notification_handlers: HashMap<String, NotificationHandlerFn>,
    fallback_request_handler: Option<RequestHandlerFn>,
    fallback_notification_handler: Option<NotificationHandlerFn>,
    pending: HashMap<RequestId, CancellationToken>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent per method: registering again for the same method just
    /// replaces the previous handler.
    pub fn set_request_handler(&mut self, method: impl Into<String>, handler: RequestHandlerFn) {
        self.request_handlers.insert(method.into(), handler);
    }

    pub fn remove_request_handler(&mut self, method: &str) {
        self.request_handlers.remove(method);
    }

    pub fn set_notification_handler(
        &mut self,
        method: impl Into<String>,
        handler: NotificationHandlerFn,
    ) {
        self.notification_handlers.insert(method.into(), handler);
    }

    pub fn remove_notification_handler(&mut self, method: &str) {
        self.notification_handlers.remove(method);
    }

    pub fn set_fallback_request_handler(&mut self, handler: RequestHandlerFn) {
        self.fallback_request_handler = Some(handler);
    }

    pub fn set_fallback_notification_handler(&mut self, handler: NotificationHandlerFn) {
        self.fallback_notification_handler = Some(handler);
    }

    pub fn request_handler(&self, method: &str) -> Option<RequestHandlerFn> {
        self.request_handlers
            .get(method)
            .or(self.fallback_request_handler.as_ref())
            .cloned()
    }

    pub fn notification_handler(&self, method: &str) -> Option<NotificationHandlerFn> {
        self.notification_handlers
            .get(method)
            .or(self.fallback_notification_handler.as_ref())
            .cloned()
    }

    pub fn has_request_handler(&self, method: &str) -> bool {
        self.request_handlers.contains_key(method)
    }

    pub fn register_pending(&mut self, id: RequestId, ct: CancellationToken) {
        self.pending.insert(id, ct);
    }

    /// Aborts the local handler for `id`, e.g. on incoming `notifications/cancelled`.
    pub fn cancel_pending(&mut self, id: &RequestId) {
        if let Some(ct) = self.pending.remove(id) {
            ct.cancel();
        }
    }

    pub fn clear_pending(&mut self, id: &RequestId) {
        self.pending.remove(id);
    }

    /// Called on `close()`: abort every in-flight handler. Idempotent.
    pub fn abort_all_pending_requests(&mut self) {
        for (_, ct) in self.pending.drain() {
            ct.cancel();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
