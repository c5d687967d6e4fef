//! The plugin system: engine-extension with a stable `name`, a priority,
//! optional lifecycle, message-routing gates, and hooks.
//!
//! Generalizes `rmcp::service::Service<R>` (one fixed `handle_request`/
//! `handle_notification` pair) into an ordered list of narrow-scoped hooks
//! the engine runs around its own dispatch — an onion-adjacent but distinct
//! "each hook may replace or pass through" model (not to be confused with
//! the onion middleware in `middleware::protocol`).

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::HandlerContext;
use crate::error::{ProtocolError, ProtocolResult};
use crate::model::{JsonObject, RequestId};
use crate::progress::ProgressManager;
use crate::registry::HandlerRegistry;
use crate::timeout::TimeoutManager;

/// The outcome of a hook: either let the value pass through unchanged, or
/// replace it for every hook and the handler downstream.
#[derive(Debug, Clone)]
pub enum Hook<T> {
    Continue,
    Replace(T),
}

impl<T> Hook<T> {
    pub fn apply(self, current: T) -> T {
        match self {
            Hook::Continue => current,
            Hook::Replace(value) => value,
        }
    }
}

/// Narrow capability views handed to plugins so they cannot reach into the
/// engine directly.
pub struct PluginContext {
    pub(crate) registry: Arc<tokio::sync::Mutex<HandlerRegistry>>,
    pub(crate) timeouts: Arc<tokio::sync::Mutex<TimeoutManager>>,
    pub(crate) progress: Arc<tokio::sync::Mutex<ProgressManager>>,
    pub(crate) outbound: tokio::sync::mpsc::Sender<crate::model::JsonRpcMessage>,
}

impl PluginContext {
    pub async fn report_error(&self, error: &ProtocolError) {
        tracing::warn!(%error, "plugin observed engine error");
    }

    pub async fn handlers(&self) -> tokio::sync::MutexGuard<'_, HandlerRegistry> {
        self.registry.lock().await
    }

    pub async fn timeouts(&self) -> tokio::sync::MutexGuard<'_, TimeoutManager> {
        self.timeouts.lock().await
    }

    pub async fn progress(&self) -> tokio::sync::MutexGuard<'_, ProgressManager> {
        self.progress.lock().await
    }

    /// Send a message to the transport directly, bypassing normal dispatch.
    /// Used by plugins that "route" a message.
    pub async fn send_raw(&self, message: crate::model::JsonRpcMessage) {
        let _ = self.outbound.send(message).await;
    }
}

/// An engine extension. `priority` breaks ties by registration order, so
/// reordering registrations does not silently change dispatch order.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    /// Called once at registration. Re-installation is forbidden by the
    /// engine (it only calls this the first time a plugin is added).
    async fn install(&self, _ctx: &PluginContext) -> ProtocolResult<()> {
        Ok(())
    }

    async fn on_connect(&self, _ctx: &PluginContext) {}

    async fn on_close(&self, _ctx: &PluginContext) {}

    /// First-match-wins gate: if this returns true for a raw
    /// incoming message, `route_message` handles it and normal dispatch
    /// is skipped for that message.
    fn should_route_message(&self, _message: &crate::model::JsonRpcMessage) -> bool {
        false
    }

    async fn route_message(&self, _message: crate::model::JsonRpcMessage, _ctx: &PluginContext) {}

    async fn on_request(
        &self,
        _method: &str,
        _params: Option<JsonObject>,
        _ctx: &PluginContext,
    ) -> ProtocolResult<Hook<Option<JsonObject>>> {
        Ok(Hook::Continue)
    }

    async fn on_request_result(
        &self,
        _method: &str,
        _result: JsonObject,
        _ctx: &PluginContext,
    ) -> ProtocolResult<Hook<JsonObject>> {
        Ok(Hook::Continue)
    }

    async fn on_request_error(
        &self,
        _method: &str,
        error: ProtocolError,
        _ctx: &PluginContext,
    ) -> ProtocolError {
        error
    }

    async fn on_response(&self, _id: &RequestId, _result: &JsonObject, _ctx: &PluginContext) {}

    async fn on_notification(
        &self,
        _method: &str,
        _params: Option<JsonObject>,
        _ctx: &PluginContext,
    ) -> Hook<Option<JsonObject>> {
        Hook::Continue
    }

    async fn on_before_send_request(
        &self,
        _method: &str,
        _params: Option<JsonObject>,
        _ctx: &PluginContext,
    ) -> Hook<Option<JsonObject>> {
        Hook::Continue
    }

    async fn on_before_send_notification(
        &self,
        _method: &str,
        _params: Option<JsonObject>,
        _ctx: &PluginContext,
    ) -> Hook<Option<JsonObject>> {
        Hook::Continue
    }

    /// Contributes to the context handed to request handlers. This is
    /// where the task subsystem attaches `TaskContext`.
    async fn on_build_handler_context(&self, _ctx: &PluginContext, _handler_ctx: &mut HandlerContext) {}
}

/// Holds the installed plugins sorted by priority (descending, ties in
/// registration order) and runs hooks across all of them in that order.
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Plugins are re-sorted by `(priority desc, registration order)` on
    /// every add so that connect-time hook iteration always reflects it.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    pub async fn on_connect(&self, ctx: &PluginContext) {
        for plugin in &self.plugins {
            plugin.on_connect(ctx).await;
        }
    }

    pub async fn on_close(&self, ctx: &PluginContext) {
        for plugin in &self.plugins {
            plugin.on_close(ctx).await;
        }
    }

    pub fn route_target(&self, message: &crate::model::JsonRpcMessage) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .find(|p| p.should_route_message(message))
            .cloned()
    }

    pub async fn on_request(
        &self,
        method: &str,
        mut params: Option<JsonObject>,
        ctx: &PluginContext,
    ) -> ProtocolResult<Option<JsonObject>> {
        for plugin in &self.plugins {
            params = plugin
                .on_request(method, params.clone(), ctx)
                .await?
                .apply(params);
        }
        Ok(params)
    }

    pub async fn on_before_send_request(
        &self,
        method: &str,
        mut params: Option<JsonObject>,
        ctx: &PluginContext,
    ) -> Option<JsonObject> {
        for plugin in &self.plugins {
            params = plugin
                .on_before_send_request(method, params.clone(), ctx)
                .await
                .apply(params);
        }
        params
    }

    pub async fn on_before_send_notification(
        &self,
        method: &str,
        mut params: Option<JsonObject>,
        ctx: &PluginContext,
    ) -> Option<JsonObject> {
        for plugin in &self.plugins {
            params = plugin
                .on_before_send_notification(method, params.clone(), ctx)
                .await
                .apply(params);
        }
        params
    }

    pub async fn on_notification(
        &self,
        method: &str,
        mut params: Option<JsonObject>,
        ctx: &PluginContext,
    ) -> Option<JsonObject> {
        for plugin in &self.plugins {
            params = plugin
                .on_notification(method, params.clone(), ctx)
                .await
                .apply(params);
        }
        params
    }

    pub async fn on_request_result(
        &self,
        method: &str,
        mut result: JsonObject,
        ctx: &PluginContext,
    ) -> ProtocolResult<JsonObject> {
        for plugin in &self.plugins {
            result = plugin
                .on_request_result(method, result.clone(), ctx)
                .await?
                .apply(result);
        }
        Ok(result)
    }

    pub async fn on_request_error(
        &self,
        method: &str,
        mut error: ProtocolError,
        ctx: &PluginContext,
    ) -> ProtocolError {
        for plugin in &self.plugins {
            error = plugin.on_request_error(method, error, ctx).await;
        }
        error
    }

    pub async fn on_response(&self, id: &RequestId, result: &JsonObject, ctx: &PluginContext) {
        for plugin in &self.plugins {
            plugin.on_response(id, result, ctx).await;
        }
    }

    pub async fn on_build_handler_context(&self, ctx: &PluginContext, handler_ctx: &mut HandlerContext) {
        for plugin in &self.plugins {
            plugin.on_build_handler_context(ctx, handler_ctx).await;
        }
    }
}
