//! `ProgressManager`.
//!
//! No direct analogue in `rmcp::service` (it predates this
//! progress-preservation behavior); shaped after `TimeoutManager`'s
//! map-keyed-by-`RequestId` style and the `ProgressToken` in `model::meta`
//! that `rmcp`'s `Peer::send_request_with_option` stamps onto every request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::RequestId;

pub type ProgressCallback = Arc<dyn Fn(f64, Option<f64>, Option<String>) + Send + Sync>;

/// Maps in-flight outgoing request ids to the caller's progress callback.
/// Normally removed on response; retained past the initial response when
/// the result is a `CreateTaskResult`.
#[derive(Default)]
pub struct ProgressManager {
    handlers: HashMap<RequestId, ProgressCallback>,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, id: RequestId, callback: ProgressCallback) {
        self.handlers.insert(id, callback);
    }

    pub fn remove_handler(&mut self, id: &RequestId) {
        self.handlers.remove(id);
    }

    /// Called from the `notifications/progress` dispatch path.
    pub fn dispatch(&self, id: &RequestId, progress: f64, total: Option<f64>, message: Option<String>) {
        if let Some(cb) = self.handlers.get(id) {
            cb(progress, total, message);
        }
    }

    pub fn has_handler(&self, id: &RequestId) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.handlers.len()
    }
}
