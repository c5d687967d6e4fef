//! The task subsystem: server-side deferred execution with a
//! side-channel message queue, plus the client-side poll/stream plugin.

#[cfg(feature = "client")]
pub mod client;
pub mod manager;
pub mod queue;
pub mod store;

#[cfg(feature = "client")]
pub use client::{StreamEvent, TaskClientPlugin, TaskRequestOptions};
pub use manager::{TaskContext, TaskManager};
pub use queue::{QueuedMessage, QueuedMessageKind, TaskMessageQueue};
pub use store::{InMemoryTaskStore, TaskStore};
