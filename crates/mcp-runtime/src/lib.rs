#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]
#![doc = include_str!("../README.md")]

pub mod error;
pub use error::{ProtocolError, ProtocolErrorData, ProtocolResult};

/// Wire-level data model
pub mod model;

/// The protocol engine: transport dispatch, `Peer`, timeouts, progress
pub mod engine;
pub use engine::{Engine, EngineHandle, HandlerContext, NotificationContext, Peer, RequestHandle, RequestOptions};

/// Method → handler registry
pub mod registry;
pub use registry::{HandlerRegistry, NotificationHandlerFn, RequestHandlerFn};

/// Per-request timeout tracking
pub mod timeout;
pub use timeout::{ResetOutcome, TimeoutManager, TimeoutOptions};

/// Progress notification correlation
pub mod progress;
pub use progress::{ProgressCallback, ProgressManager};

/// The plugin system
pub mod plugin;
pub use plugin::{Hook, Plugin, PluginContext, PluginManager};

/// Protocol-level and fetch-level middleware
pub mod middleware;

/// Deferred execution via server-side tasks, with client-side polling
#[cfg(any(feature = "client", feature = "server"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "client", feature = "server"))))]
pub mod tasks;

/// Streaming tool-call argument manager
pub mod streams;
pub use streams::{StreamCallbacks, StreamManager, StreamStatus, StreamValidationError};

/// The `Transport` boundary
pub mod transport;
pub use transport::{BoxTransport, Transport, TransportError};

#[cfg(feature = "schemars")]
#[cfg_attr(docsrs, doc(cfg(feature = "schemars")))]
pub use schemars;
