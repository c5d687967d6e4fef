//! Middleware chains: onion-model interception for protocol
//! operations, and a composable wrapper chain for wire-level fetch.

pub mod fetch;
pub mod protocol;

pub use fetch::{FetchMiddleware, FetchRequest, FetchResponse, apply_middlewares};
pub use protocol::{MiddlewareContext, MiddlewareFn, MiddlewareManager, MiddlewareScope, Next, OperationKind};
