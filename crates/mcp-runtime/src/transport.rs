//! The `Transport` boundary.
//!
//! Concrete transports (stdio, SSE, streamable HTTP) are out of scope; this
//! module only states the interface the engine drives, shaped after the
//! call sites in `rmcp::service::serve_inner` (`transport.receive()`,
//! `transport.send(..)`, `transport.close()`).

use async_trait::async_trait;
use thiserror::Error;

use crate::model::jsonrpc::JsonRpcMessage;

#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Delivers framed JSON-RPC messages in both directions. The engine owns
/// exactly one `Transport` per connection and trusts it to deliver one
/// JSON-RPC value per `receive()`.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<(), TransportError>;

    /// Returns `None` when the peer has closed the stream.
    async fn receive(&mut self) -> Option<JsonRpcMessage>;

    async fn close(&mut self) -> Result<(), TransportError>;

    /// An opaque session identifier, if the concrete transport has one
    /// (e.g. an HTTP session cookie). Not interpreted by the engine.
    fn session_id(&self) -> Option<&str> {
        None
    }
}

pub type BoxTransport = Box<dyn Transport>;

/// An in-memory, duplex transport pair for tests: each half's outbox feeds
/// the other half's inbox, the same way `rmcp`'s own tests wire two
/// in-process `Service`s together rather than a socket.
pub mod duplex {
    use tokio::sync::mpsc;

    use super::*;

    pub struct DuplexTransport {
        tx: mpsc::UnboundedSender<JsonRpcMessage>,
        rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
        closed: bool,
    }

    /// Build a connected pair: messages sent on one end arrive on the other.
    pub fn pair() -> (DuplexTransport, DuplexTransport) {
        let (tx_a, rx_b) = mpsc::unbounded_channel();
        let (tx_b, rx_a) = mpsc::unbounded_channel();
        (
            DuplexTransport {
                tx: tx_a,
                rx: rx_a,
                closed: false,
            },
            DuplexTransport {
                tx: tx_b,
                rx: rx_b,
                closed: false,
            },
        )
    }

    #[async_trait]
    impl Transport for DuplexTransport {
        async fn send(&mut self, message: JsonRpcMessage) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::new("transport closed"));
            }
            self.tx
                .send(message)
                .map_err(|_| TransportError::new("peer dropped"))
        }

        async fn receive(&mut self) -> Option<JsonRpcMessage> {
            if self.closed {
                return None;
            }
            self.rx.recv().await
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }
    }
}
