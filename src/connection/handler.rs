use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::protocol::Frame;

use super::Connection;

// -----------------------------------------------------------------------------
// ----- ConnectionHandler -----------------------------------------------------

/// Callbacks a connection drives from its read loop and from `end()`.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Called once per inbound frame, in arrival order. The next frame is not
    /// read until this returns.
    async fn on_frame(&self, connection: &Arc<Connection>, frame: Frame);

    /// Called exactly once, after the connection reached its closed state.
    async fn on_close(&self, connection: &Arc<Connection>);
}

// -----------------------------------------------------------------------------
// ----- Detached --------------------------------------------------------------

/// Handler for connections that belong to no session, e.g. after a rejected
/// handshake while the client is given time to read it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

#[async_trait]
impl ConnectionHandler for Detached {
    async fn on_frame(&self, connection: &Arc<Connection>, _frame: Frame) {
        debug!("dropping frame on detached connection {}", connection.id());
    }

    async fn on_close(&self, _connection: &Arc<Connection>) {}
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
