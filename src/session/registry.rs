use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::connection::{Connection, Detached, Transport};
use crate::errors::Rejection;
use crate::pool::{KeyedPool, PoolError};
use crate::protocol::Handshake;

use super::{limits::Limits, session::Session};

// -----------------------------------------------------------------------------
// ----- SessionRegistry -------------------------------------------------------

/// Live sessions by code. Constructed once and shared through the server state.
#[derive(Debug)]
pub struct SessionRegistry {
    pub(crate) sessions: KeyedPool<String, Arc<Session>>,
    limits: Limits,
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Static -----------------------------------------------

impl SessionRegistry {
    pub fn new(limits: Limits) -> Arc<Self> {
        Arc::new(Self {
            sessions: KeyedPool::bounded(limits.max_sessions),
            limits,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Public -----------------------------------------------

impl SessionRegistry {
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn get(&self, code: &str) -> Result<Arc<Session>, PoolError> {
        self.sessions.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.sessions.exists(code)
    }

    pub fn size(&self) -> usize {
        self.sessions.size()
    }

    /// Wraps an upgraded transport with this registry's queue capacity.
    pub fn connection(&self, transport: Transport) -> Arc<Connection> {
        Connection::new(transport, self.limits.outbound_queue)
    }

    /// Creates a session owned by `creator`. Exactly one handshake is sent;
    /// on failure the connection is closed after the rejection grace period.
    pub async fn create_session(self: &Arc<Self>, name: &str, creator: Arc<Connection>) -> Handshake {
        match Session::found(self, name, &creator).await {
            Ok(handshake) => handshake,
            Err(rejection) => self.reject(&creator, rejection).await,
        }
    }

    /// Adds `joiner` to the session registered under `code`. Same single
    /// handshake contract as `create_session`.
    pub async fn join_session(self: &Arc<Self>, code: &str, joiner: Arc<Connection>) -> Handshake {
        let session = match self.get(code) {
            Ok(session) => session,
            Err(PoolError::NotFound) => {
                return self.reject(&joiner, Rejection::SessionNotFound).await;
            }
            Err(e) => {
                return self
                    .reject(&joiner, Rejection::internal_error(e.to_string()))
                    .await;
            }
        };

        match session.admit(self, &joiner).await {
            Ok(handshake) => handshake,
            Err(rejection) => self.reject(&joiner, rejection).await,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Private ----------------------------------------------

impl SessionRegistry {
    async fn reject(&self, connection: &Arc<Connection>, rejection: Rejection) -> Handshake {
        match rejection.detail() {
            Some(detail) => warn!("rejecting {}: {rejection} ({detail})", connection.id()),
            None => debug!("rejecting {}: {rejection}", connection.id()),
        }

        let handshake = Handshake::rejected(&rejection);

        match handshake.to_frame() {
            Ok(frame) => {
                if connection.start(frame, Arc::new(Detached)).await {
                    // give the client time to read the handshake
                    tokio::time::sleep(self.limits.rejection_grace).await;
                }
            }
            Err(e) => warn!("failed to encode rejection handshake: {e}"),
        }

        connection.end().await;

        if rejection == Rejection::ServerFull {
            info!("registry full ({} sessions)", self.size());
        }

        handshake
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
