use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Rejection -------------------------------------------------------------

/// Why a create/join was refused. Reported once through the handshake, after
/// which the connection is torn down.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("Could not find session")]
    SessionNotFound,

    #[error("Server is full")]
    ServerFull,

    #[error("Session is full")]
    SessionFull,

    #[error("Server Error")]
    Internal(String),
}

// -----------------------------------------------------------------------------
// ----- Rejection: Static -----------------------------------------------------

impl Rejection {
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Rejection::Internal(detail.into())
    }
}

// -----------------------------------------------------------------------------
// ----- Rejection: Public -----------------------------------------------------

impl Rejection {
    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::SessionNotFound => 404,
            Rejection::ServerFull | Rejection::SessionFull => 507,
            Rejection::Internal(_) => 500,
        }
    }

    /// Extra context for logs; never sent to the client.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Rejection::Internal(detail) => Some(detail),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
