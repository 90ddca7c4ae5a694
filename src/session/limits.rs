use std::time::Duration;

use crate::code::DEFAULT_CODE_LENGTH;
use crate::connection::DEFAULT_OUTBOUND_QUEUE;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_MAX_SESSIONS: usize = 500;
pub const DEFAULT_MAX_MEMBERS: usize = 5;
pub const DEFAULT_REJECTION_GRACE: Duration = Duration::from_secs(5);

// -----------------------------------------------------------------------------
// ----- Limits ----------------------------------------------------------------

/// Hard limits of one registry. Nothing is evicted or queued when a limit is
/// hit; the request is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_sessions: usize,
    pub max_members_per_session: usize,
    pub outbound_queue: usize,
    pub code_length: usize,

    /// How long a rejected client keeps its connection to read the handshake.
    pub rejection_grace: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_members_per_session: DEFAULT_MAX_MEMBERS,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            code_length: DEFAULT_CODE_LENGTH,
            rejection_grace: DEFAULT_REJECTION_GRACE,
        }
    }
}
