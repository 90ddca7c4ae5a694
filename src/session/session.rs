use std::sync::{Arc, Weak};

use async_trait::async_trait;
use smallvec::SmallVec;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::code;
use crate::connection::{Connection, ConnectionHandler};
use crate::errors::Rejection;
use crate::pool::PoolError;
use crate::protocol::{Frame, Handshake, Packet, dispatch};

use super::{limits::DEFAULT_MAX_MEMBERS, registry::SessionRegistry};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

// 26^5 codes against a few hundred live sessions: collisions are rare, a long
// run of them means the code space is exhausted.
const MAX_CODE_ATTEMPTS: usize = 1024;

// -----------------------------------------------------------------------------
// ----- Session ---------------------------------------------------------------

/// A room. One lock orders every membership change and every fan-out, so all
/// members observe joins, leaves and sends in the same order.
#[derive(Debug)]
pub struct Session {
    name: String,
    code: String,
    roster: RwLock<Roster>,
}

// -----------------------------------------------------------------------------
// ----- Session: SubStructs ---------------------------------------------------

#[derive(Debug, Default)]
struct Roster {
    // join order
    members: SmallVec<[Member; DEFAULT_MAX_MEMBERS]>,

    // Set when the last member leaves. A retired session has already been
    // deleted from the registry and admits nobody, even through a stale Arc.
    retired: bool,
}

impl Roster {
    fn ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    fn position(&self, member_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m.id == member_id)
    }
}

#[derive(Debug)]
pub struct Member {
    id: String,
    session: Weak<Session>,
    connection: Arc<Connection>,
}

impl Member {
    fn new(session: &Arc<Session>, connection: Arc<Connection>) -> Self {
        Self {
            id: connection.id().to_string(),
            session: Arc::downgrade(session),
            connection,
        }
    }

    fn handler(&self, registry: &Arc<SessionRegistry>) -> Arc<dyn ConnectionHandler> {
        Arc::new(MemberHandler {
            member_id: self.id.clone(),
            session: self.session.clone(),
            registry: Arc::downgrade(registry),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Last member left; the session is gone from the registry.
    Emptied,
    Remaining(usize),
}

// -----------------------------------------------------------------------------
// ----- Session: Static -------------------------------------------------------

impl Session {
    fn new(name: &str, code: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            code: code.to_string(),
            roster: RwLock::new(Roster::default()),
        })
    }

    /// Registers a new session with `creator` as its only member and starts
    /// the creator's connection with the success handshake.
    ///
    /// The new session's lock is held from the registry insert until the
    /// creator is started, so a joiner that guesses the code early waits
    /// instead of broadcasting into an unstarted connection.
    pub(crate) async fn found(
        registry: &Arc<SessionRegistry>,
        name: &str,
        creator: &Arc<Connection>,
    ) -> Result<Handshake, Rejection> {
        let code_length = registry.limits().code_length;

        for _ in 0..MAX_CODE_ATTEMPTS {
            let session = Session::new(name, &code::generate(code_length));
            let mut roster = session.roster.write().await;

            let member = Member::new(&session, creator.clone());
            let handler = member.handler(registry);
            roster.members.push(member);

            match registry.sessions.store(session.code.clone(), session.clone()) {
                Ok(()) => {}
                Err(PoolError::DuplicateKey) => continue,
                Err(PoolError::AtCapacity) => return Err(Rejection::ServerFull),
                Err(e) => return Err(Rejection::internal_error(e.to_string())),
            }

            let handshake = Handshake::created(&session.code, name, creator.id());

            let started = match handshake.to_frame() {
                Ok(frame) => {
                    creator.set_session_code(&session.code);
                    creator.start(frame, handler).await
                }
                Err(e) => {
                    warn!("failed to encode handshake: {e}");
                    false
                }
            };

            if !started {
                roster.members.clear();
                roster.retired = true;
                registry.sessions.delete(&session.code);
                return Err(Rejection::internal_error("creator connection unusable"));
            }

            info!(
                "session {} ({}) created by {}",
                session.code,
                session.name,
                creator.id()
            );

            return Ok(handshake);
        }

        Err(Rejection::internal_error("session code space exhausted"))
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Public -------------------------------------------------------

impl Session {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Member ids in join order.
    pub async fn member_ids(&self) -> Vec<String> {
        self.roster.read().await.ids()
    }

    pub async fn member_count(&self) -> usize {
        self.roster.read().await.members.len()
    }

    pub async fn is_retired(&self) -> bool {
        self.roster.read().await.retired
    }

    /// Forwards `frame` to every member except `sender_id`. Returns how many
    /// members accepted it.
    ///
    /// Takes the exclusive lock so two fan-outs never interleave. A member
    /// with a full queue therefore delays the whole session.
    pub async fn broadcast(&self, sender_id: &str, frame: Frame) -> usize {
        let roster = self.roster.write().await;
        fan_out(&roster.members, sender_id, &frame).await
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Membership ---------------------------------------------------

impl Session {
    /// Appends `connection` as a member, starts it with the join handshake and
    /// announces it to the others.
    pub(crate) async fn admit(
        self: &Arc<Self>,
        registry: &Arc<SessionRegistry>,
        connection: &Arc<Connection>,
    ) -> Result<Handshake, Rejection> {
        let mut roster = self.roster.write().await;

        if roster.retired {
            return Err(Rejection::SessionNotFound);
        }

        if roster.members.len() >= registry.limits().max_members_per_session {
            return Err(Rejection::SessionFull);
        }

        let handshake = Handshake::joined(&self.code, &self.name, connection.id(), roster.ids());
        let frame = handshake
            .to_frame()
            .map_err(|e| Rejection::internal_error(e.to_string()))?;

        let member = Member::new(self, connection.clone());
        let handler = member.handler(registry);
        roster.members.push(member);

        connection.set_session_code(&self.code);
        if !connection.start(frame, handler).await {
            roster.members.pop();
            return Err(Rejection::internal_error("joining connection unusable"));
        }

        debug!("member {} joined session {}", connection.id(), self.code);

        match Packet::member_joined(&self.code, connection.id()).to_frame() {
            Ok(notice) => {
                fan_out(&roster.members, connection.id(), &notice).await;
            }
            Err(e) => warn!("failed to encode join notice: {e}"),
        }

        Ok(handshake)
    }

    /// Drops `member_id`. The last member out retires the session and deletes
    /// it from `registry`; otherwise the rest are told who left.
    pub(crate) async fn remove(
        &self,
        member_id: &str,
        registry: Option<&SessionRegistry>,
    ) -> Result<Removal, SessionError> {
        let mut roster = self.roster.write().await;

        let Some(idx) = roster.position(member_id) else {
            return Err(SessionError::MemberNotFound {
                member_id: member_id.to_string(),
                code: self.code.clone(),
            });
        };

        roster.members.remove(idx);

        if roster.members.is_empty() {
            roster.retired = true;
            if let Some(registry) = registry {
                registry.sessions.delete(&self.code);
            }
            return Ok(Removal::Emptied);
        }

        match Packet::member_left(&self.code, member_id).to_frame() {
            Ok(notice) => {
                fan_out(&roster.members, member_id, &notice).await;
            }
            Err(e) => warn!("failed to encode leave notice: {e}"),
        }

        Ok(Removal::Remaining(roster.members.len()))
    }
}

// -----------------------------------------------------------------------------
// ----- MemberHandler ---------------------------------------------------------

/// Ties a member's connection events back to its session. Holds only weak
/// references, so a session is owned by the registry alone.
#[derive(Debug)]
struct MemberHandler {
    member_id: String,
    session: Weak<Session>,
    registry: Weak<SessionRegistry>,
}

#[async_trait]
impl ConnectionHandler for MemberHandler {
    async fn on_frame(&self, connection: &Arc<Connection>, frame: Frame) {
        let Some(session) = self.session.upgrade() else {
            debug!("frame from {} after its session was dropped", self.member_id);
            return;
        };

        dispatch::dispatch(&session, connection, frame).await;
    }

    async fn on_close(&self, _connection: &Arc<Connection>) {
        let Some(session) = self.session.upgrade() else {
            return;
        };

        let registry = self.registry.upgrade();

        match session.remove(&self.member_id, registry.as_deref()).await {
            Ok(Removal::Emptied) => info!("session {} closed", session.code),
            Ok(Removal::Remaining(n)) => debug!(
                "member {} left session {} ({n} remaining)",
                self.member_id, session.code
            ),
            Err(e) => warn!("{e}"),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn fan_out(members: &[Member], sender_id: &str, frame: &Frame) -> usize {
    let mut delivered = 0;

    for member in members.iter().filter(|m| m.id != sender_id) {
        match member.connection.send(frame.clone()).await {
            Ok(()) => delivered += 1,
            Err(e) => debug!("skipping member {}: {e}", member.id),
        }
    }

    delivered
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("member {member_id} is not in session {code}")]
    MemberNotFound { member_id: String, code: String },
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
