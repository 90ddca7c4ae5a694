use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Frame, ProtocolError};

// -----------------------------------------------------------------------------
// ----- PacketKind ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketKind {
    Send,
    SendErr,
    #[serde(alias = "MEMBER_JOINED")]
    NewMember,
    Err,
    MemberLeft,

    // Anything a client invents. Never serialized by the relay.
    #[serde(other, skip_serializing)]
    Unknown,
}

// -----------------------------------------------------------------------------
// ----- Message ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub from: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Message {
    fn stamped(from: &str, data: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            data,
            timestamp: now_unix(),
            from: from.to_string(),
            username: None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Packet ----------------------------------------------------------------

/// Steady-state envelope exchanged after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "sessionID", default)]
    pub session_id: String,

    pub message: Message,

    #[serde(rename = "type")]
    pub kind: PacketKind,
}

// -----------------------------------------------------------------------------
// ----- Packet: Static --------------------------------------------------------

impl Packet {
    pub fn decode(raw: &str) -> Result<Packet, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Malformed)
    }

    /// Control notice: `from` names the affected member, no data.
    pub fn control(kind: PacketKind, session_code: &str, member_id: &str) -> Packet {
        Packet {
            session_id: session_code.to_string(),
            message: Message::stamped(member_id, None),
            kind,
        }
    }

    pub fn member_joined(session_code: &str, member_id: &str) -> Packet {
        Self::control(PacketKind::NewMember, session_code, member_id)
    }

    pub fn member_left(session_code: &str, member_id: &str) -> Packet {
        Self::control(PacketKind::MemberLeft, session_code, member_id)
    }

    /// Reply to a sender whose envelope could not be used.
    pub fn send_error(session_code: &str, member_id: &str, reason: impl Into<String>) -> Packet {
        Packet {
            session_id: session_code.to_string(),
            message: Message::stamped(member_id, Some(reason.into())),
            kind: PacketKind::SendErr,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Packet: Public --------------------------------------------------------

impl Packet {
    /// Overwrites everything a client must not choose for itself.
    pub fn stamp(&mut self, session_code: &str, sender_id: &str) {
        self.session_id = session_code.to_string();
        self.message.from = sender_id.to_string();
        self.message.timestamp = now_unix();

        if self.message.id.is_empty() {
            self.message.id = Uuid::new_v4().to_string();
        }
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let raw = serde_json::to_string(self).map_err(ProtocolError::Encode)?;
        Ok(Frame::Text(raw))
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
