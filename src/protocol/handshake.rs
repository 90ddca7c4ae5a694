use serde::{Deserialize, Serialize};

use crate::errors::Rejection;

use super::{Frame, ProtocolError};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const STATUS_OK: u16 = 200;

// -----------------------------------------------------------------------------
// ----- Handshake -------------------------------------------------------------

/// First envelope on every connection; reports the create/join outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,

    pub status_code: u16,
    pub status: String,
}

// -----------------------------------------------------------------------------
// ----- Handshake: Static -----------------------------------------------------

impl Handshake {
    pub fn created(code: &str, name: &str, member_id: &str) -> Self {
        Self {
            session_code: Some(code.to_string()),
            session_name: Some(name.to_string()),
            member_id: Some(member_id.to_string()),
            members: None,
            status_code: STATUS_OK,
            status: "Success".to_string(),
        }
    }

    pub fn joined(code: &str, name: &str, member_id: &str, members: Vec<String>) -> Self {
        Self {
            session_code: Some(code.to_string()),
            session_name: Some(name.to_string()),
            member_id: Some(member_id.to_string()),
            members: Some(members),
            status_code: STATUS_OK,
            status: "Success".to_string(),
        }
    }

    pub fn rejected(rejection: &Rejection) -> Self {
        Self {
            status_code: rejection.status_code(),
            status: rejection.to_string(),
            ..Default::default()
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Handshake: Public -----------------------------------------------------

impl Handshake {
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let raw = serde_json::to_string(self).map_err(ProtocolError::Encode)?;
        Ok(Frame::Text(raw))
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
