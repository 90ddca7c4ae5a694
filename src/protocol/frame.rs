use axum::extract::ws::Message as WsMessage;
use bytes::Bytes;

// -----------------------------------------------------------------------------
// ----- Frame -----------------------------------------------------------------

/// One transport-level unit, independent of the WebSocket implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Close,
}

impl Frame {
    /// `None` for ping/pong, which axum answers on its own.
    pub fn from_ws(msg: WsMessage) -> Option<Frame> {
        match msg {
            WsMessage::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
            WsMessage::Binary(data) => Some(Frame::Binary(data)),
            WsMessage::Close(_) => Some(Frame::Close),
            WsMessage::Ping(_) | WsMessage::Pong(_) => None,
        }
    }

    pub fn into_ws(self) -> WsMessage {
        match self {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(data) => WsMessage::Binary(data),
            Frame::Close => WsMessage::Close(None),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
