pub mod dispatch;
pub mod frame;
pub mod handshake;
pub mod packet;

pub use frame::Frame;
pub use handshake::Handshake;
pub use packet::{Message, Packet, PacketKind};

use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}
