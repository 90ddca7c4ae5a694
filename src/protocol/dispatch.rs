use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::session::Session;

use super::{Frame, Packet, PacketKind};

// -----------------------------------------------------------------------------
// ----- Dispatch --------------------------------------------------------------

/// Routes one inbound frame from `sender`, a member of `session`.
///
/// A malformed envelope is answered with SEND_ERR to the sender alone. The
/// read loop keeps going either way.
pub async fn dispatch(session: &Session, sender: &Arc<Connection>, frame: Frame) {
    match frame {
        Frame::Text(raw) => dispatch_text(session, sender, &raw).await,
        Frame::Binary(_) => {
            let n = session.broadcast(sender.id(), frame).await;
            debug!("binary frame from {} relayed to {n}", sender.id());
        }
        Frame::Close => {}
    }
}

// -----------------------------------------------------------------------------
// ----- Internal --------------------------------------------------------------

async fn dispatch_text(session: &Session, sender: &Arc<Connection>, raw: &str) {
    let mut packet = match Packet::decode(raw) {
        Ok(packet) => packet,
        Err(e) => {
            debug!("bad envelope from {}: {e}", sender.id());
            reply_error(session, sender, e.to_string()).await;
            return;
        }
    };

    if packet.kind != PacketKind::Send {
        debug!("ignoring {:?} from {}", packet.kind, sender.id());
        return;
    }

    packet.stamp(session.code(), sender.id());

    match packet.to_frame() {
        Ok(frame) => {
            let n = session.broadcast(sender.id(), frame).await;
            debug!("message {} from {} relayed to {n}", packet.message.id, sender.id());
        }
        Err(e) => {
            warn!("failed to re-encode message from {}: {e}", sender.id());
            reply_error(session, sender, e.to_string()).await;
        }
    }
}

async fn reply_error(session: &Session, sender: &Arc<Connection>, reason: String) {
    let reply = match Packet::send_error(session.code(), sender.id(), reason).to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            warn!("failed to encode SEND_ERR: {e}");
            return;
        }
    };

    if let Err(e) = sender.send(reply).await {
        debug!("could not report error to {}: {e}", sender.id());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
