use std::pin::Pin;

use axum::extract::ws::WebSocket;
use futures::{Sink, SinkExt, StreamExt, future, stream::BoxStream};
use thiserror::Error;

use crate::protocol::Frame;

// -----------------------------------------------------------------------------
// ----- Transport -------------------------------------------------------------

pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// An upgraded duplex link, split into its inbound and outbound halves.
pub struct Transport {
    inbound: FrameStream,
    outbound: FrameSink,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- Transport: Static -----------------------------------------------------

impl Transport {
    pub fn new(inbound: FrameStream, outbound: FrameSink) -> Self {
        Self { inbound, outbound }
    }

    pub fn from_websocket(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();

        let outbound =
            sink.with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame.into_ws())));

        let inbound = stream.filter_map(|res| {
            future::ready(match res {
                Ok(msg) => Frame::from_ws(msg).map(Ok),
                Err(e) => Some(Err(TransportError::WebSocket(e))),
            })
        });

        Self::new(inbound.boxed(), Box::pin(outbound))
    }
}

// -----------------------------------------------------------------------------
// ----- Transport: Public -----------------------------------------------------

impl Transport {
    pub fn into_parts(self) -> (FrameStream, FrameSink) {
        (self.inbound, self.outbound)
    }
}

// -----------------------------------------------------------------------------
// ----- Test Support ----------------------------------------------------------

#[cfg(test)]
pub use memory::MemoryPeer;


// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("transport closed")]
    Closed,
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
