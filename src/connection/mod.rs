pub mod connection;
pub mod handler;
pub mod transport;

pub use connection::{ConnState, Connection, ConnectionError, DEFAULT_OUTBOUND_QUEUE};
pub use handler::{ConnectionHandler, Detached};
pub use transport::{Transport, TransportError};

#[cfg(test)]
pub use transport::MemoryPeer;
