use std::sync::Arc;

use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use thiserror::Error;
use tokio::{
    select,
    sync::{RwLock, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::Frame;

use super::{
    handler::ConnectionHandler,
    transport::{FrameSink, FrameStream, Transport},
};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_OUTBOUND_QUEUE: usize = 15;

// -----------------------------------------------------------------------------
// ----- Connection ------------------------------------------------------------

/// One duplex link and its read/write task pair.
///
/// Lifecycle is `Unstarted -> Open -> Closed`. `Closed` is terminal and every
/// path into it goes through [`Connection::end`].
#[derive(Debug)]
pub struct Connection {
    id: String,
    session_code: SyncRwLock<Option<String>>,
    queue_capacity: usize,

    // Cancelled first thing in `end()`, before the state lock is taken, so
    // that a `send` parked on a full queue lets go of its read guard.
    closing: CancellationToken,

    // Only touched by `start` and `end`, both under the `inner` write lock.
    transport: SyncMutex<Option<Transport>>,

    inner: RwLock<Inner>,
}

// -----------------------------------------------------------------------------
// ----- Connection: SubStructs ------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unstarted,
    Open,
    Closed,
}

struct Inner {
    state: ConnState,
    outbound: Option<mpsc::Sender<Frame>>,
    handler: Option<Arc<dyn ConnectionHandler>>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("state", &self.state)
            .field(
                "queued",
                &self.outbound.as_ref().map(|tx| tx.max_capacity() - tx.capacity()),
            )
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Static ----------------------------------------------------

impl Connection {
    /// `queue_capacity` bounds the outbound queue and must be non-zero.
    pub fn new(transport: Transport, queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            session_code: SyncRwLock::new(None),
            queue_capacity: queue_capacity.max(1),
            closing: CancellationToken::new(),
            transport: SyncMutex::new(Some(transport)),
            inner: RwLock::new(Inner {
                state: ConnState::Unstarted,
                outbound: None,
                handler: None,
            }),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Public ----------------------------------------------------

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_code(&self) -> Option<String> {
        self.session_code.read().clone()
    }

    pub fn set_session_code(&self, code: &str) {
        *self.session_code.write() = Some(code.to_string());
    }

    pub async fn state(&self) -> ConnState {
        self.inner.read().await.state
    }

    /// Spawns the read and write loops with `initial` already queued, so it is
    /// the first frame the peer sees. No-op unless the connection is unstarted;
    /// returns whether this call opened it.
    pub async fn start(
        self: &Arc<Self>,
        initial: Frame,
        handler: Arc<dyn ConnectionHandler>,
    ) -> bool {
        let mut inner = self.inner.write().await;

        if inner.state != ConnState::Unstarted {
            return false;
        }

        let Some(transport) = self.transport.lock().take() else {
            return false;
        };

        let (tx, rx) = mpsc::channel(self.queue_capacity);

        // Fresh queue with capacity >= 1: cannot be full.
        let _ = tx.try_send(initial);

        let (inbound, outbound) = transport.into_parts();
        tokio::spawn(write_loop(self.clone(), outbound, rx));
        tokio::spawn(read_loop(self.clone(), inbound, handler.clone()));

        inner.outbound = Some(tx);
        inner.handler = Some(handler);
        inner.state = ConnState::Open;

        debug!("connection {} open", self.id);
        true
    }

    /// Queues `frame` for the write loop. Waits while the queue is full; fails
    /// if the connection is not open or gets closed while waiting.
    pub async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        let inner = self.inner.read().await;

        if inner.state != ConnState::Open {
            return Err(ConnectionError::Closed);
        }

        let Some(tx) = inner.outbound.as_ref() else {
            return Err(ConnectionError::Closed);
        };

        select! {
            biased;

            _ = self.closing.cancelled() => Err(ConnectionError::Closed),

            res = tx.send(frame) => res.map_err(|_| ConnectionError::Closed),
        }
    }

    /// Idempotent. The close handler runs exactly once, outside the state lock.
    pub async fn end(self: &Arc<Self>) {
        self.closing.cancel();

        let handler = {
            let mut inner = self.inner.write().await;

            if inner.state == ConnState::Closed {
                return;
            }

            inner.state = ConnState::Closed;

            // The cancelled token already released both loops; dropping the
            // sender closes the queue. An unstarted transport is dropped here.
            inner.outbound = None;
            drop(self.transport.lock().take());

            inner.handler.take()
        };

        debug!("connection {} closed", self.id);

        if let Some(handler) = handler {
            handler.on_close(self).await;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Loops -------------------------------------------------------

async fn read_loop(
    conn: Arc<Connection>,
    mut inbound: FrameStream,
    handler: Arc<dyn ConnectionHandler>,
) {
    loop {
        let next = select! {
            biased;

            _ = conn.closing.cancelled() => break,

            next = inbound.next() => next,
        };

        match next {
            Some(Ok(Frame::Close)) | None => {
                debug!("connection {} closed by peer", conn.id);
                break;
            }

            Some(Err(e)) => {
                debug!("connection {} read error: {e}", conn.id);
                break;
            }

            Some(Ok(frame)) => handler.on_frame(&conn, frame).await,
        }
    }

    conn.end().await;
}

async fn write_loop(
    conn: Arc<Connection>,
    mut outbound: FrameSink,
    mut rx: mpsc::Receiver<Frame>,
) {
    loop {
        let next = select! {
            biased;

            _ = conn.closing.cancelled() => break,

            next = rx.recv() => next,
        };

        let Some(frame) = next else {
            break;
        };

        let res = select! {
            biased;

            // A stalled peer must not keep the task and the socket alive.
            _ = conn.closing.cancelled() => break,

            res = outbound.send(frame) => res,
        };

        if let Err(e) = res {
            debug!("connection {} write error: {e}", conn.id);
            conn.end().await;
            return;
        }
    }

    flush_and_close(&conn, outbound, rx);
}

/// Writes what is still queued, then a close frame, for as long as the sink
/// accepts without waiting. The sink is dropped either way.
fn flush_and_close(conn: &Connection, mut outbound: FrameSink, mut rx: mpsc::Receiver<Frame>) {
    rx.close();

    let mut flushed = 0;
    while let Ok(frame) = rx.try_recv() {
        match outbound.send(frame).now_or_never() {
            Some(Ok(())) => flushed += 1,
            _ => {
                debug!("connection {} dropped unsent frames on close", conn.id);
                return;
            }
        }
    }

    if let Some(Ok(())) = outbound.send(Frame::Close).now_or_never() {
        let _ = outbound.close().now_or_never();
    }

    debug!("connection {} writer done, {flushed} flushed on close", conn.id);
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::transport::MemoryPeer;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Frame(Frame),
        Close,
    }

    struct Recorder {
        events: mpsc::UnboundedSender<Event>,
    }

    #[async_trait]
    impl ConnectionHandler for Recorder {
        async fn on_frame(&self, _connection: &Arc<Connection>, frame: Frame) {
            let _ = self.events.send(Event::Frame(frame));
        }

        async fn on_close(&self, _connection: &Arc<Connection>) {
            let _ = self.events.send(Event::Close);
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { events }), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for handler")
            .expect("handler channel closed")
    }

    async fn next_frame(peer: &mut MemoryPeer) -> Option<Frame> {
        timeout(WAIT, peer.recv()).await.expect("timed out waiting for frame")
    }

    fn text(s: &str) -> Frame {
        Frame::Text(s.to_string())
    }

    #[tokio::test]
    async fn send_before_start_is_rejected() {
        let (transport, _peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);

        assert_eq!(conn.state().await, ConnState::Unstarted);
        assert_eq!(conn.send(text("early")).await, Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn initial_frame_is_written_first_then_fifo() {
        let (transport, mut peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, _events) = recorder();

        conn.start(text("hello"), handler).await;
        assert_eq!(conn.state().await, ConnState::Open);

        for i in 0..5 {
            conn.send(text(&i.to_string())).await.unwrap();
        }

        assert_eq!(next_frame(&mut peer).await, Some(text("hello")));
        for i in 0..5 {
            assert_eq!(next_frame(&mut peer).await, Some(text(&i.to_string())));
        }
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let (transport, mut peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, _events) = recorder();

        assert!(conn.start(text("first"), handler.clone()).await);
        assert!(!conn.start(text("second"), handler).await);
        conn.send(text("after")).await.unwrap();

        assert_eq!(next_frame(&mut peer).await, Some(text("first")));
        assert_eq!(next_frame(&mut peer).await, Some(text("after")));
    }

    #[tokio::test]
    async fn handler_sees_frames_in_arrival_order() {
        let (transport, peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, mut events) = recorder();

        conn.start(text("hi"), handler).await;

        peer.send_text("a");
        peer.send(Frame::Binary(bytes::Bytes::from_static(b"b")));
        peer.send_text("c");

        assert_eq!(next_event(&mut events).await, Event::Frame(text("a")));
        assert_eq!(
            next_event(&mut events).await,
            Event::Frame(Frame::Binary(bytes::Bytes::from_static(b"b")))
        );
        assert_eq!(next_event(&mut events).await, Event::Frame(text("c")));
    }

    #[tokio::test]
    async fn close_frame_ends_connection_once() {
        let (transport, peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, mut events) = recorder();

        conn.start(text("hi"), handler).await;
        peer.send(Frame::Close);

        assert_eq!(next_event(&mut events).await, Event::Close);

        conn.end().await;
        conn.end().await;

        assert_eq!(conn.state().await, ConnState::Closed);
        assert!(events.try_recv().is_err());
        assert_eq!(conn.send(text("late")).await, Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn transport_error_and_hang_up_are_fatal() {
        let (transport, peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, mut events) = recorder();
        conn.start(text("hi"), handler).await;

        peer.fail();
        assert_eq!(next_event(&mut events).await, Event::Close);

        let (transport, mut peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, mut events) = recorder();
        conn.start(text("hi"), handler).await;

        peer.hang_up();
        assert_eq!(next_event(&mut events).await, Event::Close);
        assert_eq!(conn.state().await, ConnState::Closed);
    }

    #[tokio::test]
    async fn end_drains_queue_then_writes_close() {
        let (transport, mut peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, _events) = recorder();

        conn.start(text("hi"), handler).await;
        conn.send(text("last words")).await.unwrap();
        conn.end().await;

        assert_eq!(next_frame(&mut peer).await, Some(text("hi")));
        assert_eq!(next_frame(&mut peer).await, Some(text("last words")));
        assert_eq!(next_frame(&mut peer).await, Some(Frame::Close));
        assert_eq!(next_frame(&mut peer).await, None);
    }

    #[tokio::test]
    async fn end_before_start_never_opens() {
        let (transport, mut peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);
        let (handler, mut events) = recorder();

        conn.end().await;
        assert!(!conn.start(text("too late"), handler).await);

        assert_eq!(conn.state().await, ConnState::Closed);
        assert_eq!(next_frame(&mut peer).await, None);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_blocks_sender_until_end() {
        // Peer never reads: one frame parks in the peer buffer, one in the
        // sink, then the relay queue (capacity 2) fills up.
        let (transport, _peer) = Transport::in_memory_with_buffer(0);
        let conn = Connection::new(transport, 2);
        let (handler, _events) = recorder();

        conn.start(text("hi"), handler).await;

        let mut blocked = None;
        for i in 0..16 {
            let sender = conn.clone();
            let pending = tokio::spawn(async move { sender.send(text(&i.to_string())).await });

            tokio::time::sleep(Duration::from_millis(20)).await;
            if !pending.is_finished() {
                blocked = Some(pending);
                break;
            }
            assert_eq!(pending.await.unwrap(), Ok(()));
        }

        let blocked = blocked.expect("queue never applied backpressure");

        conn.end().await;

        let res = timeout(WAIT, blocked).await.expect("send stayed blocked").unwrap();
        assert_eq!(res, Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn end_releases_a_writer_stuck_on_a_stalled_peer() {
        // Peer never reads, so the writer parks on the transport.
        let (transport, mut peer) = Transport::in_memory_with_buffer(0);
        let conn = Connection::new(transport, 4);
        let (handler, _events) = recorder();

        assert!(conn.start(text("hi"), handler).await);
        for i in 0..3 {
            conn.send(text(&i.to_string())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        conn.end().await;

        // both loops dropped their handles
        let mut released = false;
        for _ in 0..100 {
            if Arc::strong_count(&conn) == 1 {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released, "writer still holds the connection after end()");

        // the sink was dropped: the peer sees what got through, then the end
        let mut frames = Vec::new();
        while let Some(frame) = next_frame(&mut peer).await {
            frames.push(frame);
        }
        assert_eq!(frames.first(), Some(&text("hi")));
        assert!(frames.len() < 5);
    }

    #[tokio::test]
    async fn session_code_is_tracked() {
        let (transport, _peer) = Transport::in_memory();
        let conn = Connection::new(transport, DEFAULT_OUTBOUND_QUEUE);

        assert_eq!(conn.session_code(), None);
        conn.set_session_code("ABCDE");
        assert_eq!(conn.session_code().as_deref(), Some("ABCDE"));
        assert!(!conn.id().is_empty());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
