//! Per-connection ownership hand-off.
//!
//! The reference server moves a client's file descriptor between the
//! lobby's and a worker's `select` sets as ownership changes. Doing the
//! same with an async socket would mean either re-reading the stream from
//! two places or stealing an in-flight read out of a spawned task — neither
//! is sound. Instead every accepted connection gets one perpetual reader
//! task and one perpetual writer task for its whole lifetime. What moves
//! between the lobby and a worker is not the socket but:
//!
//! - the **route**: a swappable sender the reader consults before handing
//!   off each completed frame, telling it which actor currently owns this
//!   connection's *inbound* traffic;
//! - the **outbound handle**: a cloneable sender into the writer task, held
//!   by whichever actor currently owns this connection's *outbound*
//!   traffic.
//!
//! Strict per-connection request/response ordering is kept by an ack
//! channel: the reader will not read the next frame until the current
//! owner signals it has fully handled (and, in particular, enqueued a
//! response for) the frame just delivered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use crate::protocol::FRAME_SIZE;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying one TCP connection for the lifetime of the
/// process. Stands in for the reference server's raw file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self {
        ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub fn for_test(n: u64) -> Self {
        ConnId(n)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// One frame that has been read off a connection's socket, addressed to
/// whichever actor currently owns it, plus the ack the reader is waiting on
/// before it will read the next frame from the same connection.
pub struct IncomingFrame {
    pub conn: ConnId,
    pub frame: [u8; FRAME_SIZE],
    pub ack: oneshot::Sender<()>,
}

/// Everything a reader task can hand to the current owner of a connection:
/// either a completed frame, or notice that the socket closed. Disconnects
/// carry no ack — there is no "next frame" to gate.
pub enum ConnEvent {
    Frame(IncomingFrame),
    Closed(ConnId),
}

/// Swappable destination for a connection's completed reads. Cloning a
/// `Route` shares the same swap point; `set` changes where the next
/// completed read is delivered.
#[derive(Clone)]
pub struct Route {
    inner: Arc<AsyncMutex<mpsc::UnboundedSender<ConnEvent>>>,
}

impl Route {
    fn new(initial: mpsc::UnboundedSender<ConnEvent>) -> Self {
        Route { inner: Arc::new(AsyncMutex::new(initial)) }
    }

    pub async fn set(&self, new_owner: mpsc::UnboundedSender<ConnEvent>) {
        *self.inner.lock().await = new_owner;
    }

    async fn send(&self, event: ConnEvent) -> bool {
        self.inner.lock().await.send(event).is_ok()
    }
}

/// Outbound handle for one connection. Cloneable; whichever actor currently
/// owns the connection holds (and may pass along) a clone.
#[derive(Clone)]
pub struct OutboundHandle {
    pub conn: ConnId,
    tx: mpsc::UnboundedSender<[u8; FRAME_SIZE]>,
}

impl OutboundHandle {
    /// Enqueues a frame for the writer task. Never blocks; a closed
    /// connection silently drops the frame, mirroring a best-effort write
    /// to a socket that may already be gone.
    pub fn send_frame(&self, frame: [u8; FRAME_SIZE]) {
        let _ = self.tx.send(frame);
    }
}

/// Spawns the perpetual reader and writer tasks for one freshly accepted
/// connection, returning its id, its outbound handle, and its (initially
/// lobby-owned) route.
pub fn spawn_connection(
    stream: TcpStream,
    initial_owner: mpsc::UnboundedSender<ConnEvent>,
) -> (ConnId, OutboundHandle, Route) {
    let conn = ConnId::next();
    let route = Route::new(initial_owner);
    let (out_tx, out_rx) = mpsc::unbounded_channel::<[u8; FRAME_SIZE]>();

    let (read_half, write_half) = stream.into_split();
    tokio::spawn(reader_loop(conn, read_half, route.clone()));
    tokio::spawn(writer_loop(write_half, out_rx));

    (conn, OutboundHandle { conn, tx: out_tx }, route)
}

async fn reader_loop(
    conn: ConnId,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    route: Route,
) {
    loop {
        let mut buf = [0u8; FRAME_SIZE];
        if read_half.read_exact(&mut buf).await.is_err() {
            // EOF or transport error: tell the current owner and stop.
            let _ = route.send(ConnEvent::Closed(conn)).await;
            return;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if !route.send(ConnEvent::Frame(IncomingFrame { conn, frame: buf, ack: ack_tx })).await {
            return;
        }
        // Wait for the current owner to finish handling this frame
        // (including enqueuing any response) before reading the next one,
        // keeping per-connection request/response pairing strict.
        if ack_rx.await.is_err() {
            return;
        }
    }
}

async fn writer_loop(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<[u8; FRAME_SIZE]>,
) {
    while let Some(frame) = rx.recv().await {
        if write_half.write_all(&frame).await.is_err() {
            return;
        }
    }
}
