//! Backend connection lifecycle.
//!
//! # Responsibilities
//! - Open one TCP socket per bridged request, bounded by a connect timeout
//! - Sequence writes and frame reads against the codec
//! - Bound every read and every write chunk with a timeout
//! - Track live backend sockets so leaks are observable
//!
//! # Design Decisions
//! - One connection serves exactly one request and is never reused
//! - `close()` is idempotent; dropping the connection also releases the
//!   socket, so cancelled handler futures cannot leak it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::BridgeConfig;
use crate::observability::metrics;
use crate::protocol::error::{BridgeError, Result};
use crate::protocol::FrameDecoder;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const READ_CHUNK: usize = 8 * 1024;
const WRITE_CHUNK: usize = 64 * 1024;

/// Unique identifier for a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend-{}", self.0)
    }
}

/// Counts live backend sockets.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::record_backend_connection_opened();
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has closed, or `deadline` passes.
    /// Returns whether the count reached zero.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.active_count.load(Ordering::SeqCst) > 0 {
                time::sleep(Duration::from_millis(50)).await;
            }
        };
        time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_backend_connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}

/// Where and how patiently to reach the backend.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    /// `host:port` of the backend.
    pub address: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl BackendTarget {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            address: config.backend.address.clone(),
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            read_timeout: Duration::from_secs(config.timeouts.read_secs),
            write_timeout: Duration::from_secs(config.timeouts.write_secs),
        }
    }
}

/// One TCP socket to the backend, owned by a single handshake.
#[derive(Debug)]
pub struct BackendConnection {
    id: ConnectionId,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    read_timeout: Duration,
    write_timeout: Duration,
    guard: Option<ConnectionGuard>,
}

impl BackendConnection {
    /// Open a connection to `target`, failing with `ConnectTimeout` if the
    /// backend does not accept within the connect timeout.
    pub async fn connect(target: &BackendTarget, tracker: &ConnectionTracker) -> Result<Self> {
        let stream = match time::timeout(
            target.connect_timeout,
            TcpStream::connect(target.address.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(BridgeError::Connect {
                    addr: target.address.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(BridgeError::ConnectTimeout {
                    addr: target.address.clone(),
                    timeout_secs: target.connect_timeout.as_secs(),
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(error = %e, "Failed to set TCP_NODELAY");
        }

        let guard = tracker.track();
        let id = guard.id();
        tracing::debug!(
            connection_id = %id,
            backend = %target.address,
            "Backend connection opened"
        );

        Ok(Self {
            id,
            stream: Some(stream),
            decoder: FrameDecoder::new(),
            read_timeout: target.read_timeout,
            write_timeout: target.write_timeout,
            guard: Some(guard),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Write `bytes` in full and flush.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(BridgeError::ConnectionClosed)?;
        write_within(stream, bytes, self.write_timeout).await?;
        flush_within(stream, self.write_timeout).await
    }

    /// Write a raw payload as one logical operation, chunked internally.
    /// The write timeout bounds each chunk, not the whole payload.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(BridgeError::ConnectionClosed)?;
        for chunk in payload.chunks(WRITE_CHUNK) {
            write_within(stream, chunk, self.write_timeout).await?;
        }
        flush_within(stream, self.write_timeout).await?;
        tracing::trace!(connection_id = %self.id, bytes = payload.len(), "Payload written");
        Ok(())
    }

    /// Read whatever the socket has into the frame buffer.
    /// Returns the number of bytes read; 0 means the peer closed.
    pub async fn receive(&mut self) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(BridgeError::ConnectionClosed)?;
        let buf = self.decoder.buffer_mut();
        buf.reserve(READ_CHUNK);

        match time::timeout(self.read_timeout, stream.read_buf(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(BridgeError::Read(e)),
            Err(_) => Err(BridgeError::ReadTimeout(self.read_timeout.as_secs())),
        }
    }

    /// Read one string frame.
    pub async fn receive_string(&mut self) -> Result<String> {
        loop {
            if let Some(s) = self.decoder.next_string()? {
                return Ok(s);
            }
            self.fill().await?;
        }
    }

    /// Read one i64 frame.
    pub async fn receive_i64(&mut self) -> Result<i64> {
        loop {
            if let Some(n) = self.decoder.next_i64() {
                return Ok(n);
            }
            self.fill().await?;
        }
    }

    /// Read exactly `n` raw bytes.
    pub async fn receive_exact(&mut self, n: usize) -> Result<Bytes> {
        let missing = n.saturating_sub(self.decoder.buffered());
        self.decoder.buffer_mut().reserve(missing);
        loop {
            if let Some(bytes) = self.decoder.take_exact(n) {
                return Ok(bytes);
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        if self.receive().await? > 0 {
            return Ok(());
        }
        match self.decoder.buffered() {
            0 => Err(BridgeError::ConnectionClosed),
            n => Err(BridgeError::MalformedFrame(format!(
                "connection closed with {} bytes of an incomplete frame",
                n
            ))),
        }
    }

    /// Shut the socket down. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::trace!(
                    connection_id = %self.id,
                    error = %e,
                    "Shutdown after close raced the peer"
                );
            }
            tracing::debug!(connection_id = %self.id, "Backend connection closed");
        }
        self.guard.take();
    }
}

impl Drop for BackendConnection {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(connection_id = %self.id, "Backend connection dropped before close");
        }
    }
}

async fn write_within(stream: &mut TcpStream, bytes: &[u8], limit: Duration) -> Result<()> {
    match time::timeout(limit, stream.write_all(bytes)).await {
        Ok(result) => result.map_err(BridgeError::Write),
        Err(_) => Err(BridgeError::WriteTimeout(limit.as_secs())),
    }
}

async fn flush_within(stream: &mut TcpStream, limit: Duration) -> Result<()> {
    match time::timeout(limit, stream.flush()).await {
        Ok(result) => result.map_err(BridgeError::Write),
        Err(_) => Err(BridgeError::WriteTimeout(limit.as_secs())),
    }
}
