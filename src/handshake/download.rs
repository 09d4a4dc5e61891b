//! Download handshake.
//!
//! The backend answers a `DOWNLOAD` request with the file size. A size of
//! [`NOT_FOUND_SIZE`] means the file is missing and a text error follows in
//! place of the data; otherwise exactly `size` raw bytes follow, then a
//! text status frame.

use bytes::Bytes;
use tracing::Instrument;

use crate::handshake::{open, validate_filename};
use crate::net::connection::{BackendConnection, BackendTarget, ConnectionTracker};
use crate::protocol::codec::encode_download_request;
use crate::protocol::error::{BridgeError, Result};
use crate::protocol::NOT_FOUND_SIZE;

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    filename: String,
}

impl DownloadRequest {
    pub fn new(filename: impl Into<String>) -> Result<Self> {
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self { filename })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

#[derive(Debug)]
pub enum DownloadState {
    Connecting,
    SendingRequest,
    AwaitingSize,
    AwaitingError,
    ReceivingFile(usize),
    AwaitingFinal(Bytes),
    Completed { data: Bytes, message: String },
    NotFound(String),
    Failed(BridgeError),
}

impl DownloadState {
    pub fn name(&self) -> &'static str {
        match self {
            DownloadState::Connecting => "connecting",
            DownloadState::SendingRequest => "sending_request",
            DownloadState::AwaitingSize => "awaiting_size",
            DownloadState::AwaitingError => "awaiting_error",
            DownloadState::ReceivingFile(_) => "receiving_file",
            DownloadState::AwaitingFinal(_) => "awaiting_final",
            DownloadState::Completed { .. } => "completed",
            DownloadState::NotFound(_) => "not_found",
            DownloadState::Failed(_) => "failed",
        }
    }

    /// Transition out of `AwaitingSize`. Sizes above `limit` are refused
    /// before any file bytes are buffered.
    pub fn on_size(size: i64, limit: u64) -> Self {
        if size == NOT_FOUND_SIZE {
            return DownloadState::AwaitingError;
        }
        let Ok(size) = u64::try_from(size) else {
            return DownloadState::Failed(BridgeError::MalformedFrame(format!(
                "negative file size {}",
                size
            )));
        };
        if size > limit {
            return DownloadState::Failed(BridgeError::PayloadTooLarge { size, limit });
        }
        match usize::try_from(size) {
            Ok(size) => DownloadState::ReceivingFile(size),
            Err(_) => DownloadState::Failed(BridgeError::PayloadTooLarge { size, limit }),
        }
    }
}

/// Result of one download handshake.
#[derive(Debug)]
pub enum DownloadOutcome {
    Completed { data: Bytes, message: String },
    NotFound(String),
    Failed(BridgeError),
}

impl DownloadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DownloadOutcome::Completed { .. } => "completed",
            DownloadOutcome::NotFound(_) => "not_found",
            DownloadOutcome::Failed(_) => "failed",
        }
    }
}

/// Drives one download from `Connecting` to a terminal state.
pub struct DownloadHandshake<'a> {
    target: &'a BackendTarget,
    tracker: &'a ConnectionTracker,
    request: DownloadRequest,
    max_bytes: u64,
    conn: Option<BackendConnection>,
}

impl<'a> DownloadHandshake<'a> {
    pub fn new(
        target: &'a BackendTarget,
        tracker: &'a ConnectionTracker,
        request: DownloadRequest,
        max_bytes: u64,
    ) -> Self {
        Self {
            target,
            tracker,
            request,
            max_bytes,
            conn: None,
        }
    }

    pub async fn run(self) -> DownloadOutcome {
        let span = tracing::info_span!("download", filename = %self.request.filename);
        self.drive().instrument(span).await
    }

    async fn drive(mut self) -> DownloadOutcome {
        let mut state = DownloadState::Connecting;
        let outcome = loop {
            let from = state.name();
            let next = match state {
                DownloadState::Completed { data, message } => {
                    break DownloadOutcome::Completed { data, message }
                }
                DownloadState::NotFound(reason) => break DownloadOutcome::NotFound(reason),
                DownloadState::Failed(e) => break DownloadOutcome::Failed(e),
                DownloadState::Connecting => {
                    self.connect().await.map(|()| DownloadState::SendingRequest)
                }
                DownloadState::SendingRequest => {
                    self.send_request().await.map(|()| DownloadState::AwaitingSize)
                }
                DownloadState::AwaitingSize => {
                    let limit = self.max_bytes;
                    self.read_size().await.map(|size| DownloadState::on_size(size, limit))
                }
                DownloadState::AwaitingError => {
                    self.read_message().await.map(DownloadState::NotFound)
                }
                DownloadState::ReceivingFile(size) => {
                    self.read_file(size).await.map(DownloadState::AwaitingFinal)
                }
                DownloadState::AwaitingFinal(data) => self
                    .read_message()
                    .await
                    .map(|message| DownloadState::Completed { data, message }),
            };
            state = next.unwrap_or_else(DownloadState::Failed);
            tracing::debug!(from, to = state.name(), "Download state transition");
        };

        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }

        match &outcome {
            DownloadOutcome::Completed { data, message } => {
                tracing::info!(bytes = data.len(), message = %message, "Download completed")
            }
            DownloadOutcome::NotFound(reason) => {
                tracing::info!(reason = %reason, "Download target missing on backend")
            }
            DownloadOutcome::Failed(e) => tracing::warn!(error = %e, "Download failed"),
        }
        outcome
    }

    async fn connect(&mut self) -> Result<()> {
        self.conn = Some(BackendConnection::connect(self.target, self.tracker).await?);
        Ok(())
    }

    async fn send_request(&mut self) -> Result<()> {
        let request = encode_download_request(&self.request.filename)?;
        open(&mut self.conn)?.send(&request).await
    }

    async fn read_size(&mut self) -> Result<i64> {
        open(&mut self.conn)?.receive_i64().await
    }

    async fn read_file(&mut self, size: usize) -> Result<Bytes> {
        open(&mut self.conn)?.receive_exact(size).await
    }

    async fn read_message(&mut self) -> Result<String> {
        open(&mut self.conn)?.receive_string().await
    }
}
