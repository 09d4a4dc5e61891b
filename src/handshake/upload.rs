//! Upload handshake.
//!
//! # States
//! ```text
//! Connecting ──▶ SendingHeader ──▶ AwaitingPermission ──▶ StreamingPayload ──▶ AwaitingFinal
//!     │               │                 │        │                │                 │
//!     ▼               ▼                 ▼        ▼                ▼                 ▼
//!   Failed          Failed            Failed   Denied           Failed        Completed | Failed
//! ```
//!
//! Permission is granted when the backend's reply contains
//! [`ALLOWED_MARKER`]; the backend may prefix it with status text. The size
//! sent in the header is always the length of the payload actually held.

use bytes::Bytes;
use tracing::Instrument;

use crate::handshake::{open, validate_filename};
use crate::net::connection::{BackendConnection, BackendTarget, ConnectionTracker};
use crate::protocol::codec::encode_upload_header;
use crate::protocol::error::{BridgeError, Result};
use crate::protocol::ALLOWED_MARKER;

/// One file to push through the bridge.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    filename: String,
    payload: Bytes,
}

impl UploadRequest {
    /// Fails with `EmptyFilename` or `EncodingOverflow` when the filename
    /// cannot be framed.
    pub fn new(filename: impl Into<String>, payload: Bytes) -> Result<Self> {
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self { filename, payload })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Size announced to the backend. Always the payload length.
    pub fn declared_size(&self) -> i64 {
        self.payload.len() as i64
    }
}

#[derive(Debug)]
pub enum UploadState {
    Connecting,
    SendingHeader,
    AwaitingPermission,
    StreamingPayload,
    AwaitingFinal,
    Completed(String),
    Denied(String),
    Failed(BridgeError),
}

impl UploadState {
    pub fn name(&self) -> &'static str {
        match self {
            UploadState::Connecting => "connecting",
            UploadState::SendingHeader => "sending_header",
            UploadState::AwaitingPermission => "awaiting_permission",
            UploadState::StreamingPayload => "streaming_payload",
            UploadState::AwaitingFinal => "awaiting_final",
            UploadState::Completed(_) => "completed",
            UploadState::Denied(_) => "denied",
            UploadState::Failed(_) => "failed",
        }
    }

    /// Transition out of `AwaitingPermission`.
    pub fn on_permission_reply(reply: String) -> Self {
        if reply.contains(ALLOWED_MARKER) {
            UploadState::StreamingPayload
        } else {
            UploadState::Denied(reply)
        }
    }

    /// Transition out of `AwaitingFinal`.
    pub fn on_final_reply(reply: String) -> Self {
        UploadState::Completed(reply)
    }
}

/// Result of one upload handshake.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Permission granted and payload accepted; carries the final message.
    Completed(String),
    /// The backend refused; carries its reply.
    Denied(String),
    Failed(BridgeError),
}

impl HandshakeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            HandshakeOutcome::Completed(_) => "completed",
            HandshakeOutcome::Denied(_) => "denied",
            HandshakeOutcome::Failed(_) => "failed",
        }
    }
}

/// Drives one upload from `Connecting` to a terminal state.
pub struct UploadHandshake<'a> {
    target: &'a BackendTarget,
    tracker: &'a ConnectionTracker,
    request: UploadRequest,
    conn: Option<BackendConnection>,
}

impl<'a> UploadHandshake<'a> {
    pub fn new(
        target: &'a BackendTarget,
        tracker: &'a ConnectionTracker,
        request: UploadRequest,
    ) -> Self {
        Self {
            target,
            tracker,
            request,
            conn: None,
        }
    }

    /// Run to completion. The backend connection is closed before returning.
    pub async fn run(self) -> HandshakeOutcome {
        let span = tracing::info_span!(
            "upload",
            filename = %self.request.filename,
            size = self.request.declared_size(),
        );
        self.drive().instrument(span).await
    }

    async fn drive(mut self) -> HandshakeOutcome {
        let mut state = UploadState::Connecting;
        let outcome = loop {
            let from = state.name();
            let next = match state {
                UploadState::Completed(message) => break HandshakeOutcome::Completed(message),
                UploadState::Denied(reason) => break HandshakeOutcome::Denied(reason),
                UploadState::Failed(e) => break HandshakeOutcome::Failed(e),
                UploadState::Connecting => {
                    self.connect().await.map(|()| UploadState::SendingHeader)
                }
                UploadState::SendingHeader => {
                    self.send_header().await.map(|()| UploadState::AwaitingPermission)
                }
                UploadState::AwaitingPermission => {
                    self.read_reply().await.map(UploadState::on_permission_reply)
                }
                UploadState::StreamingPayload => {
                    self.stream_payload().await.map(|()| UploadState::AwaitingFinal)
                }
                UploadState::AwaitingFinal => {
                    self.read_reply().await.map(UploadState::on_final_reply)
                }
            };
            state = next.unwrap_or_else(UploadState::Failed);
            tracing::debug!(from, to = state.name(), "Upload state transition");
        };

        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }

        match &outcome {
            HandshakeOutcome::Completed(message) => {
                tracing::info!(message = %message, "Upload completed")
            }
            HandshakeOutcome::Denied(reason) => {
                tracing::warn!(reason = %reason, "Upload denied by backend")
            }
            HandshakeOutcome::Failed(e) => tracing::warn!(error = %e, "Upload failed"),
        }
        outcome
    }

    async fn connect(&mut self) -> Result<()> {
        self.conn = Some(BackendConnection::connect(self.target, self.tracker).await?);
        Ok(())
    }

    async fn send_header(&mut self) -> Result<()> {
        let header =
            encode_upload_header(&self.request.filename, self.request.declared_size())?;
        open(&mut self.conn)?.send(&header).await
    }

    async fn stream_payload(&mut self) -> Result<()> {
        open(&mut self.conn)?
            .send_payload(&self.request.payload)
            .await
    }

    async fn read_reply(&mut self) -> Result<String> {
        open(&mut self.conn)?.receive_string().await
    }
}
