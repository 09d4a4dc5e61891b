//! Handshake state machines.
//!
//! # Data Flow
//! ```text
//! UploadRequest
//!     → upload.rs: Connecting → SendingHeader → AwaitingPermission
//!                  → StreamingPayload → AwaitingFinal
//!     → HandshakeOutcome (Completed | Denied | Failed)
//!
//! DownloadRequest
//!     → download.rs: Connecting → SendingRequest → AwaitingSize
//!                    → ReceivingFile → AwaitingFinal
//!     → DownloadOutcome (Completed | NotFound | Failed)
//! ```
//!
//! # Design Decisions
//! - Each machine owns its connection; it is closed as soon as a terminal
//!   state is reached
//! - Transitions on received data are pure functions of (state, data)
//! - Reads and writes strictly alternate; nothing is pipelined

pub mod download;
pub mod upload;

pub use download::{DownloadHandshake, DownloadOutcome, DownloadRequest};
pub use upload::{HandshakeOutcome, UploadHandshake, UploadRequest};

use crate::net::connection::BackendConnection;
use crate::protocol::error::{BridgeError, Result};
use crate::protocol::MAX_STRING_LEN;

/// Check a filename can be framed before any socket is opened.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(BridgeError::EmptyFilename);
    }
    if filename.len() > MAX_STRING_LEN {
        return Err(BridgeError::EncodingOverflow {
            len: filename.len(),
            max: MAX_STRING_LEN,
        });
    }
    Ok(())
}

fn open(conn: &mut Option<BackendConnection>) -> Result<&mut BackendConnection> {
    conn.as_mut().ok_or(BridgeError::ConnectionClosed)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_bounds() {
        assert!(validate_filename("a").is_ok());
        assert!(validate_filename(&"n".repeat(MAX_STRING_LEN)).is_ok());
        assert!(matches!(validate_filename(""), Err(BridgeError::EmptyFilename)));
        assert!(matches!(
            validate_filename(&"n".repeat(MAX_STRING_LEN + 1)),
            Err(BridgeError::EncodingOverflow { .. })
        ));
    }
}
