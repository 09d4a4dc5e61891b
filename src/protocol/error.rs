//! Error taxonomy for the bridge.

use std::io;
use thiserror::Error;

/// Errors raised while encoding frames or talking to the backend.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Backend refused or could not be reached.
    #[error("failed to connect to backend {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Connection establishment exceeded its deadline.
    #[error("timed out connecting to backend {addr} after {timeout_secs}s")]
    ConnectTimeout { addr: String, timeout_secs: u64 },

    /// Writing to the backend socket failed mid-handshake.
    #[error("failed to write to backend: {0}")]
    Write(#[source] io::Error),

    /// Reading from the backend socket failed mid-handshake.
    #[error("failed to read from backend: {0}")]
    Read(#[source] io::Error),

    /// The backend sent nothing within the read deadline.
    #[error("timed out waiting for backend reply after {0}s")]
    ReadTimeout(u64),

    /// The backend stopped accepting bytes within the write deadline.
    #[error("timed out writing to backend after {0}s")]
    WriteTimeout(u64),

    /// The backend closed the connection before the expected frame arrived.
    #[error("backend closed the connection unexpectedly")]
    ConnectionClosed,

    /// A frame's length prefix or content is inconsistent.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A string does not fit in a 16-bit length prefix.
    #[error("string of {len} bytes exceeds the {max} byte frame limit")]
    EncodingOverflow { len: usize, max: usize },

    /// Uploads and downloads need a filename.
    #[error("filename must not be empty")]
    EmptyFilename,

    /// The backend announced more data than the bridge will buffer.
    #[error("backend announced {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: u64, limit: u64 },
}

impl BridgeError {
    /// Whether this error came from the socket rather than from request
    /// validation. Transport errors surface as HTTP 500.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            BridgeError::EncodingOverflow { .. } | BridgeError::EmptyFilename
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_transport() {
        assert!(!BridgeError::EmptyFilename.is_transport());
        assert!(!BridgeError::EncodingOverflow { len: 70_000, max: 65_535 }.is_transport());
        assert!(BridgeError::ConnectionClosed.is_transport());
        assert!(BridgeError::ReadTimeout(5).is_transport());
        assert!(BridgeError::WriteTimeout(5).is_transport());
    }

    #[test]
    fn messages_name_the_cause() {
        let err = BridgeError::ConnectTimeout {
            addr: "10.0.0.1:6600".into(),
            timeout_secs: 5,
        };
        assert_eq!(
            err.to_string(),
            "timed out connecting to backend 10.0.0.1:6600 after 5s"
        );
    }
}
