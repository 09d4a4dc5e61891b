//! Response mapping.
//!
//! # Status codes
//! - 200: handshake completed
//! - 400: filename could not be framed (no socket opened)
//! - 403: backend refused the upload
//! - 404: download target missing on the backend
//! - 500: transport failure talking to the backend

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::handshake::HandshakeOutcome;
use crate::protocol::BridgeError;

/// JSON body returned by the bridge endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BridgeResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for HandshakeOutcome {
    fn into_response(self) -> Response {
        match self {
            HandshakeOutcome::Completed(message) => {
                BridgeResponse::success(message).with_status(StatusCode::OK)
            }
            HandshakeOutcome::Denied(reason) => {
                BridgeResponse::failure(reason).with_status(StatusCode::FORBIDDEN)
            }
            HandshakeOutcome::Failed(e) => error_response(&e),
        }
    }
}

/// Map a bridge error to its HTTP response.
pub fn error_response(e: &BridgeError) -> Response {
    let status = if e.is_transport() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    BridgeResponse::failure(e.to_string()).with_status(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_statuses() {
        let completed = HandshakeOutcome::Completed("OK".into()).into_response();
        assert_eq!(completed.status(), StatusCode::OK);

        let denied = HandshakeOutcome::Denied("no".into()).into_response();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let failed = HandshakeOutcome::Failed(BridgeError::ConnectionClosed).into_response();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let rejected = error_response(&BridgeError::EmptyFilename);
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn message_is_omitted_when_absent() {
        let body = BridgeResponse {
            success: true,
            message: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"success":true}"#);
        assert_eq!(
            serde_json::to_string(&BridgeResponse::failure("DENIED")).unwrap(),
            r#"{"success":false,"message":"DENIED"}"#
        );
    }
}
