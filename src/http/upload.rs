//! `POST /upload`: bridge one HTTP upload to the backend.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::handshake::{HandshakeOutcome, UploadHandshake, UploadRequest};
use crate::http::request::filename_from_headers;
use crate::http::response::{error_response, BridgeResponse};
use crate::http::server::AppState;
use crate::observability::metrics;

const OPERATION: &str = "upload";

pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start_time = Instant::now();

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Rejected upload body");
            metrics::record_request(OPERATION, "rejected", start_time);
            return BridgeResponse::failure(rejection.body_text()).with_status(rejection.status());
        }
    };

    let filename = match filename_from_headers(&headers) {
        Ok(name) => name,
        Err(msg) => {
            metrics::record_request(OPERATION, "rejected", start_time);
            return BridgeResponse::failure(msg).with_status(StatusCode::BAD_REQUEST);
        }
    };

    let request = match UploadRequest::new(filename, body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected upload before contacting backend");
            metrics::record_request(OPERATION, "rejected", start_time);
            return error_response(&e);
        }
    };

    let size = request.payload().len() as u64;
    let target = state.backend_target();
    let outcome = UploadHandshake::new(&target, &state.tracker, request)
        .run()
        .await;

    if let HandshakeOutcome::Completed(_) = outcome {
        metrics::record_payload_bytes(OPERATION, size);
    }
    metrics::record_request(OPERATION, outcome.label(), start_time);
    outcome.into_response()
}
