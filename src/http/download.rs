//! `GET /download/{filename}`: fetch a stored file from the backend.

use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::handshake::{DownloadHandshake, DownloadOutcome, DownloadRequest};
use crate::http::response::{error_response, BridgeResponse};
use crate::http::server::AppState;
use crate::observability::metrics;

const OPERATION: &str = "download";

/// Header carrying the backend's final status message on success.
pub const X_BACKEND_MESSAGE: &str = "x-backend-message";

pub async fn download_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let start_time = Instant::now();

    let request = match DownloadRequest::new(filename) {
        Ok(request) => request,
        Err(e) => {
            metrics::record_request(OPERATION, "rejected", start_time);
            return error_response(&e);
        }
    };
    let disposition = content_disposition(request.filename());

    let target = state.backend_target();
    let max_bytes = state.max_download_bytes();
    let outcome = DownloadHandshake::new(&target, &state.tracker, request, max_bytes)
        .run()
        .await;
    metrics::record_request(OPERATION, outcome.label(), start_time);

    match outcome {
        DownloadOutcome::Completed { data, message } => {
            metrics::record_payload_bytes(OPERATION, data.len() as u64);
            let mut response = (StatusCode::OK, Body::from(data)).into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            if let Ok(value) = HeaderValue::from_str(&message) {
                headers.insert(X_BACKEND_MESSAGE, value);
            }
            response
        }
        DownloadOutcome::NotFound(reason) => {
            BridgeResponse::failure(reason).with_status(StatusCode::NOT_FOUND)
        }
        DownloadOutcome::Failed(e) => error_response(&e),
    }
}

fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    )
}
