//! Request inspection.
//!
//! # Responsibilities
//! - Extract and percent-decode the upload filename header
//!
//! # Design Decisions
//! - A missing or empty `x-filename` falls back to `DEFAULT_FILENAME`
//! - Bytes that do not decode to UTF-8 are rejected, not replaced

use axum::http::HeaderMap;
use percent_encoding::percent_decode;

/// Header carrying the percent-encoded upload filename.
pub const X_FILENAME: &str = "x-filename";

/// Name used when the client does not send one.
pub const DEFAULT_FILENAME: &str = "uploaded_file";

/// Decode the filename header, or fall back to the default name.
pub fn filename_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let Some(raw) = headers.get(X_FILENAME) else {
        return Ok(DEFAULT_FILENAME.to_string());
    };
    let decoded = percent_decode(raw.as_bytes())
        .decode_utf8()
        .map_err(|e| format!("{} header is not valid UTF-8: {}", X_FILENAME, e))?;
    if decoded.is_empty() {
        return Ok(DEFAULT_FILENAME.to_string());
    }
    Ok(decoded.into_owned())
}
