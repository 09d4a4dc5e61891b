//! HTTP boundary subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → server.rs (Axum setup, request ID, body limit, timeout)
//!     → request.rs (filename header decoding)
//!     → upload.rs / download.rs (drive a handshake)
//!     → response.rs (outcome → status + JSON)
//!     → Send to client
//! ```

pub mod download;
pub mod request;
pub mod response;
pub mod server;
pub mod upload;

pub use request::{DEFAULT_FILENAME, X_FILENAME};
pub use response::BridgeResponse;
pub use server::{AppState, HttpServer};
