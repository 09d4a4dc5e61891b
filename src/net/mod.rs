//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Handshake state machine
//!     → connection.rs (connect with timeout, framed reads, raw writes)
//!     → TCP socket to the backend
//!
//! Connection lifecycle:
//!     Connecting → Open → Closed   (closed on every exit path, never reused)
//! ```

pub mod connection;

pub use connection::{BackendConnection, BackendTarget, ConnectionId, ConnectionTracker};
