//! HTTP to binary-TCP upload bridge.
//!
//! Accepts file uploads over HTTP and relays them to a backend that only
//! speaks a length-prefixed binary protocol, negotiating permission before
//! any file bytes are sent.

// Core subsystems
pub mod handshake;
pub mod http;
pub mod net;
pub mod protocol;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::BridgeConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
