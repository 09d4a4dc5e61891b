//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handshake + http layers produce:
//!     → logging.rs (structured log events, tracing spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
