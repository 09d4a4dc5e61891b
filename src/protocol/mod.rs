//! Backend wire protocol.
//!
//! # Exchange
//! ```text
//! UPLOAD:   → "UPLOAD" filename size(i64)
//!           ← text  (contains ALLOWED_MARKER iff granted)
//!           → size raw bytes                   [only when granted]
//!           ← text  (final message)
//!
//! DOWNLOAD: → "DOWNLOAD" filename
//!           ← size(i64)   (NOT_FOUND_SIZE: a text error follows instead)
//!           ← size raw bytes
//!           ← text  (final message)
//! ```

pub mod codec;
pub mod error;

pub use codec::{Frame, FrameDecoder, UploadHeader, MAX_STRING_LEN};
pub use error::BridgeError;

pub const OP_UPLOAD: &str = "UPLOAD";
pub const OP_DOWNLOAD: &str = "DOWNLOAD";

/// Substring the backend puts in its permission reply to grant an upload.
pub const ALLOWED_MARKER: &str = "ALLOWED";

/// Size the backend sends for a download whose file does not exist.
pub const NOT_FOUND_SIZE: i64 = -1;
