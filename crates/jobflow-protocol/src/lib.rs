//! IPC framing and request/response types for jobflow.
//!
//! Capture sources and the CLI talk to the daemon over a Unix socket.
//! Each message is length-prefixed JSON:
//! - 4 bytes: payload length (u32, big-endian)
//! - N bytes: JSON [`Envelope`]
//!
//! The envelope carries the protocol version, a request id used for
//! correlation, and the [`Request`] or [`Response`] payload.
//!
//! ```rust
//! use jobflow_protocol::{Envelope, Request, encode_message, decode_message};
//!
//! let request = Envelope::request("req-123", Request::GetQueueStatus);
//! let bytes = encode_message(&request).unwrap();
//! let decoded: Envelope<Request> = decode_message(&bytes).unwrap();
//! assert_eq!(decoded.payload, Request::GetQueueStatus);
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{decode_message, encode_message, read_frame, read_frame_bytes, write_frame};
pub use types::{
    ActionResult, Envelope, ErrorCode, ErrorResponse, QueueStats, Request, Response, StatusInfo,
    SyncSummary,
};

/// Protocol version constant.
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum message size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;
