//! Client error taxonomy.
//!
//! Four families, matching how failures propagate:
//!
//! - **client/local** errors (invalid names, missing files, bad
//!   checkpoints) are detected before any network call and never retried;
//! - **transport** errors are always retryable up to the attempt cap;
//! - **service** errors carry the service-assigned code and subdivide into
//!   retryable, retryable-with-correction, and terminal (see
//!   [`crate::retry`]);
//! - **stream** errors mark a retry that would need a body the caller's
//!   single-use source can no longer produce.
//!
//! When retries are exhausted the last attempt's error is surfaced
//! unchanged rather than a synthesized "too many retries" wrapper, so the
//! root cause survives.

use http::StatusCode;

use crate::transport::TransportError;

/// Convenience result alias.
pub type TosResult<T> = Result<T, TosError>;

/// A non-2xx response decoded into the service's error shape.
#[derive(Debug, Clone, thiserror::Error)]
#[error("service error: code={code}, status={status}, message={message}")]
pub struct ServiceError {
    /// HTTP status of the failing response.
    pub status: StatusCode,
    /// Service-defined error code, empty when the body carried none.
    pub code: String,
    /// Human-readable message from the service.
    pub message: String,
    /// Request identifier assigned by the service.
    pub request_id: Option<String>,
    /// The response's `Date` header, kept verbatim for skew correction.
    pub server_date: Option<String>,
}

impl ServiceError {
    /// Whether the status is a server-side failure (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }
}

/// Top-level SDK error.
#[derive(Debug, thiserror::Error)]
pub enum TosError {
    /// Invalid caller input, rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Signing configuration error.
    #[error(transparent)]
    Auth(#[from] tos_auth::AuthError),

    /// Endpoint configuration error.
    #[error(transparent)]
    Endpoint(#[from] tos_core::EndpointError),

    /// Transport-level failure surfaced after retries were exhausted.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Service rejected the request terminally or retries ran out.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A retry needed the request body again but its single-use source was
    /// already consumed.
    #[error("request body stream is exhausted and cannot be replayed for a retry")]
    StreamNotReplayable,

    /// The combined local checksum disagrees with the service's checksum
    /// for the assembled object.
    #[error("checksum mismatch: locally combined crc64 {expected}, service reported {actual}")]
    ChecksumMismatch {
        /// CRC64 combined from the per-part checksums.
        expected: u64,
        /// CRC64 the service reported for the assembled object.
        actual: u64,
    },

    /// Checkpoint file corrupt or inconsistent with the source file.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Local file I/O failure.
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body could not be decoded.
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The transfer was cancelled by the caller.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TosError {
    /// Whether the error was produced without any network call.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::Auth(_)
                | Self::Endpoint(_)
                | Self::Checkpoint(_)
                | Self::Io(_)
        )
    }
}
