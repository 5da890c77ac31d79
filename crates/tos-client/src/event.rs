//! Upload progress events.
//!
//! The transfer manager reports every state transition of a resumable
//! upload over an unbounded channel the caller supplies. Events are
//! observational only; dropping the receiver never stalls the upload.

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEventKind {
    /// The multipart session was created.
    CreateMultipartUploadSucceed,
    /// Creating the multipart session failed.
    CreateMultipartUploadFailed,
    /// One part finished uploading.
    UploadPartSucceed,
    /// One part failed with a retryable-but-exhausted or terminal error.
    UploadPartFailed,
    /// The upload was aborted and the session is unusable.
    UploadPartAborted,
    /// The object was assembled from its parts.
    CompleteMultipartUploadSucceed,
    /// Assembling the object failed.
    CompleteMultipartUploadFailed,
}

/// One progress notification.
#[derive(Debug, Clone)]
pub struct UploadEvent {
    /// Transition kind.
    pub kind: UploadEventKind,
    /// Rendered error that caused a `*Failed` or `*Aborted` event.
    pub error: Option<String>,
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Multipart session identifier, once one exists.
    pub upload_id: Option<String>,
    /// Source file.
    pub file_path: PathBuf,
    /// Checkpoint file backing the upload, when persistence is enabled.
    pub checkpoint_path: Option<PathBuf>,
    /// 1-based part number, for per-part events.
    pub part_number: Option<u32>,
}

/// Sender half for upload events.
pub type UploadEventSender = UnboundedSender<UploadEvent>;

/// Fire-and-forget emit; a dropped receiver is ignored.
pub(crate) fn emit(listener: Option<&UploadEventSender>, event: UploadEvent) {
    if let Some(tx) = listener {
        let _ = tx.send(event);
    }
}
