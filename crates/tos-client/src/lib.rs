//! TOS client: request execution and resumable multipart transfers.
//!
//! Three layers interlock here:
//!
//! - the [`pipeline`] drives one logical call through repeated attempts,
//!   signing each attempt fresh via `tos-auth` and dispatching it over the
//!   [`transport`] abstraction;
//! - the [`retry`] policy classifies each attempt's outcome into a retry
//!   decision, including clock-skew correction and credential refresh;
//! - the [`transfer`] manager splits a file into parts, runs many pipeline
//!   calls concurrently, persists progress to a [`checkpoint`], and
//!   resumes interrupted uploads from it.
//!
//! The [`ops`] module is the thin façade mapping multipart control-plane
//! calls onto pipeline invocations; [`event`] carries the upload event
//! stream delivered to callers over a channel.

pub mod checkpoint;
pub mod error;
pub mod event;
pub mod model;
pub mod ops;
pub mod pipeline;
pub mod retry;
pub mod transfer;
pub mod transport;
pub mod validation;

pub use checkpoint::UploadCheckpoint;
pub use error::{ServiceError, TosError, TosResult};
pub use event::{UploadEvent, UploadEventKind, UploadEventSender};
pub use model::{
    AbortMultipartUploadInput, Body, CompleteMultipartUploadInput, CompleteMultipartUploadOutput,
    CreateMultipartUploadInput, CreateMultipartUploadOutput, TosRequest, UploadPartInput,
    UploadPartOutput, UploadedPart,
};
pub use ops::{MultipartApi, TosClient};
pub use pipeline::RequestPipeline;
pub use retry::{AttemptFailure, RetryDecision, RetryPolicy};
pub use transfer::{FileUploader, UploadFileInput, UploadFileOutput};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
