//! Opaque request description and the multipart control-plane model.
//!
//! The pipeline treats a request as `{method, bucket/key, query, headers,
//! body-or-source}` and knows nothing about individual operations; the
//! handful of input/output types below cover only the multipart calls the
//! transfer manager drives. Everything else the service offers is outside
//! this crate.

use std::io::Read;
use std::path::PathBuf;

use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{TosError, TosResult};

/// Response header carrying the CRC64-ECMA of the stored bytes.
pub const HEADER_HASH_CRC64: &str = "x-tos-hash-crc64ecma";

/// Response header carrying the request identifier.
pub const HEADER_REQUEST_ID: &str = "x-tos-request-id";

/// A request body or body source.
///
/// `Bytes` and `File` can be produced again for every retry attempt; a
/// `Reader` is single-use, and a retry that needs it a second time fails
/// fast with [`TosError::StreamNotReplayable`] instead of sending a
/// truncated payload.
pub enum Body {
    /// No body.
    Empty,
    /// Buffered bytes, replayable.
    Bytes(Bytes),
    /// A byte range of a local file, re-read from `offset` on each attempt.
    File {
        /// Source file path.
        path: PathBuf,
        /// Starting byte offset.
        offset: u64,
        /// Number of bytes to send.
        len: u64,
    },
    /// A single-use byte stream.
    Reader(Mutex<Option<Box<dyn Read + Send>>>),
}

impl Body {
    /// Wrap a single-use reader.
    #[must_use]
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Mutex::new(Some(Box::new(reader))))
    }

    /// Whether the body can be produced again for another attempt.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Reader(_))
    }

    /// Materialize the body for one attempt.
    ///
    /// `File` bodies re-read their range; a `Reader` yields its bytes once
    /// and [`TosError::StreamNotReplayable`] afterwards.
    pub async fn load(&self) -> TosResult<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(data) => Ok(data.clone()),
            Self::File { path, offset, len } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(*offset)).await?;
                let mut buf = vec![0u8; usize::try_from(*len).unwrap_or(usize::MAX)];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            Self::Reader(slot) => {
                let reader = slot.lock().take();
                let Some(mut reader) = reader else {
                    return Err(TosError::StreamNotReplayable);
                };
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Bytes(data) => write!(f, "Body::Bytes({} bytes)", data.len()),
            Self::File { path, offset, len } => f
                .debug_struct("Body::File")
                .field("path", path)
                .field("offset", offset)
                .field("len", len)
                .finish(),
            Self::Reader(_) => f.write_str("Body::Reader"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(data.into())
    }
}

/// One logical service call, before signing.
#[derive(Debug)]
pub struct TosRequest {
    /// HTTP method.
    pub method: Method,
    /// Target bucket, when the call addresses one.
    pub bucket: Option<String>,
    /// Target object key, when the call addresses one.
    pub key: Option<String>,
    /// Decoded query parameters.
    pub query: Vec<(String, String)>,
    /// Caller headers (signed).
    pub headers: Vec<(String, String)>,
    /// Request body or body source.
    pub body: Body,
}

impl TosRequest {
    /// Create a bodyless request.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            bucket: None,
            key: None,
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Address a bucket.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Address an object key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Object path for URL and signing: `/` plus the key, or `/`.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.key {
            Some(key) => format!("/{key}"),
            None => "/".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Multipart control-plane inputs and outputs
// ---------------------------------------------------------------------------

/// Input for initiating a multipart session.
#[derive(Debug, Clone, Default)]
pub struct CreateMultipartUploadInput {
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Content type recorded for the final object.
    pub content_type: Option<String>,
    /// SSE-C algorithm header value.
    pub ssec_algorithm: Option<String>,
    /// MD5 of the SSE-C key.
    pub ssec_key_md5: Option<String>,
    /// Key encoding requested for responses.
    pub encoding_type: Option<String>,
}

/// Output of initiating a multipart session.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateMultipartUploadOutput {
    /// Bucket echoed by the service.
    #[serde(rename = "Bucket", default)]
    pub bucket: String,
    /// Key echoed by the service.
    #[serde(rename = "Key", default)]
    pub key: String,
    /// Identifier of the new multipart session.
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    /// SSE-C algorithm echoed by the service.
    #[serde(rename = "SSECAlgorithm", default)]
    pub ssec_algorithm: Option<String>,
    /// SSE-C key MD5 echoed by the service.
    #[serde(rename = "SSECKeyMD5", default)]
    pub ssec_key_md5: Option<String>,
    /// Key encoding echoed by the service.
    #[serde(rename = "EncodingType", default)]
    pub encoding_type: Option<String>,
}

/// Input for uploading one part from a file range.
#[derive(Debug, Clone)]
pub struct UploadPartInput {
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Multipart session identifier.
    pub upload_id: String,
    /// 1-based part number.
    pub part_number: u32,
    /// Source file.
    pub file_path: PathBuf,
    /// Byte offset of this part within the file.
    pub offset: u64,
    /// Part size in bytes.
    pub part_size: u64,
}

/// Output of uploading one part.
#[derive(Debug, Clone)]
pub struct UploadPartOutput {
    /// Part number echoed back for bookkeeping.
    pub part_number: u32,
    /// Entity tag of the stored part.
    pub etag: String,
    /// CRC64-ECMA computed locally over the bytes sent, already verified
    /// against the service's value when one was returned.
    pub hash_crc64ecma: Option<u64>,
}

/// One `{part_number, etag}` entry of the completion call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadedPart {
    /// 1-based part number.
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    /// Entity tag returned when the part was uploaded.
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Input for completing a multipart session.
#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadInput {
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Multipart session identifier.
    pub upload_id: String,
    /// All parts, ordered by part number.
    pub parts: Vec<UploadedPart>,
}

/// Output of completing a multipart session.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CompleteMultipartUploadOutput {
    /// Bucket echoed by the service.
    #[serde(rename = "Bucket", default)]
    pub bucket: String,
    /// Key echoed by the service.
    #[serde(rename = "Key", default)]
    pub key: String,
    /// Entity tag of the assembled object.
    #[serde(rename = "ETag", default)]
    pub etag: String,
    /// Object location URL.
    #[serde(rename = "Location", default)]
    pub location: String,
    /// Version of the assembled object.
    #[serde(rename = "VersionID", default)]
    pub version_id: Option<String>,
    /// CRC64-ECMA of the assembled object (from the response header).
    #[serde(skip)]
    pub hash_crc64ecma: Option<u64>,
}

/// Input for aborting a multipart session.
#[derive(Debug, Clone)]
pub struct AbortMultipartUploadInput {
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Multipart session identifier.
    pub upload_id: String,
}
