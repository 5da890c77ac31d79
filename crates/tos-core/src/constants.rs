//! Service limits and defaults for TOS multipart transfers and presigning.

/// Default size of one multipart part: 20 MiB.
pub const DEFAULT_PART_SIZE: u64 = 20 * 1024 * 1024;

/// Smallest part size the service accepts for non-final parts: 5 MiB.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest part size the service accepts: 5 GiB.
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts in one multipart upload.
pub const MAX_PART_COUNT: u64 = 10_000;

/// Minimum number of concurrent part-upload tasks.
pub const MIN_TASK_NUM: usize = 1;

/// Maximum number of concurrent part-upload tasks.
pub const MAX_TASK_NUM: usize = 1_000;

/// Default validity window for presigned URLs, in seconds (1 hour).
pub const DEFAULT_PRESIGN_EXPIRES: u64 = 3_600;

/// Maximum validity window for presigned URLs, in seconds (7 days).
pub const MAX_PRESIGN_EXPIRES: u64 = 604_800;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 3;

/// Bucket name length bounds.
pub const MIN_BUCKET_NAME_LEN: usize = 3;
/// See [`MIN_BUCKET_NAME_LEN`].
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Longest object key the service accepts, in bytes.
pub const MAX_OBJECT_KEY_LEN: usize = 696;
