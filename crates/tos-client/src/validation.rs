//! Local input validation, applied before any network call.

use tos_core::constants::{
    MAX_BUCKET_NAME_LEN, MAX_OBJECT_KEY_LEN, MAX_PART_SIZE, MAX_TASK_NUM, MIN_BUCKET_NAME_LEN,
    MIN_PART_SIZE, MIN_TASK_NUM,
};

use crate::error::{TosError, TosResult};

/// Validate a bucket name.
///
/// Names are 3 to 63 characters of lowercase letters, digits, and hyphens,
/// and must not begin or end with a hyphen.
pub fn validate_bucket_name(bucket: &str) -> TosResult<()> {
    if bucket.len() < MIN_BUCKET_NAME_LEN || bucket.len() > MAX_BUCKET_NAME_LEN {
        return Err(TosError::InvalidInput(format!(
            "bucket name length must be within [{MIN_BUCKET_NAME_LEN}, {MAX_BUCKET_NAME_LEN}], got {}",
            bucket.len()
        )));
    }
    if bucket.starts_with('-') || bucket.ends_with('-') {
        return Err(TosError::InvalidInput(
            "bucket name must not begin or end with '-'".to_owned(),
        ));
    }
    if !bucket
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(TosError::InvalidInput(
            "bucket name may only contain lowercase letters, digits, and '-'".to_owned(),
        ));
    }
    Ok(())
}

/// Validate an object key: non-empty and at most 696 bytes.
pub fn validate_object_key(key: &str) -> TosResult<()> {
    if key.is_empty() {
        return Err(TosError::InvalidInput("object key must not be empty".to_owned()));
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return Err(TosError::InvalidInput(format!(
            "object key length must be at most {MAX_OBJECT_KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}

/// Validate a caller-supplied part size against the service limits.
pub fn validate_part_size(part_size: u64) -> TosResult<()> {
    if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&part_size) {
        return Err(TosError::InvalidInput(format!(
            "part size must be within [{MIN_PART_SIZE}, {MAX_PART_SIZE}], got {part_size}"
        )));
    }
    Ok(())
}

/// Clamp a requested worker count into the supported range.
#[must_use]
pub fn clamp_task_num(task_num: usize) -> usize {
    task_num.clamp(MIN_TASK_NUM, MAX_TASK_NUM)
}
