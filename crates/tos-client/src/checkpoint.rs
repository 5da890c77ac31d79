//! Checkpoint persistence for resumable uploads.
//!
//! A checkpoint is the full state of one multipart upload: session
//! identity, the part plan, and per-part results. It is rewritten in full
//! after every part completes, so a crash at any point leaves a consistent
//! file, and a resumed upload skips exactly the parts recorded as done.
//!
//! The file is versioned JSON. A version mismatch, decode failure, or a
//! source file whose size or mtime changed invalidates the checkpoint and
//! the upload restarts from scratch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use tos_core::constants::MAX_PART_COUNT;

use crate::error::{TosError, TosResult};

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Identity of the source file when the upload started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Modification time, seconds since the Unix epoch.
    pub last_modified: i64,
    /// File size in bytes.
    pub size: u64,
}

impl FileInfo {
    /// Stat `path` and capture its identity.
    pub fn probe(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let last_modified = meta
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Ok(Self {
            last_modified,
            size: meta.len(),
        })
    }
}

/// One planned part and its upload result, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRecord {
    /// 1-based part number.
    pub part_number: u32,
    /// Byte offset within the source file.
    pub offset: u64,
    /// Part size in bytes.
    pub size: u64,
    /// Entity tag returned by the service.
    #[serde(default)]
    pub etag: Option<String>,
    /// CRC64-ECMA of the stored part.
    #[serde(default)]
    pub hash_crc64ecma: Option<u64>,
    /// Whether the part finished uploading.
    #[serde(default)]
    pub is_completed: bool,
}

/// Persistent state of one resumable upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCheckpoint {
    /// Format version.
    pub version: u32,
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Multipart session identifier.
    pub upload_id: String,
    /// Effective part size after planning.
    pub part_size: u64,
    /// Source file path.
    pub file_path: PathBuf,
    /// Source file identity at session start.
    pub file_info: FileInfo,
    /// The part plan, ordered by part number.
    pub parts: Vec<PartRecord>,
    /// SSE-C algorithm recorded at session start.
    #[serde(default)]
    pub ssec_algorithm: Option<String>,
    /// SSE-C key MD5 recorded at session start.
    #[serde(default)]
    pub ssec_key_md5: Option<String>,
    /// Key encoding recorded at session start.
    #[serde(default)]
    pub encoding_type: Option<String>,
}

impl UploadCheckpoint {
    /// Read and decode a checkpoint file.
    pub async fn load(path: &Path) -> TosResult<Self> {
        let data = tokio::fs::read(path).await?;
        let checkpoint: Self = serde_json::from_slice(&data)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(TosError::Checkpoint(format!(
                "unsupported checkpoint version {}",
                checkpoint.version
            )));
        }
        Ok(checkpoint)
    }

    /// Persist the whole checkpoint, replacing the file atomically.
    ///
    /// Each call stages through its own temporary file, so overlapping
    /// saves to one path cannot clobber each other's staging data; the
    /// caller is still responsible for ordering when the write sequence
    /// matters.
    pub async fn save(&self, path: &Path) -> TosResult<()> {
        static SAVE_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

        let data = serde_json::to_vec_pretty(self)?;
        let seq = SAVE_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}-{seq}.tmp", std::process::id()));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data).await?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        debug!(path = %path.display(), "checkpoint saved");
        Ok(())
    }

    /// Whether this checkpoint still matches the upload it would resume.
    #[must_use]
    pub fn matches(&self, bucket: &str, key: &str, file_path: &Path, file_info: FileInfo) -> bool {
        self.bucket == bucket
            && self.key == key
            && self.file_path == file_path
            && self.file_info == file_info
    }

    /// Parts not yet uploaded, in part-number order.
    #[must_use]
    pub fn pending_parts(&self) -> Vec<PartRecord> {
        self.parts.iter().filter(|p| !p.is_completed).cloned().collect()
    }

    /// Record one finished part.
    pub fn record_part(&mut self, part_number: u32, etag: String, hash_crc64ecma: Option<u64>) {
        if let Some(part) = self
            .parts
            .iter_mut()
            .find(|p| p.part_number == part_number)
        {
            part.etag = Some(etag);
            part.hash_crc64ecma = hash_crc64ecma;
            part.is_completed = true;
        }
    }

    /// Whether every part finished uploading.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.parts.iter().all(|p| p.is_completed)
    }
}

/// Compute the part plan for a file.
///
/// The requested part size is enlarged as needed so the plan never exceeds
/// the service's part-count limit. A zero-byte file becomes a single empty
/// part so the assembled object still exists.
#[must_use]
pub fn plan_parts(file_size: u64, requested_part_size: u64) -> (u64, Vec<PartRecord>) {
    if file_size == 0 {
        let parts = vec![PartRecord {
            part_number: 1,
            offset: 0,
            size: 0,
            etag: None,
            hash_crc64ecma: None,
            is_completed: false,
        }];
        return (requested_part_size, parts);
    }

    let mut part_size = requested_part_size.max(1);
    if file_size.div_ceil(part_size) > MAX_PART_COUNT {
        part_size = file_size.div_ceil(MAX_PART_COUNT);
    }

    let count = file_size.div_ceil(part_size);
    let mut parts = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    for i in 0..count {
        let offset = i * part_size;
        parts.push(PartRecord {
            part_number: u32::try_from(i + 1).unwrap_or(u32::MAX),
            offset,
            size: part_size.min(file_size - offset),
            etag: None,
            hash_crc64ecma: None,
            is_completed: false,
        });
    }
    (part_size, parts)
}

/// Default checkpoint path: `{file}.{bucket}.{key}.upload`, with path
/// separators in the key flattened so the checkpoint lands next to the
/// source file.
#[must_use]
pub fn default_checkpoint_path(file_path: &Path, bucket: &str, key: &str) -> PathBuf {
    let flat_key: String = key
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let mut name = file_path.as_os_str().to_owned();
    name.push(format!(".{bucket}.{flat_key}.upload"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint_fixture() -> UploadCheckpoint {
        let (part_size, parts) = plan_parts(25, 10);
        UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: "b".to_owned(),
            key: "k".to_owned(),
            upload_id: "u-1".to_owned(),
            part_size,
            file_path: PathBuf::from("/tmp/src.bin"),
            file_info: FileInfo {
                last_modified: 1_700_000_000,
                size: 25,
            },
            parts,
            ssec_algorithm: None,
            ssec_key_md5: None,
            encoding_type: None,
        }
    }

    #[test]
    fn test_should_plan_parts_with_remainder() {
        let (part_size, parts) = plan_parts(25, 10);
        assert_eq!(part_size, 10);
        assert_eq!(parts.len(), 3);
        assert_eq!((parts[0].offset, parts[0].size), (0, 10));
        assert_eq!((parts[2].offset, parts[2].size), (20, 5));
        assert_eq!(parts[2].part_number, 3);
    }

    #[test]
    fn test_should_enlarge_part_size_at_count_limit() {
        let (part_size, parts) = plan_parts(MAX_PART_COUNT * 2 + 1, 1);
        assert!(u64::try_from(parts.len()).unwrap() <= MAX_PART_COUNT);
        assert_eq!(part_size, 3);
        let total: u64 = parts.iter().map(|p| p.size).sum();
        assert_eq!(total, MAX_PART_COUNT * 2 + 1);
    }

    #[test]
    fn test_should_plan_single_empty_part_for_empty_file() {
        let (_, parts) = plan_parts(0, 8 * 1024 * 1024);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].size, 0);
        assert_eq!(parts[0].part_number, 1);
    }

    #[tokio::test]
    async fn test_should_save_and_reload_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.upload");

        let mut checkpoint = checkpoint_fixture();
        checkpoint.record_part(1, "\"e1\"".to_owned(), Some(42));
        checkpoint.save(&path).await.unwrap();

        let loaded = UploadCheckpoint::load(&path).await.unwrap();
        assert_eq!(loaded.upload_id, "u-1");
        assert!(loaded.parts[0].is_completed);
        assert_eq!(loaded.parts[0].hash_crc64ecma, Some(42));
        assert_eq!(loaded.pending_parts().len(), 2);
        assert!(!loaded.is_complete());
    }

    #[tokio::test]
    async fn test_should_survive_overlapping_saves_to_one_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.upload");

        let a = checkpoint_fixture();
        let mut b = checkpoint_fixture();
        b.record_part(1, "\"e1\"".to_owned(), None);

        for _ in 0..50 {
            let (ra, rb) = tokio::join!(a.save(&path), b.save(&path));
            ra.unwrap();
            rb.unwrap();
            // Whichever writer won, the file is a complete checkpoint.
            let loaded = UploadCheckpoint::load(&path).await.unwrap();
            assert_eq!(loaded.parts.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_should_reject_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.upload");

        let mut checkpoint = checkpoint_fixture();
        checkpoint.version = 99;
        let data = serde_json::to_vec(&checkpoint).unwrap();
        tokio::fs::write(&path, data).await.unwrap();

        assert!(matches!(
            UploadCheckpoint::load(&path).await,
            Err(TosError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_should_detect_source_file_change() {
        let checkpoint = checkpoint_fixture();
        let same = FileInfo {
            last_modified: 1_700_000_000,
            size: 25,
        };
        let changed = FileInfo {
            last_modified: 1_700_000_001,
            size: 25,
        };
        assert!(checkpoint.matches("b", "k", Path::new("/tmp/src.bin"), same));
        assert!(!checkpoint.matches("b", "k", Path::new("/tmp/src.bin"), changed));
        assert!(!checkpoint.matches("b", "other", Path::new("/tmp/src.bin"), same));
    }

    #[test]
    fn test_should_derive_default_checkpoint_path() {
        let path = default_checkpoint_path(Path::new("/data/video.mp4"), "media", "dir/video.mp4");
        assert_eq!(
            path,
            PathBuf::from("/data/video.mp4.media.dir_video.mp4.upload")
        );
    }

    #[test]
    fn test_should_mark_complete_when_all_parts_done() {
        let mut checkpoint = checkpoint_fixture();
        for n in 1..=3 {
            checkpoint.record_part(n, format!("\"e{n}\""), None);
        }
        assert!(checkpoint.is_complete());
        assert!(checkpoint.pending_parts().is_empty());
    }
}
