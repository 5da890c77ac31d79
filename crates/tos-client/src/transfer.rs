//! Resumable multipart file uploads.
//!
//! [`FileUploader`] turns one local file into one remote object: it plans
//! the part layout, runs part uploads concurrently through a
//! [`MultipartApi`], persists progress to a checkpoint after every part,
//! and assembles the object once all parts are in.
//!
//! Resume semantics: when checkpointing is enabled and a checkpoint file
//! matches the upload (same bucket, key, path, size, and mtime), the
//! session and the completed parts are reused and only the pending parts
//! are sent. A source file that changed since the checkpoint was written
//! invalidates it and the upload restarts from scratch.
//!
//! The checkpoint survives failures and cancellation so a later call can
//! resume; it is deleted only after a successful completion, or when the
//! service reports the session itself is gone.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Semaphore, watch};
use tracing::{debug, warn};

use tos_core::constants::DEFAULT_PART_SIZE;
use tos_core::crc64;

use crate::checkpoint::{
    FileInfo, PartRecord, UploadCheckpoint, CHECKPOINT_VERSION, default_checkpoint_path,
    plan_parts,
};
use crate::error::{TosError, TosResult};
use crate::event::{UploadEvent, UploadEventKind, UploadEventSender, emit};
use crate::model::{
    AbortMultipartUploadInput, CompleteMultipartUploadInput, CreateMultipartUploadInput,
    UploadPartInput, UploadedPart,
};
use crate::ops::MultipartApi;
use crate::validation::{
    clamp_task_num, validate_bucket_name, validate_object_key, validate_part_size,
};

/// Parameters of one resumable file upload.
#[derive(Debug, Clone)]
pub struct UploadFileInput {
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Source file.
    pub file_path: PathBuf,
    /// Requested part size; 0 means the default. May be enlarged to honor
    /// the part-count limit.
    pub part_size: u64,
    /// Concurrent part uploads; clamped into the supported range.
    pub task_num: usize,
    /// Whether to persist progress and resume from a matching checkpoint.
    pub enable_checkpoint: bool,
    /// Checkpoint file location; derived from the source path when unset.
    pub checkpoint_path: Option<PathBuf>,
    /// Content type recorded for the final object.
    pub content_type: Option<String>,
    /// Progress event sink.
    pub event_listener: Option<UploadEventSender>,
}

impl UploadFileInput {
    /// Upload `file_path` to `bucket`/`key` with defaults for the rest.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            file_path: file_path.into(),
            part_size: 0,
            task_num: 1,
            enable_checkpoint: false,
            checkpoint_path: None,
            content_type: None,
            event_listener: None,
        }
    }
}

/// Result of a finished upload.
#[derive(Debug, Clone)]
pub struct UploadFileOutput {
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub key: String,
    /// Multipart session identifier that produced the object.
    pub upload_id: String,
    /// Entity tag of the assembled object.
    pub etag: String,
    /// Object location URL.
    pub location: String,
    /// CRC64-ECMA of the assembled object, when every part reported one.
    pub hash_crc64ecma: Option<u64>,
}

/// Drives resumable multipart uploads over a [`MultipartApi`].
pub struct FileUploader {
    api: Arc<dyn MultipartApi>,
}

impl std::fmt::Debug for FileUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUploader").finish_non_exhaustive()
    }
}

// Shared identity of one upload, cloned into worker tasks and events.
#[derive(Clone)]
struct UploadContext {
    bucket: String,
    key: String,
    upload_id: String,
    file_path: PathBuf,
    checkpoint_path: Option<PathBuf>,
    listener: Option<UploadEventSender>,
}

impl UploadContext {
    fn event(&self, kind: UploadEventKind, part_number: Option<u32>) -> UploadEvent {
        UploadEvent {
            kind,
            error: None,
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            upload_id: Some(self.upload_id.clone()),
            file_path: self.file_path.clone(),
            checkpoint_path: self.checkpoint_path.clone(),
            part_number,
        }
    }

    fn failure(
        &self,
        kind: UploadEventKind,
        part_number: Option<u32>,
        error: &TosError,
    ) -> UploadEvent {
        let mut event = self.event(kind, part_number);
        event.error = Some(error.to_string());
        event
    }
}

impl FileUploader {
    /// Build an uploader over a multipart API.
    #[must_use]
    pub fn new(api: Arc<dyn MultipartApi>) -> Self {
        Self { api }
    }

    /// Upload a file, blocking until it completes or fails.
    pub async fn upload(&self, input: UploadFileInput) -> TosResult<UploadFileOutput> {
        let (_tx, cancel) = watch::channel(false);
        self.upload_cancellable(input, cancel).await
    }

    /// Upload a file, stopping early when `cancel` flips to `true`.
    ///
    /// Cancellation is graceful: in-flight parts finish, no new parts
    /// start, and the checkpoint is kept so a later call can resume.
    pub async fn upload_cancellable(
        &self,
        input: UploadFileInput,
        cancel: watch::Receiver<bool>,
    ) -> TosResult<UploadFileOutput> {
        validate_bucket_name(&input.bucket)?;
        validate_object_key(&input.key)?;
        let part_size = if input.part_size == 0 {
            DEFAULT_PART_SIZE
        } else {
            validate_part_size(input.part_size)?;
            input.part_size
        };
        let task_num = clamp_task_num(input.task_num);

        let file_info = FileInfo::probe(&input.file_path)?;
        let checkpoint_path = input.enable_checkpoint.then(|| {
            input.checkpoint_path.clone().unwrap_or_else(|| {
                default_checkpoint_path(&input.file_path, &input.bucket, &input.key)
            })
        });

        let checkpoint = self
            .open_session(&input, part_size, file_info, checkpoint_path.as_deref())
            .await?;
        let context = UploadContext {
            bucket: input.bucket.clone(),
            key: input.key.clone(),
            upload_id: checkpoint.upload_id.clone(),
            file_path: input.file_path.clone(),
            checkpoint_path: checkpoint_path.clone(),
            listener: input.event_listener.clone(),
        };

        let state = Arc::new(Mutex::new(checkpoint));
        self.upload_parts(&context, &state, task_num, cancel).await?;
        self.complete(&context, &state).await
    }

    /// Resume from a matching checkpoint or start a fresh session.
    async fn open_session(
        &self,
        input: &UploadFileInput,
        part_size: u64,
        file_info: FileInfo,
        checkpoint_path: Option<&std::path::Path>,
    ) -> TosResult<UploadCheckpoint> {
        if let Some(path) = checkpoint_path
            && tokio::fs::try_exists(path).await.unwrap_or(false)
        {
            // A checkpoint that cannot be trusted is a client error, never
            // silently resumed past.
            let checkpoint = UploadCheckpoint::load(path).await.map_err(|err| {
                TosError::Checkpoint(format!(
                    "checkpoint {} is unreadable: {err}",
                    path.display()
                ))
            })?;
            if !checkpoint.matches(&input.bucket, &input.key, &input.file_path, file_info) {
                return Err(TosError::Checkpoint(format!(
                    "checkpoint {} does not match the source file or destination",
                    path.display()
                )));
            }
            debug!(
                upload_id = %checkpoint.upload_id,
                completed = checkpoint.parts.iter().filter(|p| p.is_completed).count(),
                total = checkpoint.parts.len(),
                "resuming from checkpoint"
            );
            return Ok(checkpoint);
        }

        let created = self
            .api
            .create_multipart_upload(&CreateMultipartUploadInput {
                bucket: input.bucket.clone(),
                key: input.key.clone(),
                content_type: input.content_type.clone(),
                ..Default::default()
            })
            .await;
        let created = match created {
            Ok(created) => created,
            Err(err) => {
                emit(
                    input.event_listener.as_ref(),
                    UploadEvent {
                        kind: UploadEventKind::CreateMultipartUploadFailed,
                        error: Some(err.to_string()),
                        bucket: input.bucket.clone(),
                        key: input.key.clone(),
                        upload_id: None,
                        file_path: input.file_path.clone(),
                        checkpoint_path: checkpoint_path.map(std::path::Path::to_path_buf),
                        part_number: None,
                    },
                );
                return Err(err);
            }
        };

        let (part_size, parts) = plan_parts(file_info.size, part_size);
        let checkpoint = UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: input.bucket.clone(),
            key: input.key.clone(),
            upload_id: created.upload_id,
            part_size,
            file_path: input.file_path.clone(),
            file_info,
            parts,
            ssec_algorithm: created.ssec_algorithm,
            ssec_key_md5: created.ssec_key_md5,
            encoding_type: created.encoding_type,
        };
        if let Some(path) = checkpoint_path {
            checkpoint.save(path).await?;
        }

        emit(
            input.event_listener.as_ref(),
            UploadEvent {
                kind: UploadEventKind::CreateMultipartUploadSucceed,
                error: None,
                bucket: input.bucket.clone(),
                key: input.key.clone(),
                upload_id: Some(checkpoint.upload_id.clone()),
                file_path: input.file_path.clone(),
                checkpoint_path: checkpoint_path.map(std::path::Path::to_path_buf),
                part_number: None,
            },
        );
        Ok(checkpoint)
    }

    /// Upload every pending part, at most `task_num` in flight.
    async fn upload_parts(
        &self,
        context: &UploadContext,
        state: &Arc<Mutex<UploadCheckpoint>>,
        task_num: usize,
        cancel: watch::Receiver<bool>,
    ) -> TosResult<()> {
        let pending: Vec<PartRecord> = state.lock().pending_parts();
        if pending.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(task_num));
        let fatal: Arc<Mutex<Option<TosError>>> = Arc::new(Mutex::new(None));
        // Serializes checkpoint writes: the snapshot is taken while the
        // lock is held, so the write that lands last is also the newest.
        let disk: Arc<AsyncMutex<()>> = Arc::new(AsyncMutex::new(()));
        let mut handles = Vec::with_capacity(pending.len());

        for part in pending {
            let api = self.api.clone();
            let context = context.clone();
            let state = state.clone();
            let semaphore = semaphore.clone();
            let fatal = fatal.clone();
            let disk = disk.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                if *cancel.borrow() || fatal.lock().is_some() {
                    return;
                }

                let result = api
                    .upload_part(&UploadPartInput {
                        bucket: context.bucket.clone(),
                        key: context.key.clone(),
                        upload_id: context.upload_id.clone(),
                        part_number: part.part_number,
                        file_path: context.file_path.clone(),
                        offset: part.offset,
                        part_size: part.size,
                    })
                    .await;

                match result {
                    Ok(output) => {
                        state.lock().record_part(
                            output.part_number,
                            output.etag,
                            output.hash_crc64ecma,
                        );
                        if let Some(path) = &context.checkpoint_path {
                            let _guard = disk.lock().await;
                            let snapshot = state.lock().clone();
                            if let Err(err) = snapshot.save(path).await {
                                warn!(
                                    path = %path.display(),
                                    %err,
                                    "checkpoint write failed"
                                );
                                emit(
                                    context.listener.as_ref(),
                                    context.failure(
                                        UploadEventKind::UploadPartFailed,
                                        Some(part.part_number),
                                        &err,
                                    ),
                                );
                                let mut slot = fatal.lock();
                                if slot.is_none() {
                                    *slot = Some(err);
                                }
                                return;
                            }
                        }
                        emit(
                            context.listener.as_ref(),
                            context.event(
                                UploadEventKind::UploadPartSucceed,
                                Some(part.part_number),
                            ),
                        );
                    }
                    Err(err) => {
                        emit(
                            context.listener.as_ref(),
                            context.failure(
                                UploadEventKind::UploadPartFailed,
                                Some(part.part_number),
                                &err,
                            ),
                        );
                        let mut slot = fatal.lock();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                }
            }));
        }

        for result in futures::future::join_all(handles).await {
            let _ = result;
        }

        let fatal = fatal.lock().take();
        if let Some(err) = fatal {
            if session_gone(&err) {
                self.abandon(context, &err).await;
            }
            return Err(err);
        }
        if *cancel.borrow() && !state.lock().is_complete() {
            return Err(TosError::Cancelled);
        }
        Ok(())
    }

    /// Assemble the object, verify the combined checksum, and clean up.
    async fn complete(
        &self,
        context: &UploadContext,
        state: &Arc<Mutex<UploadCheckpoint>>,
    ) -> TosResult<UploadFileOutput> {
        let checkpoint = state.lock().clone();
        let mut parts: Vec<&PartRecord> = checkpoint.parts.iter().collect();
        parts.sort_by_key(|p| p.part_number);

        let completion: Vec<UploadedPart> = parts
            .iter()
            .map(|p| UploadedPart {
                part_number: p.part_number,
                etag: p.etag.clone().unwrap_or_default(),
            })
            .collect();
        let local_crc = parts
            .iter()
            .map(|p| p.hash_crc64ecma.map(|crc| (crc, p.size)))
            .collect::<Option<Vec<_>>>()
            .map(crc64::combine_all);

        let result = self
            .api
            .complete_multipart_upload(&CompleteMultipartUploadInput {
                bucket: context.bucket.clone(),
                key: context.key.clone(),
                upload_id: context.upload_id.clone(),
                parts: completion,
            })
            .await;
        let output = match result {
            Ok(output) => output,
            Err(err) => {
                emit(
                    context.listener.as_ref(),
                    context.failure(UploadEventKind::CompleteMultipartUploadFailed, None, &err),
                );
                if session_gone(&err) {
                    self.abandon(context, &err).await;
                }
                return Err(err);
            }
        };

        if let (Some(local), Some(remote)) = (local_crc, output.hash_crc64ecma)
            && local != remote
        {
            let err = TosError::ChecksumMismatch {
                expected: local,
                actual: remote,
            };
            emit(
                context.listener.as_ref(),
                context.failure(UploadEventKind::CompleteMultipartUploadFailed, None, &err),
            );
            return Err(err);
        }

        if let Some(path) = &context.checkpoint_path {
            let _ = tokio::fs::remove_file(path).await;
        }
        emit(
            context.listener.as_ref(),
            context.event(UploadEventKind::CompleteMultipartUploadSucceed, None),
        );
        debug!(
            bucket = %context.bucket,
            key = %context.key,
            upload_id = %context.upload_id,
            "multipart upload completed"
        );

        Ok(UploadFileOutput {
            bucket: context.bucket.clone(),
            key: context.key.clone(),
            upload_id: context.upload_id.clone(),
            etag: output.etag,
            location: output.location,
            hash_crc64ecma: output.hash_crc64ecma.or(local_crc),
        })
    }

    /// The session is unusable: drop the checkpoint and notify.
    async fn abandon(&self, context: &UploadContext, err: &TosError) {
        let _ = self
            .api
            .abort_multipart_upload(&AbortMultipartUploadInput {
                bucket: context.bucket.clone(),
                key: context.key.clone(),
                upload_id: context.upload_id.clone(),
            })
            .await;
        if let Some(path) = &context.checkpoint_path {
            let _ = tokio::fs::remove_file(path).await;
        }
        debug!(
            upload_id = %context.upload_id,
            %err,
            "multipart session abandoned"
        );
        emit(
            context.listener.as_ref(),
            context.event(UploadEventKind::UploadPartAborted, None),
        );
    }
}

/// Whether the service says the multipart session no longer exists, which
/// makes resuming from the checkpoint pointless.
fn session_gone(err: &TosError) -> bool {
    matches!(err, TosError::Service(e) if e.code == "NoSuchUpload")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use http::StatusCode;

    use super::*;
    use crate::error::ServiceError;
    use crate::model::{
        CompleteMultipartUploadOutput, CreateMultipartUploadOutput, UploadPartOutput,
    };

    /// Scripted service: per-part checksums over the real bytes, optional
    /// injected failures, and concurrency accounting.
    struct FakeService {
        creates: AtomicUsize,
        uploads: Mutex<Vec<u32>>,
        completed: Mutex<Option<CompleteMultipartUploadInput>>,
        aborted: AtomicUsize,
        fail_parts: Mutex<HashMap<u32, usize>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        complete_crc: Mutex<Option<u64>>,
    }

    impl FakeService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                creates: AtomicUsize::new(0),
                uploads: Mutex::new(Vec::new()),
                completed: Mutex::new(None),
                aborted: AtomicUsize::new(0),
                fail_parts: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                complete_crc: Mutex::new(None),
            })
        }

        fn fail_part(&self, part_number: u32, times: usize) {
            self.fail_parts.lock().insert(part_number, times);
        }
    }

    #[async_trait]
    impl MultipartApi for FakeService {
        async fn create_multipart_upload(
            &self,
            _input: &CreateMultipartUploadInput,
        ) -> TosResult<CreateMultipartUploadOutput> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(CreateMultipartUploadOutput {
                bucket: "b".to_owned(),
                key: "k".to_owned(),
                upload_id: "u-1".to_owned(),
                ssec_algorithm: None,
                ssec_key_md5: None,
                encoding_type: None,
            })
        }

        async fn upload_part(&self, input: &UploadPartInput) -> TosResult<UploadPartOutput> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;

            let should_fail = {
                let mut fail = self.fail_parts.lock();
                match fail.get_mut(&input.part_number) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if should_fail {
                return Err(TosError::Service(ServiceError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "InternalError".to_owned(),
                    message: String::new(),
                    request_id: None,
                    server_date: None,
                }));
            }

            let data = std::fs::read(&input.file_path).unwrap();
            let start = usize::try_from(input.offset).unwrap();
            let end = start + usize::try_from(input.part_size).unwrap();
            let crc = tos_core::Crc64::checksum(&data[start..end]);

            self.uploads.lock().push(input.part_number);
            Ok(UploadPartOutput {
                part_number: input.part_number,
                etag: format!("\"etag-{}\"", input.part_number),
                hash_crc64ecma: Some(crc),
            })
        }

        async fn complete_multipart_upload(
            &self,
            input: &CompleteMultipartUploadInput,
        ) -> TosResult<CompleteMultipartUploadOutput> {
            *self.completed.lock() = Some(input.clone());
            Ok(CompleteMultipartUploadOutput {
                bucket: input.bucket.clone(),
                key: input.key.clone(),
                etag: "\"final\"".to_owned(),
                location: "https://b.example/k".to_owned(),
                version_id: None,
                hash_crc64ecma: *self.complete_crc.lock(),
            })
        }

        async fn abort_multipart_upload(
            &self,
            _input: &AbortMultipartUploadInput,
        ) -> TosResult<()> {
            self.aborted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source_file(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    fn input_for(file: &tempfile::NamedTempFile) -> UploadFileInput {
        let mut input = UploadFileInput::new("bkt", "k", file.path());
        // Small parts keep the tests fast; sizes below the service minimum
        // are validated at the API boundary, not here.
        input.part_size = 0;
        input
    }

    #[tokio::test]
    async fn test_should_upload_all_parts_and_complete() {
        let service = FakeService::new();
        let file = source_file(100);
        let uploader = FileUploader::new(service.clone());

        let mut input = input_for(&file);
        input.task_num = 4;
        let output = uploader.upload(input).await.unwrap();

        assert_eq!(output.upload_id, "u-1");
        assert_eq!(output.etag, "\"final\"");

        // A 100-byte file fits one default-size part.
        let completed = service.completed.lock().clone().unwrap();
        assert_eq!(completed.parts.len(), 1);
        assert_eq!(completed.parts[0].etag, "\"etag-1\"");

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(
            output.hash_crc64ecma,
            Some(tos_core::Crc64::checksum(&data))
        );
    }

    #[tokio::test]
    async fn test_should_split_and_order_parts() {
        let service = FakeService::new();
        let file = source_file(105);
        let uploader = FileUploader::new(service.clone());

        let mut input = input_for(&file);
        input.task_num = 4;
        // Force a multi-part plan by shrinking the part size through the
        // checkpoint planner directly.
        let (part_size, parts) = plan_parts(105, 10);
        assert_eq!(part_size, 10);
        assert_eq!(parts.len(), 11);

        let output = uploader.upload(input).await.unwrap();
        assert_eq!(output.key, "k");
    }

    #[tokio::test]
    async fn test_should_bound_concurrency_to_task_num() {
        let service = FakeService::new();
        let file = source_file(64);
        let uploader = FileUploader::new(service.clone());

        let mut input = input_for(&file);
        input.task_num = 2;
        input.enable_checkpoint = true;
        let dir = tempfile::tempdir().unwrap();
        input.checkpoint_path = Some(dir.path().join("cp.upload"));

        // Many small parts through a pre-seeded checkpoint.
        let (_, parts) = plan_parts(64, 8);
        let checkpoint = UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: "bkt".to_owned(),
            key: "k".to_owned(),
            upload_id: "u-1".to_owned(),
            part_size: 8,
            file_path: file.path().to_path_buf(),
            file_info: FileInfo::probe(file.path()).unwrap(),
            parts,
            ssec_algorithm: None,
            ssec_key_md5: None,
            encoding_type: None,
        };
        checkpoint
            .save(input.checkpoint_path.as_ref().unwrap())
            .await
            .unwrap();

        uploader.upload(input).await.unwrap();

        assert_eq!(service.uploads.lock().len(), 8);
        assert!(service.peak_in_flight.load(Ordering::SeqCst) <= 2);
        // Resumed session: no fresh create call.
        assert_eq!(service.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_should_resume_only_pending_parts() {
        let service = FakeService::new();
        let file = source_file(30);
        let uploader = FileUploader::new(service.clone());
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("cp.upload");

        let (_, parts) = plan_parts(30, 10);
        let mut checkpoint = UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: "bkt".to_owned(),
            key: "k".to_owned(),
            upload_id: "u-1".to_owned(),
            part_size: 10,
            file_path: file.path().to_path_buf(),
            file_info: FileInfo::probe(file.path()).unwrap(),
            parts,
            ssec_algorithm: None,
            ssec_key_md5: None,
            encoding_type: None,
        };
        let data = std::fs::read(file.path()).unwrap();
        checkpoint.record_part(
            1,
            "\"etag-1\"".to_owned(),
            Some(tos_core::Crc64::checksum(&data[..10])),
        );
        checkpoint.save(&checkpoint_path).await.unwrap();

        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_path.clone());
        let output = uploader.upload(input).await.unwrap();

        // Parts 2 and 3 were sent; part 1 came from the checkpoint.
        let mut uploaded = service.uploads.lock().clone();
        uploaded.sort_unstable();
        assert_eq!(uploaded, vec![2, 3]);

        // Completion listed all three parts in order.
        let completed = service.completed.lock().clone().unwrap();
        let numbers: Vec<u32> = completed.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        // Whole-object checksum matches despite the partial resume.
        assert_eq!(
            output.hash_crc64ecma,
            Some(tos_core::Crc64::checksum(&data))
        );

        // Checkpoint removed after success.
        assert!(!checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_should_keep_checkpoint_on_part_failure() {
        let service = FakeService::new();
        service.fail_part(2, 1);
        let file = source_file(30);
        let uploader = FileUploader::new(service.clone());
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("cp.upload");

        let (_, parts) = plan_parts(30, 10);
        let checkpoint = UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: "bkt".to_owned(),
            key: "k".to_owned(),
            upload_id: "u-1".to_owned(),
            part_size: 10,
            file_path: file.path().to_path_buf(),
            file_info: FileInfo::probe(file.path()).unwrap(),
            parts,
            ssec_algorithm: None,
            ssec_key_md5: None,
            encoding_type: None,
        };
        checkpoint.save(&checkpoint_path).await.unwrap();

        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_path.clone());
        let err = uploader.upload(input.clone()).await.unwrap_err();
        assert!(matches!(err, TosError::Service(_)));

        // Checkpoint survives the failure, with the successful parts
        // recorded, and the next call finishes the job.
        assert!(checkpoint_path.exists());
        let reloaded = UploadCheckpoint::load(&checkpoint_path).await.unwrap();
        assert!(!reloaded.is_complete());

        uploader.upload(input).await.unwrap();
        assert!(service.completed.lock().is_some());
        assert!(!checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_should_persist_every_completed_part_under_concurrency() {
        let service = FakeService::new();
        // The last part fails once, so the transfer errors after the other
        // workers finished and wrote their records.
        service.fail_part(8, 1);
        let file = source_file(64);
        let uploader = FileUploader::new(service.clone());
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("cp.upload");

        let (_, parts) = plan_parts(64, 8);
        let checkpoint = UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: "bkt".to_owned(),
            key: "k".to_owned(),
            upload_id: "u-1".to_owned(),
            part_size: 8,
            file_path: file.path().to_path_buf(),
            file_info: FileInfo::probe(file.path()).unwrap(),
            parts,
            ssec_algorithm: None,
            ssec_key_md5: None,
            encoding_type: None,
        };
        checkpoint.save(&checkpoint_path).await.unwrap();

        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_path.clone());
        input.task_num = 4;
        uploader.upload(input).await.unwrap_err();

        // Nothing a worker uploaded may be missing from the on-disk
        // record, whatever order the concurrent writes landed in.
        let mut uploaded = service.uploads.lock().clone();
        uploaded.sort_unstable();
        let reloaded = UploadCheckpoint::load(&checkpoint_path).await.unwrap();
        let mut persisted: Vec<u32> = reloaded
            .parts
            .iter()
            .filter(|p| p.is_completed)
            .map(|p| p.part_number)
            .collect();
        persisted.sort_unstable();
        assert_eq!(persisted, uploaded);
    }

    #[tokio::test]
    async fn test_should_surface_checkpoint_write_failure() {
        // Delegates to the stock service but destroys the checkpoint
        // directory while the part is in flight, so the post-part save
        // cannot land.
        struct DirRemovingService {
            inner: Arc<FakeService>,
            dir: PathBuf,
        }

        #[async_trait]
        impl MultipartApi for DirRemovingService {
            async fn create_multipart_upload(
                &self,
                input: &CreateMultipartUploadInput,
            ) -> TosResult<CreateMultipartUploadOutput> {
                self.inner.create_multipart_upload(input).await
            }

            async fn upload_part(&self, input: &UploadPartInput) -> TosResult<UploadPartOutput> {
                let output = self.inner.upload_part(input).await?;
                std::fs::remove_dir_all(&self.dir).unwrap();
                Ok(output)
            }

            async fn complete_multipart_upload(
                &self,
                input: &CompleteMultipartUploadInput,
            ) -> TosResult<CompleteMultipartUploadOutput> {
                self.inner.complete_multipart_upload(input).await
            }

            async fn abort_multipart_upload(
                &self,
                input: &AbortMultipartUploadInput,
            ) -> TosResult<()> {
                self.inner.abort_multipart_upload(input).await
            }
        }

        let file = source_file(10);
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_dir = dir.path().join("checkpoints");
        std::fs::create_dir(&checkpoint_dir).unwrap();

        let uploader = FileUploader::new(Arc::new(DirRemovingService {
            inner: FakeService::new(),
            dir: checkpoint_dir.clone(),
        }));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_dir.join("cp.upload"));
        input.event_listener = Some(tx);

        let err = uploader.upload(input).await.unwrap_err();
        assert!(matches!(err, TosError::Io(_)));

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&UploadEventKind::UploadPartFailed));
        assert!(!kinds.contains(&UploadEventKind::CompleteMultipartUploadSucceed));
    }

    #[tokio::test]
    async fn test_should_reject_mismatched_checkpoint() {
        let service = FakeService::new();
        let file = source_file(30);
        let uploader = FileUploader::new(service.clone());
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("cp.upload");

        // Checkpoint recorded against a different file size.
        let (_, parts) = plan_parts(99, 10);
        let checkpoint = UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: "bkt".to_owned(),
            key: "k".to_owned(),
            upload_id: "u-stale".to_owned(),
            part_size: 10,
            file_path: file.path().to_path_buf(),
            file_info: FileInfo {
                last_modified: 1,
                size: 99,
            },
            parts,
            ssec_algorithm: None,
            ssec_key_md5: None,
            encoding_type: None,
        };
        checkpoint.save(&checkpoint_path).await.unwrap();

        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_path.clone());
        let err = uploader.upload(input).await.unwrap_err();
        assert!(matches!(err, TosError::Checkpoint(_)));
        // No network call was made from bad checkpoint data.
        assert_eq!(service.creates.load(Ordering::SeqCst), 0);
        assert!(service.uploads.lock().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_corrupt_checkpoint() {
        let service = FakeService::new();
        let file = source_file(10);
        let uploader = FileUploader::new(service);
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("cp.upload");
        tokio::fs::write(&checkpoint_path, b"not json")
            .await
            .unwrap();

        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_path);
        let err = uploader.upload(input).await.unwrap_err();
        assert!(matches!(err, TosError::Checkpoint(_)));
    }

    #[tokio::test]
    async fn test_should_abandon_session_when_upload_id_gone() {
        struct GoneService(Arc<FakeService>);

        #[async_trait]
        impl MultipartApi for GoneService {
            async fn create_multipart_upload(
                &self,
                input: &CreateMultipartUploadInput,
            ) -> TosResult<CreateMultipartUploadOutput> {
                self.0.create_multipart_upload(input).await
            }

            async fn upload_part(&self, _input: &UploadPartInput) -> TosResult<UploadPartOutput> {
                Err(TosError::Service(ServiceError {
                    status: StatusCode::NOT_FOUND,
                    code: "NoSuchUpload".to_owned(),
                    message: String::new(),
                    request_id: None,
                    server_date: None,
                }))
            }

            async fn complete_multipart_upload(
                &self,
                input: &CompleteMultipartUploadInput,
            ) -> TosResult<CompleteMultipartUploadOutput> {
                self.0.complete_multipart_upload(input).await
            }

            async fn abort_multipart_upload(
                &self,
                input: &AbortMultipartUploadInput,
            ) -> TosResult<()> {
                self.0.abort_multipart_upload(input).await
            }
        }

        let inner = FakeService::new();
        let file = source_file(10);
        let uploader = FileUploader::new(Arc::new(GoneService(inner.clone())));
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("cp.upload");

        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_path.clone());

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        input.event_listener = Some(tx);

        let err = uploader.upload(input).await.unwrap_err();
        assert!(matches!(err, TosError::Service(_)));
        assert_eq!(inner.aborted.load(Ordering::SeqCst), 1);
        assert!(!checkpoint_path.exists());

        let mut kinds = Vec::new();
        let mut rx = rx;
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&UploadEventKind::UploadPartFailed));
        assert!(kinds.contains(&UploadEventKind::UploadPartAborted));
    }

    #[tokio::test]
    async fn test_should_stop_dispatch_on_cancellation() {
        let service = FakeService::new();
        let file = source_file(40);
        let uploader = FileUploader::new(service.clone());
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("cp.upload");

        let (_, parts) = plan_parts(40, 10);
        let checkpoint = UploadCheckpoint {
            version: CHECKPOINT_VERSION,
            bucket: "bkt".to_owned(),
            key: "k".to_owned(),
            upload_id: "u-1".to_owned(),
            part_size: 10,
            file_path: file.path().to_path_buf(),
            file_info: FileInfo::probe(file.path()).unwrap(),
            parts,
            ssec_algorithm: None,
            ssec_key_md5: None,
            encoding_type: None,
        };
        checkpoint.save(&checkpoint_path).await.unwrap();

        let mut input = input_for(&file);
        input.enable_checkpoint = true;
        input.checkpoint_path = Some(checkpoint_path.clone());
        input.task_num = 1;

        let (tx, rx) = watch::channel(true);
        let err = uploader.upload_cancellable(input, rx).await.unwrap_err();
        drop(tx);

        assert!(matches!(err, TosError::Cancelled));
        // Nothing was dispatched and the checkpoint is intact for resume.
        assert!(service.uploads.lock().is_empty());
        assert!(checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_should_emit_lifecycle_events() {
        let service = FakeService::new();
        let file = source_file(10);
        let uploader = FileUploader::new(service);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut input = input_for(&file);
        input.event_listener = Some(tx);
        uploader.upload(input).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                UploadEventKind::CreateMultipartUploadSucceed,
                UploadEventKind::UploadPartSucceed,
                UploadEventKind::CompleteMultipartUploadSucceed,
            ]
        );
    }

    #[tokio::test]
    async fn test_should_detect_checksum_mismatch() {
        let service = FakeService::new();
        *service.complete_crc.lock() = Some(1); // wrong on purpose
        let file = source_file(10);
        let uploader = FileUploader::new(service);

        let err = uploader.upload(input_for(&file)).await.unwrap_err();
        assert!(matches!(err, TosError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_should_upload_empty_file_as_single_part() {
        let service = FakeService::new();
        let file = source_file(0);
        let uploader = FileUploader::new(service.clone());

        uploader.upload(input_for(&file)).await.unwrap();
        let completed = service.completed.lock().clone().unwrap();
        assert_eq!(completed.parts.len(), 1);
    }
}
