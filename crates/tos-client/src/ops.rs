//! Multipart control-plane operations and presigned URLs.
//!
//! [`TosClient`] is a thin façade: each operation validates its input,
//! shapes a [`TosRequest`], runs it through the pipeline, and decodes the
//! response. The transfer manager drives these operations through the
//! [`MultipartApi`] trait so it can be tested against a scripted service.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use tracing::debug;

use tos_auth::{CredentialsProvider, PresignInput, PresignedUrl, Signer, StaticCredentialsProvider};
use tos_core::{Crc64, TosConfig};

use crate::error::{TosError, TosResult};
use crate::model::{
    AbortMultipartUploadInput, Body, CompleteMultipartUploadInput, CompleteMultipartUploadOutput,
    CreateMultipartUploadInput, CreateMultipartUploadOutput, HEADER_HASH_CRC64, TosRequest,
    UploadPartInput, UploadPartOutput,
};
use crate::pipeline::RequestPipeline;
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
use crate::validation::{validate_bucket_name, validate_object_key};

/// The multipart control-plane calls the transfer manager depends on.
#[async_trait]
pub trait MultipartApi: Send + Sync {
    /// Initiate a multipart session.
    async fn create_multipart_upload(
        &self,
        input: &CreateMultipartUploadInput,
    ) -> TosResult<CreateMultipartUploadOutput>;

    /// Upload one part from a file range.
    async fn upload_part(&self, input: &UploadPartInput) -> TosResult<UploadPartOutput>;

    /// Assemble the object from its parts.
    async fn complete_multipart_upload(
        &self,
        input: &CompleteMultipartUploadInput,
    ) -> TosResult<CompleteMultipartUploadOutput>;

    /// Abandon a multipart session and free its storage.
    async fn abort_multipart_upload(&self, input: &AbortMultipartUploadInput) -> TosResult<()>;
}

/// The TOS client: signed, retried operations against one endpoint.
pub struct TosClient {
    pipeline: RequestPipeline,
    signer: Signer,
    provider: Arc<dyn CredentialsProvider>,
    config: TosConfig,
}

impl std::fmt::Debug for TosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TosClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TosClient {
    /// Build a client with the stock HTTP transport.
    pub fn new(
        config: TosConfig,
        provider: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, TransportError> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(config, transport, provider))
    }

    /// Build a client over a fixed credential.
    pub fn with_credential(
        config: TosConfig,
        credential: tos_auth::Credential,
    ) -> Result<Self, TransportError> {
        Self::new(config, Arc::new(StaticCredentialsProvider::new(credential)))
    }

    /// Build a client over a caller-supplied transport.
    #[must_use]
    pub fn with_transport(
        config: TosConfig,
        transport: Arc<dyn HttpTransport>,
        provider: Arc<dyn CredentialsProvider>,
    ) -> Self {
        let pipeline = RequestPipeline::new(&config, transport, provider.clone());
        let signer = Signer::new(config.endpoint.region());
        Self {
            pipeline,
            signer,
            provider,
            config,
        }
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &TosConfig {
        &self.config
    }

    /// The underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Generate a presigned URL for one object operation.
    ///
    /// The URL is self-contained: anyone holding it can perform the
    /// operation until `expires` seconds after now, no credential needed.
    pub fn pre_signed_url(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        expires: u64,
    ) -> TosResult<PresignedUrl> {
        validate_bucket_name(bucket)?;
        validate_object_key(key)?;

        let host = self.config.endpoint.bucket_host(bucket);
        let mut input = PresignInput::new(method, host, format!("/{key}"));
        input.scheme = self.config.endpoint.scheme().to_owned();
        input.expires = expires;

        let credential = self.provider.credentials();
        let url = self
            .signer
            .presign(&input, &credential, self.pipeline.clock().now())?;
        Ok(url)
    }
}

#[async_trait]
impl MultipartApi for TosClient {
    async fn create_multipart_upload(
        &self,
        input: &CreateMultipartUploadInput,
    ) -> TosResult<CreateMultipartUploadOutput> {
        validate_bucket_name(&input.bucket)?;
        validate_object_key(&input.key)?;

        let mut request = TosRequest::new(Method::POST)
            .with_bucket(&input.bucket)
            .with_key(&input.key)
            .with_query("uploads", "");
        if let Some(content_type) = &input.content_type {
            request = request.with_header("content-type", content_type);
        }
        if let Some(algorithm) = &input.ssec_algorithm {
            request = request.with_header("x-tos-server-side-encryption-customer-algorithm", algorithm);
        }
        if let Some(encoding) = &input.encoding_type {
            request = request.with_query("encoding-type", encoding);
        }

        let response = self.pipeline.execute(&request).await?;
        let output: CreateMultipartUploadOutput = serde_json::from_slice(&response.body)?;
        debug!(
            bucket = %input.bucket,
            key = %input.key,
            upload_id = %output.upload_id,
            "multipart upload created"
        );
        Ok(output)
    }

    async fn upload_part(&self, input: &UploadPartInput) -> TosResult<UploadPartOutput> {
        if input.part_number == 0 {
            return Err(TosError::InvalidInput(
                "part number must be at least 1".to_owned(),
            ));
        }

        // Read the range once: the same bytes feed the wire and the local
        // checksum the stored part is verified against.
        let data = Body::File {
            path: input.file_path.clone(),
            offset: input.offset,
            len: input.part_size,
        }
        .load()
        .await?;
        let local_crc = Crc64::checksum(&data);

        let request = TosRequest::new(Method::PUT)
            .with_bucket(&input.bucket)
            .with_key(&input.key)
            .with_query("partNumber", input.part_number.to_string())
            .with_query("uploadId", &input.upload_id)
            .with_body(Body::Bytes(data));

        let response = self.pipeline.execute(&request).await?;
        if let Some(remote) = header_crc64(&response)
            && remote != local_crc
        {
            return Err(TosError::ChecksumMismatch {
                expected: local_crc,
                actual: remote,
            });
        }

        let etag = response.header("etag").unwrap_or_default().to_owned();
        Ok(UploadPartOutput {
            part_number: input.part_number,
            etag,
            hash_crc64ecma: Some(local_crc),
        })
    }

    async fn complete_multipart_upload(
        &self,
        input: &CompleteMultipartUploadInput,
    ) -> TosResult<CompleteMultipartUploadOutput> {
        if input.parts.is_empty() {
            return Err(TosError::InvalidInput(
                "completion requires at least one part".to_owned(),
            ));
        }

        let body = serde_json::to_vec(&serde_json::json!({ "Parts": input.parts }))?;
        let request = TosRequest::new(Method::POST)
            .with_bucket(&input.bucket)
            .with_key(&input.key)
            .with_query("uploadId", &input.upload_id)
            .with_header("content-type", "application/json")
            .with_body(Body::from(body));

        let response = self.pipeline.execute(&request).await?;
        let mut output: CompleteMultipartUploadOutput = serde_json::from_slice(&response.body)?;
        output.hash_crc64ecma = header_crc64(&response);
        Ok(output)
    }

    async fn abort_multipart_upload(&self, input: &AbortMultipartUploadInput) -> TosResult<()> {
        let request = TosRequest::new(Method::DELETE)
            .with_bucket(&input.bucket)
            .with_key(&input.key)
            .with_query("uploadId", &input.upload_id);

        self.pipeline.execute(&request).await?;
        debug!(
            bucket = %input.bucket,
            key = %input.key,
            upload_id = %input.upload_id,
            "multipart upload aborted"
        );
        Ok(())
    }
}

/// The stored-bytes CRC64 the service reports, when present.
fn header_crc64(response: &HttpResponse) -> Option<u64> {
    response
        .header(HEADER_HASH_CRC64)
        .and_then(|v| v.parse().ok())
}
