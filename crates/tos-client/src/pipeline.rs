//! The request execution pipeline.
//!
//! One logical call runs as a loop of attempts. Every attempt is built from
//! scratch: the body is re-materialized, the credential snapshot is taken
//! fresh, and the signature is computed over the attempt's own timestamp.
//! Nothing from a failed attempt leaks into the next one except the two
//! pieces of state the retry rules call for: the skew-corrected clock and a
//! rotated credential.
//!
//! When the policy says stop, the last attempt's error is surfaced
//! unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use tos_auth::{Credential, CredentialsProvider, SignableRequest, Signer};
use tos_core::{Endpoint, SkewClock, TosConfig};

use crate::error::{ServiceError, TosError, TosResult};
use crate::model::{HEADER_REQUEST_ID, TosRequest};
use crate::retry::{AttemptFailure, RetryDecision, RetryPolicy};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Executes logical calls as signed, retried HTTP attempts.
pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    provider: Arc<dyn CredentialsProvider>,
    signer: Signer,
    policy: RetryPolicy,
    clock: SkewClock,
    endpoint: Endpoint,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// Build a pipeline from a configuration, transport, and credentials.
    #[must_use]
    pub fn new(
        config: &TosConfig,
        transport: Arc<dyn HttpTransport>,
        provider: Arc<dyn CredentialsProvider>,
    ) -> Self {
        let policy = RetryPolicy::new(config.max_retry_count)
            .with_max_skew_retry_count(config.max_skew_retry_count);
        Self {
            transport,
            provider,
            signer: Signer::new(config.endpoint.region()),
            policy,
            clock: SkewClock::new(),
            endpoint: config.endpoint.clone(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The clock whose offset skew correction adjusts.
    #[must_use]
    pub fn clock(&self) -> &SkewClock {
        &self.clock
    }

    /// Endpoint this pipeline addresses.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run one logical call to completion.
    ///
    /// Returns the successful response, or the final attempt's error once
    /// the policy stops retrying.
    pub async fn execute(&self, request: &TosRequest) -> TosResult<HttpResponse> {
        let mut refreshed: Option<Credential> = None;
        let mut retries_used = 0u32;
        let mut skew_retries_used = 0u32;

        loop {
            // Fresh snapshot per attempt; an explicit refresh pins the
            // rotated credential for the remaining attempts of this call.
            let credential = match refreshed.clone() {
                Some(credential) => credential,
                None => self.provider.credentials(),
            };
            let body = request.body.load().await?;
            let host = self.endpoint.request_host(request.bucket.as_deref());
            let path = request.path();

            let mut signable = SignableRequest::new(request.method.clone(), &host, &path);
            signable.query.clone_from(&request.query);
            signable.headers.clone_from(&request.headers);
            let signed = self.signer.sign(&signable, &credential, self.clock.now())?;

            let query = tos_auth::canonical::canonical_query(&request.query);
            let uri = tos_auth::canonical::canonical_uri(&path);
            let url = if query.is_empty() {
                format!("{}://{host}{uri}", self.endpoint.scheme())
            } else {
                format!("{}://{host}{uri}?{query}", self.endpoint.scheme())
            };

            let mut headers = request.headers.clone();
            headers.extend(signed.extra_headers);
            headers.push(("Authorization".to_owned(), signed.authorization));

            let attempt = HttpRequest {
                method: request.method.clone(),
                url,
                headers,
                body,
            };
            debug!(
                method = %attempt.method,
                url = %attempt.url,
                retries_used,
                "sending attempt"
            );

            let failure = match self.transport.roundtrip(attempt).await {
                Ok(response) if response.status.is_success() => return Ok(response),
                Ok(response) => AttemptFailure::Service(decode_service_error(&response)),
                Err(err) => AttemptFailure::Transport(err),
            };

            let decision = self.policy.decide(
                &failure,
                retries_used,
                skew_retries_used,
                request.body.is_replayable(),
            );
            debug!(?decision, retries_used, skew_retries_used, "attempt failed");

            match decision {
                RetryDecision::None => return Err(into_error(failure)),
                RetryDecision::Retry { delay } => {
                    retries_used += 1;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::ResetStreamAndRetry { delay } => {
                    if !request.body.is_replayable() {
                        return Err(TosError::StreamNotReplayable);
                    }
                    retries_used += 1;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::CorrectClockSkewAndRetry => {
                    let Some(server_time) = server_date(&failure) else {
                        return Err(into_error(failure));
                    };
                    self.clock.correct_to(server_time, Utc::now());
                    skew_retries_used += 1;
                    debug!(
                        offset_seconds = self.clock.offset_seconds(),
                        "corrected clock skew"
                    );
                }
                RetryDecision::RefreshCredentialsAndRetry { delay } => {
                    let Some(fresh) = self.provider.refresh() else {
                        return Err(into_error(failure));
                    };
                    refreshed = Some(fresh);
                    retries_used += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn into_error(failure: AttemptFailure) -> TosError {
    match failure {
        AttemptFailure::Transport(err) => TosError::Transport(err),
        AttemptFailure::Service(err) => TosError::Service(err),
    }
}

/// Server wall-clock time from the failing response's `Date` header.
fn server_date(failure: &AttemptFailure) -> Option<DateTime<Utc>> {
    match failure {
        AttemptFailure::Service(err) => err
            .server_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.with_timezone(&Utc)),
        AttemptFailure::Transport(_) => None,
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "RequestId", default)]
    request_id: Option<String>,
}

/// Decode a non-2xx response into the service error shape.
///
/// A body that is not the documented JSON shape still yields an error with
/// the status preserved and an empty code.
fn decode_service_error(response: &HttpResponse) -> ServiceError {
    let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
    let request_id = body
        .request_id
        .or_else(|| response.header(HEADER_REQUEST_ID).map(str::to_owned));
    ServiceError {
        status: response.status,
        code: body.code,
        message: body.message,
        request_id,
        server_date: response.header("date").map(str::to_owned),
    }
}
