//! Inline TOS V4 signing.
//!
//! Flow, per signature:
//!
//! 1. Merge the caller's headers with the headers the scheme itself signs
//!    (`host`, `x-tos-date`, and `x-tos-security-token` when a session
//!    token is present).
//! 2. Build and hash the canonical request.
//! 3. Build the string to sign from the timestamp, credential scope, and
//!    canonical request hash.
//! 4. Derive the signing key by the HMAC-SHA256 chain over the secret key,
//!    date, region, and the fixed `tos`/`request` terminators.
//! 5. Hex-encode the HMAC of the string to sign.
//!
//! The timestamp is always supplied by the caller so retried attempts pick
//! up clock-skew corrections and tests stay deterministic.

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

use tos_core::time::{format_long_date, format_short_date};

use crate::canonical::{
    build_canonical_request, canonical_headers, canonical_query, canonical_uri,
    signed_headers_string,
};
use crate::credentials::Credential;
use crate::error::AuthError;

/// The signing algorithm identifier.
pub const ALGORITHM: &str = "TOS4-HMAC-SHA256";

/// Payload-hash sentinel for unsigned (streaming) payloads.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Name of the signed date header.
pub const HEADER_DATE: &str = "x-tos-date";

/// Name of the signed session-token header.
pub const HEADER_SECURITY_TOKEN: &str = "x-tos-security-token";

type HmacSha256 = Hmac<Sha256>;

/// The canonical description of one request attempt, as signing input.
///
/// Built fresh for every attempt and never mutated afterwards, so a
/// retried attempt with a corrected timestamp or rotated credential gets a
/// new descriptor rather than a patched one.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    /// HTTP method.
    pub method: http::Method,
    /// Request host (virtual-host style bucket host included).
    pub host: String,
    /// Unencoded request path.
    pub path: String,
    /// Decoded query key/value pairs.
    pub query: Vec<(String, String)>,
    /// Caller headers to include in the signature.
    pub headers: Vec<(String, String)>,
    /// Hex SHA-256 of the payload, or [`UNSIGNED_PAYLOAD`].
    pub payload_hash: String,
}

impl SignableRequest {
    /// Create a descriptor with an unsigned payload and no extra headers.
    #[must_use]
    pub fn new(method: http::Method, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            host: host.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            payload_hash: UNSIGNED_PAYLOAD.to_owned(),
        }
    }
}

/// Product of one inline signing operation.
#[derive(Debug, Clone)]
pub struct SignatureResult {
    /// Hex-encoded signature.
    pub signature: String,
    /// Sorted lowercase names of the headers covered by the signature.
    pub signed_headers: Vec<String>,
    /// Credential scope, `{date}/{region}/tos/request`.
    pub credential_scope: String,
    /// Value for the `X-Tos-Date` header.
    pub date: String,
    /// Complete `Authorization` header value.
    pub authorization: String,
    /// Headers the signer added beyond the caller's (date and, when a
    /// session token is present, the token header). The caller must place
    /// these on the wire exactly as signed.
    pub extra_headers: Vec<(String, String)>,
}

/// TOS V4 signer for one region.
#[derive(Debug, Clone)]
pub struct Signer {
    region: String,
}

impl Signer {
    /// Create a signer for `region`.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    /// Region this signer scopes credentials to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign one request attempt.
    ///
    /// Deterministic: identical inputs produce identical signatures, and
    /// changing any signed header value changes the signature.
    pub fn sign(
        &self,
        request: &SignableRequest,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<SignatureResult, AuthError> {
        credential.validate()?;
        if request.host.is_empty() {
            return Err(AuthError::MissingHost);
        }

        let date = format_long_date(now);
        let short_date = format_short_date(now);

        let mut headers: Vec<(String, String)> = request.headers.clone();
        headers.push(("host".to_owned(), request.host.clone()));
        headers.push((HEADER_DATE.to_owned(), date.clone()));

        let mut extra_headers = vec![(HEADER_DATE.to_owned(), date.clone())];
        if let Some(token) = &credential.security_token {
            headers.push((HEADER_SECURITY_TOKEN.to_owned(), token.clone()));
            extra_headers.push((HEADER_SECURITY_TOKEN.to_owned(), token.clone()));
        }

        let (headers_block, signed_headers) = canonical_headers(&headers);
        let signed_headers_str = signed_headers_string(&signed_headers);

        let canonical = build_canonical_request(
            request.method.as_str(),
            &canonical_uri(&request.path),
            &canonical_query(&request.query),
            &headers_block,
            &signed_headers_str,
            &request.payload_hash,
        );
        debug!(canonical, "built canonical request");

        let canonical_hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        let credential_scope = format!("{short_date}/{}/tos/request", self.region);
        let string_to_sign = build_string_to_sign(&date, &credential_scope, &canonical_hash);

        let signing_key =
            derive_signing_key(&credential.access_key_secret, &short_date, &self.region);
        let signature = compute_signature(&signing_key, &string_to_sign);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers_str}, Signature={signature}",
            credential.access_key_id
        );

        Ok(SignatureResult {
            signature,
            signed_headers,
            credential_scope,
            date,
            authorization,
            extra_headers,
        })
    }
}

/// Build the string to sign:
/// `TOS4-HMAC-SHA256\n{timestamp}\n{scope}\n{hex(sha256(canonical))}`.
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the signing key by the HMAC-SHA256 chain:
///
/// ```text
/// DateKey       = HMAC-SHA256(secret_key, date)
/// DateRegionKey = HMAC-SHA256(DateKey, region)
/// ServiceKey    = HMAC-SHA256(DateRegionKey, "tos")
/// SigningKey    = HMAC-SHA256(ServiceKey, "request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str) -> Vec<u8> {
    let date_key = hmac_sha256(secret_key.as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&date_region_key, b"tos");
    hmac_sha256(&service_key, b"request")
}

/// Hex-encoded HMAC-SHA256 of `data` under `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Hex SHA-256 of a buffered payload, for callers that sign bodies.
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
