//! Presigned URL generation.
//!
//! A presigned URL moves the signing inputs out of headers and into query
//! parameters so the URL is self-contained: `X-Tos-Algorithm`,
//! `X-Tos-Credential`, `X-Tos-Date`, `X-Tos-Expires`,
//! `X-Tos-SignedHeaders`, and `X-Tos-Signature` (plus
//! `X-Tos-Security-Token` for temporary credentials). The embedded date and
//! expiry are the literal signing-time values; the service judges validity
//! against them, and the client never re-evaluates expiry itself.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use tos_core::constants::{DEFAULT_PRESIGN_EXPIRES, MAX_PRESIGN_EXPIRES};
use tos_core::time::{format_long_date, format_short_date};

use crate::canonical::{
    build_canonical_request, canonical_headers, canonical_query, canonical_uri, uri_encode,
};
use crate::credentials::Credential;
use crate::error::AuthError;
use crate::sign::{
    ALGORITHM, Signer, UNSIGNED_PAYLOAD, build_string_to_sign, compute_signature,
    derive_signing_key,
};

/// Query parameter names used by presigned URLs.
const QUERY_ALGORITHM: &str = "X-Tos-Algorithm";
const QUERY_CREDENTIAL: &str = "X-Tos-Credential";
const QUERY_DATE: &str = "X-Tos-Date";
const QUERY_EXPIRES: &str = "X-Tos-Expires";
const QUERY_SIGNED_HEADERS: &str = "X-Tos-SignedHeaders";
const QUERY_SECURITY_TOKEN: &str = "X-Tos-Security-Token";
const QUERY_SIGNATURE: &str = "X-Tos-Signature";

/// Description of the request a presigned URL will authorize.
#[derive(Debug, Clone)]
pub struct PresignInput {
    /// HTTP method the URL is valid for.
    pub method: http::Method,
    /// URL scheme, `http` or `https`.
    pub scheme: String,
    /// Request host.
    pub host: String,
    /// Unencoded request path.
    pub path: String,
    /// Decoded caller query parameters.
    pub query: Vec<(String, String)>,
    /// Headers any user of the URL must send verbatim (for example a
    /// required content type on presigned uploads).
    pub headers: Vec<(String, String)>,
    /// Validity window in seconds from the signing time.
    pub expires: u64,
}

impl PresignInput {
    /// Create an input with the default one-hour expiry.
    #[must_use]
    pub fn new(method: http::Method, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            scheme: "https".to_owned(),
            host: host.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            expires: DEFAULT_PRESIGN_EXPIRES,
        }
    }
}

/// A generated presigned URL and its companion headers.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// The self-contained URL.
    pub url: String,
    /// Headers that must accompany any request made with the URL.
    pub signed_headers: Vec<(String, String)>,
}

impl Signer {
    /// Generate a presigned URL.
    ///
    /// The signature covers the canonical request with the presign
    /// parameters (everything but the signature itself) already in the
    /// query and the payload marked unsigned.
    pub fn presign(
        &self,
        input: &PresignInput,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<PresignedUrl, AuthError> {
        credential.validate()?;
        if input.host.is_empty() {
            return Err(AuthError::MissingHost);
        }
        if input.expires == 0 || input.expires > MAX_PRESIGN_EXPIRES {
            return Err(AuthError::InvalidExpiry(input.expires));
        }

        let date = format_long_date(now);
        let short_date = format_short_date(now);
        let credential_scope = format!("{short_date}/{}/tos/request", self.region());

        let mut headers: Vec<(String, String)> = input.headers.clone();
        headers.push(("host".to_owned(), input.host.clone()));
        let (headers_block, signed_header_names) = canonical_headers(&headers);
        let signed_headers_str = signed_header_names.join(";");

        let mut query: Vec<(String, String)> = input.query.clone();
        query.push((QUERY_ALGORITHM.to_owned(), ALGORITHM.to_owned()));
        query.push((
            QUERY_CREDENTIAL.to_owned(),
            format!("{}/{credential_scope}", credential.access_key_id),
        ));
        query.push((QUERY_DATE.to_owned(), date.clone()));
        query.push((QUERY_EXPIRES.to_owned(), input.expires.to_string()));
        query.push((QUERY_SIGNED_HEADERS.to_owned(), signed_headers_str));
        if let Some(token) = &credential.security_token {
            query.push((QUERY_SECURITY_TOKEN.to_owned(), token.clone()));
        }

        let uri = canonical_uri(&input.path);
        let canonical_query_str = canonical_query(&query);
        let canonical = build_canonical_request(
            input.method.as_str(),
            &uri,
            &canonical_query_str,
            &headers_block,
            &signed_header_names.join(";"),
            UNSIGNED_PAYLOAD,
        );
        debug!(canonical, "built presign canonical request");

        let canonical_hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        let string_to_sign = build_string_to_sign(&date, &credential_scope, &canonical_hash);
        let signing_key = derive_signing_key(
            &credential.access_key_secret,
            &short_date,
            self.region(),
        );
        let signature = compute_signature(&signing_key, &string_to_sign);

        let url = format!(
            "{}://{}{uri}?{canonical_query_str}&{QUERY_SIGNATURE}={}",
            input.scheme,
            input.host,
            uri_encode(&signature),
        );

        Ok(PresignedUrl {
            url,
            signed_headers: input.headers.clone(),
        })
    }
}
