//! Endpoint and region model.
//!
//! An [`Endpoint`] pairs a service host with the region used in the signing
//! credential scope. TOS addresses buckets virtual-host style: requests for
//! bucket `b` against endpoint `tos-cn-beijing.volces.com` go to host
//! `b.tos-cn-beijing.volces.com` with the object key as the path.

use std::fmt;

/// Error building an [`Endpoint`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum EndpointError {
    /// The URL scheme is neither `http` nor `https`.
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// The endpoint string has no host part.
    #[error("endpoint has no host: {0}")]
    MissingHost(String),

    /// The region is empty.
    #[error("endpoint region must not be empty")]
    MissingRegion,
}

/// A parsed service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    scheme: String,
    host: String,
    region: String,
}

impl Endpoint {
    /// Parse an endpoint from a URL string (scheme optional, `https`
    /// assumed) and a region name.
    ///
    /// # Examples
    ///
    /// ```
    /// use tos_core::endpoint::Endpoint;
    ///
    /// let ep = Endpoint::new("https://tos-cn-beijing.volces.com", "cn-beijing").unwrap();
    /// assert_eq!(ep.host(), "tos-cn-beijing.volces.com");
    /// assert_eq!(ep.scheme(), "https");
    ///
    /// let bare = Endpoint::new("tos-cn-beijing.volces.com", "cn-beijing").unwrap();
    /// assert_eq!(bare.scheme(), "https");
    /// ```
    pub fn new(url: &str, region: &str) -> Result<Self, EndpointError> {
        if region.is_empty() {
            return Err(EndpointError::MissingRegion);
        }

        let (scheme, rest) = match url.split_once("://") {
            Some((scheme, rest)) => {
                if scheme != "http" && scheme != "https" {
                    return Err(EndpointError::UnsupportedScheme(scheme.to_owned()));
                }
                (scheme.to_owned(), rest)
            }
            None => ("https".to_owned(), url),
        };

        let host = rest.trim_end_matches('/');
        if host.is_empty() {
            return Err(EndpointError::MissingHost(url.to_owned()));
        }

        Ok(Self {
            scheme,
            host: host.to_owned(),
            region: region.to_owned(),
        })
    }

    /// URL scheme, `http` or `https`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Service host without scheme or path.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Region used in the signing credential scope.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Virtual-host style host for a bucket.
    #[must_use]
    pub fn bucket_host(&self, bucket: &str) -> String {
        format!("{bucket}.{}", self.host)
    }

    /// Host for a request, virtual-host style when a bucket is involved.
    #[must_use]
    pub fn request_host(&self, bucket: Option<&str>) -> String {
        match bucket {
            Some(b) => self.bucket_host(b),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}
