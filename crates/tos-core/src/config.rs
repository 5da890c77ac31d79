//! Client configuration.

use std::time::Duration;

use crate::constants::DEFAULT_MAX_RETRY_COUNT;
use crate::endpoint::{Endpoint, EndpointError};

/// Configuration for a TOS client.
///
/// # Examples
///
/// ```
/// use tos_core::config::TosConfig;
///
/// let config = TosConfig::new("https://tos-cn-beijing.volces.com", "cn-beijing")
///     .unwrap()
///     .with_max_retry_count(5);
/// assert_eq!(config.max_retry_count, 5);
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TosConfig {
    /// Service endpoint and signing region.
    pub endpoint: Endpoint,
    /// Retries allowed after the initial attempt.
    pub max_retry_count: u32,
    /// Clock-skew corrections allowed per logical call.
    pub max_skew_retry_count: u32,
    /// Connect timeout enforced by the transport.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Whole-attempt timeout enforced by the transport.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl TosConfig {
    /// Build a configuration with defaults for everything but the endpoint.
    pub fn new(endpoint_url: &str, region: &str) -> Result<Self, EndpointError> {
        Ok(Self {
            endpoint: Endpoint::new(endpoint_url, region)?,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            max_skew_retry_count: 1,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        })
    }

    /// Replace the retry cap.
    #[must_use]
    pub fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    /// Replace the per-attempt request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replace the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

mod duration_secs {
    //! Serialize `Duration` as whole seconds for config files.

    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(de)?))
    }
}
