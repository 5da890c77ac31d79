//! Signing error types.

/// Errors detected before a signature is attempted.
///
/// Signing itself cannot fail for well-formed input; these all describe
/// configuration problems in the request or credential.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The credential carries an empty access key.
    #[error("credential access key must not be empty")]
    MissingAccessKey,

    /// The credential carries an empty secret key.
    #[error("credential secret key must not be empty")]
    MissingSecretKey,

    /// The request carries no host.
    #[error("request host must not be empty")]
    MissingHost,

    /// Presign expiry outside the service bounds.
    #[error("presign expiry {0}s out of range (1..={max}s)", max = tos_core::constants::MAX_PRESIGN_EXPIRES)]
    InvalidExpiry(u64),
}
