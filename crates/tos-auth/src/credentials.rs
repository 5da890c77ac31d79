//! Credential snapshot and provider trait.

use chrono::{DateTime, Utc};

use crate::error::AuthError;

/// An immutable credential snapshot.
///
/// A new credential supersedes but never mutates one already borrowed by an
/// in-flight signing operation. Secrets are redacted from `Debug` output.
#[derive(Clone)]
pub struct Credential {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub access_key_secret: String,
    /// Session token for temporary credentials.
    pub security_token: Option<String>,
    /// When the credential expires, if it is temporary.
    pub expiration: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a long-lived credential.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            security_token: None,
            expiration: None,
        }
    }

    /// Attach a session token.
    #[must_use]
    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }

    /// Attach an expiration time.
    #[must_use]
    pub fn with_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expiration = Some(at);
        self
    }

    /// Reject credentials unusable for signing.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_key_id.is_empty() {
            return Err(AuthError::MissingAccessKey);
        }
        if self.access_key_secret.is_empty() {
            return Err(AuthError::MissingSecretKey);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"[REDACTED]")
            .field(
                "security_token",
                &self.security_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Source of the credential used to sign each attempt.
///
/// The pipeline asks for a fresh snapshot before every attempt, and calls
/// [`refresh`](CredentialsProvider::refresh) when the service reports an
/// expired or invalid credential. A source that cannot rotate returns
/// `None` from `refresh`, which downgrades the retry to a terminal failure.
pub trait CredentialsProvider: Send + Sync {
    /// Current credential snapshot.
    fn credentials(&self) -> Credential;

    /// Ask the source for a rotated credential.
    fn refresh(&self) -> Option<Credential> {
        None
    }
}

/// Provider backed by one fixed credential.
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credential: Credential,
}

impl StaticCredentialsProvider {
    /// Wrap a fixed credential.
    #[must_use]
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

impl CredentialsProvider for StaticCredentialsProvider {
    fn credentials(&self) -> Credential {
        self.credential.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_redact_secrets_in_debug() {
        let cred = Credential::new("AKID", "sk-9f8e7d6c").with_security_token("sts-1a2b3c4d");
        let dump = format!("{cred:?}");
        assert!(dump.contains("AKID"));
        assert!(!dump.contains("sk-9f8e7d6c"));
        assert!(!dump.contains("sts-1a2b3c4d"));
        assert!(dump.contains("[REDACTED]"));
    }

    #[test]
    fn test_should_validate_identifying_fields() {
        assert!(Credential::new("ak", "sk").validate().is_ok());
        assert!(matches!(
            Credential::new("", "sk").validate(),
            Err(AuthError::MissingAccessKey)
        ));
        assert!(matches!(
            Credential::new("ak", "").validate(),
            Err(AuthError::MissingSecretKey)
        ));
    }

    #[test]
    fn test_should_not_refresh_static_provider() {
        let provider = StaticCredentialsProvider::new(Credential::new("ak", "sk"));
        assert_eq!(provider.credentials().access_key_id, "ak");
        assert!(provider.refresh().is_none());
    }
}
