//! Credential verification boundary.
//!
//! The real verifier is an external identity provider; [`InMemoryDirectory`]
//! stands in for it during development and tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::AuthError;
use crate::user::{UserRecord, UserStatus, normalize_identifier};

/// Non-success outcome of a verification call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("no account is registered for '{0}'")]
    UnknownIdentifier(String),

    #[error("secret does not match")]
    SecretMismatch,

    /// The provider could not be reached or failed unexpectedly.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Verifies an identifier/secret pair and returns the matching account.
///
/// Inactive accounts are still returned; deciding whether they may sign in is
/// the caller's job.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<UserRecord, VerificationFailure>;
}

/// Map a verification outcome onto the error taxonomy.
///
/// - unknown identifier / wrong secret → `credentials`
/// - account found but not active → `account`
/// - provider failure → `network`
pub fn classify_verification(
    outcome: Result<UserRecord, VerificationFailure>,
) -> Result<UserRecord, AuthError> {
    match outcome {
        Ok(user) if user.is_active() => Ok(user),
        Ok(user) => Err(AuthError::account(user.status)),
        Err(VerificationFailure::UnknownIdentifier(_) | VerificationFailure::SecretMismatch) => {
            Err(AuthError::credentials())
        }
        Err(VerificationFailure::Unavailable(reason)) => Err(AuthError::network(reason)),
    }
}

#[derive(Debug, Clone)]
struct DirectoryEntry {
    user: UserRecord,
    secret: String,
}

/// In-process account directory keyed by normalized email.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<String, DirectoryEntry>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an account.
    pub fn register(&self, user: UserRecord, secret: impl Into<String>) {
        let key = normalize_identifier(&user.email);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            DirectoryEntry {
                user,
                secret: secret.into(),
            },
        );
    }

    /// Change an account's status. Returns `false` when the identifier is unknown.
    pub fn set_status(&self, identifier: &str, status: UserStatus) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&normalize_identifier(identifier)) {
            Some(entry) => {
                entry.user.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryDirectory {
    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<UserRecord, VerificationFailure> {
        let key = normalize_identifier(identifier);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get(&key)
            .ok_or_else(|| VerificationFailure::UnknownIdentifier(key.clone()))?;

        if entry.secret != secret {
            return Err(VerificationFailure::SecretMismatch);
        }

        Ok(entry.user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use crate::errors::AuthErrorKind;

    fn directory() -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        dir.register(UserRecord::new("dana@example.com", "Dana", Role::Director), "s3cret");
        dir.register(
            UserRecord::new("ivo@example.com", "Ivo", Role::Employee)
                .with_status(UserStatus::Inactive),
            "pw",
        );
        dir
    }

    #[tokio::test]
    async fn verifies_with_normalized_identifier() {
        let user = directory().verify(" Dana@Example.com", "s3cret").await.unwrap();
        assert_eq!(user.role, Role::Director);
    }

    #[tokio::test]
    async fn distinguishes_unknown_identifier_from_wrong_secret() {
        let dir = directory();
        assert!(matches!(
            dir.verify("nobody@example.com", "x").await,
            Err(VerificationFailure::UnknownIdentifier(_))
        ));
        assert_eq!(
            dir.verify("dana@example.com", "wrong").await,
            Err(VerificationFailure::SecretMismatch)
        );
    }

    #[tokio::test]
    async fn inactive_account_is_returned_but_classified_as_account_error() {
        let outcome = directory().verify("ivo@example.com", "pw").await;
        assert!(outcome.is_ok());
        let err = classify_verification(outcome).unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Account);
    }

    #[test]
    fn classification_covers_every_failure() {
        let creds = classify_verification(Err(VerificationFailure::SecretMismatch)).unwrap_err();
        assert_eq!(creds.kind, AuthErrorKind::Credentials);

        let unknown = classify_verification(Err(VerificationFailure::UnknownIdentifier(
            "a".into(),
        )))
        .unwrap_err();
        assert_eq!(unknown.kind, AuthErrorKind::Credentials);

        let net = classify_verification(Err(VerificationFailure::Unavailable("timeout".into())))
            .unwrap_err();
        assert_eq!(net.kind, AuthErrorKind::Network);
        assert_eq!(net.details.as_deref(), Some("timeout"));
    }

    #[test]
    fn set_status_reports_unknown_identifiers() {
        let dir = directory();
        assert!(dir.set_status("DANA@example.com", UserStatus::Suspended));
        assert!(!dir.set_status("ghost@example.com", UserStatus::Active));
        assert_eq!(dir.len(), 2);
    }
}
