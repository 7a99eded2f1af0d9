//! Error & recovery taxonomy.
//!
//! Every failure surfaced to a user is an [`AuthError`] of one of five kinds,
//! and every kind carries a fixed, ordered list of recovery steps the UI
//! renders verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

/// Where the "reset credential" recovery step navigates to.
pub const RESET_CREDENTIAL_ROUTE: &str = "/forgot-password";

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    /// Identifier not found, or secret mismatch.
    Credentials,
    /// The verification call failed or timed out.
    Network,
    /// Account exists but is not active.
    Account,
    /// Session expired, could not be refreshed or could not be stored.
    Session,
    /// Authenticated, but the role lacks access to the requested resource.
    Permission,
}

/// What invoking a recovery step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Re-issue the last operation.
    Retry,
    /// Sign out, then go to the login route.
    Login,
    /// Informational; no state transition.
    Contact,
    /// Redirect to `target`, or to the role's home route when absent.
    Navigate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub label: String,
    pub action: RecoveryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl RecoveryStep {
    fn new(label: &str, action: RecoveryAction) -> Self {
        Self {
            label: label.to_string(),
            action,
            target: None,
        }
    }

    fn navigate(label: &str, target: &str) -> Self {
        Self {
            label: label.to_string(),
            action: RecoveryAction::Navigate,
            target: Some(target.to_string()),
        }
    }
}

impl AuthErrorKind {
    /// Canonical recovery steps for this kind. Never empty.
    pub fn recovery_template(self) -> Vec<RecoveryStep> {
        match self {
            AuthErrorKind::Credentials => vec![
                RecoveryStep::new("Try again", RecoveryAction::Retry),
                RecoveryStep::navigate("Reset your password", RESET_CREDENTIAL_ROUTE),
                RecoveryStep::new("Contact support", RecoveryAction::Contact),
            ],
            AuthErrorKind::Network => vec![
                RecoveryStep::new("Try again", RecoveryAction::Retry),
                RecoveryStep::new("Contact support", RecoveryAction::Contact),
            ],
            AuthErrorKind::Account => vec![
                RecoveryStep::new("Contact your administrator", RecoveryAction::Contact),
                RecoveryStep::new("Back to sign in", RecoveryAction::Login),
            ],
            AuthErrorKind::Session => {
                vec![RecoveryStep::new("Sign in again", RecoveryAction::Login)]
            }
            AuthErrorKind::Permission => vec![
                RecoveryStep::new("Request access", RecoveryAction::Contact),
                RecoveryStep::new("Sign in with a different account", RecoveryAction::Login),
            ],
        }
    }
}

/// A classified failure with its recovery steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub recovery_actions: Vec<RecoveryStep>,
}

impl AuthError {
    /// Build an error of `kind` with that kind's canonical recovery steps.
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            recovery_actions: kind.recovery_template(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn credentials() -> Self {
        Self::new(AuthErrorKind::Credentials, "The email or password is incorrect.")
    }

    pub fn network(details: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Network, "We could not reach the sign-in service.")
            .with_details(details)
    }

    pub fn account(status: impl core::fmt::Display) -> Self {
        Self::new(AuthErrorKind::Account, "This account cannot sign in right now.")
            .with_details(format!("account status is {status}"))
    }

    pub fn session_expired() -> Self {
        Self::new(AuthErrorKind::Session, "Your session has expired. Please sign in again.")
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Session, message)
    }

    pub fn permission(route: &str, role: Role) -> Self {
        Self::new(AuthErrorKind::Permission, "You do not have access to this page.")
            .with_details(format!("role {role} may not open {route}"))
    }

    pub fn is(&self, kind: AuthErrorKind) -> bool {
        self.kind == kind
    }
}
