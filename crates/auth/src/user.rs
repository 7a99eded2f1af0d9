//! User record as returned by credential verification.
//!
//! The session layer persists this record verbatim and replaces it only
//! through `update_user`; it never derives identity from anything else.

use serde::{Deserialize, Serialize};

use sitedesk_core::UserId;

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Account can authenticate.
    #[default]
    Active,
    /// Account has not been activated yet (or was deactivated).
    Inactive,
    /// Account was suspended by an administrator.
    Suspended,
}

impl UserStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, UserStatus::Active)
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Inactive => write!(f, "inactive"),
            UserStatus::Suspended => write!(f, "suspended"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User Record
// ─────────────────────────────────────────────────────────────────────────────

/// Optional profile details shown on the profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Identity + role + profile of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub profile: UserProfile,
}

impl UserRecord {
    /// Build an active user with an empty profile.
    ///
    /// The email is trimmed and lower-cased; it doubles as the login identifier.
    pub fn new(email: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            email: normalize_identifier(&email.into()),
            display_name: display_name.into().trim().to_string(),
            role,
            status: UserStatus::Active,
            profile: UserProfile::default(),
        }
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Canonical form of a login identifier.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}
