//! `sitedesk-auth`: roles, accounts, the access policy table and the pure
//! route authorization evaluator.
//!
//! This crate is intentionally decoupled from session state and storage.

pub mod authorize;
pub mod credentials;
pub mod errors;
pub mod policy;
pub mod redirect;
pub mod roles;
pub mod user;

pub use authorize::{
    AccessDecision, AccessRule, GuardOutcome, GuardVerdict, PROFILE_ROUTE, RouteGuard,
    authorize_route, explain_route_access, filter_tree_by_role, is_route_allowed, normalize_route,
};
pub use credentials::{
    CredentialVerifier, InMemoryDirectory, VerificationFailure, classify_verification,
};
pub use errors::{AuthError, AuthErrorKind, RESET_CREDENTIAL_ROUTE, RecoveryAction, RecoveryStep};
pub use policy::{AccessNode, AccessPolicy, PolicyError, standard_policy};
pub use redirect::{LOGIN_ROUTE, get_redirect_path};
pub use roles::{Constituency, Role};
pub use user::{UserProfile, UserRecord, UserStatus, normalize_identifier};
