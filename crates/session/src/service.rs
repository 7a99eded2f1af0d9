//! Authentication service.
//!
//! One owner for the state machine, the timer coordinator and the durable
//! session record. All mutation happens under a single lock that is never
//! held across an await; the only await is the credential check in
//! [`AuthService::login`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use sitedesk_auth::{
    AccessPolicy, AuthError, CredentialVerifier, GuardOutcome, LOGIN_ROUTE, RecoveryAction,
    RecoveryStep, Role, RouteGuard, UserRecord, VerificationFailure, classify_verification,
    get_redirect_path, normalize_identifier,
};
use sitedesk_core::{Clock, StateMachine};

use crate::config::SessionConfig;
use crate::machine::{AuthState, Session, SessionCommand, SessionMachine, SessionPhase};
use crate::notices::{NoticeBus, NoticeSubscription, SessionNotice};
use crate::store::{KeyValueStore, PersistedSession, SessionStorage, StorageError, StoredSession};
use crate::timers::{SessionTimers, TimerFired, TimerKind};

/// Why a login did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// Verification or persistence failed; the same error is recorded on the service.
    #[error(transparent)]
    Rejected(#[from] AuthError),

    /// Another login is still waiting on verification.
    #[error("a sign-in is already in progress")]
    InProgress,

    /// A logout happened while this login was in flight; its result was discarded.
    #[error("the sign-in was cancelled before it completed")]
    Superseded,
}

impl LoginError {
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            LoginError::Rejected(error) => Some(error),
            _ => None,
        }
    }
}

/// The last user-initiated operation, kept for the "retry" recovery step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// The secret is never retained; a retry asks the user to resubmit it.
    Login { identifier: String },
    ExtendSession,
    RefreshToken,
    ValidateSession,
}

/// What [`AuthService::perform_recovery`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Show the login form again, prefilled with `identifier`.
    ResubmitLogin { identifier: String },
    Retried { operation: Operation },
    Navigate { route: String },
    Contact,
    NothingToRetry,
}

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub user: Option<UserRecord>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub session_expiry: Option<DateTime<Utc>>,
    pub auth_error: Option<AuthError>,
    pub expiry_warning: bool,
    pub phase: SessionPhase,
}

#[derive(Debug)]
struct Core {
    machine: SessionMachine,
    timers: SessionTimers,
    /// Expiry instant the current warning was raised for.
    expiry_warning: Option<DateTime<Utc>>,
    last_operation: Option<Operation>,
    disposed: bool,
}

struct Shared {
    core: Mutex<Core>,
    verifier: Arc<dyn CredentialVerifier>,
    storage: SessionStorage,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    notices: NoticeBus,
    timers_changed: Notify,
}

/// Why renewing the expiry did not happen.
enum RenewFailure {
    NoSession,
    Expired,
    Storage(StorageError),
}

#[derive(Clone)]
pub struct AuthService {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.lock();
        f.debug_struct("AuthService")
            .field("state", &core.machine.state().name())
            .field("namespace", &self.shared.config.storage_namespace)
            .field("disposed", &core.disposed)
            .finish()
    }
}

impl AuthService {
    /// Build the service and rehydrate any persisted session.
    pub fn start(
        config: SessionConfig,
        verifier: Arc<dyn CredentialVerifier>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage = SessionStorage::new(store, &config.storage_namespace);
        let core = Core {
            machine: SessionMachine::new(),
            timers: SessionTimers::from_config(&config),
            expiry_warning: None,
            last_operation: None,
            disposed: false,
        };
        let service = Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                verifier,
                storage,
                clock,
                config,
                notices: NoticeBus::default(),
                timers_changed: Notify::new(),
            }),
        };
        service.rehydrate();
        service
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    /// One lifetime after `now`, at the millisecond precision the store keeps.
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        (now + self.shared.config.lifetime).trunc_subsecs(3)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    fn rehydrate(&self) {
        let now = self.now();
        let mut core = self.lock();
        match self.shared.storage.load() {
            Ok(StoredSession::Absent) => debug!("no stored session"),
            Ok(StoredSession::Present(stored)) if stored.expires_at > now => {
                let user_id = stored.user.id;
                let expires_at = stored.expires_at;
                let session = Session::restore(stored.user, stored.token, now, expires_at);
                if run(&mut core, SessionCommand::Restore { session }) {
                    self.arm(&mut core, now, expires_at);
                    info!(%user_id, %expires_at, "restored stored session");
                    self.shared.notices.publish(SessionNotice::Restored { user_id, expires_at });
                }
            }
            Ok(StoredSession::Present(stored)) => {
                info!(expired_at = %stored.expires_at, "stored session has expired");
                self.end_session(&mut core, AuthError::session_expired());
            }
            Ok(StoredSession::Unreadable(reason)) => {
                warn!(%reason, "stored session is unreadable, discarding it");
                let error = AuthError::session(
                    "Your saved session could not be read. Please sign in again.",
                )
                .with_details(reason);
                self.end_session(&mut core, error);
            }
            Err(e) => {
                warn!(error = %e, "failed to read stored session");
                let error = AuthError::session(
                    "Your saved session could not be read. Please sign in again.",
                )
                .with_details(e.to_string());
                self.end_session(&mut core, error);
            }
        }
    }

    // ── Login / logout ──────────────────────────────────────────────────────

    /// Verify credentials and start a session.
    ///
    /// Signing in while already authenticated signs the current session out
    /// first. A logout issued while verification is in flight wins: the
    /// late result is discarded and [`LoginError::Superseded`] returned.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<UserRecord, LoginError> {
        let attempt = {
            let mut core = self.lock();
            if core.machine.is_authenticating() {
                debug!("login ignored, another is in flight");
                return Err(LoginError::InProgress);
            }
            if core.machine.session().is_some() {
                info!("signing out the current session before a new sign-in");
                self.sign_out(&mut core);
            }
            core.last_operation = Some(Operation::Login {
                identifier: normalize_identifier(identifier),
            });
            run(&mut core, SessionCommand::BeginLogin);
            let Some(attempt) = core.machine.pending_attempt() else {
                return Err(LoginError::InProgress);
            };
            attempt
        };
        debug!(attempt, "verifying credentials");

        let outcome = self.verify(identifier, secret).await;

        let mut core = self.lock();
        if !core.machine.is_current_attempt(attempt) {
            info!(attempt, "discarding the result of a cancelled sign-in");
            return Err(LoginError::Superseded);
        }

        let user = match classify_verification(outcome) {
            Ok(user) => user,
            Err(error) => {
                info!(attempt, kind = ?error.kind, "sign-in rejected");
                run(&mut core, SessionCommand::FailLogin {
                    attempt,
                    error: error.clone(),
                });
                return Err(LoginError::Rejected(error));
            }
        };

        let now = self.now();
        let expires_at = self.expiry_from(now);
        let session = Session::issue(user.clone(), now, expires_at);
        let record = PersistedSession {
            token: session.token.clone(),
            user: user.clone(),
            expires_at,
        };
        if let Err(e) = self.shared.storage.save(&record) {
            warn!(error = %e, "failed to persist the new session");
            self.clear_storage();
            let error = AuthError::session("We could not save your session. Please try again.")
                .with_details(e.to_string());
            run(&mut core, SessionCommand::FailLogin {
                attempt,
                error: error.clone(),
            });
            return Err(LoginError::Rejected(error));
        }

        if !run(&mut core, SessionCommand::CompleteLogin { attempt, session }) {
            self.clear_storage();
            return Err(LoginError::Superseded);
        }
        self.arm(&mut core, now, expires_at);
        info!(user_id = %user.id, role = %user.role, %expires_at, "signed in");
        self.shared.notices.publish(SessionNotice::SignedIn {
            user_id: user.id,
            expires_at,
        });
        Ok(user)
    }

    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<UserRecord, VerificationFailure> {
        let limit = self
            .shared
            .config
            .verification_timeout
            .to_std()
            .unwrap_or(StdDuration::from_secs(30));
        match tokio::time::timeout(limit, self.shared.verifier.verify(identifier, secret)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(VerificationFailure::Unavailable(format!(
                "no answer within {}s",
                limit.as_secs()
            ))),
        }
    }

    /// Drop the session, its timers and its stored record. Safe in any state.
    pub fn logout(&self) {
        let mut core = self.lock();
        self.sign_out(&mut core);
    }

    fn sign_out(&self, core: &mut Core) {
        let from = core.machine.state().name();
        self.disarm(core);
        self.clear_storage();
        core.expiry_warning = None;
        core.last_operation = None;
        run(core, SessionCommand::Logout);
        info!(from, "signed out");
        self.shared.notices.publish(SessionNotice::SignedOut);
    }

    /// Logout semantics, keeping `error` for the presentation layer.
    fn end_session(&self, core: &mut Core, error: AuthError) {
        let kind = error.kind;
        self.disarm(core);
        self.clear_storage();
        core.expiry_warning = None;
        if run(core, SessionCommand::End { error }) {
            info!(?kind, "session ended");
            self.shared.notices.publish(SessionNotice::Ended { kind });
        }
    }

    fn clear_storage(&self) {
        if let Err(e) = self.shared.storage.clear() {
            warn!(error = %e, "failed to clear the stored session");
        }
    }

    // ── Expiry management ───────────────────────────────────────────────────

    /// Push the expiry out by one lifetime. No-op without a session.
    ///
    /// A storage failure is recorded as a session error and the current
    /// expiry and timers stay as they were.
    pub fn extend_session(&self) {
        let now = self.now();
        let mut core = self.lock();
        if core.machine.session().is_some() {
            core.last_operation = Some(Operation::ExtendSession);
        }
        match self.renew(&mut core, now) {
            Ok(expires_at) => debug!(%expires_at, "session extended"),
            Err(RenewFailure::NoSession) => debug!("extend ignored, no active session"),
            Err(RenewFailure::Expired) => {
                info!("extend requested after expiry");
                self.end_session(&mut core, AuthError::session_expired());
            }
            Err(RenewFailure::Storage(e)) => {
                warn!(error = %e, "failed to persist the extended expiry");
                let error = AuthError::session("We could not extend your session.")
                    .with_details(e.to_string());
                run(&mut core, SessionCommand::Report { error });
            }
        }
    }

    /// Renew the session; any failure ends it with a session error.
    pub fn refresh_token(&self) -> Result<DateTime<Utc>, AuthError> {
        let now = self.now();
        let mut core = self.lock();
        core.last_operation = Some(Operation::RefreshToken);
        let error = match self.renew(&mut core, now) {
            Ok(expires_at) => {
                info!(%expires_at, "session refreshed");
                return Ok(expires_at);
            }
            Err(RenewFailure::NoSession) => {
                let error = AuthError::session("There is no session to refresh. Please sign in.");
                run(&mut core, SessionCommand::Report { error: error.clone() });
                return Err(error);
            }
            Err(RenewFailure::Expired) => AuthError::session_expired(),
            Err(RenewFailure::Storage(e)) => {
                warn!(error = %e, "failed to persist the refreshed expiry");
                AuthError::session("We could not refresh your session. Please sign in again.")
                    .with_details(e.to_string())
            }
        };
        self.end_session(&mut core, error.clone());
        Err(error)
    }

    fn renew(&self, core: &mut Core, now: DateTime<Utc>) -> Result<DateTime<Utc>, RenewFailure> {
        if core.machine.session().is_none() {
            return Err(RenewFailure::NoSession);
        }
        match self.shared.storage.read_expiry() {
            Ok(Some(current)) if current > now => {}
            Ok(_) => return Err(RenewFailure::Expired),
            Err(e) => return Err(RenewFailure::Storage(e)),
        }

        let expires_at = self.expiry_from(now);
        self.shared
            .storage
            .save_expiry(expires_at)
            .map_err(RenewFailure::Storage)?;
        run(core, SessionCommand::Extend { expires_at, at: now });
        core.expiry_warning = None;
        self.arm(core, now, expires_at);
        self.shared.notices.publish(SessionNotice::Extended { expires_at });
        Ok(expires_at)
    }

    /// Check the persisted expiry; a passed or unreadable expiry ends the session.
    pub fn validate_session(&self) -> bool {
        let now = self.now();
        let mut core = self.lock();
        if core.machine.session().is_some() {
            core.last_operation = Some(Operation::ValidateSession);
        }
        self.revalidate(&mut core, now)
    }

    fn revalidate(&self, core: &mut Core, now: DateTime<Utc>) -> bool {
        if core.machine.session().is_none() {
            return false;
        }
        match self.shared.storage.read_expiry() {
            Ok(Some(expires_at)) if expires_at > now => {
                run(core, SessionCommand::MarkValidated { at: now });
                true
            }
            Ok(_) => {
                info!("persisted expiry has passed");
                self.end_session(core, AuthError::session_expired());
                false
            }
            Err(e) => {
                warn!(error = %e, "persisted expiry is unreadable");
                let error = AuthError::session(
                    "Your session could not be verified. Please sign in again.",
                )
                .with_details(e.to_string());
                self.end_session(core, error);
                false
            }
        }
    }

    // ── User record ─────────────────────────────────────────────────────────

    /// Replace the signed-in user's record, in memory and in storage.
    pub fn update_user(&self, user: UserRecord) -> Result<(), AuthError> {
        let mut core = self.lock();
        if core.machine.session().is_none() {
            let error = AuthError::session("Sign in to update your profile.");
            run(&mut core, SessionCommand::Report { error: error.clone() });
            return Err(error);
        }
        if let Err(e) = self.shared.storage.save_user(&user) {
            warn!(error = %e, "failed to persist the updated user");
            let error = AuthError::session("We could not save your profile.")
                .with_details(e.to_string());
            run(&mut core, SessionCommand::Report { error: error.clone() });
            return Err(error);
        }
        debug!(user_id = %user.id, "user record updated");
        run(&mut core, SessionCommand::UpdateUser { user });
        Ok(())
    }

    pub fn clear_auth_error(&self) {
        let mut core = self.lock();
        run(&mut core, SessionCommand::ClearError);
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> AuthSnapshot {
        let now = self.now();
        let core = self.lock();
        let session = core.machine.session();
        AuthSnapshot {
            user: session.map(|s| s.user.clone()),
            is_authenticated: core.machine.is_authenticated(now),
            is_loading: core.machine.is_authenticating(),
            session_expiry: session.map(|s| s.expires_at),
            auth_error: core.machine.auth_error().cloned(),
            expiry_warning: core.expiry_warning.is_some(),
            phase: core.machine.phase(now),
        }
    }

    pub fn state(&self) -> AuthState {
        self.lock().machine.state().clone()
    }

    /// Role of the signed-in user while the session is valid.
    pub fn current_role(&self) -> Option<Role> {
        let now = self.now();
        let core = self.lock();
        core.machine
            .session()
            .filter(|s| s.is_valid_at(now))
            .map(|s| s.user.role)
    }

    /// Where to send a user of `role` after sign-in.
    pub fn get_redirect_path(&self, role: Role) -> &'static str {
        get_redirect_path(role)
    }

    /// Home route of the signed-in user, or the login route.
    pub fn home_route(&self) -> &'static str {
        self.current_role().map_or(LOGIN_ROUTE, get_redirect_path)
    }

    /// Guard `route` for whoever is signed in now.
    pub fn guard_route(
        &self,
        policy: &AccessPolicy,
        guard: &RouteGuard,
        route: &str,
    ) -> GuardOutcome {
        guard.check(policy, route, self.current_role())
    }

    pub fn subscribe(&self) -> NoticeSubscription {
        self.shared.notices.subscribe()
    }

    // ── Timers ──────────────────────────────────────────────────────────────

    fn arm(&self, core: &mut Core, now: DateTime<Utc>, expires_at: DateTime<Utc>) {
        if core.disposed {
            debug!("service disposed, not arming timers");
            return;
        }
        let armed = core.timers.arm(now, expires_at);
        self.shared.timers_changed.notify_one();
        if armed.already_expired {
            self.dispatch_due(core, now);
        }
    }

    fn disarm(&self, core: &mut Core) {
        if core.timers.disarm() > 0 {
            self.shared.timers_changed.notify_one();
        }
    }

    /// Dispatch every timer due at the clock's current instant.
    pub fn fire_due_timers(&self) -> usize {
        let now = self.now();
        let mut core = self.lock();
        if core.disposed {
            return 0;
        }
        self.dispatch_due(&mut core, now)
    }

    fn dispatch_due(&self, core: &mut Core, now: DateTime<Utc>) -> usize {
        let fired = core.timers.take_due(now);
        for timer in &fired {
            self.on_timer(core, timer, now);
        }
        if !fired.is_empty() {
            self.shared.timers_changed.notify_one();
        }
        fired.len()
    }

    /// Each handler re-reads the persisted expiry, so a timer armed for an
    /// expiry that has since moved does nothing.
    fn on_timer(&self, core: &mut Core, timer: &TimerFired, now: DateTime<Utc>) {
        if core.machine.session().is_none() {
            debug!(kind = ?timer.kind, "timer fired without a session, ignored");
            return;
        }
        match timer.kind {
            TimerKind::Warning => match self.shared.storage.read_expiry() {
                Ok(Some(expires_at)) if Some(expires_at) == timer.armed_for && expires_at > now => {
                    let remaining_secs = (expires_at - now).num_seconds();
                    core.expiry_warning = Some(expires_at);
                    info!(%expires_at, remaining_secs, "session expiry warning");
                    self.shared.notices.publish(SessionNotice::ExpiryWarning {
                        expires_at,
                        remaining_secs,
                    });
                }
                _ => debug!(armed_for = ?timer.armed_for, "stale expiry warning suppressed"),
            },
            TimerKind::Expiry => match self.shared.storage.read_expiry() {
                Ok(Some(expires_at)) if expires_at > now => {
                    debug!(%expires_at, "expiry timer superseded by a later expiry");
                    if core.timers.expiry_due_at().is_none() {
                        run(core, SessionCommand::Extend { expires_at, at: now });
                        self.arm(core, now, expires_at);
                    }
                }
                Ok(_) => {
                    info!("session expired");
                    self.end_session(core, AuthError::session_expired());
                }
                Err(e) => {
                    warn!(error = %e, "persisted expiry is unreadable");
                    let error = AuthError::session(
                        "Your session could not be verified. Please sign in again.",
                    )
                    .with_details(e.to_string());
                    self.end_session(core, error);
                }
            },
            TimerKind::Revalidation => {
                self.revalidate(core, now);
            }
        }
    }

    pub fn next_timer_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock().timers.next_deadline()
    }

    /// How long until the next timer is due, by the service's clock.
    pub fn time_until_next_timer(&self) -> Option<StdDuration> {
        let deadline = self.next_timer_deadline()?;
        Some((deadline - self.now()).to_std().unwrap_or(StdDuration::ZERO))
    }

    /// Pending timers in deadline order.
    pub fn timer_schedule(&self) -> Vec<(TimerKind, DateTime<Utc>)> {
        self.lock().timers.pending()
    }

    /// Resolves after the timer schedule changes.
    pub async fn timers_changed(&self) {
        self.shared.timers_changed.notified().await;
    }

    /// Cancel every timer for good. No timer reaches the state machine afterwards.
    pub fn dispose(&self) {
        let mut core = self.lock();
        core.disposed = true;
        self.disarm(&mut core);
        debug!("auth service disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    // ── Recovery ────────────────────────────────────────────────────────────

    /// Carry out one recovery step of the current error.
    pub fn perform_recovery(&self, step: &RecoveryStep) -> RecoveryOutcome {
        match step.action {
            RecoveryAction::Retry => {
                let last = self.lock().last_operation.clone();
                match last {
                    None => RecoveryOutcome::NothingToRetry,
                    Some(Operation::Login { identifier }) => {
                        RecoveryOutcome::ResubmitLogin { identifier }
                    }
                    Some(operation) => {
                        match operation {
                            Operation::ExtendSession => self.extend_session(),
                            Operation::RefreshToken => {
                                if let Err(e) = self.refresh_token() {
                                    debug!(error = %e, "retried refresh failed");
                                }
                            }
                            Operation::ValidateSession => {
                                self.validate_session();
                            }
                            Operation::Login { .. } => {}
                        }
                        RecoveryOutcome::Retried { operation }
                    }
                }
            }
            RecoveryAction::Login => {
                self.logout();
                RecoveryOutcome::Navigate {
                    route: LOGIN_ROUTE.to_string(),
                }
            }
            RecoveryAction::Navigate => {
                let route = step
                    .target
                    .clone()
                    .unwrap_or_else(|| self.home_route().to_string());
                RecoveryOutcome::Navigate { route }
            }
            RecoveryAction::Contact => RecoveryOutcome::Contact,
        }
    }
}

/// Apply a command, logging a rejected transition instead of failing.
fn run(core: &mut Core, command: SessionCommand) -> bool {
    match core.machine.execute(&command) {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "state machine rejected command");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};
    use sitedesk_auth::{AuthErrorKind, InMemoryDirectory};
    use sitedesk_core::ManualClock;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn service_with(store: Arc<InMemoryStore>, clock: &ManualClock) -> AuthService {
        let directory = InMemoryDirectory::new();
        directory.register(
            UserRecord::new("pm@example.com", "Priya", Role::ProjectManager),
            "s3cret",
        );
        AuthService::start(
            SessionConfig::default(),
            Arc::new(directory),
            store,
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn login_returns_the_same_error_it_records() {
        let clock = ManualClock::starting_at(t0());
        let service = service_with(Arc::new(InMemoryStore::new()), &clock);

        let err = service.login("pm@example.com", "wrong").await.unwrap_err();
        let recorded = service.snapshot().auth_error.unwrap();
        assert_eq!(err.auth_error(), Some(&recorded));
        assert_eq!(recorded.kind, AuthErrorKind::Credentials);
    }

    #[tokio::test]
    async fn retry_after_failed_login_asks_for_resubmission() {
        let clock = ManualClock::starting_at(t0());
        let service = service_with(Arc::new(InMemoryStore::new()), &clock);
        let err = service.login(" PM@example.com ", "wrong").await.unwrap_err();

        let retry = &err.auth_error().unwrap().recovery_actions[0];
        assert_eq!(
            service.perform_recovery(retry),
            RecoveryOutcome::ResubmitLogin {
                identifier: "pm@example.com".to_string()
            }
        );
    }

    #[tokio::test]
    async fn navigate_without_target_goes_home() {
        let clock = ManualClock::starting_at(t0());
        let service = service_with(Arc::new(InMemoryStore::new()), &clock);
        let step = RecoveryStep {
            label: "Home".to_string(),
            action: RecoveryAction::Navigate,
            target: None,
        };
        assert_eq!(
            service.perform_recovery(&step),
            RecoveryOutcome::Navigate {
                route: LOGIN_ROUTE.to_string()
            }
        );

        service.login("pm@example.com", "s3cret").await.unwrap();
        assert_eq!(
            service.perform_recovery(&step),
            RecoveryOutcome::Navigate {
                route: "/projects".to_string()
            }
        );
    }

    #[tokio::test]
    async fn login_recovery_step_signs_out() {
        let clock = ManualClock::starting_at(t0());
        let service = service_with(Arc::new(InMemoryStore::new()), &clock);
        service.login("pm@example.com", "s3cret").await.unwrap();

        let step = AuthError::session_expired().recovery_actions[0].clone();
        assert_eq!(
            service.perform_recovery(&step),
            RecoveryOutcome::Navigate {
                route: LOGIN_ROUTE.to_string()
            }
        );
        assert_eq!(service.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn nothing_to_retry_on_a_fresh_service() {
        let clock = ManualClock::starting_at(t0());
        let service = service_with(Arc::new(InMemoryStore::new()), &clock);
        let retry = AuthError::network("down").recovery_actions[0].clone();
        assert_eq!(service.perform_recovery(&retry), RecoveryOutcome::NothingToRetry);
    }

    #[tokio::test]
    async fn disposed_service_ignores_due_timers() {
        let clock = ManualClock::starting_at(t0());
        let service = service_with(Arc::new(InMemoryStore::new()), &clock);
        service.login("pm@example.com", "s3cret").await.unwrap();

        service.dispose();
        clock.advance(Duration::hours(2));
        assert_eq!(service.fire_due_timers(), 0);
        assert!(service.timer_schedule().is_empty());
        // The machine was never told the session ended.
        assert!(matches!(service.state(), AuthState::Authenticated(_)));
    }

    #[tokio::test]
    async fn update_user_replaces_only_the_user() {
        let clock = ManualClock::starting_at(t0());
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(store.clone(), &clock);
        let user = service.login("pm@example.com", "s3cret").await.unwrap();
        let before = service.snapshot();

        let renamed = UserRecord {
            display_name: "Priya N.".to_string(),
            ..user
        };
        service.update_user(renamed.clone()).unwrap();

        let after = service.snapshot();
        assert_eq!(after.user, Some(renamed.clone()));
        assert_eq!(after.session_expiry, before.session_expiry);

        // A cold start reads the updated user back.
        let restarted = service_with(store, &clock);
        assert_eq!(restarted.snapshot().user, Some(renamed));
    }

    #[test]
    fn update_user_without_a_session_is_a_session_error() {
        let clock = ManualClock::starting_at(t0());
        let service = service_with(Arc::new(InMemoryStore::new()), &clock);
        let user = UserRecord::new("x@example.com", "X", Role::Employee);
        let err = service.update_user(user).unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Session);
        assert_eq!(service.snapshot().auth_error, Some(err));
    }
}
