//! Auth state machine.
//!
//! Pure: commands carry every instant and value they need, and the machine
//! only decides and records transitions. Persistence and timers are driven
//! by [`crate::AuthService`] from the emitted events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use sitedesk_auth::{AuthError, UserRecord};
use sitedesk_core::{DomainError, DomainResult, SessionId, StateMachine};

/// A live authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user: UserRecord,
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub last_validated_at: DateTime<Utc>,
}

impl Session {
    /// Mint a session for a freshly verified user.
    pub fn issue(user: UserRecord, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            user,
            token: mint_token(),
            refresh_token: Some(mint_token()),
            expires_at,
            last_validated_at: now,
        }
    }

    /// Rebuild a session from durable storage (the refresh token is not persisted).
    pub fn restore(
        user: UserRecord,
        token: String,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user,
            token,
            refresh_token: None,
            expires_at,
            last_validated_at: now,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && self.expires_at > now
    }
}

fn mint_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No session data (initial, after logout, after expiry).
    Unauthenticated,
    /// A login is waiting on credential verification.
    Authenticating { attempt: u64 },
    Authenticated(Session),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticating { .. } => "authenticating",
            AuthState::Authenticated(_) => "authenticated",
        }
    }
}

/// The four mutually exclusive situations a session can be in at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NoSession,
    Pending,
    Valid,
    /// Authenticated state whose expiry has passed but whose expiry path has not run yet.
    Expired,
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    BeginLogin,
    CompleteLogin { attempt: u64, session: Session },
    FailLogin { attempt: u64, error: AuthError },
    Restore { session: Session },
    Extend { expires_at: DateTime<Utc>, at: DateTime<Utc> },
    UpdateUser { user: UserRecord },
    MarkValidated { at: DateTime<Utc> },
    /// End the session with an error (expiry, failed refresh, unreadable storage).
    End { error: AuthError },
    /// Record a failure that leaves the state as it is.
    Report { error: AuthError },
    Logout,
    ClearError,
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::BeginLogin => "begin_login",
            SessionCommand::CompleteLogin { .. } => "complete_login",
            SessionCommand::FailLogin { .. } => "fail_login",
            SessionCommand::Restore { .. } => "restore",
            SessionCommand::Extend { .. } => "extend",
            SessionCommand::UpdateUser { .. } => "update_user",
            SessionCommand::MarkValidated { .. } => "mark_validated",
            SessionCommand::End { .. } => "end",
            SessionCommand::Report { .. } => "report",
            SessionCommand::Logout => "logout",
            SessionCommand::ClearError => "clear_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoginStarted { attempt: u64 },
    LoginSucceeded { session: Session },
    LoginFailed { attempt: u64, error: AuthError },
    SessionRestored { session: Session },
    ExpiryExtended { expires_at: DateTime<Utc>, at: DateTime<Utc> },
    UserUpdated { user: UserRecord },
    SessionValidated { at: DateTime<Utc> },
    SessionEnded { error: AuthError },
    ErrorReported { error: AuthError },
    LoggedOut,
    ErrorCleared,
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: AuthState,
    auth_error: Option<AuthError>,
    attempts: u64,
    version: u64,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            auth_error: None,
            attempts: 0,
            version: 0,
        }
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn auth_error(&self) -> Option<&AuthError> {
        self.auth_error.as_ref()
    }

    pub fn is_authenticating(&self) -> bool {
        matches!(self.state, AuthState::Authenticating { .. })
    }

    /// Attempt number of the login in flight, if any.
    pub fn pending_attempt(&self) -> Option<u64> {
        match self.state {
            AuthState::Authenticating { attempt } => Some(attempt),
            _ => None,
        }
    }

    /// Whether `attempt` is still the login in flight.
    pub fn is_current_attempt(&self, attempt: u64) -> bool {
        matches!(self.state, AuthState::Authenticating { attempt: a } if a == attempt)
    }

    /// True iff user, token and expiry are present and the expiry is after `now`.
    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.session().is_some_and(|s| s.is_valid_at(now))
    }

    pub fn phase(&self, now: DateTime<Utc>) -> SessionPhase {
        match &self.state {
            AuthState::Unauthenticated => SessionPhase::NoSession,
            AuthState::Authenticating { .. } => SessionPhase::Pending,
            AuthState::Authenticated(s) if s.is_valid_at(now) => SessionPhase::Valid,
            AuthState::Authenticated(_) => SessionPhase::Expired,
        }
    }

    fn reject(&self, command: &SessionCommand) -> DomainError {
        DomainError::invalid_transition(self.state.name(), command.name())
    }
}

impl StateMachine for SessionMachine {
    type Command = SessionCommand;
    type Event = SessionEvent;
    type Error = DomainError;

    fn handle(&self, command: &SessionCommand) -> DomainResult<Vec<SessionEvent>> {
        use AuthState::*;
        use SessionCommand as C;
        use SessionEvent as E;

        let event = match (command, &self.state) {
            (C::BeginLogin, Unauthenticated) => E::LoginStarted {
                attempt: self.attempts + 1,
            },
            (C::CompleteLogin { attempt, session }, Authenticating { attempt: current })
                if attempt == current =>
            {
                E::LoginSucceeded {
                    session: session.clone(),
                }
            }
            (C::FailLogin { attempt, error }, Authenticating { attempt: current })
                if attempt == current =>
            {
                E::LoginFailed {
                    attempt: *attempt,
                    error: error.clone(),
                }
            }
            (C::Restore { session }, Unauthenticated) => E::SessionRestored {
                session: session.clone(),
            },
            (C::Extend { expires_at, at }, Authenticated(_)) => E::ExpiryExtended {
                expires_at: *expires_at,
                at: *at,
            },
            (C::UpdateUser { user }, Authenticated(_)) => E::UserUpdated { user: user.clone() },
            (C::MarkValidated { at }, Authenticated(_)) => E::SessionValidated { at: *at },
            (C::End { error }, Unauthenticated | Authenticated(_)) => E::SessionEnded {
                error: error.clone(),
            },
            (C::Report { error }, _) => E::ErrorReported { error: error.clone() },
            (C::Logout, _) => E::LoggedOut,
            (C::ClearError, _) => E::ErrorCleared,
            (command, _) => return Err(self.reject(command)),
        };

        Ok(vec![event])
    }

    fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::LoginStarted { attempt } => {
                self.attempts = *attempt;
                self.auth_error = None;
                self.state = AuthState::Authenticating { attempt: *attempt };
            }
            SessionEvent::LoginSucceeded { session }
            | SessionEvent::SessionRestored { session } => {
                self.auth_error = None;
                self.state = AuthState::Authenticated(session.clone());
            }
            SessionEvent::LoginFailed { error, .. } | SessionEvent::SessionEnded { error } => {
                self.auth_error = Some(error.clone());
                self.state = AuthState::Unauthenticated;
            }
            SessionEvent::ExpiryExtended { expires_at, at } => {
                if let AuthState::Authenticated(session) = &mut self.state {
                    session.expires_at = *expires_at;
                    session.last_validated_at = *at;
                }
            }
            SessionEvent::UserUpdated { user } => {
                if let AuthState::Authenticated(session) = &mut self.state {
                    session.user = user.clone();
                }
            }
            SessionEvent::SessionValidated { at } => {
                if let AuthState::Authenticated(session) = &mut self.state {
                    session.last_validated_at = *at;
                }
            }
            SessionEvent::ErrorReported { error } => {
                self.auth_error = Some(error.clone());
            }
            SessionEvent::LoggedOut => {
                self.auth_error = None;
                self.state = AuthState::Unauthenticated;
            }
            SessionEvent::ErrorCleared => {
                self.auth_error = None;
            }
        }
        self.version += 1;
    }

    fn version(&self) -> u64 {
        self.version
    }
}
