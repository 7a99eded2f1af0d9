//! Session lifecycle for SiteDesk.
//!
//! [`AuthService`] owns the auth state machine, the session timers and the
//! durable session record; [`SessionDriver`] fires its timers on a tokio
//! runtime.

pub mod config;
pub mod driver;
pub mod machine;
pub mod notices;
pub mod service;
pub mod store;
pub mod timers;

pub use config::{ConfigError, SessionConfig};
pub use driver::{DriverHandle, SessionDriver};
pub use machine::{AuthState, Session, SessionCommand, SessionEvent, SessionMachine, SessionPhase};
pub use notices::{NoticeSubscription, SessionNotice};
pub use service::{AuthService, AuthSnapshot, LoginError, Operation, RecoveryOutcome};
pub use store::{
    FileStore, InMemoryStore, KeyValueStore, PersistedSession, SessionStorage, StorageError,
    StoredSession,
};
pub use timers::{ArmedTimers, SessionTimers, TimerFired, TimerKind};
