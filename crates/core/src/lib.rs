//! `sitedesk-core`: foundation primitives shared by the session and
//! authorization crates.
//!
//! This crate contains **pure** building blocks (no storage, no scheduling).

pub mod clock;
pub mod error;
pub mod id;
pub mod machine;

pub use clock::{Clock, ManualClock, SystemClock, from_epoch_millis, to_epoch_millis};
pub use error::{DomainError, DomainResult};
pub use id::{SessionId, UserId};
pub use machine::StateMachine;
