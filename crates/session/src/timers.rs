//! Session timer coordinator.
//!
//! Owns at most one {warning, expiry} pair, always derived from a single
//! expiry instant, plus an independent periodic revalidation timer. Timers are
//! entries in a deadline-ordered queue; whoever owns the coordinator drains
//! due entries against its clock and dispatches them.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::SessionConfig;

/// Tie-breaker between timers due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct TimerHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Warning,
    Expiry,
    Revalidation,
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub due_at: DateTime<Utc>,
    /// Expiry instant the warning/expiry pair was computed from.
    pub armed_for: Option<DateTime<Utc>>,
}

/// What `arm` scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimers {
    pub expires_at: DateTime<Utc>,
    pub warning_at: Option<DateTime<Utc>>,
    pub expiry_due_at: DateTime<Utc>,
    /// The expiry instant was already reached; the expiry timer is due now.
    pub already_expired: bool,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    kind: TimerKind,
    armed_for: Option<DateTime<Utc>>,
}

type Slot = Option<(DateTime<Utc>, TimerHandle)>;

#[derive(Debug)]
pub struct SessionTimers {
    warning_window: Duration,
    revalidation_interval: Duration,
    queue: BTreeMap<(DateTime<Utc>, TimerHandle), Scheduled>,
    warning: Slot,
    expiry: Slot,
    revalidation: Slot,
    next_handle: u64,
}

impl SessionTimers {
    pub fn new(warning_window: Duration, revalidation_interval: Duration) -> Self {
        Self {
            warning_window,
            revalidation_interval,
            queue: BTreeMap::new(),
            warning: None,
            expiry: None,
            revalidation: None,
            next_handle: 0,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.warning_window, config.revalidation_interval)
    }

    /// Replace the warning/expiry pair with one computed from `expires_at`.
    ///
    /// The previous pair is cancelled before anything new is scheduled. An
    /// expiry at or before `now` is scheduled at `now`; a warning whose instant
    /// is not strictly in the future is skipped. The revalidation timer is
    /// started if it is not already running.
    pub fn arm(&mut self, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> ArmedTimers {
        self.cancel_pair();

        let remaining = expires_at - now;
        let already_expired = remaining <= Duration::zero();
        let expiry_due_at = if already_expired { now } else { expires_at };
        self.expiry = Some(self.schedule(expiry_due_at, TimerKind::Expiry, Some(expires_at)));

        let warning_at = if remaining > self.warning_window {
            let at = expires_at - self.warning_window;
            self.warning = Some(self.schedule(at, TimerKind::Warning, Some(expires_at)));
            Some(at)
        } else {
            None
        };

        if self.revalidation.is_none() {
            let at = now + self.revalidation_interval;
            self.revalidation = Some(self.schedule(at, TimerKind::Revalidation, None));
        }

        tracing::debug!(
            %expires_at,
            warning_at = ?warning_at,
            already_expired,
            "session timers armed"
        );

        ArmedTimers {
            expires_at,
            warning_at,
            expiry_due_at,
            already_expired,
        }
    }

    /// Cancel every timer. Returns how many were still pending.
    pub fn disarm(&mut self) -> usize {
        let cancelled = self.queue.len();
        self.queue.clear();
        self.warning = None;
        self.expiry = None;
        self.revalidation = None;
        if cancelled > 0 {
            tracing::debug!(cancelled, "session timers disarmed");
        }
        cancelled
    }

    /// Remove and return every timer due at or before `now`, earliest first.
    ///
    /// A fired revalidation timer is rescheduled one interval after `now`.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<TimerFired> {
        let mut fired = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            let (due_at, handle) = *entry.key();
            if due_at > now {
                break;
            }
            let scheduled = entry.remove();
            let slot = self.slot_mut(scheduled.kind);
            if matches!(*slot, Some((_, h)) if h == handle) {
                *slot = None;
            }
            fired.push(TimerFired {
                kind: scheduled.kind,
                due_at,
                armed_for: scheduled.armed_for,
            });
        }

        if fired.iter().any(|f| f.kind == TimerKind::Revalidation) && self.revalidation.is_none() {
            let at = now + self.revalidation_interval;
            self.revalidation = Some(self.schedule(at, TimerKind::Revalidation, None));
        }

        fired
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Pending timers in deadline order.
    pub fn pending(&self) -> Vec<(TimerKind, DateTime<Utc>)> {
        self.queue.iter().map(|((at, _), s)| (s.kind, *at)).collect()
    }

    pub fn warning_due_at(&self) -> Option<DateTime<Utc>> {
        self.warning.map(|(at, _)| at)
    }

    pub fn expiry_due_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.map(|(at, _)| at)
    }

    pub fn revalidation_due_at(&self) -> Option<DateTime<Utc>> {
        self.revalidation.map(|(at, _)| at)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    fn cancel_pair(&mut self) {
        for (at, handle) in [self.warning.take(), self.expiry.take()].into_iter().flatten() {
            self.queue.remove(&(at, handle));
        }
    }

    fn schedule(
        &mut self,
        at: DateTime<Utc>,
        kind: TimerKind,
        armed_for: Option<DateTime<Utc>>,
    ) -> (DateTime<Utc>, TimerHandle) {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.queue.insert((at, handle), Scheduled { kind, armed_for });
        (at, handle)
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut Slot {
        match kind {
            TimerKind::Warning => &mut self.warning,
            TimerKind::Expiry => &mut self.expiry,
            TimerKind::Revalidation => &mut self.revalidation,
        }
    }
}
