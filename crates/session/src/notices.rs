//! Session notices for the presentation layer.
//!
//! Fan-out over std mpsc channels: every subscriber receives every notice
//! published after it subscribed; dropped subscribers are pruned on publish.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sitedesk_auth::AuthErrorKind;
use sitedesk_core::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    SignedIn { user_id: UserId, expires_at: DateTime<Utc> },
    Restored { user_id: UserId, expires_at: DateTime<Utc> },
    Extended { expires_at: DateTime<Utc> },
    ExpiryWarning { expires_at: DateTime<Utc>, remaining_secs: i64 },
    Ended { kind: AuthErrorKind },
    SignedOut,
}

#[derive(Debug, Default)]
pub(crate) struct NoticeBus {
    subscribers: Mutex<Vec<Sender<SessionNotice>>>,
}

impl NoticeBus {
    pub(crate) fn publish(&self, notice: SessionNotice) {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|tx| tx.send(notice.clone()).is_ok());
    }

    pub(crate) fn subscribe(&self) -> NoticeSubscription {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        NoticeSubscription { rx }
    }
}

/// Receiving end of the notice stream.
#[derive(Debug)]
pub struct NoticeSubscription {
    rx: Receiver<SessionNotice>,
}

impl NoticeSubscription {
    /// Next notice if one is already waiting.
    pub fn try_next(&self) -> Option<SessionNotice> {
        self.rx.try_recv().ok()
    }

    /// Every notice currently waiting, oldest first.
    pub fn drain(&self) -> Vec<SessionNotice> {
        self.rx.try_iter().collect()
    }

    /// Block up to `timeout` for the next notice.
    pub fn recv_timeout(&self, timeout: StdDuration) -> Result<SessionNotice, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}
