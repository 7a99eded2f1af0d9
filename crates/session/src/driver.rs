//! Background task that fires session timers on wall-clock time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::service::AuthService;

/// Drives an [`AuthService`]'s timers from a tokio task.
pub struct SessionDriver {
    service: AuthService,
    shutdown: Arc<Notify>,
}

/// Running driver. Dropping it leaves the task running; call [`DriverHandle::shutdown`].
#[derive(Debug)]
pub struct DriverHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SessionDriver {
    pub fn new(service: AuthService) -> Self {
        Self {
            service,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Start the driver on the current tokio runtime.
    ///
    /// The task sleeps until the next timer deadline, wakes early whenever the
    /// schedule changes, and on shutdown disposes the service's timers.
    pub fn spawn(self) -> DriverHandle {
        let shutdown = self.shutdown.clone();
        let service = self.service;
        let stop = shutdown.clone();

        let join = tokio::spawn(async move {
            tracing::debug!("session driver started");
            loop {
                let wait = service.time_until_next_timer();
                tokio::select! {
                    _ = stop.notified() => {
                        tracing::debug!("session driver received shutdown signal");
                        break;
                    }
                    _ = service.timers_changed() => continue,
                    _ = sleep_for(wait) => {
                        let fired = service.fire_due_timers();
                        if fired > 0 {
                            tracing::trace!(fired, "session timers dispatched");
                        }
                    }
                }
            }
            service.dispose();
            tracing::debug!("session driver stopped");
        });

        DriverHandle { shutdown, join }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

impl DriverHandle {
    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "session driver task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
