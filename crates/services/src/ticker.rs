//! Wall-clock tick delivery for active sessions.
//!
//! The engine's countdown is driven by discrete `tick` commands; this module
//! supplies them at 1 Hz from the tokio timer. Tests that need deterministic
//! time either call `Session::tick` directly or run under tokio's paused
//! test clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use exam_core::{Clock, Session, SessionStatus};

/// A session shared between the command-issuing host and the tick task.
///
/// The engine expects commands to be serialized per session; the mutex is
/// that serialization.
pub type SharedSession = Arc<Mutex<Session>>;

/// Spawns tick tasks for shared sessions.
pub struct SessionTicker;

impl SessionTicker {
    /// Start delivering one tick per second to `session`.
    ///
    /// The task stops on its own once a tick observes the terminal state
    /// (either because that tick expired the budget or because the session
    /// was submitted manually in the meantime); `tick` tolerating terminal
    /// sessions makes the manual-submit race harmless. Call
    /// [`TickerHandle::stop`] to cancel earlier.
    #[must_use]
    pub fn spawn(session: SharedSession, clock: Clock) -> TickerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of a tokio interval completes immediately;
            // consume it so the countdown starts one full second in
            interval.tick().await;

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let status = {
                            let Ok(mut session) = session.lock() else {
                                warn!("session mutex poisoned, stopping ticker");
                                break;
                            };
                            session.tick(clock.now())
                        };
                        if status == SessionStatus::Submitted {
                            debug!("session terminal, ticker exiting");
                            break;
                        }
                    }
                }
            }
        });

        TickerHandle { stop_tx, task }
    }
}

/// Handle to a running tick task.
pub struct TickerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Stop the tick task and wait for it to finish.
    ///
    /// After this returns, no further tick will be delivered to the session;
    /// joining the task is what turns the stop signal into that guarantee.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the tick task has already exited on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// A ticking session: the shared state plus the clock driving it down.
pub struct ExamSessionHandle {
    session: SharedSession,
    ticker: TickerHandle,
}

impl ExamSessionHandle {
    #[must_use]
    pub fn new(session: SharedSession, ticker: TickerHandle) -> Self {
        Self { session, ticker }
    }

    /// The shared session, for issuing commands under the lock.
    #[must_use]
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Stop the ticker and hand back the shared session.
    ///
    /// Used on both exits: after a manual submission (so no orphaned timer
    /// outlives the session) and after observing a timeout.
    pub async fn stop(self) -> SharedSession {
        self.ticker.stop().await;
        self.session
    }
}
