//! Cancellable periodic background tasks bound to a session.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::SessionStatus;

/// Lifecycle of a [`PeriodicTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Scheduled,
    Cancelled,
}

/// Runs `tick` every `period` for as long as the session that was active
/// when it was spawned lasts.
///
/// The task stops when cancelled, when the handle is dropped, and when the
/// session generation changes (logout or a new login). A tick never starts
/// after any of these.
pub struct PeriodicTask {
    name: &'static str,
    cancel: watch::Sender<bool>,
    finished: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        mut session: watch::Receiver<SessionStatus>,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut cancelled) = watch::channel(false);
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();

        let handle = tokio::spawn(async move {
            let owner = *session.borrow_and_update();
            if owner.authenticated {
                tracing::debug!(task = name, ?period, "periodic task scheduled");
                let start = tokio::time::Instant::now() + period;
                let mut interval = tokio::time::interval_at(start, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancelled.changed() => break,
                        changed = session.changed() => {
                            if changed.is_err()
                                || session.borrow_and_update().generation != owner.generation
                            {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            if *cancelled.borrow() || session.borrow().generation != owner.generation {
                                break;
                            }
                            tick().await;
                        }
                    }
                }
            }
            done.store(true, Ordering::Release);
            tracing::debug!(task = name, "periodic task cancelled");
        });

        Self {
            name,
            cancel,
            finished,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> TaskState {
        if *self.cancel.borrow() || self.finished.load(Ordering::Acquire) {
            TaskState::Cancelled
        } else {
            TaskState::Scheduled
        }
    }

    /// Stops the task. A tick already running finishes; no new tick starts.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancels and waits for the task to stop.
    pub async fn shutdown(mut self) {
        self.cancel();
        let handle = &mut self.handle;
        let _ = handle.await;
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn spawn_counting(
        status: &watch::Sender<SessionStatus>,
        ticks: &Arc<AtomicU32>,
    ) -> PeriodicTask {
        let ticks = ticks.clone();
        PeriodicTask::spawn("test", Duration::from_secs(30), status.subscribe(), move || {
            ticks.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        })
    }

    fn signed_in() -> watch::Sender<SessionStatus> {
        let (status, _) = watch::channel(SessionStatus {
            generation: 1,
            authenticated: true,
        });
        status
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let status = signed_in();
        let ticks = Arc::new(AtomicU32::new(0));
        let task = spawn_counting(&status, &ticks);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(task.state(), TaskState::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let status = signed_in();
        let ticks = Arc::new(AtomicU32::new(0));
        let task = spawn_counting(&status, &ticks);

        tokio::time::sleep(Duration::from_secs(31)).await;
        task.cancel();
        assert_eq!(task.state(), TaskState::Cancelled);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_stops_ticks() {
        let status = signed_in();
        let ticks = Arc::new(AtomicU32::new(0));
        let task = spawn_counting(&status, &ticks);

        tokio::time::sleep(Duration::from_secs(31)).await;
        status.send_replace(SessionStatus {
            generation: 2,
            authenticated: false,
        });
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_scheduled_without_session() {
        let (status, _) = watch::channel(SessionStatus::default());
        let ticks = Arc::new(AtomicU32::new(0));
        let task = spawn_counting(&status, &ticks);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_ticks() {
        let status = signed_in();
        let ticks = Arc::new(AtomicU32::new(0));
        let task = spawn_counting(&status, &ticks);
        drop(task);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
