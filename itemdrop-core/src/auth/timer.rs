//! Schedulable one-shot tasks for proactive refresh.

use futures_util::future::BoxFuture;
use std::time::Duration;

/// Cancels a scheduled task. Dropping the handle leaves the task scheduled.
pub struct TimerHandle {
    cancel: Box<dyn FnOnce() + Send>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    pub fn cancel(self) {
        (self.cancel)()
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

pub trait RefreshTimer: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle;
}

/// Timer backed by a spawned tokio task.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl RefreshTimer for TokioTimer {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let abort = handle.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}
