use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What a loop does after one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    /// Run again after the regular period.
    Continue,
    /// Run again after the backoff period.
    Backoff,
    Stop,
}

/// A periodic task that can be cancelled.
///
/// Cycles never overlap: the next delay starts only once the previous cycle's
/// future has completed. Cancelling prevents further cycles from starting; a
/// cycle already running finishes, so callers that need "no effects after
/// stop" must also guard the cycle body itself. Dropping the handle aborts
/// the task outright, at the running cycle's next await point.
#[derive(Debug)]
pub(crate) struct LoopHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    pub(crate) fn spawn<F, Fut>(period: Duration, backoff: Duration, mut cycle: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Next> + Send,
    {
        let (cancel, mut cancelled) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut delay = period;
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if *cancelled.borrow() {
                    break;
                }
                delay = match cycle().await {
                    Next::Continue => period,
                    Next::Backoff => backoff,
                    Next::Stop => break,
                };
            }
        });
        Self { cancel, task }
    }

    /// Stops scheduling further cycles.
    pub(crate) fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.cancel();
        self.task.abort();
    }
}
