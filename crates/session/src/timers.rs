//! Ownership of one job's background tasks.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The poll and progress tasks of a single job.
///
/// Both tasks run until their own loop ends or [`stop`](Self::stop) is
/// called; stopping drops each task at its next suspension point. Dropping
/// a `JobTimers` stops it.
#[derive(Debug)]
pub struct JobTimers {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl JobTimers {
    /// Spawn the poll and progress loops on the current runtime.
    pub fn start<P, Q>(poll: P, progress: Q) -> Self
    where
        P: Future<Output = ()> + Send + 'static,
        Q: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let tasks = vec![
            spawn_until_cancelled(cancel.clone(), poll),
            spawn_until_cancelled(cancel.clone(), progress),
        ];
        Self { cancel, tasks }
    }

    /// Stop both tasks. Calling this again is a no-op.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether every task has exited.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

impl Drop for JobTimers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_until_cancelled<F>(cancel: CancellationToken, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = task => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn counting_loop(counter: Arc<AtomicU32>) -> impl Future<Output = ()> + Send + 'static {
        async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                ticker.tick().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_both_tasks_and_is_idempotent() {
        let polls = Arc::new(AtomicU32::new(0));
        let ticks = Arc::new(AtomicU32::new(0));
        let timers = JobTimers::start(counting_loop(polls.clone()), counting_loop(ticks.clone()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        timers.stop();
        timers.stop();
        let (p, t) = (polls.load(Ordering::SeqCst), ticks.load(Ordering::SeqCst));
        assert!(p > 0 && t > 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(polls.load(Ordering::SeqCst), p);
        assert_eq!(ticks.load(Ordering::SeqCst), t);
        assert!(timers.is_stopped());
        assert!(timers.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_tasks() {
        let polls = Arc::new(AtomicU32::new(0));
        drop(JobTimers::start(counting_loop(polls.clone()), async {}));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(polls.load(Ordering::SeqCst) <= 1);
    }
}
