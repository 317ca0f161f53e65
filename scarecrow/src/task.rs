//! Cancellable background task handle.
//!
//! All long-lived helpers in the engine (thermal sampler, patrol glide,
//! clip-save timer) share one lifecycle: a worker thread that polls a stop
//! flag, and an owner that cancels by setting the flag and joining. Nothing
//! here force-kills; cancellation is cooperative and the canceller blocks
//! until the worker has observably exited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::warn;

/// Shared stop flag checked by the worker each iteration.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A spawned worker plus the flag that stops it.
#[derive(Debug)]
pub struct StoppableTask {
    flag: StopFlag,
    handle: JoinHandle<()>,
}

impl StoppableTask {
    /// Spawn `work`, handing it a [`StopFlag`] it must poll.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let flag = StopFlag::new();
        let worker_flag = flag.clone();
        let handle = std::thread::spawn(move || work(worker_flag));
        Self { flag, handle }
    }

    /// Raise the stop flag and block until the worker exits.
    pub fn cancel_and_join(self) {
        self.flag.raise();
        if self.handle.join().is_err() {
            warn!("background task panicked before join");
        }
    }

    /// True once the worker has returned on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_cancel_joins_promptly() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let task = StoppableTask::spawn(move |flag| {
            while !flag.is_raised() {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        std::thread::sleep(Duration::from_millis(10));
        task.cancel_and_join();
        let after_join = iterations.load(Ordering::SeqCst);
        assert!(after_join > 0);

        // No further iterations once joined.
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(iterations.load(Ordering::SeqCst), after_join);
    }

    #[test]
    fn test_finished_task_joins_without_flag() {
        let task = StoppableTask::spawn(|_flag| {});
        std::thread::sleep(Duration::from_millis(10));
        assert!(task.is_finished());
        task.cancel_and_join();
    }
}
