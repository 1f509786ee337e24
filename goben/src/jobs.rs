//! Work distribution between the connections of a run.
//!
//! A [`JobDispenser`] hands out a fixed budget of tickets, each granting exactly one
//! request attempt. Every consumed ticket is reported to the [`CompletionBarrier`], which
//! the orchestrator waits on until the whole budget has been spent.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Hands out a bounded number of request tickets to any number of concurrent callers.
#[derive(Debug)]
pub struct JobDispenser {
    remaining: AtomicI64,
    cancel: CancellationToken,
}

impl JobDispenser {
    /// Creates a dispenser holding `total` tickets.
    pub fn new(total: u32, cancel: CancellationToken) -> Self {
        Self {
            remaining: AtomicI64::new(i64::from(total)),
            cancel,
        }
    }

    /// Takes one ticket, returning `false` once the budget is exhausted.
    ///
    /// Never blocks. After the first `false`, every later call returns `false` as well, since
    /// the counter only ever decreases. A cancelled run hands out no further tickets.
    pub fn try_acquire(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel) - 1 >= 0
    }
}

/// Lets the orchestrator wait until a known number of jobs have finished.
///
/// Consumption drives completion: failed attempts are signaled just like successful ones.
#[derive(Debug)]
pub struct CompletionBarrier {
    total: u64,
    completed: AtomicU64,
    finished: Notify,
}

impl CompletionBarrier {
    /// Creates a barrier that opens after `total` calls to [`signal`](Self::signal).
    pub fn new(total: u32) -> Self {
        Self {
            total: u64::from(total),
            completed: AtomicU64::new(0),
            finished: Notify::new(),
        }
    }

    /// Records one finished job and wakes the waiter once the last one is in.
    pub fn signal(&self) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(completed <= self.total, "more completions than tickets");
        if completed == self.total {
            self.finished.notify_waiters();
        }
    }

    /// Returns the number of jobs signaled so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Waits until all jobs have been signaled.
    ///
    /// Resolves immediately for an empty budget.
    pub async fn wait(&self) {
        loop {
            let notified = self.finished.notified();
            if self.completed() >= self.total {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn dispenses_exact_budget() {
        let dispenser = JobDispenser::new(3, CancellationToken::new());

        assert!(dispenser.try_acquire());
        assert!(dispenser.try_acquire());
        assert!(dispenser.try_acquire());
        assert!(!dispenser.try_acquire());
        assert!(!dispenser.try_acquire());
    }

    #[test]
    fn empty_budget_never_dispenses() {
        let dispenser = JobDispenser::new(0, CancellationToken::new());
        assert!(!dispenser.try_acquire());
    }

    #[test]
    fn concurrent_callers_share_budget() {
        let dispenser = JobDispenser::new(10_000, CancellationToken::new());

        let acquired: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let mut count = 0;
                        while dispenser.try_acquire() {
                            count += 1;
                        }
                        count
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(acquired, 10_000);
        assert!(!dispenser.try_acquire());
    }

    #[test]
    fn cancelled_dispenser_stops() {
        let cancel = CancellationToken::new();
        let dispenser = JobDispenser::new(5, cancel.clone());

        assert!(dispenser.try_acquire());
        cancel.cancel();
        assert!(!dispenser.try_acquire());
    }

    #[tokio::test]
    async fn barrier_opens_after_all_signals() {
        let barrier = CompletionBarrier::new(2);

        let mut wait = Box::pin(barrier.wait());
        assert!(futures_util::poll!(&mut wait).is_pending());

        barrier.signal();
        assert!(futures_util::poll!(&mut wait).is_pending());

        barrier.signal();
        assert!(futures_util::poll!(&mut wait).is_ready());
        assert_eq!(barrier.completed(), 2);
    }

    #[tokio::test]
    async fn barrier_open_for_empty_budget() {
        let barrier = CompletionBarrier::new(0);
        let wait = Box::pin(barrier.wait());
        assert!(futures_util::poll!(wait).is_ready());
    }

    #[tokio::test]
    async fn barrier_signaled_from_tasks() {
        let barrier = Arc::new(CompletionBarrier::new(100));

        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                for _ in 0..25 {
                    barrier.signal();
                    tokio::task::yield_now().await;
                }
            });
        }

        barrier.wait().await;
        assert_eq!(barrier.completed(), 100);
    }
}
