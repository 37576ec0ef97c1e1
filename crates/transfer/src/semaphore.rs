use std::pin::pin;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::Notify;

const UNSET: i64 = i64::MIN;

/// A one-shot completion barrier.
///
/// The coordinator sets a goal of `n` outstanding events, `n` workers each
/// report one completion with [`goal_minus_one`](Self::goal_minus_one), and
/// [`wait_goal`](Self::wait_goal) resolves once all of them have. A goal of
/// zero is satisfied immediately.
///
/// Misuse (setting the goal twice, reporting before the goal is set, or
/// reporting more completions than the goal) panics: the counts are wrong
/// and no caller can recover a meaningful state from that.
pub struct CountingSemaphore {
    goal: AtomicI64,
    remaining: AtomicI64,
    notify: Notify,
}

impl Default for CountingSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl CountingSemaphore {
    pub fn new() -> Self {
        Self {
            goal: AtomicI64::new(UNSET),
            remaining: AtomicI64::new(UNSET),
            notify: Notify::new(),
        }
    }

    /// Sets the number of completions to wait for.
    ///
    /// # Panics
    ///
    /// Panics if a goal was already set or `goal` exceeds `i64::MAX`.
    pub fn set_goal(&self, goal: u64) {
        let goal = i64::try_from(goal).expect("completion goal exceeds i64::MAX");
        if self
            .remaining
            .compare_exchange(UNSET, goal, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("completion goal set twice");
        }
        self.goal.store(goal, Ordering::Release);
        if goal == 0 {
            self.notify.notify_waiters();
        }
    }

    /// Reports one completion.
    ///
    /// # Panics
    ///
    /// Panics if no goal is set or every expected completion was already
    /// reported.
    pub fn goal_minus_one(&self) {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if prev == UNSET {
            panic!("completion reported before a goal was set");
        }
        if prev <= 0 {
            panic!("more completions reported than the goal allows");
        }
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Resolves once the goal is set and every completion has been reported.
    pub async fn wait_goal(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking so a final completion racing with the
            // check still wakes us.
            notified.as_mut().enable();
            if self.is_satisfied() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    /// The goal, or `None` before one is set.
    pub fn goal(&self) -> Option<u64> {
        match self.goal.load(Ordering::Acquire) {
            UNSET => None,
            goal => Some(goal as u64),
        }
    }

    /// Completions still outstanding, or `None` before a goal is set.
    pub fn remaining(&self) -> Option<u64> {
        match self.remaining.load(Ordering::Acquire) {
            UNSET => None,
            n => Some(n.max(0) as u64),
        }
    }
}

impl std::fmt::Debug for CountingSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingSemaphore")
            .field("goal", &self.goal())
            .field("remaining", &self.remaining())
            .finish()
    }
}
