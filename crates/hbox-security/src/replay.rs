// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Challenge replay window.
//
// Records the first time each challenge was seen. A challenge may be reused
// while it is inside the window and is rejected once the window has passed.
// State is process-local; a restart forgets every challenge.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// Result of presenting a challenge to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First use; the challenge is now recorded.
    Fresh,
    /// Seen before, still inside the window.
    Reused,
    /// Seen before, window elapsed. Must be rejected.
    Expired,
}

impl Admission {
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Expired)
    }
}

/// Map of challenge to first-use time in epoch milliseconds.
#[derive(Debug, Default)]
pub struct ReplayWindow {
    first_use: Mutex<HashMap<String, i64>>,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `challenge` at `now_millis`, then sweep expired records.
    ///
    /// An expired record is reported and left in place untouched, so an
    /// immediate replay is rejected again. Only admissions that accept a
    /// challenge sweep.
    pub fn admit(&self, challenge: &str, now_millis: i64, expires_in_secs: u64) -> Admission {
        let window = window_millis(expires_in_secs);
        let mut first_use = self.first_use.lock().expect("replay window lock poisoned");

        let admission = match first_use.get(challenge) {
            None => {
                first_use.insert(challenge.to_owned(), now_millis);
                Admission::Fresh
            }
            Some(&first) if now_millis.saturating_sub(first) <= window => Admission::Reused,
            Some(_) => return Admission::Expired,
        };

        sweep_locked(&mut first_use, now_millis, window);
        admission
    }

    /// Drop every record older than the window. Returns how many were removed.
    pub fn sweep(&self, now_millis: i64, expires_in_secs: u64) -> usize {
        let mut first_use = self.first_use.lock().expect("replay window lock poisoned");
        sweep_locked(&mut first_use, now_millis, window_millis(expires_in_secs))
    }

    /// First-use time of `challenge`, if recorded.
    pub fn first_use(&self, challenge: &str) -> Option<i64> {
        self.first_use
            .lock()
            .expect("replay window lock poisoned")
            .get(challenge)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.first_use.lock().expect("replay window lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn window_millis(expires_in_secs: u64) -> i64 {
    i64::try_from(expires_in_secs)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000)
}

fn sweep_locked(first_use: &mut HashMap<String, i64>, now_millis: i64, window: i64) -> usize {
    let before = first_use.len();
    first_use.retain(|_, first| now_millis.saturating_sub(*first) <= window);
    let removed = before - first_use.len();
    if removed > 0 {
        debug!(removed, remaining = first_use.len(), "swept expired challenges");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 120;

    #[test]
    fn first_use_is_fresh_then_reused() {
        let window = ReplayWindow::new();
        assert_eq!(window.admit("ch1", 10_000, WINDOW), Admission::Fresh);
        assert_eq!(window.admit("ch1", 15_000, WINDOW), Admission::Reused);
        assert_eq!(window.first_use("ch1"), Some(10_000));
    }

    #[test]
    fn window_edge_is_inclusive() {
        let window = ReplayWindow::new();
        window.admit("ch1", 0, WINDOW);
        assert_eq!(window.admit("ch1", 120_000, WINDOW), Admission::Reused);
        assert_eq!(window.admit("ch1", 120_001, WINDOW), Admission::Expired);
    }

    #[test]
    fn expired_challenge_is_not_refreshed() {
        let window = ReplayWindow::new();
        window.admit("ch1", 0, WINDOW);

        let admission = window.admit("ch1", 121_000, WINDOW);
        assert_eq!(admission, Admission::Expired);
        assert!(!admission.is_accepted());
        assert_eq!(window.first_use("ch1"), Some(0));
    }

    #[test]
    fn expired_challenge_stays_rejected_on_repeat() {
        let window = ReplayWindow::new();
        window.admit("ch1", 0, WINDOW);

        assert_eq!(window.admit("ch1", 121_000, WINDOW), Admission::Expired);
        assert_eq!(window.admit("ch1", 121_001, WINDOW), Admission::Expired);
        assert_eq!(window.admit("ch1", 500_000, WINDOW), Admission::Expired);
        assert_eq!(window.first_use("ch1"), Some(0));
    }

    #[test]
    fn sweep_removes_only_old_records() {
        let window = ReplayWindow::new();
        window.admit("old", 0, WINDOW);
        window.admit("new", 100_000, WINDOW);

        let removed = window.sweep(150_000, WINDOW);
        assert_eq!(removed, 1);
        assert_eq!(window.first_use("old"), None);
        assert_eq!(window.first_use("new"), Some(100_000));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn admission_sweeps_other_challenges() {
        let window = ReplayWindow::new();
        window.admit("a", 0, WINDOW);
        window.admit("b", 500_000, WINDOW);
        assert_eq!(window.len(), 1);
        assert_eq!(window.first_use("a"), None);
    }

    #[test]
    fn distinct_challenges_are_independent() {
        let window = ReplayWindow::new();
        assert_eq!(window.admit("a", 0, WINDOW), Admission::Fresh);
        assert_eq!(window.admit("b", 1, WINDOW), Admission::Fresh);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn concurrent_first_use_has_one_fresh() {
        use std::sync::Arc;

        let window = Arc::new(ReplayWindow::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let window = Arc::clone(&window);
                std::thread::spawn(move || window.admit("shared", 1_000, WINDOW))
            })
            .collect();

        let fresh = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|a| *a == Admission::Fresh)
            .count();
        assert_eq!(fresh, 1);
    }
}
