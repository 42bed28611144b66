//! Pause/resume coordination for encoder worker threads
//!
//! Each encode pipeline owns one [`PauseGate`]. Control calls (`pause`,
//! `resume`, `halt`) come from the controlling thread; worker threads poll
//! [`PauseGate::is_running`] and park in [`PauseGate::wait_while_paused`].
//!
//! Both flags are atomics so the hot loop can read them without locking.
//! Every write that can release a parked thread happens while holding the
//! gate mutex, and the waiter re-checks the flags under that same mutex, so a
//! resume issued between a worker's flag check and its wait is never lost.
//!
//! Every pause bumps a counter, so a worker that never got to park during a
//! short pause still learns that one happened.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared run/pause state for one encode pipeline
#[derive(Debug)]
pub struct PauseGate {
    running: AtomicBool,
    paused: AtomicBool,
    pauses: AtomicU64,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    /// Create a gate that is neither running nor paused
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            pauses: AtomicU64::new(0),
            lock: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// Mark the pipeline as encoding
    pub fn start(&self) {
        let _guard = self.lock.lock();
        self.paused.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Ask worker threads to park
    pub fn pause(&self) {
        let _guard = self.lock.lock();
        if self.running.load(Ordering::SeqCst) && !self.paused.swap(true, Ordering::SeqCst) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Clear the pause flag and wake parked workers
    pub fn resume(&self) {
        let _guard = self.lock.lock();
        self.paused.store(false, Ordering::SeqCst);
        self.wakeup.notify_all();
    }

    /// Clear the encoding flag and wake parked workers so they can exit
    pub fn halt(&self) {
        let _guard = self.lock.lock();
        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.wakeup.notify_all();
    }

    /// Whether worker loops should keep going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a pause is in effect
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Number of pauses since creation; repeated `pause` calls count once
    pub fn pause_count(&self) -> u64 {
        self.pauses.load(Ordering::SeqCst)
    }

    /// Park the calling thread until resumed or halted
    ///
    /// Returns `true` if the thread was parked, so the caller re-checks the
    /// running flag before doing more work.
    pub fn wait_while_paused(&self) -> bool {
        if !self.paused.load(Ordering::SeqCst) {
            return false;
        }

        let mut guard = self.lock.lock();
        while self.paused.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst) {
            self.wakeup.wait(&mut guard);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_not_paused_returns_immediately() {
        let gate = PauseGate::new();
        gate.start();
        assert!(gate.is_running());
        assert!(!gate.wait_while_paused());
    }

    #[test]
    fn test_pause_ignored_before_start() {
        let gate = PauseGate::new();
        gate.pause();
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_pause_count_tracks_distinct_pauses() {
        let gate = PauseGate::new();
        gate.pause();
        assert_eq!(gate.pause_count(), 0);

        gate.start();
        gate.pause();
        gate.pause();
        assert_eq!(gate.pause_count(), 1);

        gate.resume();
        gate.pause();
        gate.resume();
        assert_eq!(gate.pause_count(), 2);
        assert!(!gate.wait_while_paused());
    }

    #[test]
    fn test_resume_wakes_waiter() {
        let gate = Arc::new(PauseGate::new());
        gate.start();
        gate.pause();

        let worker_gate = gate.clone();
        let worker = thread::spawn(move || worker_gate.wait_while_paused());

        thread::sleep(Duration::from_millis(20));
        gate.resume();
        assert!(worker.join().unwrap());
        assert!(gate.is_running());
    }

    #[test]
    fn test_halt_wakes_paused_waiters() {
        let gate = Arc::new(PauseGate::new());
        gate.start();
        gate.pause();

        let started = Instant::now();
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || {
                    gate.wait_while_paused();
                    gate.is_running()
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        gate.halt();
        for worker in workers {
            assert!(!worker.join().unwrap());
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
