// src/search/coordinator.rs
//! Worker coordination: a generation-counted barrier plus the stop and
//! shutdown flags.
//!
//! The controller broadcasts `generate_work(count)` to wake `count`
//! workers; each worker claims one item, runs its loop until the stop flag
//! flips, then checks back in with `on_work_item_completed`. Generations
//! keep a late worker from a previous round from stealing work meant for
//! the next one.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

struct CoordinatorState {
    generation: u64,
    work_items: usize,
    active: usize,
}

pub struct WorkCoordinator {
    state: Mutex<CoordinatorState>,
    work_available: Condvar,
    workers_idle: Condvar,
    stop: AtomicBool,
    shutdown: AtomicBool,
}

impl WorkCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                generation: 0,
                work_items: 0,
                active: 0,
            }),
            work_available: Condvar::new(),
            workers_idle: Condvar::new(),
            stop: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Controller: publish `count` work items under a fresh generation and
    /// wake the workers.
    pub fn generate_work(&self, count: usize) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.work_items = count;
        drop(state);
        self.work_available.notify_all();
    }

    /// Worker: park until an item from a generation newer than
    /// `last_generation` is available, then claim it. Returns false on
    /// shutdown.
    pub fn wait_for_work_items(&self, last_generation: &mut u64) -> bool {
        let mut state = self.state.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return false;
            }
            if state.generation > *last_generation && state.work_items > 0 {
                *last_generation = state.generation;
                state.work_items -= 1;
                state.active += 1;
                return true;
            }
            self.work_available.wait(&mut state);
        }
    }

    /// Worker: report the claimed item finished.
    pub fn on_work_item_completed(&self) {
        let mut state = self.state.lock();
        state.active -= 1;
        if state.active == 0 && state.work_items == 0 {
            self.workers_idle.notify_all();
        }
    }

    /// Controller: block until every published item has been claimed and
    /// completed.
    pub fn wait_for_workers(&self) {
        let mut state = self.state.lock();
        while state.active > 0 || state.work_items > 0 {
            self.workers_idle.wait(&mut state);
        }
    }

    #[inline]
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Cleared by the controller before each new round; the flag is sticky
    /// for the duration of a search.
    #[inline]
    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.shutdown.load(Ordering::Acquire)
    }

    /// Permanent: wakes everything and makes all waits fail.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.work_available.notify_all();
        self.workers_idle.notify_all();
    }

    #[inline]
    pub fn should_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for WorkCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn barrier_round_trip() {
        let coordinator = Arc::new(WorkCoordinator::new());
        let worker = {
            let coordinator = Arc::clone(&coordinator);
            std::thread::spawn(move || {
                let mut generation = 0;
                let mut rounds = 0;
                while coordinator.wait_for_work_items(&mut generation) {
                    rounds += 1;
                    coordinator.on_work_item_completed();
                }
                rounds
            })
        };

        coordinator.generate_work(1);
        coordinator.wait_for_workers();
        coordinator.generate_work(1);
        coordinator.wait_for_workers();
        coordinator.shut_down();
        assert_eq!(worker.join().unwrap(), 2);
    }

    #[test]
    fn stale_generation_is_not_reclaimed() {
        let coordinator = WorkCoordinator::new();
        coordinator.generate_work(1);
        let mut generation = 0;
        assert!(coordinator.wait_for_work_items(&mut generation));
        coordinator.on_work_item_completed();
        // The same generation must not hand out a second item.
        let mut stale = generation;
        coordinator.generate_work(1);
        assert!(coordinator.wait_for_work_items(&mut stale));
        assert_eq!(stale, generation + 1);
        coordinator.on_work_item_completed();
    }

    #[test]
    fn stop_flag_is_sticky_until_cleared() {
        let coordinator = WorkCoordinator::new();
        coordinator.request_stop();
        assert!(coordinator.should_stop());
        assert!(coordinator.should_stop());
        coordinator.clear_stop();
        assert!(!coordinator.should_stop());
    }
}
