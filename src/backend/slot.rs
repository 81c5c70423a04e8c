//! Single-slot latest-value cell.
//!
//! `LatestSlot` holds at most one value. Writers overwrite whatever is
//! pending, readers either take the value (leaving the slot empty) or clone
//! it. Blocking readers sleep on a condition variable instead of polling,
//! and are released when the slot is closed.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct SlotState<T> {
    value: Option<T>,
    generation: u64,
    closed: bool,
}

/// A latest-wins, capacity-one cell shared between a caller and a worker.
pub struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    changed: Condvar,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                generation: 0,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `value`, replacing any pending one. Returns the new generation.
    pub fn put(&self, value: T) -> u64 {
        let mut state = self.lock();
        state.value = Some(value);
        state.generation += 1;
        let generation = state.generation;
        drop(state);
        self.changed.notify_all();
        generation
    }

    /// Take the pending value, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when the slot is closed while empty.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Whether a value is currently held.
    pub fn has_value(&self) -> bool {
        self.lock().value.is_some()
    }

    /// Number of `put` calls so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Release all blocked readers; subsequent blocking reads return
    /// immediately once the slot is empty.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }
}

impl<T: Clone> LatestSlot<T> {
    /// Clone the held value without removing it.
    pub fn peek(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Clone the held value, blocking until one exists.
    ///
    /// `None` timeout waits indefinitely. Returns `None` on timeout or when
    /// the slot is closed while still empty.
    pub fn wait_filled(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.as_ref() {
                return Some(value.clone());
            }
            if state.closed {
                return None;
            }
            state = match deadline {
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.changed
                        .wait_timeout(state, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
            };
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
