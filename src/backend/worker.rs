//! Background worker thread lifecycle
//!
//! Every stage that owns background activity (Buffer, Trigger, Pipeline
//! keep-alive, BlockingPipeline) runs it on a [`WorkerThread`]. The worker
//! observes an in-place mutated atomic stop flag, and can be woken early
//! from timed sleeps when a stop is requested.
//!
//! # Waiting
//!
//! `wait(timeout)` reports whether the thread is *still running* after the
//! timeout. Completion is observed through a channel whose only sender is
//! dropped when the worker body returns (or unwinds), so a panicking worker
//! is reported as finished rather than hanging its waiters.

use crate::error::{FrameChainError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Cooperative stop flag handed to worker bodies.
#[derive(Clone)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl StopSignal {
    /// Whether a stop has been requested.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for up to `duration`, returning early when a stop is requested.
    ///
    /// Returns `true` if the worker should stop.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        if !duration.is_zero() {
            // Nothing is ever sent; the wake channel only disconnects.
            let _ = self.wake.recv_timeout(duration);
        }
        self.is_stopped()
    }
}

/// A named background thread with a stop flag and timed wait.
pub struct WorkerThread {
    name: String,
    flag: Arc<AtomicBool>,
    wake_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Spawn a worker running `body` until it returns.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let name = name.into();
        let flag = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = bounded::<()>(0);

        let signal = StopSignal {
            flag: flag.clone(),
            wake: wake_rx,
        };

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _done = done_tx;
                body(signal);
            })
            .map_err(|e| {
                FrameChainError::Io(e).with_context(format!("Failed to spawn thread '{}'", name))
            })?;

        tracing::debug!("Spawned worker thread '{}'", name);

        Ok(Self {
            name,
            flag,
            wake_tx: Mutex::new(Some(wake_tx)),
            done_rx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to stop. Idempotent and non-blocking.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Ok(mut tx) = self.wake_tx.lock() {
            tx.take();
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Whether the worker body is still executing.
    pub fn is_running(&self) -> bool {
        matches!(self.done_rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Block up to `timeout` (forever when `None`) for the worker to finish.
    ///
    /// Returns whether the worker is still running.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let still_running = match timeout {
            None => {
                let _ = self.done_rx.recv();
                false
            }
            Some(t) => matches!(self.done_rx.recv_timeout(t), Err(RecvTimeoutError::Timeout)),
        };

        if !still_running {
            self.reap();
        }
        still_running
    }

    fn reap(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Worker thread '{}' panicked", self.name);
            } else {
                tracing::debug!("Worker thread '{}' joined", self.name);
            }
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.request_stop();
    }
}
