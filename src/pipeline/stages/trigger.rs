//! Trigger: paced polling of an upstream chain.
//!
//! The trigger pulls its predecessor on a background thread at a target
//! rate and republishes the latest result. Its own callers never wait on
//! the upstream chain after the first result exists.

use crate::backend::slot::LatestSlot;
use crate::backend::worker::WorkerThread;
use crate::config::{TriggerSettings, DEFAULT_REPORT_INTERVAL_SECS, DEFAULT_TRIGGER_RATE_HZ};
use crate::error::{FrameChainError, Result};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::Tape;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Remaining waits shorter than this are spun instead of slept.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Pacing stage that decouples a consumer's pull rate from its upstream.
pub struct Trigger {
    name: String,
    period: Option<Duration>,
    report_interval: Duration,
    latest: Arc<LatestSlot<Tape>>,
    iterations: Arc<AtomicU64>,
    worker: Mutex<Option<Arc<WorkerThread>>>,
}

impl Trigger {
    /// Trigger targeting `rate_hz` pulls per second. A non-positive rate,
    /// or one too small to express as a period, pulls as fast as the
    /// upstream allows.
    pub fn new(rate_hz: f64) -> Self {
        let period = if rate_hz.is_finite() && rate_hz > 0.0 {
            let period = Duration::try_from_secs_f64(1.0 / rate_hz).ok();
            if period.is_none() {
                tracing::warn!(
                    "Trigger rate {} Hz has no representable period; running unpaced",
                    rate_hz
                );
            }
            period
        } else {
            None
        };
        Self {
            name: "Trigger".to_string(),
            period,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            latest: Arc::new(LatestSlot::new()),
            iterations: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &TriggerSettings) -> Self {
        Self::new(settings.rate_hz)
            .with_report_interval(Duration::from_secs(settings.report_interval_secs))
    }

    /// Interval between achieved-rate log lines; zero disables them.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Target period between pulls, if paced.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Upstream pulls completed so far.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    fn worker(&self) -> Option<Arc<WorkerThread>> {
        self.worker.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_RATE_HZ)
    }
}

impl Stage for Trigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, _ctx: &StageContext, tape: Tape) -> Tape {
        if let Some(latest) = self.latest.peek() {
            return latest;
        }
        let running = self
            .worker()
            .is_some_and(|w| !w.is_stop_requested() && w.is_running());
        match running.then(|| self.latest.wait_filled(None)).flatten() {
            Some(latest) => latest,
            None => {
                tracing::warn!("{}: no result available and not running", self.name);
                let mut tape = tape;
                tape.push_absent();
                tape
            }
        }
    }

    fn start(&self, ctx: &StageContext, block: bool) -> Result<()> {
        let prev = ctx.prev().ok_or_else(|| FrameChainError::MissingPredecessor {
            stage: ctx.label(&self.name),
        })?;

        let mut worker = self
            .worker
            .lock()
            .map_err(|_| FrameChainError::Config(format!("{}: lock poisoned", self.name)))?;
        if worker.is_some() {
            tracing::info!("{} already started", self.name);
            return Ok(());
        }

        tracing::info!("Starting {}", ctx.label(&self.name));
        let graph = ctx.graph().clone();
        let latest = self.latest.clone();
        let iterations = self.iterations.clone();
        let period = self.period;
        let report_interval = self.report_interval;
        let name = self.name.clone();

        let spawned = WorkerThread::spawn(ctx.label(&self.name), move |stop| {
            let mut window_start = Instant::now();
            let mut window_iters = 0u64;

            while !stop.is_stopped() {
                let tick = Instant::now();
                latest.put(graph.pull(prev, Tape::new()));
                iterations.fetch_add(1, Ordering::Relaxed);
                window_iters += 1;

                let elapsed = window_start.elapsed();
                if !report_interval.is_zero() && elapsed >= report_interval {
                    tracing::info!(
                        "{}: {:.2} iters/s",
                        name,
                        window_iters as f64 / elapsed.as_secs_f64()
                    );
                    window_start = Instant::now();
                    window_iters = 0;
                }

                // Sleep the remainder of the period; a slow upstream simply
                // lowers the achieved rate.
                let Some(period) = period else {
                    std::thread::yield_now();
                    continue;
                };
                let deadline = tick + period;
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining > SPIN_THRESHOLD && stop.sleep(remaining - SPIN_THRESHOLD / 2) {
                    break;
                }
                while Instant::now() < deadline {
                    std::hint::spin_loop();
                }
            }
            latest.close();
        })?;
        *worker = Some(Arc::new(spawned));
        drop(worker);
        tracing::info!("Started {}", self.name);

        if block {
            self.wait(None);
        }
        Ok(())
    }

    fn stop(&self) {
        if let Some(worker) = self.worker() {
            tracing::info!("Stopping {}", self.name);
            worker.request_stop();
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        self.worker().is_some_and(|w| w.wait(timeout))
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        if let Some(worker) = self.worker() {
            worker.request_stop();
        }
    }
}
