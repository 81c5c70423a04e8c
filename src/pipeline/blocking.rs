//! Synchronous pipeline driver.
//!
//! Unlike [`Pipeline`](super::Pipeline), a blocking pipeline ignores chain
//! links: its background thread repeatedly threads a fresh tape through
//! every stage in insertion order and publishes the finished tape.

use crate::backend::slot::LatestSlot;
use crate::backend::worker::WorkerThread;
use crate::error::{FrameChainError, Result};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::Tape;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct BlockingPipeline {
    stages: Vec<Arc<dyn Stage>>,
    latest: Arc<LatestSlot<Tape>>,
    passes: Arc<AtomicU64>,
    worker: Mutex<Option<Arc<WorkerThread>>>,
}

impl BlockingPipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            latest: Arc::new(LatestSlot::new()),
            passes: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    pub fn add<S: Stage + 'static>(&mut self, stage: S) {
        self.stages.push(Arc::new(stage));
    }

    pub fn add_arc(&mut self, stage: Arc<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Tape produced by the most recent completed pass.
    pub fn latest(&self) -> Option<Tape> {
        self.latest.peek()
    }

    /// Completed passes so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one pass on the calling thread.
    pub fn run_once(&self) -> Tape {
        run_pass(&self.stages, &StageContext::standalone())
    }

    pub fn start(&self, block: bool) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| FrameChainError::Config("BlockingPipeline lock poisoned".to_string()))?;
        if worker.is_some() {
            return Err(FrameChainError::AlreadyStarted("BlockingPipeline".to_string()));
        }

        tracing::info!("Starting blocking pipeline ({} stages)", self.stages.len());
        let ctx = StageContext::standalone();
        for (pos, stage) in self.stages.iter().enumerate() {
            if let Err(e) = stage.start(&ctx, false) {
                tracing::error!(
                    "Blocking pipeline: stage '{}' failed to start: {}",
                    stage.name(),
                    e
                );
                for started in self.stages[..pos].iter() {
                    started.stop();
                }
                return Err(e);
            }
        }

        let stages = self.stages.clone();
        let latest = self.latest.clone();
        let passes = self.passes.clone();
        let spawned = WorkerThread::spawn("blocking-pipeline", move |stop| {
            while !stop.is_stopped() {
                latest.put(run_pass(&stages, &ctx));
                passes.fetch_add(1, Ordering::Relaxed);
                std::thread::yield_now();
            }
            tracing::info!("Stopped blocking pipeline");
        })?;
        *worker = Some(Arc::new(spawned));
        drop(worker);

        if block {
            self.wait(None);
        }
        Ok(())
    }

    /// Stop every stage, then the pass loop.
    pub fn stop(&self) {
        tracing::info!("Stopping blocking pipeline");
        for stage in &self.stages {
            stage.stop();
        }
        if let Some(worker) = self.worker.lock().ok().and_then(|w| w.clone()) {
            worker.request_stop();
        }
    }

    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.worker
            .lock()
            .ok()
            .and_then(|w| w.clone())
            .is_some_and(|w| w.wait(timeout))
    }
}

impl Default for BlockingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn run_pass(stages: &[Arc<dyn Stage>], ctx: &StageContext) -> Tape {
    stages
        .iter()
        .fold(Tape::new(), |tape, stage| stage.call(ctx, tape))
}
