//! Buffer: rate decoupling around a slow stage.
//!
//! A Buffer hands each incoming tape to a background worker running the
//! wrapped stage and immediately answers with the most recent completed
//! output. Both sides of the hand-off are single slots: a newer input
//! replaces a pending one, and a newer output replaces the previous one.
//! Staleness is therefore bounded by one in-flight computation.
//!
//! The worker is either a thread in this process or a sidecar process
//! (see [`crate::backend::sidecar`]). Stages that must be constructed in
//! the worker's own address space are given as a [`StageSpec`].
//!
//! Until the first output exists, a call with a non-empty tape answers
//! with the configured [`Fallback`] entries. A call with an empty tape
//! (the Buffer heads a sub-chain) blocks until the first output arrives,
//! or until the worker stops or fails, in which case it appends Absent.

use crate::backend::registry::{StageRegistry, StageSpec};
use crate::backend::sidecar::{SidecarClient, SidecarOptions};
use crate::backend::slot::LatestSlot;
use crate::backend::worker::{StopSignal, WorkerThread};
use crate::error::{FrameChainError, Result};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Tape};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long the worker waits for input before re-checking its stop flag.
const INPUT_POLL: Duration = Duration::from_millis(50);

/// One synthetic entry appended while no output exists yet.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackEntry {
    /// Duplicate the incoming entry at this position.
    Copy(isize),
    /// Constant annotation.
    Text(String),
    /// Absent marker.
    Absent,
}

/// Entries appended during warm-up. Defaults to a copy of the last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback(Vec<FallbackEntry>);

impl Fallback {
    /// Duplicate the entry at `index`.
    pub fn index(index: isize) -> Self {
        Self(vec![FallbackEntry::Copy(index)])
    }

    pub fn entries(entries: impl IntoIterator<Item = FallbackEntry>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// A single absent marker.
    pub fn absent() -> Self {
        Self(vec![FallbackEntry::Absent])
    }

    fn apply(&self, name: &str, tape: &mut Tape) {
        let incoming = tape.len();
        let mut appended = Vec::with_capacity(self.0.len().max(1));
        for entry in &self.0 {
            appended.push(match entry {
                FallbackEntry::Copy(index) => {
                    // Positions refer to the incoming tape, not to entries
                    // appended by earlier fallback entries.
                    let resolved = if *index < 0 {
                        let absolute = incoming as isize + index;
                        (absolute >= 0).then_some(absolute as usize)
                    } else {
                        Some(*index as usize).filter(|&i| i < incoming)
                    };
                    match resolved.and_then(|i| tape.entries().get(i)) {
                        Some(artifact) => artifact.clone(),
                        None => {
                            tracing::error!(
                                "{}: {}",
                                name,
                                FrameChainError::InvalidIndex {
                                    index: *index,
                                    len: incoming
                                }
                            );
                            Artifact::Absent
                        }
                    }
                }
                FallbackEntry::Text(text) => Artifact::text(text.as_str()),
                FallbackEntry::Absent => Artifact::Absent,
            });
        }
        if appended.is_empty() {
            appended.push(Artifact::Absent);
        }
        tape.extend(appended);
    }
}

impl Default for Fallback {
    fn default() -> Self {
        Self::index(-1)
    }
}

/// Where the wrapped stage executes.
#[derive(Debug, Clone, Default)]
pub enum Isolation {
    /// A background thread in this process.
    #[default]
    Thread,
    /// A sidecar process.
    Process(SidecarOptions),
}

/// The wrapped stage, or how to build it.
pub enum WrappedStage {
    Prebuilt(Box<dyn Stage>),
    Deferred(StageSpec),
}

/// Output of one unit of work, with the length of the tape it was
/// computed from.
#[derive(Clone)]
struct Completed {
    input_len: usize,
    tape: Tape,
}

struct Shared {
    input: LatestSlot<Tape>,
    output: LatestSlot<Completed>,
    failed: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn fail(&self, name: &str, message: String) {
        tracing::error!("{}: worker failed: {}", name, message);
        self.failed.store(true, Ordering::SeqCst);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message);
        }
    }
}

/// Releases warm-up waiters however the worker body ends.
struct ExitGuard {
    shared: Arc<Shared>,
    name: String,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shared.fail(&self.name, "wrapped stage panicked".to_string());
        }
        self.shared.output.close();
    }
}

/// Snapshot of a Buffer's hand-off counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    /// Inputs handed to the slot, including overwritten ones.
    pub staged: u64,
    /// Outputs produced by the worker.
    pub completed: u64,
}

/// Latest-wins cache in front of a slow stage.
pub struct Buffer {
    name: String,
    wrapped: Mutex<Option<WrappedStage>>,
    fallback: Fallback,
    isolation: Isolation,
    registry: Arc<StageRegistry>,
    shared: Arc<Shared>,
    /// In-process wrapped stage, kept for stop/wait delegation.
    local: Mutex<Option<Arc<dyn Stage>>>,
    worker: Mutex<Option<Arc<WorkerThread>>>,
    sidecar_pid: Mutex<Option<u32>>,
}

impl Buffer {
    /// Buffer around a constructed stage, run on a thread.
    pub fn new<S: Stage + 'static>(stage: S) -> Self {
        let name = format!("Buffer({})", stage.name());
        Self::with_wrapped(name, WrappedStage::Prebuilt(Box::new(stage)))
    }

    /// Buffer around a stage built by the worker from `spec`.
    pub fn deferred(spec: StageSpec) -> Self {
        let name = format!("Buffer({})", spec.factory);
        Self::with_wrapped(name, WrappedStage::Deferred(spec))
    }

    fn with_wrapped(name: String, wrapped: WrappedStage) -> Self {
        Self {
            name,
            wrapped: Mutex::new(Some(wrapped)),
            fallback: Fallback::default(),
            isolation: Isolation::Thread,
            registry: Arc::new(StageRegistry::with_builtins()),
            shared: Arc::new(Shared {
                input: LatestSlot::new(),
                output: LatestSlot::new(),
                failed: AtomicBool::new(false),
                last_error: Mutex::new(None),
            }),
            local: Mutex::new(None),
            worker: Mutex::new(None),
            sidecar_pid: Mutex::new(None),
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Warm-up fallback duplicating the entry at `index`.
    pub fn with_default_index(self, index: isize) -> Self {
        self.with_fallback(Fallback::index(index))
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Run the wrapped stage in a sidecar process.
    pub fn isolated(self, options: SidecarOptions) -> Self {
        self.with_isolation(Isolation::Process(options))
    }

    /// Registry used to build deferred stages on a thread.
    pub fn with_registry(mut self, registry: Arc<StageRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            staged: self.shared.input.generation(),
            completed: self.shared.output.generation(),
        }
    }

    /// Whether at least one output has been produced.
    pub fn is_warm(&self) -> bool {
        self.shared.output.has_value()
    }

    /// Whether the worker ended on an error.
    pub fn has_failed(&self) -> bool {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Message of the error that ended the worker, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Process id of the sidecar hosting the wrapped stage, when isolated.
    pub fn sidecar_pid(&self) -> Option<u32> {
        self.sidecar_pid.lock().ok().and_then(|pid| *pid)
    }

    fn worker(&self) -> Option<Arc<WorkerThread>> {
        self.worker.lock().ok().and_then(|guard| guard.clone())
    }

    /// Worker started, not stopped, not failed.
    fn is_active(&self) -> bool {
        self.worker()
            .is_some_and(|w| !w.is_stop_requested() && w.is_running())
            && !self.has_failed()
    }

    fn append_output(&self, tape: &mut Tape, completed: &Completed) {
        let contribution = completed.tape.tail_from(completed.input_len);
        if contribution.is_empty() {
            tape.push_absent();
        } else {
            tape.extend(contribution);
        }
    }

    fn spawn_thread_worker(&self, ctx: &StageContext, stage: Arc<dyn Stage>) -> Result<WorkerThread> {
        let shared = self.shared.clone();
        let name = self.name.clone();
        let ctx = ctx.detach();
        WorkerThread::spawn(self.name.clone(), move |stop| {
            let _guard = ExitGuard {
                shared: shared.clone(),
                name: name.clone(),
            };
            run_loop(&shared, &stop, |input| Ok(stage.call(&ctx, input)), &name);
        })
    }

    fn spawn_process_worker(&self, mut client: SidecarClient) -> Result<WorkerThread> {
        let shared = self.shared.clone();
        let name = self.name.clone();
        WorkerThread::spawn(self.name.clone(), move |stop| {
            let _guard = ExitGuard {
                shared: shared.clone(),
                name: name.clone(),
            };
            run_loop(&shared, &stop, |input| client.call(&input), &name);
            client.shutdown();
        })
    }
}

/// Worker body: take the pending input, run it, publish the output.
fn run_loop<F>(shared: &Shared, stop: &StopSignal, mut process: F, name: &str)
where
    F: FnMut(Tape) -> Result<Tape>,
{
    tracing::debug!("{}: worker running", name);
    while !stop.is_stopped() {
        let Some(input) = shared.input.take_timeout(INPUT_POLL) else {
            continue;
        };
        let input_len = input.len();
        match process(input) {
            Ok(tape) => {
                shared.output.put(Completed { input_len, tape });
            }
            Err(e) => {
                shared.fail(name, e.to_string());
                break;
            }
        }
    }
    tracing::debug!("{}: worker exiting", name);
}

impl Stage for Buffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let mut tape = ctx.upstream(tape);
        self.shared.input.put(tape.clone());

        let completed = match self.shared.output.peek() {
            Some(completed) => Some(completed),
            None if tape.is_empty() => {
                if self.is_active() {
                    tracing::debug!("{}: waiting for first output", self.name);
                    self.shared.output.wait_filled(None)
                } else {
                    None
                }
            }
            None => None,
        };

        match completed {
            Some(completed) => self.append_output(&mut tape, &completed),
            None if tape.is_empty() => {
                tracing::error!("{}: no output available and worker is not running", self.name);
                tape.push_absent();
            }
            None => self.fallback.apply(&self.name, &mut tape),
        }
        tape
    }

    fn start(&self, ctx: &StageContext, block: bool) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| FrameChainError::Config(format!("{}: lock poisoned", self.name)))?;
        if worker.is_some() {
            tracing::info!("{} already started", self.name);
            return Ok(());
        }
        let wrapped = self
            .wrapped
            .lock()
            .ok()
            .and_then(|mut w| w.take())
            .ok_or_else(|| FrameChainError::AlreadyStarted(self.name.clone()))?;

        tracing::info!("Starting {}", self.name);
        let spawned = match (&self.isolation, wrapped) {
            (Isolation::Thread, wrapped) => {
                let stage: Arc<dyn Stage> = match wrapped {
                    WrappedStage::Prebuilt(stage) => Arc::from(stage),
                    WrappedStage::Deferred(spec) => Arc::from(self.registry.build(&spec)?),
                };
                stage.start(&ctx.detach(), false)?;
                if let Ok(mut local) = self.local.lock() {
                    *local = Some(stage.clone());
                }
                self.spawn_thread_worker(ctx, stage)?
            }
            (Isolation::Process(_), WrappedStage::Prebuilt(stage)) => {
                return Err(FrameChainError::Config(format!(
                    "{}: a constructed stage ('{}') cannot be moved into another process; \
                     pass a StageSpec instead",
                    self.name,
                    stage.name()
                )));
            }
            (Isolation::Process(options), WrappedStage::Deferred(spec)) => {
                let client = SidecarClient::launch(options, &spec)?;
                if let Ok(mut pid) = self.sidecar_pid.lock() {
                    *pid = Some(client.id());
                }
                self.spawn_process_worker(client)?
            }
        };
        *worker = Some(Arc::new(spawned));
        drop(worker);
        tracing::info!("Started {}", self.name);

        if block {
            self.wait(None);
        }
        Ok(())
    }

    fn stop(&self) {
        let Some(worker) = self.worker() else {
            return;
        };
        if worker.is_stop_requested() {
            return;
        }
        tracing::info!("Stopping {}", self.name);
        worker.request_stop();
        self.shared.input.close();
        // Release warm-up waiters now rather than after the in-flight call.
        self.shared.output.close();
        if let Some(local) = self.local.lock().ok().and_then(|l| l.clone()) {
            local.stop();
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        if let Some(local) = self.local.lock().ok().and_then(|l| l.clone()) {
            local.wait(timeout);
        }
        let still_running = self.worker().is_some_and(|w| w.wait(timeout));
        if !still_running {
            tracing::debug!("{} stopped", self.name);
        }
        still_running
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker() {
            worker.request_stop();
            self.shared.input.close();
            self.shared.output.close();
        }
    }
}
