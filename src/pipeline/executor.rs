//! Pipeline: chain builder and coordinated lifecycle.
//!
//! A pipeline records an ordered list of stages in a shared [`Graph`] and
//! wires `prev`/`next` links as stages are appended. It does no per-frame
//! work itself: pulls are driven by whoever polls the tail (typically a
//! viewer). Its own background activity is an idle keep-alive thread that
//! gives `start(block)` and `wait` something to block on.

use crate::backend::worker::WorkerThread;
use crate::error::{FrameChainError, Result};
use crate::pipeline::graph::Graph;
use crate::pipeline::id::StageId;
use crate::pipeline::stage::Stage;
use crate::pipeline::tape::Tape;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// An ordered chain of stages in a shared graph.
pub struct Pipeline {
    name: String,
    graph: Graph,
    stages: Vec<StageId>,
    keep_alive: Mutex<Option<Arc<WorkerThread>>>,
}

impl Pipeline {
    /// Create an empty pipeline over `graph`.
    pub fn new(graph: &Graph) -> Self {
        Self::with_name(graph, "pipeline")
    }

    pub fn with_name(graph: &Graph, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: graph.clone(),
            stages: Vec::new(),
            keep_alive: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    // ── Chain building ──

    /// Insert `stage` into the graph and append it to the chain.
    pub fn add<S: Stage + 'static>(&mut self, stage: S) -> StageId {
        self.add_arc(Arc::new(stage))
    }

    /// Insert a stage the caller keeps a handle to and append it.
    pub fn add_arc(&mut self, stage: Arc<dyn Stage>) -> StageId {
        let id = self.graph.insert_arc(stage);
        // A freshly inserted stage has no links and cannot close a cycle.
        if let Err(e) = self.append(id) {
            tracing::error!("Failed to wire new stage {}: {}", id, e);
        }
        id
    }

    /// Append a stage already present in the graph, e.g. one owned by
    /// another pipeline. Existing links are kept.
    pub fn add_existing(&mut self, id: StageId) -> Result<StageId> {
        if !self.graph.contains(id) {
            return Err(FrameChainError::Config(format!(
                "Pipeline '{}': unknown stage {}",
                self.name, id
            )));
        }
        self.append(id)?;
        Ok(id)
    }

    fn append(&mut self, id: StageId) -> Result<()> {
        if let Some(&tail) = self.stages.last() {
            self.graph.link(tail, id)?;
        }
        self.stages.push(id);
        Ok(())
    }

    /// Stages in insertion order.
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    pub fn head(&self) -> Option<StageId> {
        self.stages.first().copied()
    }

    pub fn tail(&self) -> Option<StageId> {
        self.stages.last().copied()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Pull the tail stage with an empty tape.
    pub fn pull(&self) -> Tape {
        match self.tail() {
            Some(tail) => self.graph.pull(tail, Tape::new()),
            None => Tape::new(),
        }
    }

    // ── Lifecycle ──

    /// Start every stage in insertion order, non-blocking, then the
    /// keep-alive thread. With `block`, returns once the keep-alive ends.
    ///
    /// If a stage fails to start, the stages already started are stopped
    /// again and the error is returned.
    pub fn start(&self, block: bool) -> Result<()> {
        let mut keep_alive = self
            .keep_alive
            .lock()
            .map_err(|_| FrameChainError::Config("Pipeline lock poisoned".to_string()))?;
        if keep_alive.is_some() {
            return Err(FrameChainError::AlreadyStarted(self.name.clone()));
        }

        tracing::info!("Starting pipeline '{}' ({} stages)", self.name, self.stages.len());
        for (pos, &id) in self.stages.iter().enumerate() {
            tracing::debug!(
                "Starting {}{}",
                self.graph.name(id).unwrap_or_default(),
                id
            );
            if let Err(e) = self.graph.start(id, false) {
                tracing::error!("Pipeline '{}': stage {} failed to start: {}", self.name, id, e);
                for &started in self.stages[..pos].iter() {
                    self.graph.stop(started);
                }
                return Err(e);
            }
        }

        let worker = WorkerThread::spawn(format!("{}-keepalive", self.name), |stop| {
            while !stop.sleep(KEEP_ALIVE_INTERVAL) {}
        })?;
        *keep_alive = Some(Arc::new(worker));
        drop(keep_alive);
        tracing::info!("Started pipeline '{}'", self.name);

        if block {
            self.wait(None);
        }
        Ok(())
    }

    fn keep_alive(&self) -> Option<Arc<WorkerThread>> {
        self.keep_alive.lock().ok().and_then(|guard| guard.clone())
    }

    /// Stop every stage in insertion order, then the keep-alive thread.
    /// Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        tracing::info!("Stopping pipeline '{}'", self.name);
        for &id in &self.stages {
            self.graph.stop(id);
        }
        if let Some(worker) = self.keep_alive() {
            worker.request_stop();
        }
    }

    /// Wait on the keep-alive thread. Returns whether it is still running.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let Some(worker) = self.keep_alive() else {
            return false;
        };
        let still_running = worker.wait(timeout);
        if !still_running {
            tracing::info!("Stopped pipeline '{}'", self.name);
        }
        still_running
    }

    /// Whether the keep-alive thread is running.
    pub fn is_running(&self) -> bool {
        self.keep_alive()
            .is_some_and(|worker| worker.is_running())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(worker) = self.keep_alive() {
            worker.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::StageContext;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counted {
        name: &'static str,
        starts: Arc<AtomicU32>,
        stops: Arc<AtomicU32>,
        fail_start: bool,
    }

    impl Counted {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                starts: Arc::new(AtomicU32::new(0)),
                stops: Arc::new(AtomicU32::new(0)),
                fail_start: false,
            }
        }
    }

    impl Stage for Counted {
        fn name(&self) -> &str {
            self.name
        }

        fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
            ctx.upstream(tape).with(self.name)
        }

        fn start(&self, _ctx: &StageContext, _block: bool) -> Result<()> {
            if self.fail_start {
                return Err(FrameChainError::Config("refused".to_string()));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_wires_chain_in_order() {
        let graph = Graph::new();
        let mut pipeline = Pipeline::new(&graph);
        let a = pipeline.add(Counted::new("a"));
        let b = pipeline.add(Counted::new("b"));
        let c = pipeline.add(Counted::new("c"));

        assert_eq!(graph.prev(a), None);
        assert_eq!(graph.prev(b), Some(a));
        assert_eq!(graph.prev(c), Some(b));
        assert_eq!(graph.next(a), Some(b));
        assert_eq!(pipeline.head(), Some(a));
        assert_eq!(pipeline.tail(), Some(c));

        let tape = pipeline.pull();
        let labels: Vec<_> = (0..3).map(|i| tape.text(i).unwrap()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_shared_stage_keeps_first_wiring() {
        let graph = Graph::new();
        let mut first = Pipeline::with_name(&graph, "first");
        let capture = first.add(Counted::new("capture"));
        let shared = first.add(Counted::new("shared"));

        let mut second = Pipeline::with_name(&graph, "second");
        second.add(Counted::new("other"));
        second.add_existing(shared).unwrap();

        assert_eq!(graph.prev(shared), Some(capture));
        assert!(second.add_existing(StageId(42)).is_err());
    }

    #[test]
    fn test_lifecycle_starts_and_stops_all_stages() {
        let graph = Graph::new();
        let mut pipeline = Pipeline::new(&graph);
        let stage = Counted::new("a");
        let (starts, stops) = (stage.starts.clone(), stage.stops.clone());
        pipeline.add(stage);

        pipeline.start(false).unwrap();
        assert!(pipeline.is_running());
        assert!(pipeline.wait(Some(Duration::from_millis(10))));
        assert!(matches!(
            pipeline.start(false),
            Err(FrameChainError::AlreadyStarted(_))
        ));

        pipeline.stop();
        assert!(!pipeline.wait(Some(Duration::from_secs(5))));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        // A second stop is harmless.
        pipeline.stop();
    }

    #[test]
    fn test_start_failure_stops_started_stages() {
        let graph = Graph::new();
        let mut pipeline = Pipeline::new(&graph);
        let good = Counted::new("good");
        let stops = good.stops.clone();
        pipeline.add(good);
        let mut bad = Counted::new("bad");
        bad.fail_start = true;
        pipeline.add(bad);

        let err = pipeline.start(false).unwrap_err();
        assert!(err.is_config());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_stop_before_start_is_harmless() {
        let graph = Graph::new();
        let pipeline = Pipeline::new(&graph);
        pipeline.stop();
        assert!(!pipeline.wait(Some(Duration::from_millis(1))));
        assert!(pipeline.pull().is_empty());
    }
}
