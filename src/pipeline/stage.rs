//! Stage abstraction for pull chains.
//!
//! A stage is any unit that extends a tape when pulled and has explicit
//! lifecycle control. Sources, heavy transforms, compositors, buffers and
//! triggers all implement [`Stage`]. Chain links are not stored on the
//! stage: they live in the [`Graph`] arena and are reached through the
//! [`StageContext`] handed to every call.

use crate::error::Result;
use crate::pipeline::graph::Graph;
use crate::pipeline::id::StageId;
use crate::pipeline::tape::Tape;
use std::time::Duration;

/// The capability contract shared by every stage.
pub trait Stage: Send + Sync {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Extend `tape` with this stage's contribution.
    ///
    /// Stages with a predecessor first replace the incoming tape with the
    /// predecessor's output via [`StageContext::upstream`]. Every call must
    /// append at least one entry, using [`Artifact::Absent`] when there is
    /// nothing to contribute.
    ///
    /// [`Artifact::Absent`]: crate::pipeline::Artifact::Absent
    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape;

    /// Acquire resources and begin background activity. With `block` the
    /// call returns only once that activity has terminated.
    fn start(&self, _ctx: &StageContext, _block: bool) -> Result<()> {
        Ok(())
    }

    /// Signal background activity to end and release resources.
    fn stop(&self) {}

    /// Block up to `timeout` for background activity to end.
    ///
    /// Returns whether the stage is still running.
    fn wait(&self, _timeout: Option<Duration>) -> bool {
        false
    }
}

/// Per-call view of the graph from one stage's position.
#[derive(Clone)]
pub struct StageContext {
    graph: Graph,
    id: Option<StageId>,
}

impl StageContext {
    /// Context for the stage stored at `id` in `graph`.
    pub fn new(graph: Graph, id: StageId) -> Self {
        Self {
            graph,
            id: Some(id),
        }
    }

    /// Context with access to `graph` but no position in it, so no
    /// predecessor. Used for stages wrapped by a Buffer.
    pub fn detached(graph: Graph) -> Self {
        Self { graph, id: None }
    }

    /// Context over an empty private graph.
    pub fn standalone() -> Self {
        Self::detached(Graph::new())
    }

    pub fn id(&self) -> Option<StageId> {
        self.id
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The predecessor of this stage, if any.
    pub fn prev(&self) -> Option<StageId> {
        self.id.and_then(|id| self.graph.prev(id))
    }

    /// The successor of this stage, if any.
    pub fn next(&self) -> Option<StageId> {
        self.id.and_then(|id| self.graph.next(id))
    }

    /// The tape this stage should work on: its predecessor's output for an
    /// empty pull when it has one, otherwise `tape` itself.
    pub fn upstream(&self, tape: Tape) -> Tape {
        match self.prev() {
            Some(prev) => self.graph.pull(prev, Tape::new()),
            None => tape,
        }
    }

    /// Pull an arbitrary stage with an empty tape.
    pub fn pull(&self, id: StageId) -> Tape {
        self.graph.pull(id, Tape::new())
    }

    /// The same graph without a position.
    pub fn detach(&self) -> StageContext {
        Self::detached(self.graph.clone())
    }

    /// `name#id` label for log lines.
    pub fn label(&self, name: &str) -> String {
        match self.id {
            Some(id) => format!("{}{}", name, id),
            None => name.to_string(),
        }
    }
}
