//! Shared stage arena with chain links.
//!
//! The graph owns every stage behind an `Arc` and records each stage's
//! predecessor and successor by [`StageId`]. Links are kept out of the
//! stages themselves so a stage can be shared by several pipelines while
//! keeping only the links it received first.
//!
//! Pulls never hold the arena lock while a stage runs: the stage handle is
//! cloned out, the lock is released, then `call` executes. This lets a
//! stage pull its predecessor (or arbitrary stages, for Merge) recursively.

use crate::error::{FrameChainError, Result};
use crate::pipeline::id::StageId;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::Tape;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// A stage and its chain links.
struct StageSlot {
    stage: Arc<dyn Stage>,
    prev: Option<StageId>,
    next: Option<StageId>,
}

/// Cheaply clonable handle to a shared stage arena.
#[derive(Clone, Default)]
pub struct Graph {
    slots: Arc<RwLock<Vec<StageSlot>>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<StageSlot>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<StageSlot>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a stage to the arena. Returns its StageId.
    pub fn insert<S: Stage + 'static>(&self, stage: S) -> StageId {
        self.insert_arc(Arc::new(stage))
    }

    /// Add an already shared stage to the arena.
    pub fn insert_arc(&self, stage: Arc<dyn Stage>) -> StageId {
        let mut slots = self.write();
        let id = StageId(slots.len() as u32);
        tracing::debug!("Inserted stage '{}' as {}", stage.name(), id);
        slots.push(StageSlot {
            stage,
            prev: None,
            next: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, id: StageId) -> bool {
        id.index() < self.read().len()
    }

    /// The stage stored at `id`.
    pub fn stage(&self, id: StageId) -> Option<Arc<dyn Stage>> {
        self.read().get(id.index()).map(|slot| slot.stage.clone())
    }

    pub fn name(&self, id: StageId) -> Option<String> {
        self.read()
            .get(id.index())
            .map(|slot| slot.stage.name().to_string())
    }

    pub fn prev(&self, id: StageId) -> Option<StageId> {
        self.read().get(id.index()).and_then(|slot| slot.prev)
    }

    pub fn next(&self, id: StageId) -> Option<StageId> {
        self.read().get(id.index()).and_then(|slot| slot.next)
    }

    /// Context for the stage at `id`.
    pub fn context(&self, id: StageId) -> StageContext {
        StageContext::new(self.clone(), id)
    }

    /// Wire `prev -> next`, filling each side's link only if it is unset.
    ///
    /// Returns whether `next` now has `prev` as its predecessor. A stage
    /// that already has a predecessor keeps it; this is how a shared
    /// stage retains its first wiring.
    pub fn link(&self, prev: StageId, next: StageId) -> Result<bool> {
        let mut slots = self.write();
        for id in [prev, next] {
            if id.index() >= slots.len() {
                return Err(FrameChainError::Config(format!("Unknown stage {}", id)));
            }
        }
        if prev == next {
            return Err(FrameChainError::Config(format!(
                "Cannot link stage {} to itself",
                prev
            )));
        }
        if would_create_cycle(&slots, prev, next) {
            return Err(FrameChainError::Config(format!(
                "Linking {} -> {} would create a cycle",
                prev, next
            )));
        }

        if slots[prev.index()].next.is_none() {
            slots[prev.index()].next = Some(next);
        }
        let slot = &mut slots[next.index()];
        match slot.prev {
            None => {
                slot.prev = Some(prev);
                Ok(true)
            }
            Some(existing) => {
                tracing::debug!(
                    "Stage {} keeps predecessor {} (ignoring {})",
                    next,
                    existing,
                    prev
                );
                Ok(existing == prev)
            }
        }
    }

    /// Pull the stage at `id` with `tape`.
    ///
    /// An unknown id yields `tape` plus an absent marker.
    pub fn pull(&self, id: StageId, tape: Tape) -> Tape {
        match self.stage(id) {
            Some(stage) => stage.call(&self.context(id), tape),
            None => {
                tracing::error!("Pull of unknown stage {}", id);
                let mut tape = tape;
                tape.push_absent();
                tape
            }
        }
    }

    /// Start the stage at `id`.
    pub fn start(&self, id: StageId, block: bool) -> Result<()> {
        let stage = self
            .stage(id)
            .ok_or_else(|| FrameChainError::Config(format!("Unknown stage {}", id)))?;
        stage.start(&self.context(id), block)
    }

    /// Stop the stage at `id`. Unknown ids are ignored.
    pub fn stop(&self, id: StageId) {
        if let Some(stage) = self.stage(id) {
            stage.stop();
        }
    }

    /// Wait on the stage at `id`. Returns whether it is still running.
    pub fn wait(&self, id: StageId, timeout: Option<Duration>) -> bool {
        self.stage(id).is_some_and(|stage| stage.wait(timeout))
    }
}

/// Whether `prev -> next` closes a loop, i.e. `next` is already an
/// ancestor of `prev`.
fn would_create_cycle(slots: &[StageSlot], prev: StageId, next: StageId) -> bool {
    let mut visited = vec![false; slots.len()];
    let mut current = Some(prev);
    while let Some(id) = current {
        if id == next {
            return true;
        }
        let idx = id.index();
        if idx >= slots.len() || visited[idx] {
            return false;
        }
        visited[idx] = true;
        current = slots[idx].prev;
    }
    false
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.read();
        f.debug_list()
            .entries(slots.iter().enumerate().map(|(i, slot)| {
                format!(
                    "{}{} prev={:?} next={:?}",
                    slot.stage.name(),
                    StageId(i as u32),
                    slot.prev,
                    slot.next
                )
            }))
            .finish()
    }
}
