//! Execution backends for buffered stages
//!
//! A [`Buffer`](crate::pipeline::stages::Buffer) runs its wrapped stage
//! off the caller's thread. This module holds the machinery it uses:
//!
//! - [`WorkerThread`] - A named thread with a cooperative stop flag
//! - [`LatestSlot`] - Single-value, overwrite-on-put handoff between threads
//! - [`StageRegistry`] - Named stage factories, so a stage can be rebuilt
//!   inside another process from a serializable [`StageSpec`]
//! - [`SidecarClient`] - Runs a stage in a child process over a framed
//!   stdin/stdout protocol
//!
//! # Example
//!
//! ```ignore
//! use framechain::backend::{StageRegistry, StageSpec};
//!
//! let registry = StageRegistry::with_builtins();
//! let stage = registry.build(&StageSpec::bare("test_pattern"))?;
//! ```

pub mod registry;
pub mod sidecar;
pub mod slot;
pub mod worker;

pub use registry::{StageFactory, StageRegistry, StageSpec};
pub use sidecar::{is_worker_process, serve_stdio, SidecarClient, SidecarOptions};
pub use slot::LatestSlot;
pub use worker::{StopSignal, WorkerThread};
