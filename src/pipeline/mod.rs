//! Pull-based stage chains.
//!
//! Stages extend a shared [`Tape`] when pulled. A chain is pulled from its
//! tail: each stage first pulls its predecessor with an empty tape, then
//! appends its own contribution on the way back.
//!
//! # Architecture
//!
//! ```text
//! [Source] ─► [Buffer(detector)] ─► [Inlay] ─► [Trigger] ─► [Viewer]
//!                 │                                 │
//!            worker thread                    pacing thread
//!            or sidecar process
//! ```
//!
//! # Design
//!
//! - **Arena graph**: stages live in a shared [`Graph`] addressed by
//!   [`StageId`]; `prev`/`next` links are stored beside them, so one stage
//!   can be shared by several pipelines.
//! - **Latest wins**: [`Buffer`](stages::Buffer) and
//!   [`Trigger`](stages::Trigger) publish through single slots, never queues.
//! - **Absence is data**: missing inputs become [`Artifact::Absent`],
//!   keeping positional addressing stable.

pub mod blocking;
pub mod executor;
pub mod graph;
pub mod id;
pub mod stage;
pub mod stages;
pub mod tape;

pub use blocking::BlockingPipeline;
pub use executor::Pipeline;
pub use graph::Graph;
pub use id::StageId;
pub use stage::{Stage, StageContext};
pub use tape::{Artifact, Frame, Tape};
