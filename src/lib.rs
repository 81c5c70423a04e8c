//! # framechain: rate-decoupled pull chains for live media
//!
//! Stages are small units that take a tape (an ordered list of artifacts:
//! images, text, or absent markers) and append their own results to it.
//! Stages are linked into chains that are evaluated by pulling from the
//! tail: each stage pulls its predecessor for a fresh tape, then appends.
//!
//! ## Architecture
//!
//! - **Pipeline**: [`Graph`](pipeline::Graph) arena of stages with
//!   predecessor/successor links, and [`Pipeline`](pipeline::Pipeline) to
//!   build and start a linear chain
//! - **Buffer**: runs a slow stage on its own thread or in a sidecar
//!   process and answers immediately with the most recent result
//! - **Trigger**: pulls its predecessor at a fixed rate so a chain runs
//!   continuously
//! - **Compositors**: picture-in-picture ([`Inlay`](pipeline::stages::Inlay)),
//!   [`SideBySide`](pipeline::stages::SideBySide), and
//!   [`Merge`](pipeline::stages::Merge) of two branches
//! - **Communication**: single-value latest-wins slots between threads, a
//!   length-prefixed postcard protocol across processes
//!
//! ## Configuration
//!
//! File-backed settings for the binary live under `dev.framechain` in the
//! platform config directory; see [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use framechain::pipeline::{stages::{Buffer, Inlay, Trigger, Viewer}, Graph, Pipeline};
//! use framechain::processors::SlowDetector;
//! use framechain::sources::TestPattern;
//! use std::time::Duration;
//!
//! let graph = Graph::new();
//! let mut chain = Pipeline::new(&graph);
//! chain.add(TestPattern::new(640, 480));
//! chain.add(Buffer::new(SlowDetector::new(Duration::from_millis(200))));
//! chain.add(Inlay::default());
//! chain.add(Trigger::new(30.0));
//! chain.start(false)?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod imaging;
pub mod logging;
pub mod pipeline;
pub mod processors;
pub mod sources;

pub use error::{FrameChainError, Result, ResultExt};
pub use pipeline::{Artifact, Frame, Graph, Pipeline, Stage, StageContext, StageId, Tape};
