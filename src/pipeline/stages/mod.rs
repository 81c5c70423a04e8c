//! Built-in stages: rate decoupling, pacing, compositing and viewing.

pub mod buffer;
pub mod inlay;
pub mod merge;
pub mod sbs;
pub mod trigger;
pub mod viewer;

pub use buffer::{Buffer, BufferStats, Fallback, FallbackEntry, Isolation, WrappedStage};
pub use inlay::{Inlay, InlayConfig};
pub use merge::Merge;
pub use sbs::{SbsConfig, SideBySide};
pub use trigger::Trigger;
pub use viewer::Viewer;

use crate::pipeline::tape::{Frame, Tape};

/// Image at `index`, treating out-of-range positions as absent.
pub(crate) fn read_image(tape: &Tape, index: isize, stage: &str) -> Option<Frame> {
    if tape.resolve(index).is_none() {
        tracing::warn!(
            "{}: position {} is outside a tape of length {}",
            stage,
            index,
            tape.len()
        );
        return None;
    }
    tape.image(index).cloned()
}
