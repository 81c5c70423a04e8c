//! Viewer: terminal stage that keeps the most recent image for delivery.
//!
//! Display and transport live outside this crate. The viewer only records
//! the image at `input_index` on every pull so a delivery collaborator can
//! fetch and encode it.

use crate::error::Result;
use crate::imaging;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Frame, Tape};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct Viewer {
    input_index: isize,
    latest: Mutex<Option<Frame>>,
    updates: AtomicU64,
}

impl Viewer {
    pub fn new(input_index: isize) -> Self {
        Self {
            input_index,
            latest: Mutex::new(None),
            updates: AtomicU64::new(0),
        }
    }

    /// The image recorded by the most recent pull that had one.
    pub fn latest_image(&self) -> Option<Frame> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    /// Number of pulls that delivered a new image.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// JPEG encoding of the latest image.
    pub fn encode_jpeg(&self, quality: u8) -> Option<Result<Vec<u8>>> {
        self.latest_image()
            .map(|frame| imaging::encode_jpeg(&frame, quality))
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new(-1)
    }
}

impl Stage for Viewer {
    fn name(&self) -> &str {
        "Viewer"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let tape = ctx.upstream(tape);
        let shown = match tape.image(self.input_index) {
            Some(frame) => {
                if let Ok(mut latest) = self.latest.lock() {
                    *latest = Some(frame.clone());
                }
                self.updates.fetch_add(1, Ordering::Relaxed);
                Some(frame.clone())
            }
            None => self.latest_image(),
        };
        tape.with(shown.map_or(Artifact::Absent, Artifact::Image))
    }
}
