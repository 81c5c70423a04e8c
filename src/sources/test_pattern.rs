//! Simulated camera producing a moving test pattern.

use crate::imaging;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Tape};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

const MARKER_SIZE: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPatternConfig {
    pub width: u32,
    pub height: u32,
    /// Mirror each frame horizontally.
    pub flip: bool,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            flip: false,
        }
    }
}

/// Appends one fresh frame per pull: a colour gradient scrolling with the
/// frame counter and a white marker sweeping left to right.
pub struct TestPattern {
    config: TestPatternConfig,
    frame: AtomicU64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_config(TestPatternConfig {
            width,
            height,
            ..TestPatternConfig::default()
        })
    }

    pub fn from_config(config: TestPatternConfig) -> Self {
        Self {
            config,
            frame: AtomicU64::new(0),
        }
    }

    /// Frames produced so far.
    pub fn frames(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    fn render(&self, n: u64) -> RgbImage {
        let (w, h) = (self.config.width.max(1), self.config.height.max(1));
        let shift = (n * 4) as u32;
        let mut image = RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                (y * 255 / h) as u8,
                (n % 256) as u8,
            ])
        });

        let travel = w.saturating_sub(MARKER_SIZE).max(1);
        let marker_x = (n as u32).wrapping_mul(8) % travel;
        let marker_y = h.saturating_sub(MARKER_SIZE) / 2;
        imaging::fill_rect(&mut image, marker_x, marker_y, MARKER_SIZE, MARKER_SIZE, imaging::WHITE);

        if self.config.flip {
            image::imageops::flip_horizontal_in_place(&mut image);
        }
        image
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::from_config(TestPatternConfig::default())
    }
}

impl Stage for TestPattern {
    fn name(&self) -> &str {
        "TestPattern"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let n = self.frame.fetch_add(1, Ordering::Relaxed);
        ctx.upstream(tape).with(Artifact::image(self.render(n)))
    }
}
