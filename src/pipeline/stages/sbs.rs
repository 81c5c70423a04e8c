//! Side-by-side compositor.

use crate::error::{FrameChainError, Result};
use crate::imaging;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::stages::read_image;
use crate::pipeline::tape::{Artifact, Tape};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SbsConfig {
    pub first_index: isize,
    pub second_index: isize,
    pub factor: u32,
    /// Stack vertically instead of horizontally.
    pub flip: bool,
}

impl Default for SbsConfig {
    fn default() -> Self {
        Self {
            first_index: -1,
            second_index: -2,
            factor: 2,
            flip: false,
        }
    }
}

/// Joins two images into one canvas.
///
/// With one side missing the other is passed through unchanged; with both
/// missing an absent marker is appended.
#[derive(Debug, Clone)]
pub struct SideBySide {
    config: SbsConfig,
}

impl SideBySide {
    pub fn new(first_index: isize, second_index: isize) -> Self {
        Self::from_config(SbsConfig {
            first_index,
            second_index,
            ..SbsConfig::default()
        })
    }

    pub fn from_config(config: SbsConfig) -> Self {
        Self { config }
    }

    pub fn with_factor(mut self, factor: u32) -> Self {
        self.config.factor = factor;
        self
    }

    /// Stack the panes vertically.
    pub fn flipped(mut self, flip: bool) -> Self {
        self.config.flip = flip;
        self
    }

    pub fn config(&self) -> &SbsConfig {
        &self.config
    }

    pub fn compose(&self, tape: &Tape) -> Artifact {
        let first = read_image(tape, self.config.first_index, "SBS");
        let second = read_image(tape, self.config.second_index, "SBS");
        match (first, second) {
            (None, None) => Artifact::Absent,
            (Some(only), None) | (None, Some(only)) => Artifact::Image(only),
            (Some(first), Some(second)) => Artifact::image(imaging::side_by_side(
                &first,
                &second,
                self.config.factor,
                self.config.flip,
            )),
        }
    }
}

impl Default for SideBySide {
    fn default() -> Self {
        Self::from_config(SbsConfig::default())
    }
}

impl Stage for SideBySide {
    fn name(&self) -> &str {
        "SBS"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let tape = ctx.upstream(tape);
        let composite = self.compose(&tape);
        tape.with(composite)
    }

    fn start(&self, _ctx: &StageContext, _block: bool) -> Result<()> {
        if self.config.factor == 0 {
            return Err(FrameChainError::Config(
                "SBS factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn test_passes_through_present_side() {
        let ctx = StageContext::standalone();
        let sbs = SideBySide::new(0, 1);

        let left_only = Tape::new().with(solid(10, 10, 1)).with(Artifact::Absent);
        let out = sbs.call(&ctx, left_only);
        assert!(Arc::ptr_eq(out.image(-1).unwrap(), out.image(0).unwrap()));

        let right_only = Tape::new().with(Artifact::Absent).with(solid(10, 10, 2));
        let out = sbs.call(&ctx, right_only);
        assert!(Arc::ptr_eq(out.image(-1).unwrap(), out.image(1).unwrap()));

        let neither = Tape::new().with(Artifact::Absent).with("text");
        assert!(sbs.call(&ctx, neither).get(-1).unwrap().is_absent());
    }

    #[test]
    fn test_composes_both_sides() {
        let tape = Tape::new().with(solid(40, 20, 1)).with(solid(40, 40, 2));
        let out = SideBySide::new(0, 1).call(&StageContext::standalone(), tape);
        assert_eq!(out.image(-1).unwrap().dimensions(), (20 + 2 + 20, 20));

        let tape = Tape::new().with(solid(40, 20, 1)).with(solid(40, 40, 2));
        let out = SideBySide::new(0, 1)
            .flipped(true)
            .call(&StageContext::standalone(), tape);
        assert_eq!(out.image(-1).unwrap().dimensions(), (20, 10 + 2 + 20));
    }
}
