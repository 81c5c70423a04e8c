//! Picture-in-picture compositor.

use crate::error::{FrameChainError, Result};
use crate::imaging;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::stages::read_image;
use crate::pipeline::tape::{Artifact, Tape};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlayConfig {
    pub input_index: isize,
    pub thumb_index: isize,
    pub factor: u32,
}

impl Default for InlayConfig {
    fn default() -> Self {
        Self {
            input_index: -1,
            thumb_index: -2,
            factor: 4,
        }
    }
}

/// Overlays the image at `thumb_index`, scaled to `1/factor` of the canvas
/// width, onto the top-left corner of a copy of the image at
/// `input_index`. Appends an absent marker when either image is missing.
#[derive(Debug, Clone)]
pub struct Inlay {
    config: InlayConfig,
}

impl Inlay {
    pub fn new(input_index: isize, thumb_index: isize, factor: u32) -> Self {
        Self::from_config(InlayConfig {
            input_index,
            thumb_index,
            factor,
        })
    }

    pub fn from_config(config: InlayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InlayConfig {
        &self.config
    }

    /// The composite for `tape`, without appending it.
    pub fn compose(&self, tape: &Tape) -> Artifact {
        let canvas = read_image(tape, self.config.input_index, "Inlay");
        let thumb = read_image(tape, self.config.thumb_index, "Inlay");
        match (canvas, thumb) {
            (Some(canvas), Some(thumb)) => {
                Artifact::image(imaging::inlay(&canvas, &thumb, self.config.factor))
            }
            _ => Artifact::Absent,
        }
    }
}

impl Default for Inlay {
    fn default() -> Self {
        Self::from_config(InlayConfig::default())
    }
}

impl Stage for Inlay {
    fn name(&self) -> &str {
        "Inlay"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let tape = ctx.upstream(tape);
        let composite = self.compose(&tape);
        tape.with(composite)
    }

    fn start(&self, _ctx: &StageContext, _block: bool) -> Result<()> {
        if self.config.factor == 0 {
            return Err(FrameChainError::Config(
                "Inlay factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
