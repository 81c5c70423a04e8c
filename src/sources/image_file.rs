//! Image file capture.
//!
//! Reads an image file on every pull, so a file rewritten by another
//! process shows up as a new frame. Read failures are retried a few times
//! before the pull gives up and appends an absent marker.

use crate::imaging;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Tape};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFileConfig {
    pub path: PathBuf,
    /// Resize to this width, keeping the aspect ratio.
    pub width: Option<u32>,
    /// Additional read attempts after a failure.
    pub retries: u32,
}

impl Default for ImageFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("image.jpg"),
            width: Some(800),
            retries: 3,
        }
    }
}

pub struct ImageFile {
    config: ImageFileConfig,
}

impl ImageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_config(ImageFileConfig {
            path: path.into(),
            ..ImageFileConfig::default()
        })
    }

    pub fn from_config(config: ImageFileConfig) -> Self {
        Self { config }
    }

    pub fn with_width(mut self, width: Option<u32>) -> Self {
        self.config.width = width;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    fn read(&self) -> Option<Artifact> {
        for attempt in 0..=self.config.retries {
            match image::open(&self.config.path) {
                Ok(image) => {
                    let image = image.to_rgb8();
                    let image = match self.config.width {
                        Some(width) => imaging::resize_to_width(&image, width),
                        None => image,
                    };
                    return Some(Artifact::image(image));
                }
                Err(e) => {
                    tracing::warn!(
                        "Re-acquiring {} (attempt {}): {}",
                        self.config.path.display(),
                        attempt + 1,
                        e
                    );
                    if attempt < self.config.retries {
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }
        None
    }
}

impl Stage for ImageFile {
    fn name(&self) -> &str {
        "ImageFile"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let tape = ctx.upstream(tape);
        match self.read() {
            Some(frame) => tape.with(frame),
            None => {
                tracing::error!("Giving up on {}", self.config.path.display());
                tape.with(Artifact::Absent)
            }
        }
    }
}
