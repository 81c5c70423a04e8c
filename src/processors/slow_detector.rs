//! Synthetic heavy transform standing in for an inference model.

use crate::imaging;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Tape};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowDetectorConfig {
    pub input_index: isize,
    /// Simulated inference time per call.
    pub latency_ms: u64,
    pub label: String,
}

impl Default for SlowDetectorConfig {
    fn default() -> Self {
        Self {
            input_index: -1,
            latency_ms: 200,
            label: "object".to_string(),
        }
    }
}

/// Sleeps for the configured latency, then appends the input image with a
/// box drawn around its centre and a text label. Appends two absent
/// markers when the input image is missing.
pub struct SlowDetector {
    config: SlowDetectorConfig,
}

impl SlowDetector {
    pub fn new(latency: Duration) -> Self {
        Self::from_config(SlowDetectorConfig {
            latency_ms: latency.as_millis() as u64,
            ..SlowDetectorConfig::default()
        })
    }

    pub fn from_config(config: SlowDetectorConfig) -> Self {
        Self { config }
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.config.latency_ms)
    }
}

impl Default for SlowDetector {
    fn default() -> Self {
        Self::from_config(SlowDetectorConfig::default())
    }
}

impl Stage for SlowDetector {
    fn name(&self) -> &str {
        "SlowDetector"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let mut tape = ctx.upstream(tape);
        let Some(input) = tape.image(self.config.input_index).cloned() else {
            tape.push_absent();
            tape.push_absent();
            return tape;
        };

        std::thread::sleep(self.latency());

        let mut annotated = (*input).clone();
        let (w, h) = annotated.dimensions();
        imaging::outline_rect(&mut annotated, w / 4, h / 4, w / 2, h / 2, 3, Rgb([0, 255, 0]));
        tape.push(annotated);
        tape.push(Artifact::text(format!("{}: 1", self.config.label)));
        tape
    }
}
