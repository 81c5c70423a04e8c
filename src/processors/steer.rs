//! Steer: turns a free-text answer into a movement command.

use crate::error::Result;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Tape};
use std::sync::{Arc, Mutex};

/// Receives movement commands, e.g. a robot's HTTP control endpoint.
#[cfg_attr(test, mockall::automock)]
pub trait CommandSink: Send + Sync {
    fn send(&self, command: &str) -> Result<()>;
}

/// Map free text to one of `left`, `right`, `forward`, `backward`, or an
/// empty command when nothing matches.
pub fn parse_direction(text: &str) -> &'static str {
    if text.contains("left") {
        "left"
    } else if text.contains("right") {
        "right"
    } else if text.contains("center") {
        "forward"
    } else if text.contains("backward") {
        "backward"
    } else {
        ""
    }
}

/// Reads an image and a text answer, appends the image and the parsed
/// direction, and forwards the direction to an optional [`CommandSink`].
pub struct Steer {
    image_index: isize,
    text_index: isize,
    only_when_updated: bool,
    sink: Option<Arc<dyn CommandSink>>,
    last_text: Mutex<Option<String>>,
}

impl Steer {
    pub fn new(image_index: isize, text_index: isize) -> Self {
        Self {
            image_index,
            text_index,
            only_when_updated: true,
            sink: None,
            last_text: Mutex::new(None),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Dispatch even when the answer text has not changed.
    pub fn always_dispatch(mut self) -> Self {
        self.only_when_updated = false;
        self
    }

    fn dispatch(&self, text: &str, direction: &str) {
        let Some(sink) = &self.sink else {
            return;
        };
        let Ok(mut last) = self.last_text.lock() else {
            return;
        };
        if self.only_when_updated && last.as_deref() == Some(text) {
            return;
        }
        match sink.send(direction) {
            Ok(()) => *last = Some(text.to_string()),
            Err(e) => tracing::warn!("Steer: failed to send '{}': {}", direction, e),
        }
    }
}

impl Default for Steer {
    fn default() -> Self {
        Self::new(-1, -2)
    }
}

impl Stage for Steer {
    fn name(&self) -> &str {
        "Steer"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let mut tape = ctx.upstream(tape);
        let image = tape.image(self.image_index).cloned();
        let text = tape.text(self.text_index).map(str::to_string);

        match (image, text) {
            (Some(image), Some(text)) => {
                let direction = parse_direction(&text);
                self.dispatch(&text, direction);
                tape.push(image);
                tape.push(Artifact::text(direction));
            }
            _ => {
                tape.push_absent();
                tape.push_absent();
            }
        }
        tape
    }
}
