//! Stand-in stages with observable behaviour

use crossbeam_channel::{unbounded, Receiver, Sender};
use framechain::{Artifact, Stage, StageContext, Tape};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source appending an increasing counter as text, starting at 1.
#[derive(Default)]
pub struct CounterSource {
    next: AtomicU64,
}

impl CounterSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for CounterSource {
    fn name(&self) -> &str {
        "CounterSource"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let tape = ctx.upstream(tape);
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        tape.with(Artifact::text(n.to_string()))
    }
}

/// Sleeps, then appends a copy of the text at -1 prefixed with `seen:`.
pub struct SlowEcho {
    delay: Duration,
}

impl SlowEcho {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Stage for SlowEcho {
    fn name(&self) -> &str {
        "SlowEcho"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let tape = ctx.upstream(tape);
        std::thread::sleep(self.delay);
        let seen = tape.text(-1).unwrap_or("nothing").to_string();
        tape.with(Artifact::text(format!("seen:{}", seen)))
    }
}

/// Reports the instant of every call on a channel, then appends a marker.
pub struct CallRecorder {
    delay: Duration,
    calls: Sender<Instant>,
}

impl CallRecorder {
    pub fn new(delay: Duration) -> (Self, Receiver<Instant>) {
        let (tx, rx) = unbounded();
        (Self { delay, calls: tx }, rx)
    }
}

impl Stage for CallRecorder {
    fn name(&self) -> &str {
        "CallRecorder"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let tape = ctx.upstream(tape);
        let _ = self.calls.send(Instant::now());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        tape.with(Artifact::text("tick"))
    }
}

/// Counts calls and appends nothing.
#[derive(Default)]
pub struct Silent {
    pub calls: Arc<AtomicU64>,
}

impl Stage for Silent {
    fn name(&self) -> &str {
        "Silent"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.upstream(tape)
    }
}

/// Panics on every call.
pub struct Panicking;

impl Stage for Panicking {
    fn name(&self) -> &str {
        "Panicking"
    }

    fn call(&self, _ctx: &StageContext, _tape: Tape) -> Tape {
        panic!("Panicking stage called");
    }
}

/// Parse the counter out of `seen:N` or `N` text.
pub fn counter_of(text: &str) -> Option<u64> {
    text.trim_start_matches("seen:").parse().ok()
}
