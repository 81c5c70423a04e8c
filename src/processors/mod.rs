//! Transform stages that read existing positions and append results.

pub mod slow_detector;
pub mod steer;

pub use slow_detector::{SlowDetector, SlowDetectorConfig};
pub use steer::{parse_direction, CommandSink, Steer};
