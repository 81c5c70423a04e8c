//! Source stages. Each pull appends exactly one image or absent marker.

pub mod image_file;
pub mod test_pattern;

pub use image_file::{ImageFile, ImageFileConfig};
pub use test_pattern::{TestPattern, TestPatternConfig};
