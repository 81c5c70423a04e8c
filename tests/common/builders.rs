//! Test data builders for tapes and images

use framechain::{Artifact, Tape};
use image::{Rgb, RgbImage};

/// Solid grey image
pub fn solid(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

/// Builder for creating test Tapes
#[derive(Default)]
pub struct TapeBuilder {
    entries: Vec<Artifact>,
}

impl TapeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, width: u32, height: u32, value: u8) -> Self {
        self.entries.push(Artifact::image(solid(width, height, value)));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.entries.push(Artifact::text(text));
        self
    }

    pub fn absent(mut self) -> Self {
        self.entries.push(Artifact::Absent);
        self
    }

    pub fn build(self) -> Tape {
        Tape::from(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tape_builder() {
        let tape = TapeBuilder::new().image(4, 3, 9).text("hi").absent().build();

        assert_eq!(tape.len(), 3);
        assert_eq!(tape.image(0).unwrap().dimensions(), (4, 3));
        assert_eq!(tape.text(1), Some("hi"));
        assert!(tape.get(2).unwrap().is_absent());
    }
}
