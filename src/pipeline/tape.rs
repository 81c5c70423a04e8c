//! The artifact tape threaded through a pull chain.
//!
//! A `Tape` is an ordered, append-only sequence of heterogeneous artifacts.
//! Entries are addressed by position, including negative offsets from the
//! end (`-1` is the most recently appended entry). Image payloads are
//! reference counted, so cloning and copy-extending a tape at every chain
//! link only bumps refcounts.

use image::RgbImage;
use std::fmt;
use std::sync::Arc;

/// Shared, immutable RGB frame.
pub type Frame = Arc<RgbImage>;

/// A single entry on a tape.
#[derive(Clone, Default)]
pub enum Artifact {
    /// An image (camera frame, composite, annotated detection output).
    Image(Frame),
    /// A text annotation (VQA answer, command, label).
    Text(Arc<str>),
    /// Placeholder appended when a stage has nothing to contribute.
    #[default]
    Absent,
}

impl Artifact {
    pub fn image(image: RgbImage) -> Self {
        Artifact::Image(Arc::new(image))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Artifact::Text(Arc::from(text.into()))
    }

    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Artifact::Absent)
    }

    pub fn as_image(&self) -> Option<&Frame> {
        match self {
            Artifact::Image(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Artifact::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Artifact::Image(a), Artifact::Image(b)) => Arc::ptr_eq(a, b) || **a == **b,
            (Artifact::Text(a), Artifact::Text(b)) => a == b,
            (Artifact::Absent, Artifact::Absent) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Image(frame) => write!(f, "Image({}x{})", frame.width(), frame.height()),
            Artifact::Text(text) => write!(f, "Text({:?})", text),
            Artifact::Absent => write!(f, "Absent"),
        }
    }
}

impl From<RgbImage> for Artifact {
    fn from(image: RgbImage) -> Self {
        Artifact::image(image)
    }
}

impl From<Frame> for Artifact {
    fn from(frame: Frame) -> Self {
        Artifact::Image(frame)
    }
}

impl From<&str> for Artifact {
    fn from(text: &str) -> Self {
        Artifact::text(text)
    }
}

/// Ordered, positionally addressed artifact sequence.
#[derive(Clone, Default, PartialEq)]
pub struct Tape {
    entries: Vec<Artifact>,
}

impl Tape {
    /// Create a new empty tape.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Number of entries on the tape.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one artifact.
    #[inline]
    pub fn push(&mut self, artifact: impl Into<Artifact>) {
        self.entries.push(artifact.into());
    }

    /// Append an absent marker.
    #[inline]
    pub fn push_absent(&mut self) {
        self.entries.push(Artifact::Absent);
    }

    /// Builder-style append.
    pub fn with(mut self, artifact: impl Into<Artifact>) -> Self {
        self.push(artifact);
        self
    }

    /// Translate a possibly negative position into an absolute index.
    ///
    /// `-1` maps to the last entry. Returns `None` when the position is
    /// outside the tape.
    pub fn resolve(&self, index: isize) -> Option<usize> {
        let len = self.entries.len() as isize;
        let absolute = if index < 0 { len + index } else { index };
        (0..len).contains(&absolute).then_some(absolute as usize)
    }

    /// Entry at a possibly negative position.
    pub fn get(&self, index: isize) -> Option<&Artifact> {
        self.resolve(index).map(|i| &self.entries[i])
    }

    /// Image at a position; `None` when out of range, absent, or text.
    pub fn image(&self, index: isize) -> Option<&Frame> {
        self.get(index).and_then(Artifact::as_image)
    }

    /// Text at a position; `None` when out of range, absent, or an image.
    pub fn text(&self, index: isize) -> Option<&str> {
        self.get(index).and_then(Artifact::as_text)
    }

    /// Most recently appended entry.
    pub fn last(&self) -> Option<&Artifact> {
        self.entries.last()
    }

    /// Entries from absolute position `start` to the end.
    pub fn tail_from(&self, start: usize) -> &[Artifact] {
        &self.entries[start.min(self.entries.len())..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Artifact] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Artifact> {
        self.entries
    }
}

impl Extend<Artifact> for Tape {
    fn extend<I: IntoIterator<Item = Artifact>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl<'a> Extend<&'a Artifact> for Tape {
    fn extend<I: IntoIterator<Item = &'a Artifact>>(&mut self, iter: I) {
        self.entries.extend(iter.into_iter().cloned());
    }
}

impl From<Vec<Artifact>> for Tape {
    fn from(entries: Vec<Artifact>) -> Self {
        Self { entries }
    }
}

impl FromIterator<Artifact> for Tape {
    fn from_iter<I: IntoIterator<Item = Artifact>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn test_negative_indexing() {
        let tape = Tape::new()
            .with(solid(2, 2, 10))
            .with("answer")
            .with(Artifact::Absent);

        assert!(tape.get(-1).unwrap().is_absent());
        assert_eq!(tape.text(-2), Some("answer"));
        assert_eq!(tape.image(-3).unwrap().width(), 2);
        assert_eq!(tape.image(0).unwrap().width(), 2);
        assert!(tape.get(-4).is_none());
        assert!(tape.get(3).is_none());
    }

    #[test]
    fn test_typed_accessors_reject_other_kinds() {
        let tape = Tape::new().with("text").with(solid(1, 1, 0));
        assert!(tape.image(0).is_none());
        assert!(tape.text(1).is_none());
    }

    #[test]
    fn test_clone_shares_image_payload() {
        let tape = Tape::new().with(solid(4, 4, 1));
        let copy = tape.clone();
        let a = tape.image(-1).unwrap();
        let b = copy.image(-1).unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_artifact_equality() {
        assert_eq!(Artifact::image(solid(2, 2, 5)), Artifact::image(solid(2, 2, 5)));
        assert_ne!(Artifact::image(solid(2, 2, 5)), Artifact::image(solid(2, 2, 6)));
        assert_ne!(Artifact::text("a"), Artifact::Absent);
    }

    #[test]
    fn test_tail_from_clamps() {
        let tape = Tape::new().with("a").with("b");
        assert_eq!(tape.tail_from(1).len(), 1);
        assert!(tape.tail_from(5).is_empty());
    }

    #[test]
    fn test_debug_is_compact() {
        let tape = Tape::new().with(solid(8, 6, 0)).with("x").with(Artifact::Absent);
        assert_eq!(format!("{:?}", tape), "[Image(8x6), Text(\"x\"), Absent]");
    }

    proptest! {
        #[test]
        fn test_negative_and_positive_positions_agree(len in 1usize..40, offset in 1usize..40) {
            prop_assume!(offset <= len);
            let tape: Tape = (0..len).map(|i| Artifact::text(i.to_string())).collect();
            let negative = -(offset as isize);
            let positive = (len - offset) as isize;
            prop_assert_eq!(tape.resolve(negative), Some(len - offset));
            prop_assert_eq!(tape.get(negative), tape.get(positive));
        }

        #[test]
        fn test_out_of_range_positions_resolve_to_none(len in 0usize..20, extra in 0isize..20) {
            let tape: Tape = (0..len).map(|_| Artifact::Absent).collect();
            prop_assert!(tape.get(len as isize + extra).is_none());
            prop_assert!(tape.get(-(len as isize) - 1 - extra).is_none());
        }
    }
}
