//! Merge: joins two independently pulled sub-chains into the current tape.

use crate::pipeline::id::StageId;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Tape};

/// Pulls `first` and `second` with empty tapes and appends their results,
/// optionally narrowed to a single position each.
#[derive(Debug, Clone)]
pub struct Merge {
    first: StageId,
    second: StageId,
    first_index: Option<isize>,
    second_index: Option<isize>,
}

impl Merge {
    /// Append both full tapes.
    pub fn new(first: StageId, second: StageId) -> Self {
        Self {
            first,
            second,
            first_index: None,
            second_index: None,
        }
    }

    /// Append only the entry at `first_index` of the first tape and the
    /// entry at `second_index` of the second.
    pub fn narrowed(mut self, first_index: Option<isize>, second_index: Option<isize>) -> Self {
        self.first_index = first_index;
        self.second_index = second_index;
        self
    }

    fn select(&self, pulled: Tape, index: Option<isize>, id: StageId) -> Vec<Artifact> {
        match index {
            None => pulled.into_entries(),
            Some(index) => match pulled.get(index) {
                Some(artifact) => vec![artifact.clone()],
                None => {
                    tracing::warn!(
                        "Merge: position {} missing from {} (length {})",
                        index,
                        id,
                        pulled.len()
                    );
                    vec![Artifact::Absent]
                }
            },
        }
    }
}

impl Stage for Merge {
    fn name(&self) -> &str {
        "Merge"
    }

    fn call(&self, ctx: &StageContext, tape: Tape) -> Tape {
        let mut tape = ctx.upstream(tape);
        let before = tape.len();

        let first = self.select(ctx.pull(self.first), self.first_index, self.first);
        let second = self.select(ctx.pull(self.second), self.second_index, self.second);
        tape.extend(first);
        tape.extend(second);

        if tape.len() == before {
            tape.push_absent();
        }
        tape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::graph::Graph;

    struct Emit(&'static [&'static str]);

    impl Stage for Emit {
        fn name(&self) -> &str {
            "emit"
        }

        fn call(&self, _ctx: &StageContext, mut tape: Tape) -> Tape {
            for text in self.0 {
                tape.push(*text);
            }
            tape
        }
    }

    #[test]
    fn test_appends_full_tapes() {
        let graph = Graph::new();
        let a = graph.insert(Emit(&["a0", "a1"]));
        let b = graph.insert(Emit(&["b0"]));
        let merge = graph.insert(Merge::new(a, b));

        let tape = graph.pull(merge, Tape::new().with("seed"));
        let texts: Vec<_> = tape.iter().filter_map(Artifact::as_text).collect();
        assert_eq!(texts, vec!["seed", "a0", "a1", "b0"]);
    }

    #[test]
    fn test_narrows_to_positions() {
        let graph = Graph::new();
        let a = graph.insert(Emit(&["a0", "a1"]));
        let b = graph.insert(Emit(&["b0", "b1"]));
        let merge = graph.insert(Merge::new(a, b).narrowed(Some(-1), Some(0)));

        let tape = graph.pull(merge, Tape::new());
        assert_eq!(tape.len(), 2);
        assert_eq!(tape.text(0), Some("a1"));
        assert_eq!(tape.text(1), Some("b0"));
    }

    #[test]
    fn test_missing_positions_become_absent() {
        let graph = Graph::new();
        let a = graph.insert(Emit(&[]));
        let b = graph.insert(Emit(&[]));

        let narrowed = graph.insert(Merge::new(a, b).narrowed(Some(3), Some(-1)));
        let tape = graph.pull(narrowed, Tape::new());
        assert_eq!(tape.len(), 2);
        assert!(tape.iter().all(Artifact::is_absent));

        let full = graph.insert(Merge::new(a, b));
        assert_eq!(graph.pull(full, Tape::new()).len(), 1);
    }

    #[test]
    fn test_uses_chain_predecessor() {
        let graph = Graph::new();
        let head = graph.insert(Emit(&["head"]));
        let a = graph.insert(Emit(&["a"]));
        let b = graph.insert(Emit(&["b"]));
        let merge = graph.insert(Merge::new(a, b));
        graph.link(head, merge).unwrap();

        let tape = graph.pull(merge, Tape::new().with("ignored"));
        let texts: Vec<_> = tape.iter().filter_map(Artifact::as_text).collect();
        assert_eq!(texts, vec!["head", "a", "b"]);
    }
}
