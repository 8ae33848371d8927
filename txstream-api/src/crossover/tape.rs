use serde::Deserialize;
use serde::Serialize;

/// Progress of a crossover run.
///
/// `head` is the last height whose confirmed transactions were fully
/// ingested, `height` the latest height seen upstream. `head <= height`
/// always holds and neither ever moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tape {
    pub head: u64,
    pub height: u64,
}

impl Tape {
    pub fn starting_at(head: u64) -> Self {
        Self { head, height: head }
    }

    /// Records a newly observed upstream height. Lower heights are ignored.
    pub fn observe(&mut self, height: u64) {
        self.height = self.height.max(height).max(self.head);
    }

    /// Moves `head` to `height` once everything up to it has been ingested.
    /// Returns whether the tape moved.
    pub fn advance_to(&mut self, height: u64) -> bool {
        if height <= self.head {
            return false;
        }
        self.head = height;
        self.height = self.height.max(height);
        true
    }

    pub fn is_caught_up(&self) -> bool {
        self.head >= self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn never_moves_backwards() {
        let mut tape = Tape::starting_at(100);
        tape.observe(105);
        assert!(!tape.is_caught_up());
        assert!(tape.advance_to(105));
        assert!(!tape.advance_to(104));
        tape.observe(90);
        assert_eq!(
            tape,
            Tape {
                head: 105,
                height: 105
            }
        );
        assert!(tape.is_caught_up());
    }
}
