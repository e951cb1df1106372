// Pattern - Named, colored container of notes
// A pattern is like a "clip" in other DAWs and can be placed many times on a playlist

use crate::sequencer::note::Note;
use crate::sequencer::note_store::{NoteCounter, NoteStore};
use crate::sequencer::timeline::{Tick, TimeSignature};

/// Unique identifier for patterns
pub type PatternId = u64;

/// Default display color for new patterns
pub const DEFAULT_PATTERN_COLOR: [u8; 3] = [100, 150, 200];

/// A pattern containing notes
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Unique identifier
    pub id: PatternId,

    /// Pattern name
    pub name: String,

    /// Display color (RGB)
    pub color: [u8; 3],

    /// Length in ticks
    pub length: Tick,

    /// Time-indexed notes
    pub notes: NoteStore,
}

impl Pattern {
    /// Create a new empty pattern
    pub fn new(
        id: PatternId,
        name: String,
        length: Tick,
        note_limit: usize,
        counter: NoteCounter,
    ) -> Self {
        Self {
            id,
            name,
            color: DEFAULT_PATTERN_COLOR,
            length,
            notes: NoteStore::new(note_limit, counter),
        }
    }

    /// Length expressed in whole bars (rounded up)
    pub fn length_bars(&self, time_signature: &TimeSignature) -> u64 {
        self.length.div_ceil(time_signature.ticks_per_bar())
    }

    /// Notes that would move to the right-hand side of a split at `at`
    pub fn notes_from(&self, at: Tick) -> Vec<Note> {
        self.notes.iter().filter(|n| n.start >= at).copied().collect()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
