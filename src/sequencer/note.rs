// Note representation for the sequencer
// A note is a pitch with a start tick, a length in ticks, and a velocity

use crate::sequencer::timeline::{MAX_TICK, Tick};
use serde::{Deserialize, Serialize};

/// Unique identifier for notes (persisted and runtime share the type, not the range)
pub type NoteId = u64;

/// Highest valid MIDI pitch
pub const MAX_PITCH: u8 = 127;

/// Field validation failures for a note
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NoteError {
    #[error("pitch {0} outside 0..=127")]
    InvalidPitch(u8),

    #[error("note length must be at least one tick")]
    ZeroLength,

    #[error("velocity {0} outside (0, 1]")]
    InvalidVelocity(f32),

    #[error("note at {start} with length {length} ends past the last tick")]
    OutOfRange { start: Tick, length: Tick },
}

/// A musical note owned by a pattern's note store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Stable identifier, preserved across in-place edits
    pub id: NoteId,

    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// Start position in pattern-local ticks
    pub start: Tick,

    /// Length in ticks (>= 1)
    pub length: Tick,

    /// Normalized velocity in (0, 1]
    pub velocity: f32,

    /// Editor selection flag
    #[serde(default)]
    pub selected: bool,
}

impl Note {
    /// Creates a new validated note
    pub fn new(
        id: NoteId,
        pitch: u8,
        start: Tick,
        length: Tick,
        velocity: f32,
    ) -> Result<Self, NoteError> {
        let note = Self {
            id,
            pitch,
            start,
            length,
            velocity,
            selected: false,
        };
        note.validate()?;
        Ok(note)
    }

    /// Check every field against its bounds
    pub fn validate(&self) -> Result<(), NoteError> {
        if self.pitch > MAX_PITCH {
            return Err(NoteError::InvalidPitch(self.pitch));
        }
        if self.length == 0 {
            return Err(NoteError::ZeroLength);
        }
        if self.start.checked_add(self.length).is_none_or(|end| end > MAX_TICK) {
            return Err(NoteError::OutOfRange {
                start: self.start,
                length: self.length,
            });
        }
        // NaN fails both comparisons
        if !(self.velocity > 0.0 && self.velocity <= 1.0) {
            return Err(NoteError::InvalidVelocity(self.velocity));
        }
        Ok(())
    }

    /// Exclusive end tick
    pub fn end(&self) -> Tick {
        self.start + self.length
    }

    /// Check if this note's [start, end) span contains a tick
    pub fn contains_tick(&self, tick: Tick) -> bool {
        tick >= self.start && tick < self.end()
    }

    /// Check if this note overlaps the half-open range [start, end)
    pub fn overlaps(&self, start: Tick, end: Tick) -> bool {
        !(end <= self.start || start >= self.end())
    }
}

/// Name of a MIDI pitch in scientific notation (60 = "C4")
pub fn pitch_name(pitch: u8) -> String {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    let octave = (pitch / 12) as i32 - 1;
    let note_index = (pitch % 12) as usize;

    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Field changes applied to an existing note; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoteEdit {
    pub pitch: Option<u8>,
    pub start: Option<Tick>,
    pub length: Option<Tick>,
    pub velocity: Option<f32>,
}

impl NoteEdit {
    /// Produce the edited copy of `note`, keeping its id and selection
    pub fn apply(&self, note: &Note) -> Note {
        Note {
            pitch: self.pitch.unwrap_or(note.pitch),
            start: self.start.unwrap_or(note.start),
            length: self.length.unwrap_or(note.length),
            velocity: self.velocity.unwrap_or(note.velocity),
            ..*note
        }
    }
}

/// A preview or record-time note
///
/// Runtime notes live in their own id space and are never serialized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeNote {
    pub id: NoteId,
    pub pitch: u8,
    pub start: Tick,
    pub length: Tick,
    pub velocity: f32,
}
