// Record buffer - Captures live note on/off at the playhead
// Captured notes carry runtime ids until they are committed into a pattern

use crate::sequencer::note::{MAX_PITCH, NoteId, RuntimeNote};
use crate::sequencer::timeline::Tick;
use std::collections::HashMap;

/// A key that is currently held down
#[derive(Debug, Clone, Copy)]
struct HeldNote {
    id: NoteId,
    velocity: f32,
    start: Tick,
}

/// Collects notes played while recording
#[derive(Debug, Default)]
pub struct RecordBuffer {
    held: HashMap<u8, HeldNote>,
    captured: Vec<RuntimeNote>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key down at `tick`. A second note-on for a held pitch closes the first.
    pub fn note_on(&mut self, pitch: u8, velocity: f32, tick: Tick, id: NoteId) {
        if pitch > MAX_PITCH || velocity <= 0.0 {
            return;
        }
        if self.held.contains_key(&pitch) {
            self.note_off(pitch, tick);
        }
        self.held.insert(
            pitch,
            HeldNote {
                id,
                velocity: velocity.min(1.0),
                start: tick,
            },
        );
    }

    /// Key up at `tick`; returns the runtime id of the closed note
    pub fn note_off(&mut self, pitch: u8, tick: Tick) -> Option<NoteId> {
        let held = self.held.remove(&pitch)?;
        self.captured.push(RuntimeNote {
            id: held.id,
            pitch,
            start: held.start,
            length: tick.saturating_sub(held.start).max(1),
            velocity: held.velocity,
        });
        Some(held.id)
    }

    /// Close every held note at `tick`; returns their runtime ids
    pub fn finalize(&mut self, tick: Tick) -> Vec<NoteId> {
        let mut pitches: Vec<u8> = self.held.keys().copied().collect();
        pitches.sort_unstable();
        pitches
            .into_iter()
            .filter_map(|pitch| self.note_off(pitch, tick))
            .collect()
    }

    /// Take the captured notes in start order
    pub fn drain(&mut self) -> Vec<RuntimeNote> {
        let mut notes = std::mem::take(&mut self.captured);
        notes.sort_by_key(|n| (n.start, n.pitch));
        notes
    }

    /// Number of keys held down
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn captured_count(&self) -> usize {
        self.captured.len()
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.captured.clear();
    }
}
