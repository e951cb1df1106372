// Note Store - Time-indexed note container backing a pattern
//
// Notes are bucketed by start tick in a BTreeMap; several notes may share a
// bucket. An id -> start index gives direct bucket lookup for deletes, and a
// count of stored lengths bounds how far back an overlap query has to look.

use crate::sequencer::note::{Note, NoteError, NoteId};
use crate::sequencer::timeline::Tick;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Song-wide note counter shared by every store of a song
#[derive(Debug, Clone, Default)]
pub struct NoteCounter(Arc<AtomicUsize>);

impl NoteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: usize) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn sub(&self, n: usize) {
        self.0.fetch_sub(n, Ordering::Relaxed);
    }
}

/// Reasons an insert is refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsertError {
    #[error(transparent)]
    Invalid(#[from] NoteError),

    #[error("note {0} is already stored")]
    Duplicate(NoteId),

    #[error("pattern holds the maximum of {limit} notes")]
    LimitExceeded { limit: usize },
}

/// Range query semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    /// Notes whose start lies in [start, end); used for onset scheduling
    StartOnly,
    /// Notes overlapping [start, end) at all; used for selection and editing
    FullOverlap,
}

/// Point query tie-break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    /// Every match
    All,
    /// A selected match if any, else the shortest, else every match
    Single,
}

/// Interval-indexed note container for one pattern
#[derive(Debug, Clone)]
pub struct NoteStore {
    buckets: BTreeMap<Tick, Vec<Note>>,
    index: HashMap<NoteId, Tick>,
    lengths: BTreeMap<Tick, usize>,
    limit: usize,
    counter: NoteCounter,
}

impl NoteStore {
    /// Create an empty store that reports into `counter`
    pub fn new(limit: usize, counter: NoteCounter) -> Self {
        Self {
            buckets: BTreeMap::new(),
            index: HashMap::new(),
            lengths: BTreeMap::new(),
            limit,
            counter,
        }
    }

    /// Number of notes
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Note-count ceiling
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.index.contains_key(&id)
    }

    /// Insert a note
    pub fn insert(&mut self, note: Note) -> Result<(), InsertError> {
        note.validate()?;
        if self.index.contains_key(&note.id) {
            return Err(InsertError::Duplicate(note.id));
        }
        if self.index.len() >= self.limit {
            return Err(InsertError::LimitExceeded { limit: self.limit });
        }

        self.track_length(note.length);
        self.index.insert(note.id, note.start);
        self.buckets.entry(note.start).or_default().push(note);
        self.counter.add(1);
        Ok(())
    }

    /// Remove a note by id, returning it if present
    pub fn remove(&mut self, id: NoteId) -> Option<Note> {
        let start = self.index.remove(&id)?;
        let bucket = self.buckets.get_mut(&start)?;
        let position = bucket.iter().position(|n| n.id == id)?;
        let note = bucket.remove(position);
        if bucket.is_empty() {
            self.buckets.remove(&start);
        }
        self.untrack_length(note.length);
        self.counter.sub(1);
        Some(note)
    }

    /// Replace a stored note with an edited copy carrying the same id
    ///
    /// The note moves buckets if its start changed. Returns the previous value.
    pub fn replace(&mut self, note: Note) -> Result<Note, InsertError> {
        note.validate()?;
        let previous = self.get(note.id).copied();
        let Some(previous) = previous else {
            // Not stored yet: behave like a plain insert
            self.insert(note)?;
            return Ok(note);
        };

        if previous.start == note.start {
            if let Some(slot) = self
                .buckets
                .get_mut(&note.start)
                .and_then(|b| b.iter_mut().find(|n| n.id == note.id))
            {
                *slot = note;
            }
            self.untrack_length(previous.length);
            self.track_length(note.length);
        } else {
            self.remove(note.id);
            self.insert(note)?;
        }
        Ok(previous)
    }

    /// Get a note by id
    pub fn get(&self, id: NoteId) -> Option<&Note> {
        let start = self.index.get(&id)?;
        self.buckets.get(start)?.iter().find(|n| n.id == id)
    }

    /// Set or clear the selection flag; returns false if the note is unknown
    pub fn set_selected(&mut self, id: NoteId, selected: bool) -> bool {
        let Some(start) = self.index.get(&id) else {
            return false;
        };
        match self
            .buckets
            .get_mut(start)
            .and_then(|b| b.iter_mut().find(|n| n.id == id))
        {
            Some(note) => {
                note.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Clear the selection flag on every note
    pub fn clear_selection(&mut self) {
        for note in self.buckets.values_mut().flatten() {
            note.selected = false;
        }
    }

    /// All selected notes in start order
    pub fn selected(&self) -> Vec<Note> {
        self.iter().filter(|n| n.selected).copied().collect()
    }

    /// Notes sounding at `tick` with pitch in [low_pitch, high_pitch]
    pub fn point_query(
        &self,
        tick: Tick,
        low_pitch: u8,
        high_pitch: u8,
        pick: PickMode,
    ) -> Vec<Note> {
        let from = tick.saturating_sub(self.max_length().saturating_sub(1));
        let matches: Vec<Note> = self
            .buckets
            .range(from..=tick)
            .flat_map(|(_, bucket)| bucket.iter())
            .filter(|n| n.contains_tick(tick) && (low_pitch..=high_pitch).contains(&n.pitch))
            .copied()
            .collect();

        match pick {
            PickMode::All => matches,
            PickMode::Single => {
                if let Some(selected) = matches.iter().find(|n| n.selected) {
                    return vec![*selected];
                }
                let shortest = matches.iter().map(|n| n.length).min();
                let candidates: Vec<Note> = matches
                    .iter()
                    .filter(|n| Some(n.length) == shortest)
                    .copied()
                    .collect();
                if candidates.len() == 1 {
                    candidates
                } else {
                    matches
                }
            }
        }
    }

    /// Notes matching [start, end) under `mode`, in start order
    pub fn range_query(&self, start: Tick, end: Tick, mode: RangeMode) -> Vec<Note> {
        if end <= start {
            return Vec::new();
        }
        match mode {
            RangeMode::StartOnly => self
                .buckets
                .range(start..end)
                .flat_map(|(_, bucket)| bucket.iter())
                .copied()
                .collect(),
            RangeMode::FullOverlap => {
                let from = start.saturating_sub(self.max_length());
                self.buckets
                    .range(from..end)
                    .flat_map(|(_, bucket)| bucket.iter())
                    .filter(|n| n.overlaps(start, end))
                    .copied()
                    .collect()
            }
        }
    }

    /// Iterate in ascending start order
    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.buckets.values().flatten()
    }

    /// All notes in ascending start order, for serialization
    pub fn to_ordered_snapshot(&self) -> Vec<Note> {
        self.iter().copied().collect()
    }

    /// Remove every note
    pub fn clear(&mut self) {
        self.counter.sub(self.index.len());
        self.buckets.clear();
        self.index.clear();
        self.lengths.clear();
    }

    /// Longest stored note, 0 when empty
    pub fn max_length(&self) -> Tick {
        self.lengths.keys().next_back().copied().unwrap_or(0)
    }

    fn track_length(&mut self, length: Tick) {
        *self.lengths.entry(length).or_default() += 1;
    }

    fn untrack_length(&mut self, length: Tick) {
        if let Some(count) = self.lengths.get_mut(&length) {
            *count -= 1;
            if *count == 0 {
                self.lengths.remove(&length);
            }
        }
    }

    /// Withdraw this store's notes from the song-wide counter (store leaves the song)
    pub(crate) fn unregister(&self) {
        self.counter.sub(self.index.len());
    }

    /// Add this store's notes back to the song-wide counter (store rejoins the song)
    pub(crate) fn register(&self) {
        self.counter.add(self.index.len());
    }
}
