// Song - The edit model: patterns, tracks, instruments, effects, routing
//
// Every public mutator validates before touching state, applies the change,
// then records exactly one inverse action. Inverse actions restore through the
// private `*_raw` helpers, which never record, so replaying undo cannot grow
// the history.

pub mod ids;
pub mod instrument;
pub mod track;

use crate::routing::graph::{
    Connection, GraphError, LinkBackend, NullBackend, RepairReport, RoutingGraph,
};
use crate::routing::node::{Node, NodeId, NodeKind, PortLayout};
use crate::sequencer::note::{Note, NoteEdit, NoteError, NoteId, RuntimeNote};
use crate::sequencer::note_store::{InsertError, NoteCounter};
use crate::sequencer::pattern::{Pattern, PatternId};
use crate::sequencer::timeline::{
    MAX_TICK, Tempo, Tick, TimeSignature, quantize_tick, TICKS_PER_QUARTER,
};
use crate::sequencer::transport::LoopRegion;
use crate::undo::{DEFAULT_MAX_HISTORY, UndoAction, UndoLog};
use ids::IdAllocator;
use instrument::{Effect, EffectId, Instrument, InstrumentId, SilentVoiceFactory, VoiceFactory};
use std::collections::BTreeMap;
use track::{PlaylistItem, PlaylistItemId, Track, TrackId};

/// Default note ceiling per pattern
pub const DEFAULT_NOTE_LIMIT: usize = 10_000;

/// Default song length: 16 bars of 4/4
pub const DEFAULT_SONG_LENGTH: Tick = TICKS_PER_QUARTER * 4 * 16;

/// Edit-path failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("invalid edit: {0}")]
    Validation(String),

    #[error("pattern holds the maximum of {limit} notes")]
    LimitExceeded { limit: usize },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<NoteError> for EditError {
    fn from(err: NoteError) -> Self {
        EditError::Validation(err.to_string())
    }
}

impl From<InsertError> for EditError {
    fn from(err: InsertError) -> Self {
        match err {
            InsertError::LimitExceeded { limit } => EditError::LimitExceeded { limit },
            other => EditError::Validation(other.to_string()),
        }
    }
}

pub type EditResult<T> = Result<T, EditError>;

/// Construction options for a song
pub struct SongOptions {
    pub note_limit: usize,
    pub undo_capacity: usize,
    pub voice_factory: Box<dyn VoiceFactory>,
    pub link_backend: Box<dyn LinkBackend>,
}

impl Default for SongOptions {
    fn default() -> Self {
        Self {
            note_limit: DEFAULT_NOTE_LIMIT,
            undo_capacity: DEFAULT_MAX_HISTORY,
            voice_factory: Box::new(SilentVoiceFactory),
            link_backend: Box::new(NullBackend),
        }
    }
}

/// A song and its undo history
pub struct Song {
    name: String,
    length: Tick,
    tempo: Tempo,
    time_signature: TimeSignature,
    loop_region: LoopRegion,
    patterns: BTreeMap<PatternId, Pattern>,
    tracks: BTreeMap<TrackId, Track>,
    instruments: BTreeMap<InstrumentId, Instrument>,
    effects: BTreeMap<EffectId, Effect>,
    graph: RoutingGraph,
    ids: IdAllocator,
    note_counter: NoteCounter,
    note_limit: usize,
    history: UndoLog<Song>,
    voice_factory: Box<dyn VoiceFactory>,
}

fn not_found(what: &str, id: u64) -> EditError {
    EditError::NotFound(format!("{} {}", what, id))
}

/// A span [start, start + length) must end on or before `MAX_TICK`
fn check_span(what: &str, start: Tick, length: Tick) -> EditResult<()> {
    match start.checked_add(length) {
        Some(end) if end <= MAX_TICK => Ok(()),
        _ => Err(EditError::Validation(format!(
            "{} at {} with length {} ends past tick {}",
            what, start, length, MAX_TICK
        ))),
    }
}

impl Song {
    /// Empty song with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, SongOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: SongOptions) -> Self {
        Self {
            name: name.into(),
            length: DEFAULT_SONG_LENGTH,
            tempo: Tempo::default(),
            time_signature: TimeSignature::default(),
            loop_region: LoopRegion::default(),
            patterns: BTreeMap::new(),
            tracks: BTreeMap::new(),
            instruments: BTreeMap::new(),
            effects: BTreeMap::new(),
            graph: RoutingGraph::new(options.link_backend),
            ids: IdAllocator::new(),
            note_counter: NoteCounter::new(),
            note_limit: options.note_limit,
            history: UndoLog::with_capacity(options.undo_capacity),
            voice_factory: options.voice_factory,
        }
    }

    // ---- accessors ----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> Tick {
        self.length
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(&id)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(&id)
    }

    /// Mutable access for triggering; structure edits go through the mutators
    pub fn instrument_mut(&mut self, id: InstrumentId) -> Option<&mut Instrument> {
        self.instruments.get_mut(&id)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub(crate) fn instruments_mut(&mut self) -> impl Iterator<Item = &mut Instrument> {
        self.instruments.values_mut()
    }

    pub fn effect(&self, id: EffectId) -> Option<&Effect> {
        self.effects.get(&id)
    }

    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.effects.values()
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    /// Notes across every pattern of the song
    pub fn note_count(&self) -> usize {
        self.note_counter.get()
    }

    pub fn note_limit(&self) -> usize {
        self.note_limit
    }

    /// Id high-water mark
    pub fn next_id(&self) -> u64 {
        self.ids.next_id()
    }

    // ---- undo ----

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.history.undo_description()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Revert the most recent edit; returns its description
    pub fn undo(&mut self) -> Option<String> {
        let action = self.history.pop()?;
        let description = action.description().to_string();
        action.revert(self);
        log::info!("Undo: {}", description);
        Some(description)
    }

    /// Drop every recorded action
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn record<F>(&mut self, description: impl Into<String>, revert: F)
    where
        F: FnOnce(&mut Song) + Send + 'static,
    {
        self.history.push(UndoAction::new(description, revert));
    }

    // ---- song metadata ----

    pub fn set_name(&mut self, name: impl Into<String>) {
        let previous = std::mem::replace(&mut self.name, name.into());
        self.record("Rename song", move |song| song.name = previous);
    }

    pub fn set_length(&mut self, length: Tick) -> EditResult<()> {
        if length == 0 {
            return Err(EditError::Validation("song length must be positive".into()));
        }
        check_span("song", 0, length)?;
        let previous = std::mem::replace(&mut self.length, length);
        self.record("Set song length", move |song| song.length = previous);
        Ok(())
    }

    /// Change the song tempo (fixed for the whole song)
    pub fn set_tempo(&mut self, tempo: Tempo) {
        let previous = std::mem::replace(&mut self.tempo, tempo);
        self.record("Set tempo", move |song| song.tempo = previous);
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        let previous = std::mem::replace(&mut self.time_signature, time_signature);
        self.record("Set time signature", move |song| song.time_signature = previous);
    }

    /// Loop region; an enabled region must be non-empty
    pub fn set_loop_region(&mut self, region: LoopRegion) -> EditResult<()> {
        if region.enabled && region.end <= region.start {
            return Err(EditError::Validation(format!(
                "loop end {} must be after start {}",
                region.end, region.start
            )));
        }
        check_span("loop", region.start, region.length())?;
        let previous = std::mem::replace(&mut self.loop_region, region);
        self.record("Set loop", move |song| song.loop_region = previous);
        Ok(())
    }

    // ---- patterns ----

    fn pattern_mut(&mut self, id: PatternId) -> EditResult<&mut Pattern> {
        self.patterns.get_mut(&id).ok_or_else(|| not_found("pattern", id))
    }

    fn take_pattern_raw(&mut self, id: PatternId) -> Option<Pattern> {
        let pattern = self.patterns.remove(&id)?;
        pattern.notes.unregister();
        Some(pattern)
    }

    fn put_pattern_raw(&mut self, pattern: Pattern) {
        pattern.notes.register();
        self.patterns.insert(pattern.id, pattern);
    }

    /// Create an empty pattern
    pub fn add_pattern(&mut self, name: impl Into<String>, length: Tick) -> EditResult<PatternId> {
        if length == 0 {
            return Err(EditError::Validation("pattern length must be positive".into()));
        }
        check_span("pattern", 0, length)?;
        let id = self.ids.allocate();
        let pattern = Pattern::new(
            id,
            name.into(),
            length,
            self.note_limit,
            self.note_counter.clone(),
        );
        self.patterns.insert(id, pattern);
        self.record("Add pattern", move |song| {
            song.take_pattern_raw(id);
        });
        Ok(id)
    }

    pub fn rename_pattern(&mut self, id: PatternId, name: impl Into<String>) -> EditResult<()> {
        let pattern = self.pattern_mut(id)?;
        let previous = std::mem::replace(&mut pattern.name, name.into());
        self.record("Rename pattern", move |song| {
            if let Some(pattern) = song.patterns.get_mut(&id) {
                pattern.name = previous;
            }
        });
        Ok(())
    }

    /// Duplicate a pattern; every note of the copy gets a fresh id
    pub fn copy_pattern(&mut self, id: PatternId) -> EditResult<PatternId> {
        let source = self.pattern(id).ok_or_else(|| not_found("pattern", id))?;
        let name = format!("{} (copy)", source.name);
        let (color, length) = (source.color, source.length);
        let notes = source.notes.to_ordered_snapshot();

        let new_id = self.ids.allocate();
        let mut copy =
            Pattern::new(new_id, name, length, self.note_limit, self.note_counter.clone());
        copy.color = color;
        for note in notes {
            let fresh = Note {
                id: self.ids.allocate(),
                selected: false,
                ..note
            };
            copy.notes.insert(fresh)?;
        }
        self.patterns.insert(new_id, copy);

        self.record("Copy pattern", move |song| {
            song.take_pattern_raw(new_id);
        });
        Ok(new_id)
    }

    /// Split at `at`: notes starting at or after it move to a new pattern
    ///
    /// Moved notes keep their ids and are rebased to the new pattern's start.
    pub fn split_pattern(&mut self, id: PatternId, at: Tick) -> EditResult<PatternId> {
        let pattern = self.pattern(id).ok_or_else(|| not_found("pattern", id))?;
        let old_length = pattern.length;
        if at == 0 || at >= old_length {
            return Err(EditError::Validation(format!(
                "split point {} outside pattern of length {}",
                at, old_length
            )));
        }
        let (name, color) = (format!("{} (split)", pattern.name), pattern.color);
        let moved = pattern.notes_from(at);

        let new_id = self.ids.allocate();
        let mut right = Pattern::new(
            new_id,
            name,
            old_length - at,
            self.note_limit,
            self.note_counter.clone(),
        );
        right.color = color;

        let left = self.pattern_mut(id)?;
        for note in &moved {
            left.notes.remove(note.id);
        }
        left.length = at;
        for note in moved {
            // Cannot exceed the limit: the right side holds a subset of the left
            right.notes.insert(Note {
                start: note.start - at,
                ..note
            })?;
        }
        self.patterns.insert(new_id, right);

        self.record("Split pattern", move |song| {
            let Some(right) = song.take_pattern_raw(new_id) else {
                return;
            };
            if let Some(left) = song.patterns.get_mut(&id) {
                for note in right.notes.iter() {
                    let restored = Note {
                        start: note.start + at,
                        ..*note
                    };
                    if let Err(e) = left.notes.insert(restored) {
                        log::warn!("Undo split: could not restore note {}: {}", note.id, e);
                    }
                }
                left.length = old_length;
            }
        });
        Ok(new_id)
    }

    /// Remove a pattern and every playlist item placing it
    pub fn delete_pattern(&mut self, id: PatternId) -> EditResult<()> {
        let pattern = self.take_pattern_raw(id).ok_or_else(|| not_found("pattern", id))?;

        let mut detached: Vec<(TrackId, PlaylistItem)> = Vec::new();
        for track in self.tracks.values_mut() {
            let items: Vec<PlaylistItemId> = track
                .playlist
                .iter()
                .filter(|i| i.pattern == id)
                .map(|i| i.id)
                .collect();
            for item in items {
                if let Some(item) = track.remove_item(item) {
                    detached.push((track.id, item));
                }
            }
        }
        log::debug!("Deleted pattern {} ({} placements detached)", id, detached.len());

        self.record("Delete pattern", move |song| {
            song.put_pattern_raw(pattern);
            for (track, item) in detached {
                if let Some(track) = song.tracks.get_mut(&track) {
                    track.insert_item(item);
                }
            }
        });
        Ok(())
    }

    // ---- notes ----

    /// Add a note with a freshly allocated id
    pub fn add_note(
        &mut self,
        pattern: PatternId,
        pitch: u8,
        start: Tick,
        length: Tick,
        velocity: f32,
    ) -> EditResult<NoteId> {
        let note = Note::new(self.ids.next_id(), pitch, start, length, velocity)?;
        self.pattern_mut(pattern)?.notes.insert(note)?;
        let id = self.ids.allocate();

        self.record("Add note", move |song| {
            if let Some(p) = song.patterns.get_mut(&pattern) {
                p.notes.remove(id);
            }
        });
        Ok(id)
    }

    pub fn delete_note(&mut self, pattern: PatternId, id: NoteId) -> EditResult<Note> {
        let note = self
            .pattern_mut(pattern)?
            .notes
            .remove(id)
            .ok_or_else(|| not_found("note", id))?;

        self.record("Delete note", move |song| {
            if let Some(p) = song.patterns.get_mut(&pattern)
                && let Err(e) = p.notes.insert(note)
            {
                log::warn!("Undo delete: could not restore note {}: {}", note.id, e);
            }
        });
        Ok(note)
    }

    /// Edit a note in place (id preserved); returns the previous value
    pub fn update_note(
        &mut self,
        pattern: PatternId,
        id: NoteId,
        edit: NoteEdit,
    ) -> EditResult<Note> {
        let store = &mut self.pattern_mut(pattern)?.notes;
        let current = *store.get(id).ok_or_else(|| not_found("note", id))?;
        let edited = edit.apply(&current);
        edited.validate()?;
        let previous = store.replace(edited)?;

        self.record("Edit note", move |song| {
            if let Some(p) = song.patterns.get_mut(&pattern)
                && let Err(e) = p.notes.replace(previous)
            {
                log::warn!("Undo edit: could not restore note {}: {}", previous.id, e);
            }
        });
        Ok(previous)
    }

    /// Selection is editor state and is not recorded
    pub fn set_note_selected(
        &mut self,
        pattern: PatternId,
        id: NoteId,
        selected: bool,
    ) -> EditResult<()> {
        if self.pattern_mut(pattern)?.notes.set_selected(id, selected) {
            Ok(())
        } else {
            Err(not_found("note", id))
        }
    }

    pub fn clear_selection(&mut self, pattern: PatternId) -> EditResult<()> {
        self.pattern_mut(pattern)?.notes.clear_selection();
        Ok(())
    }

    pub fn selected_notes(&self, pattern: PatternId) -> EditResult<Vec<Note>> {
        self.pattern(pattern)
            .map(|p| p.notes.selected())
            .ok_or_else(|| not_found("pattern", pattern))
    }

    /// Snap note starts to `grid`; returns how many notes moved
    ///
    /// Records one action covering every moved note, or none if nothing moved.
    pub fn quantize_notes(
        &mut self,
        pattern: PatternId,
        grid: Tick,
        selected_only: bool,
    ) -> EditResult<usize> {
        if grid == 0 {
            return Err(EditError::Validation("quantize grid must be positive".into()));
        }
        let store = &mut self.pattern_mut(pattern)?.notes;
        let candidates: Vec<Note> = if selected_only {
            store.selected()
        } else {
            store.to_ordered_snapshot()
        };

        let mut previous = Vec::new();
        for note in candidates {
            let start = quantize_tick(note.start, grid);
            if start != note.start {
                previous.push(store.replace(Note { start, ..note })?);
            }
        }
        let moved = previous.len();
        if moved > 0 {
            self.record("Quantize notes", move |song| {
                if let Some(p) = song.patterns.get_mut(&pattern) {
                    for note in previous {
                        if let Err(e) = p.notes.replace(note) {
                            log::warn!("Undo quantize: could not restore note {}: {}", note.id, e);
                        }
                    }
                }
            });
        }
        Ok(moved)
    }

    /// Turn captured runtime notes into persisted notes with fresh ids
    ///
    /// Starts are rebased by `origin` (the pattern's song position). The whole
    /// batch is one undoable edit and is rejected if it would pass the ceiling.
    pub fn commit_notes(
        &mut self,
        pattern: PatternId,
        notes: &[RuntimeNote],
        origin: Tick,
    ) -> EditResult<Vec<NoteId>> {
        let store = &self.pattern_mut(pattern)?.notes;
        if store.len() + notes.len() > store.limit() {
            return Err(EditError::LimitExceeded { limit: store.limit() });
        }

        let mut first = self.ids.next_id();
        let mut staged = Vec::with_capacity(notes.len());
        for captured in notes {
            staged.push(Note::new(
                first,
                captured.pitch,
                captured.start.saturating_sub(origin),
                captured.length,
                captured.velocity,
            )?);
            first += 1;
        }

        let store = &mut self.pattern_mut(pattern)?.notes;
        let mut ids = Vec::with_capacity(staged.len());
        for note in staged {
            store.insert(note)?;
            ids.push(note.id);
        }
        for _ in &ids {
            self.ids.allocate();
        }

        if !ids.is_empty() {
            let committed = ids.clone();
            self.record("Record notes", move |song| {
                if let Some(p) = song.patterns.get_mut(&pattern) {
                    for id in committed {
                        p.notes.remove(id);
                    }
                }
            });
        }
        Ok(ids)
    }

    // ---- tracks ----

    fn track_mut(&mut self, id: TrackId) -> EditResult<&mut Track> {
        self.tracks.get_mut(&id).ok_or_else(|| not_found("track", id))
    }

    /// Re-add a detached node and replay its edges
    fn restore_node_raw(&mut self, node: Node, edges: Vec<Connection>) {
        if let Err(e) = self.graph.add_node(node) {
            log::warn!("Could not restore graph node: {}", e);
            return;
        }
        for edge in edges {
            if let Err(e) = self.graph.connect(edge) {
                log::warn!("Could not restore connection {:?}: {}", edge, e);
            }
        }
    }

    pub fn add_track(&mut self, name: impl Into<String>) -> EditResult<TrackId> {
        let name = name.into();
        let id = self.ids.allocate();
        self.graph
            .add_node(Node::new(NodeId(id), name.clone(), NodeKind::Track, PortLayout::track()))?;
        self.tracks.insert(id, Track::new(id, name));

        self.record("Add track", move |song| {
            song.tracks.remove(&id);
            let _ = song.graph.remove_node(NodeId(id));
        });
        Ok(id)
    }

    /// Remove a track; its node is unlinked first
    pub fn delete_track(&mut self, id: TrackId) -> EditResult<Track> {
        if !self.tracks.contains_key(&id) {
            return Err(not_found("track", id));
        }
        let (node, edges) = self.graph.remove_node(NodeId(id))?;
        let track = self.tracks.remove(&id).ok_or_else(|| not_found("track", id))?;

        let restored = track.clone();
        self.record("Delete track", move |song| {
            song.restore_node_raw(node, edges);
            song.tracks.insert(restored.id, restored);
        });
        Ok(track)
    }

    pub fn rename_track(&mut self, id: TrackId, name: impl Into<String>) -> EditResult<()> {
        let track = self.track_mut(id)?;
        let previous = std::mem::replace(&mut track.name, name.into());
        self.record("Rename track", move |song| {
            if let Some(track) = song.tracks.get_mut(&id) {
                track.name = previous;
            }
        });
        Ok(())
    }

    /// Place a pattern on a track; `length` defaults to the pattern length
    pub fn add_playlist_item(
        &mut self,
        track: TrackId,
        pattern: PatternId,
        start: Tick,
        length: Option<Tick>,
    ) -> EditResult<PlaylistItemId> {
        let pattern_length = self
            .pattern(pattern)
            .map(|p| p.length)
            .ok_or_else(|| not_found("pattern", pattern))?;
        let length = length.unwrap_or(pattern_length);
        if length == 0 {
            return Err(EditError::Validation("playlist item length must be positive".into()));
        }
        check_span("playlist item", start, length)?;
        self.track_mut(track)?;

        let id = self.ids.allocate();
        let item = PlaylistItem {
            id,
            pattern,
            start,
            length,
        };
        self.track_mut(track)?.insert_item(item);

        self.record("Add playlist item", move |song| {
            if let Some(t) = song.tracks.get_mut(&track) {
                t.remove_item(id);
            }
        });
        Ok(id)
    }

    pub fn remove_playlist_item(
        &mut self,
        track: TrackId,
        item: PlaylistItemId,
    ) -> EditResult<PlaylistItem> {
        let removed = self
            .track_mut(track)?
            .remove_item(item)
            .ok_or_else(|| not_found("playlist item", item))?;

        self.record("Remove playlist item", move |song| {
            if let Some(t) = song.tracks.get_mut(&track) {
                t.insert_item(removed);
            }
        });
        Ok(removed)
    }

    /// Move a placement to a new song tick
    pub fn move_playlist_item(
        &mut self,
        track: TrackId,
        item: PlaylistItemId,
        start: Tick,
    ) -> EditResult<()> {
        let t = self.track_mut(track)?;
        let length = t
            .item(item)
            .map(|i| i.length)
            .ok_or_else(|| not_found("playlist item", item))?;
        check_span("playlist item", start, length)?;
        let t = self.track_mut(track)?;
        let mut moved = t.remove_item(item).ok_or_else(|| not_found("playlist item", item))?;
        let previous = moved.start;
        moved.start = start;
        t.insert_item(moved);

        self.record("Move playlist item", move |song| {
            if let Some(t) = song.tracks.get_mut(&track)
                && let Some(mut moved) = t.remove_item(item)
            {
                moved.start = previous;
                t.insert_item(moved);
            }
        });
        Ok(())
    }

    /// Route a track's notes to an instrument
    pub fn add_track_target(&mut self, track: TrackId, instrument: InstrumentId) -> EditResult<()> {
        if !self.instruments.contains_key(&instrument) {
            return Err(not_found("instrument", instrument));
        }
        if !self.track_mut(track)?.targets.insert(instrument) {
            return Ok(());
        }
        self.record("Add track target", move |song| {
            if let Some(t) = song.tracks.get_mut(&track) {
                t.targets.remove(&instrument);
            }
        });
        Ok(())
    }

    pub fn remove_track_target(
        &mut self,
        track: TrackId,
        instrument: InstrumentId,
    ) -> EditResult<()> {
        if !self.track_mut(track)?.targets.remove(&instrument) {
            return Err(not_found("track target", instrument));
        }
        self.record("Remove track target", move |song| {
            if let Some(t) = song.tracks.get_mut(&track) {
                t.targets.insert(instrument);
            }
        });
        Ok(())
    }

    // ---- instruments and effects ----

    /// Create an instrument; its voice comes from the song's voice factory
    pub fn add_instrument(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> EditResult<InstrumentId> {
        let (name, kind) = (name.into(), kind.into());
        let voice = self.voice_factory.create(&kind);
        let id = self.ids.allocate();
        self.graph
            .add_node(Node::new(NodeId(id), name.clone(), NodeKind::Instrument, voice.ports()))?;
        self.instruments.insert(id, Instrument::new(id, name, kind, voice));

        self.record("Add instrument", move |song| {
            song.instruments.remove(&id);
            let _ = song.graph.remove_node(NodeId(id));
        });
        Ok(id)
    }

    /// Remove an instrument; its node is unlinked first
    ///
    /// Track targets naming it are kept and resolve to nothing during playback.
    pub fn remove_instrument(&mut self, id: InstrumentId) -> EditResult<()> {
        if !self.instruments.contains_key(&id) {
            return Err(not_found("instrument", id));
        }
        let (node, edges) = self.graph.remove_node(NodeId(id))?;
        let instrument = self.instruments.remove(&id).ok_or_else(|| not_found("instrument", id))?;

        self.record("Remove instrument", move |song| {
            song.restore_node_raw(node, edges);
            song.instruments.insert(instrument.id, instrument);
        });
        Ok(())
    }

    pub fn add_effect(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> EditResult<EffectId> {
        let (name, kind) = (name.into(), kind.into());
        let id = self.ids.allocate();
        self.graph
            .add_node(Node::new(NodeId(id), name.clone(), NodeKind::Effect, PortLayout::effect()))?;
        self.effects.insert(id, Effect { id, name, kind });

        self.record("Add effect", move |song| {
            song.effects.remove(&id);
            let _ = song.graph.remove_node(NodeId(id));
        });
        Ok(id)
    }

    pub fn remove_effect(&mut self, id: EffectId) -> EditResult<Effect> {
        if !self.effects.contains_key(&id) {
            return Err(not_found("effect", id));
        }
        let (node, edges) = self.graph.remove_node(NodeId(id))?;
        let effect = self.effects.remove(&id).ok_or_else(|| not_found("effect", id))?;

        let restored = effect.clone();
        self.record("Remove effect", move |song| {
            song.restore_node_raw(node, edges);
            song.effects.insert(restored.id, restored);
        });
        Ok(effect)
    }

    // ---- routing ----

    /// Connect two ports; a rejected connection records nothing
    pub fn connect(&mut self, connection: Connection) -> EditResult<()> {
        self.graph.connect(connection)?;
        self.record("Connect", move |song| {
            if let Err(e) = song.graph.disconnect(connection) {
                log::warn!("Undo connect failed: {}", e);
            }
        });
        Ok(())
    }

    pub fn disconnect(&mut self, connection: Connection) -> EditResult<()> {
        self.graph.disconnect(connection)?;
        self.record("Disconnect", move |song| {
            if let Err(e) = song.graph.connect(connection) {
                log::warn!("Undo disconnect failed: {}", e);
            }
        });
        Ok(())
    }

    // ---- bulk import (no history) ----

    /// Import a pattern with its notes, ids as persisted
    pub(crate) fn import_pattern(
        &mut self,
        id: PatternId,
        name: String,
        color: [u8; 3],
        length: Tick,
        notes: Vec<Note>,
    ) -> EditResult<()> {
        if self.patterns.contains_key(&id) {
            return Err(EditError::Validation(format!("duplicate pattern id {}", id)));
        }
        check_span("pattern", 0, length)?;
        self.claim_id(id)?;
        let mut pattern =
            Pattern::new(id, name, length, self.note_limit, self.note_counter.clone());
        pattern.color = color;
        for note in notes {
            let stored = self
                .claim_id(note.id)
                .and_then(|()| pattern.notes.insert(note).map_err(EditError::from));
            if let Err(e) = stored {
                // Keep the counter consistent with what actually stays in the song
                pattern.notes.clear();
                return Err(e);
            }
        }
        self.patterns.insert(id, pattern);
        Ok(())
    }

    pub(crate) fn import_track(&mut self, track: Track, node: Node) -> EditResult<()> {
        if self.tracks.contains_key(&track.id) {
            return Err(EditError::Validation(format!("duplicate track id {}", track.id)));
        }
        self.claim_id(track.id)?;
        for item in &track.playlist {
            self.claim_id(item.id)?;
            check_span("playlist item", item.start, item.length)?;
        }
        self.graph.add_node(node)?;
        self.tracks.insert(track.id, track);
        Ok(())
    }

    pub(crate) fn import_instrument(
        &mut self,
        id: InstrumentId,
        name: String,
        kind: String,
        node: Node,
    ) -> EditResult<()> {
        if self.instruments.contains_key(&id) {
            return Err(EditError::Validation(format!("duplicate instrument id {}", id)));
        }
        self.claim_id(id)?;
        let voice = self.voice_factory.create(&kind);
        self.graph.add_node(node)?;
        self.instruments.insert(id, Instrument::new(id, name, kind, voice));
        Ok(())
    }

    pub(crate) fn import_effect(&mut self, effect: Effect, node: Node) -> EditResult<()> {
        if self.effects.contains_key(&effect.id) {
            return Err(EditError::Validation(format!("duplicate effect id {}", effect.id)));
        }
        self.claim_id(effect.id)?;
        self.graph.add_node(node)?;
        self.effects.insert(effect.id, effect);
        Ok(())
    }

    pub(crate) fn import_settings(
        &mut self,
        length: Tick,
        tempo: Tempo,
        time_signature: TimeSignature,
        loop_region: LoopRegion,
    ) -> EditResult<()> {
        check_span("song", 0, length)?;
        check_span("loop", loop_region.start, loop_region.length())?;
        self.length = length;
        self.tempo = tempo;
        self.time_signature = time_signature;
        self.loop_region = loop_region;
        Ok(())
    }

    /// Prune and relink persisted connections
    pub(crate) fn repair_graph(&mut self) -> RepairReport {
        self.graph.repair()
    }

    /// Restore the id high-water mark; never lowers it below ids already seen
    pub(crate) fn restore_next_id(&mut self, next: u64) -> EditResult<()> {
        self.ids
            .restore(next)
            .map_err(|e| EditError::Validation(format!("next id: {}", e)))
    }

    fn claim_id(&mut self, id: u64) -> EditResult<()> {
        self.ids.observe(id).map_err(|e| EditError::Validation(e.to_string()))
    }
}

impl std::fmt::Debug for Song {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Song")
            .field("name", &self.name)
            .field("patterns", &self.patterns.len())
            .field("tracks", &self.tracks.len())
            .field("instruments", &self.instruments.len())
            .field("effects", &self.effects.len())
            .field("notes", &self.note_count())
            .finish_non_exhaustive()
    }
}
