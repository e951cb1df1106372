// Session - A song together with its transport and scheduler
//
// The session is the control surface: transport commands, edits that can
// touch a sounding note, undo, preview and recording. Edits that can change
// or remove a sounding note release it through the trigger path first.

use crate::config::EngineConfig;
use crate::routing::graph::Connection;
use crate::sequencer::note::{MAX_PITCH, Note, NoteEdit, NoteId};
use crate::sequencer::pattern::PatternId;
use crate::sequencer::recorder::RecordBuffer;
use crate::sequencer::scheduler::{
    DEFAULT_LOOKAHEAD, PassReport, Scheduler, SoundingKey, SoundingNote,
};
use crate::sequencer::timeline::{MusicalTime, Tempo, Tick};
use crate::sequencer::transport::{Clock, LoopRegion, SeekTarget, SystemClock, TransportClock};
use crate::song::ids::RuntimeIds;
use crate::song::instrument::InstrumentId;
use crate::song::track::{PlaylistItem, PlaylistItemId, Track, TrackId};
use crate::song::{EditError, EditResult, Song};
use std::sync::{Arc, Mutex};

/// Default start preroll in seconds
pub const DEFAULT_PREROLL: f64 = 0.01;

/// Session shared between the control thread and the heartbeat
pub type SharedSession = Arc<Mutex<Session>>;

pub struct Session {
    song: Song,
    transport: TransportClock,
    scheduler: Scheduler,
    recorder: RecordBuffer,
    runtime_ids: RuntimeIds,
}

impl Session {
    pub fn new(song: Song, clock: Box<dyn Clock>, lookahead: f64, preroll: f64) -> Self {
        let mut transport = TransportClock::new(clock, song.tempo(), preroll);
        transport.set_loop_region(song.loop_region());
        Self {
            song,
            transport,
            scheduler: Scheduler::new(lookahead),
            recorder: RecordBuffer::new(),
            runtime_ids: RuntimeIds::new(),
        }
    }

    pub fn from_config(song: Song, clock: Box<dyn Clock>, config: &EngineConfig) -> Self {
        Self::new(song, clock, config.lookahead_seconds(), config.preroll_seconds())
    }

    /// Session on the system clock with default timing
    pub fn with_song(song: Song) -> Self {
        Self::new(song, Box::new(SystemClock::new()), DEFAULT_LOOKAHEAD, DEFAULT_PREROLL)
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    /// Run any song edit
    ///
    /// Afterwards every sounding note the edit moved, changed or removed is
    /// released, and tempo or loop changes reach the transport.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut Song) -> R) -> R {
        let result = f(&mut self.song);
        self.release_stale();
        self.sync_transport();
        result
    }

    /// Release sounding notes that no longer match the song
    fn release_stale(&mut self) -> usize {
        let song = &self.song;
        let stale: Vec<SoundingKey> = self
            .scheduler
            .sounding()
            .filter(|(key, note)| !still_sounds(song, key, note))
            .map(|(key, _)| *key)
            .collect();
        if stale.is_empty() {
            return 0;
        }
        self.scheduler.release_matching(&mut self.song, |key, _| stale.contains(key))
    }

    /// Bring the transport's tempo and loop in line with the song
    fn sync_transport(&mut self) {
        if self.transport.loop_region() != self.song.loop_region() {
            self.transport.set_loop_region(self.song.loop_region());
        }
        if self.transport.tempo() != self.song.tempo() {
            let at = self.current_tick();
            self.scheduler.release_all(&mut self.song);
            self.transport.set_tempo(self.song.tempo());
            self.transport.seek(SeekTarget::Ticks(at));
            self.scheduler.reset(at);
        }
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn position(&self) -> f64 {
        self.transport.position()
    }

    pub fn position_ticks(&self) -> f64 {
        self.transport.position_ticks()
    }

    /// Playhead as bars:beats:ticks in the song's time signature
    pub fn musical_position(&self) -> MusicalTime {
        MusicalTime::from_total_ticks(self.current_tick(), &self.song.time_signature())
    }

    fn current_tick(&self) -> Tick {
        self.transport.position_ticks().max(0.0).floor() as Tick
    }

    /// Replace the song; playback stops and the playhead returns to zero
    pub fn load_song(&mut self, song: Song) {
        self.stop_playback();
        self.recorder.clear();
        self.song = song;
        self.transport.set_tempo(self.song.tempo());
        self.transport.set_loop_region(self.song.loop_region());
        self.transport.seek(SeekTarget::Ticks(0));
        self.scheduler.reset(0);
        log::info!("Session loaded song '{}'", self.song.name());
    }

    // ---- transport ----

    /// Start playing from the current position; schedules the first window at once
    pub fn start_playback(&mut self) -> bool {
        let from = self.transport.position_ticks().max(0.0).ceil() as Tick;
        if !self.transport.start() {
            return false;
        }
        self.scheduler.reset(from);
        self.scheduler.tick(&mut self.song, &mut self.transport);
        log::info!("Playback started at tick {}", from);
        true
    }

    /// Stop and release every sounding note
    pub fn stop_playback(&mut self) -> bool {
        if !self.transport.is_playing() {
            return false;
        }
        let released = self.scheduler.release_all(&mut self.song);
        self.transport.stop();
        log::info!("Playback stopped, released {} notes", released);
        true
    }

    pub fn seek(&mut self, target: SeekTarget) {
        self.scheduler.release_all(&mut self.song);
        self.transport.seek(target);
        let from = self.transport.position_ticks().max(0.0).ceil() as Tick;
        self.scheduler.reset(from);
        if self.transport.is_playing() {
            self.scheduler.tick(&mut self.song, &mut self.transport);
        }
    }

    /// Set the loop region on the song (undoable) and the transport
    pub fn set_loop(&mut self, region: LoopRegion) -> EditResult<()> {
        self.song.set_loop_region(region)?;
        self.transport.set_loop_region(region);
        Ok(())
    }

    /// Change the tempo; the playhead keeps its musical position
    pub fn set_tempo(&mut self, tempo: Tempo) {
        let at = self.current_tick();
        self.scheduler.release_all(&mut self.song);
        self.song.set_tempo(tempo);
        self.transport.set_tempo(tempo);
        self.transport.seek(SeekTarget::Ticks(at));
        self.scheduler.reset(at);
    }

    /// Heartbeat entry point
    ///
    /// Playback stops once the playhead passes the song length with no loop active.
    pub fn tick(&mut self) -> PassReport {
        if !self.transport.is_playing() {
            return PassReport::default();
        }
        let report = self.scheduler.tick(&mut self.song, &mut self.transport);
        if !self.transport.loop_region().is_active()
            && self.transport.position_ticks() >= self.song.length() as f64
            && self.scheduler.sounding_count() == 0
        {
            log::debug!("End of song reached");
            self.stop_playback();
        }
        report
    }

    /// Release everything and silence every instrument
    pub fn panic(&mut self) {
        self.scheduler.panic(&mut self.song);
    }

    // ---- undo ----

    pub fn can_undo(&self) -> bool {
        self.song.can_undo()
    }

    /// Revert the last edit; sounding notes are released first
    pub fn undo(&mut self) -> Option<String> {
        if !self.song.can_undo() {
            return None;
        }
        self.scheduler.release_all(&mut self.song);
        let description = self.song.undo();
        self.sync_transport();
        description
    }

    // ---- edits touching sounding notes ----

    pub fn delete_note(&mut self, pattern: PatternId, id: NoteId) -> EditResult<Note> {
        self.scheduler.release_note(&mut self.song, pattern, id);
        self.song.delete_note(pattern, id)
    }

    pub fn update_note(
        &mut self,
        pattern: PatternId,
        id: NoteId,
        edit: NoteEdit,
    ) -> EditResult<Note> {
        self.scheduler.release_note(&mut self.song, pattern, id);
        self.song.update_note(pattern, id, edit)
    }

    pub fn quantize_notes(
        &mut self,
        pattern: PatternId,
        grid: Tick,
        selected_only: bool,
    ) -> EditResult<usize> {
        self.scheduler.release_pattern(&mut self.song, pattern);
        self.song.quantize_notes(pattern, grid, selected_only)
    }

    pub fn split_pattern(&mut self, pattern: PatternId, at: Tick) -> EditResult<PatternId> {
        self.scheduler.release_pattern(&mut self.song, pattern);
        self.song.split_pattern(pattern, at)
    }

    pub fn delete_pattern(&mut self, pattern: PatternId) -> EditResult<()> {
        self.scheduler.release_pattern(&mut self.song, pattern);
        self.song.delete_pattern(pattern)
    }

    pub fn delete_track(&mut self, track: TrackId) -> EditResult<Track> {
        self.scheduler.release_track(&mut self.song, track);
        self.song.delete_track(track)
    }

    pub fn remove_playlist_item(
        &mut self,
        track: TrackId,
        item: PlaylistItemId,
    ) -> EditResult<PlaylistItem> {
        self.scheduler.release_item(&mut self.song, item);
        self.song.remove_playlist_item(track, item)
    }

    pub fn move_playlist_item(
        &mut self,
        track: TrackId,
        item: PlaylistItemId,
        start: Tick,
    ) -> EditResult<()> {
        self.scheduler.release_item(&mut self.song, item);
        self.song.move_playlist_item(track, item, start)
    }

    pub fn remove_track_target(
        &mut self,
        track: TrackId,
        instrument: InstrumentId,
    ) -> EditResult<()> {
        self.scheduler.release_matching(&mut self.song, |_, s| {
            s.track == track && s.instruments.contains(&instrument)
        });
        self.song.remove_track_target(track, instrument)
    }

    pub fn remove_instrument(&mut self, instrument: InstrumentId) -> EditResult<()> {
        self.scheduler.release_instrument(&mut self.song, instrument);
        self.song.remove_instrument(instrument)
    }

    pub fn connect(&mut self, connection: Connection) -> EditResult<()> {
        self.song.connect(connection)
    }

    pub fn disconnect(&mut self, connection: Connection) -> EditResult<()> {
        self.song.disconnect(connection)
    }

    // ---- preview ----

    /// Audition a pitch on one instrument; the release is sent along with the attack
    pub fn preview_note(
        &mut self,
        instrument: InstrumentId,
        pitch: u8,
        velocity: f32,
        duration: f64,
    ) -> EditResult<NoteId> {
        if pitch > MAX_PITCH {
            return Err(EditError::Validation(format!("pitch {} outside 0..=127", pitch)));
        }
        let id = self.runtime_ids.allocate();
        let target = self
            .song
            .instrument_mut(instrument)
            .ok_or_else(|| EditError::NotFound(format!("instrument {}", instrument)))?;
        target.voice.trigger_attack(id, pitch, 0.0, velocity.clamp(0.0, 1.0));
        target.voice.trigger_release(id, duration.max(0.0));
        Ok(id)
    }

    // ---- recording ----

    /// Capture a key press at the playhead
    pub fn record_note_on(&mut self, pitch: u8, velocity: f32) -> NoteId {
        let id = self.runtime_ids.allocate();
        let tick = self.current_tick();
        self.recorder.note_on(pitch, velocity, tick, id);
        id
    }

    pub fn record_note_off(&mut self, pitch: u8) -> Option<NoteId> {
        let tick = self.current_tick();
        self.recorder.note_off(pitch, tick)
    }

    pub fn recorded_count(&self) -> usize {
        self.recorder.captured_count()
    }

    /// Close held keys and write the take into `pattern`
    ///
    /// `origin` is the song tick the pattern is placed at; recorded starts are
    /// rebased by it. The take is one undoable edit.
    pub fn commit_recording(
        &mut self,
        pattern: PatternId,
        origin: Tick,
    ) -> EditResult<Vec<NoteId>> {
        let tick = self.current_tick();
        self.recorder.finalize(tick);
        let take = self.recorder.drain();
        if take.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.song.commit_notes(pattern, &take, origin)?;
        log::info!("Committed {} recorded notes to pattern {}", ids.len(), pattern);
        Ok(ids)
    }

    /// Drop the current take
    pub fn discard_recording(&mut self) {
        self.recorder.clear();
    }
}

/// Whether a sounding note is still placed, pitched, timed and routed as when it started
fn still_sounds(song: &Song, key: &SoundingKey, sounding: &SoundingNote) -> bool {
    let Some(track) = song.track(sounding.track) else {
        return false;
    };
    let Some(item) = track.item(key.item) else {
        return false;
    };
    let Some(note) = song
        .pattern(item.pattern)
        .filter(|p| p.id == sounding.pattern)
        .and_then(|p| p.notes.get(key.note))
    else {
        return false;
    };
    let start = item.start.saturating_add(note.start);
    let end = item.start.saturating_add(note.end()).min(item.end());
    note.pitch == sounding.pitch
        && start == sounding.start
        && end == sounding.end
        && sounding
            .instruments
            .iter()
            .all(|i| track.targets.contains(i) && song.instrument(*i).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::transport::ManualClock;
    use crate::song::SongOptions;
    use crate::song::ids::RUNTIME_ID_BASE;
    use crate::song::instrument::{Voice, VoiceFactory};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Attack(NoteId, u8),
        Release(NoteId),
        KillAll,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Voice for Recorder {
        fn trigger_attack(&mut self, note_id: NoteId, pitch: u8, _delay: f64, _velocity: f32) {
            self.calls.lock().unwrap().push(Call::Attack(note_id, pitch));
        }

        fn trigger_release(&mut self, note_id: NoteId, _delay: f64) {
            self.calls.lock().unwrap().push(Call::Release(note_id));
        }

        fn kill_all_notes(&mut self) {
            self.calls.lock().unwrap().push(Call::KillAll);
        }
    }

    impl VoiceFactory for Recorder {
        fn create(&mut self, _kind: &str) -> Box<dyn Voice> {
            Box::new(self.clone())
        }
    }

    struct Fixture {
        session: Session,
        clock: ManualClock,
        calls: Arc<Mutex<Vec<Call>>>,
        pattern: PatternId,
        track: TrackId,
        synth: InstrumentId,
    }

    fn fixture() -> Fixture {
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        let mut song = Song::with_options(
            "Session",
            SongOptions {
                voice_factory: Box::new(recorder),
                ..SongOptions::default()
            },
        );
        let pattern = song.add_pattern("P", 1920).unwrap();
        let track = song.add_track("T").unwrap();
        let synth = song.add_instrument("Synth", "synth").unwrap();
        song.add_track_target(track, synth).unwrap();
        song.add_playlist_item(track, pattern, 0, None).unwrap();
        song.clear_history();

        let clock = ManualClock::new();
        clock.set(5.0);
        let session = Session::new(song, Box::new(clock.clone()), 0.05, 0.0);
        Fixture {
            session,
            clock,
            calls,
            pattern,
            track,
            synth,
        }
    }

    fn attacks(calls: &Arc<Mutex<Vec<Call>>>) -> usize {
        calls.lock().unwrap().iter().filter(|c| matches!(c, Call::Attack(..))).count()
    }

    fn releases(calls: &Arc<Mutex<Vec<Call>>>) -> usize {
        calls.lock().unwrap().iter().filter(|c| matches!(c, Call::Release(..))).count()
    }

    #[test]
    fn test_musical_position_follows_seek() {
        let mut f = fixture();
        f.session.seek(SeekTarget::Ticks(1920 + 480));
        assert_eq!(f.session.musical_position(), MusicalTime::new(2, 2, 0));
        assert_eq!(f.session.musical_position().to_string(), "2:02:000");
    }

    #[test]
    fn test_start_schedules_immediately() {
        let mut f = fixture();
        f.session.edit(|song| song.add_note(f.pattern, 60, 0, 480, 1.0)).unwrap();

        assert!(f.session.start_playback());
        assert!(!f.session.start_playback());
        assert_eq!(attacks(&f.calls), 1);
        assert_eq!(f.session.scheduler().sounding_count(), 1);
    }

    #[test]
    fn test_stop_releases_sounding_notes() {
        let mut f = fixture();
        for pitch in [60, 64, 67] {
            f.session.edit(|song| song.add_note(f.pattern, pitch, 0, 960, 1.0)).unwrap();
        }
        f.session.start_playback();
        assert_eq!(f.session.scheduler().sounding_count(), 3);

        assert!(f.session.stop_playback());
        assert_eq!(releases(&f.calls), 3);
        assert_eq!(f.session.scheduler().sounding_count(), 0);
        assert!(!f.session.stop_playback());
    }

    #[test]
    fn test_stopped_tick_is_idle() {
        let mut f = fixture();
        f.session.edit(|song| song.add_note(f.pattern, 60, 0, 480, 1.0)).unwrap();
        assert_eq!(f.session.tick(), PassReport::default());
        assert_eq!(attacks(&f.calls), 0);
    }

    #[test]
    fn test_delete_sounding_note_releases_first() {
        let mut f = fixture();
        let note = f.session.edit(|song| song.add_note(f.pattern, 60, 0, 960, 1.0)).unwrap();
        f.session.start_playback();

        f.session.delete_note(f.pattern, note).unwrap();
        assert_eq!(f.calls.lock().unwrap().last(), Some(&Call::Release(note)));
        assert_eq!(f.session.scheduler().sounding_count(), 0);
    }

    #[test]
    fn test_edit_releases_only_invalidated_notes() {
        let mut f = fixture();
        let held = f.session.edit(|song| song.add_note(f.pattern, 60, 0, 960, 1.0)).unwrap();
        let moved = f.session.edit(|song| song.add_note(f.pattern, 64, 0, 960, 1.0)).unwrap();
        let gone = f.session.edit(|song| song.add_note(f.pattern, 67, 0, 960, 1.0)).unwrap();
        f.session.start_playback();
        assert_eq!(f.session.scheduler().sounding_count(), 3);

        f.session.edit(|song| song.delete_note(f.pattern, gone)).unwrap();
        assert_eq!(f.calls.lock().unwrap().last(), Some(&Call::Release(gone)));

        let edit = NoteEdit {
            pitch: Some(65),
            ..NoteEdit::default()
        };
        f.session.edit(|song| song.update_note(f.pattern, moved, edit)).unwrap();
        assert_eq!(f.calls.lock().unwrap().last(), Some(&Call::Release(moved)));

        // Unrelated edits leave the remaining note alone
        f.session.edit(|song| song.add_note(f.pattern, 72, 1200, 100, 1.0)).unwrap();
        f.session.edit(|song| song.rename_pattern(f.pattern, "Renamed")).unwrap();
        let keys: Vec<NoteId> = f.session.scheduler().sounding().map(|(k, _)| k.note).collect();
        assert_eq!(keys, vec![held]);
        assert_eq!(releases(&f.calls), 2);
    }

    #[test]
    fn test_edit_releases_when_placement_or_routing_changes() {
        let mut f = fixture();
        f.session.edit(|song| song.add_note(f.pattern, 60, 0, 960, 1.0)).unwrap();
        f.session.start_playback();
        assert_eq!(f.session.scheduler().sounding_count(), 1);

        f.session.edit(|song| song.remove_track_target(f.track, f.synth)).unwrap();
        assert_eq!(f.session.scheduler().sounding_count(), 0);
        assert_eq!(releases(&f.calls), 1);
    }

    #[test]
    fn test_edit_syncs_loop_and_tempo_into_transport() {
        let mut f = fixture();
        let region = LoopRegion::new(true, 0, 960);
        f.session.edit(|song| song.set_loop_region(region)).unwrap();
        assert_eq!(f.session.transport().loop_region(), region);

        f.session.seek(SeekTarget::Ticks(480));
        f.session.edit(|song| song.set_tempo(Tempo::new(60.0)));
        assert_eq!(f.session.transport().tempo(), Tempo::new(60.0));
        assert!((f.session.position_ticks() - 480.0).abs() < 1e-6);
        assert!((f.session.position() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_target_releases_that_target() {
        let mut f = fixture();
        f.session.edit(|song| song.add_note(f.pattern, 60, 0, 960, 1.0)).unwrap();
        f.session.start_playback();

        f.session.remove_track_target(f.track, f.synth).unwrap();
        assert_eq!(releases(&f.calls), 1);
        assert!(f.session.song().track(f.track).unwrap().targets.is_empty());
    }

    #[test]
    fn test_seek_restarts_window() {
        let mut f = fixture();
        f.session.edit(|song| song.add_note(f.pattern, 60, 0, 100, 1.0)).unwrap();
        f.session.edit(|song| song.add_note(f.pattern, 62, 960, 100, 1.0)).unwrap();
        f.session.start_playback();
        assert_eq!(attacks(&f.calls), 1);

        f.session.seek(SeekTarget::Ticks(960));
        assert_eq!(attacks(&f.calls), 2);
        assert!((f.session.position_ticks() - 960.0).abs() < 1e-6);
    }

    #[test]
    fn test_set_loop_syncs_transport_and_undo() {
        let mut f = fixture();
        let region = LoopRegion::new(true, 0, 960);
        f.session.set_loop(region).unwrap();
        assert_eq!(f.session.transport().loop_region(), region);

        assert_eq!(f.session.undo().as_deref(), Some("Set loop"));
        assert_eq!(f.session.transport().loop_region(), LoopRegion::default());
    }

    #[test]
    fn test_tempo_change_keeps_tick_position() {
        let mut f = fixture();
        f.session.seek(SeekTarget::Ticks(960));
        f.session.set_tempo(Tempo::new(60.0));
        assert!((f.session.position_ticks() - 960.0).abs() < 1e-6);
        assert!((f.session.position() - 2.0).abs() < 1e-9);

        f.session.undo();
        assert_eq!(f.session.transport().tempo(), Tempo::new(120.0));
        assert!((f.session.position_ticks() - 960.0).abs() < 1e-6);
    }

    #[test]
    fn test_preview_uses_runtime_ids() {
        let mut f = fixture();
        let id = f.session.preview_note(f.synth, 72, 0.5, 0.25).unwrap();
        assert!(id >= RUNTIME_ID_BASE);
        assert_eq!(
            *f.calls.lock().unwrap(),
            vec![Call::Attack(id, 72), Call::Release(id)]
        );
        assert!(matches!(f.session.preview_note(999, 72, 0.5, 0.25), Err(EditError::NotFound(_))));
        assert!(f.session.preview_note(f.synth, 200, 0.5, 0.25).is_err());
    }

    #[test]
    fn test_record_and_commit() {
        let mut f = fixture();
        f.session.start_playback();
        f.session.record_note_on(60, 0.9);
        f.clock.advance(0.25);
        f.session.record_note_off(60);
        assert_eq!(f.session.recorded_count(), 1);
        f.session.record_note_on(64, 0.7);
        f.clock.advance(0.25);

        let ids = f.session.commit_recording(f.pattern, 0).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| *id < RUNTIME_ID_BASE));

        let notes = f.session.song().pattern(f.pattern).unwrap().notes.to_ordered_snapshot();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].start, 0);
        assert_eq!(notes[0].length, 240);
        assert_eq!(notes[1].start, 240);

        f.session.undo();
        assert_eq!(f.session.song().note_count(), 0);
    }

    #[test]
    fn test_discarded_take_commits_nothing() {
        let mut f = fixture();
        f.session.start_playback();
        f.session.record_note_on(60, 0.9);
        f.clock.advance(0.1);
        f.session.record_note_off(60);
        f.session.discard_recording();

        assert_eq!(f.session.recorded_count(), 0);
        assert!(f.session.commit_recording(f.pattern, 0).unwrap().is_empty());
        assert!(!f.session.can_undo());
    }

    #[test]
    fn test_playback_stops_at_song_end() {
        let mut f = fixture();
        f.session.edit(|song| song.set_length(480)).unwrap();
        f.session.start_playback();
        f.clock.advance(0.6);
        f.session.tick();
        assert!(!f.session.is_playing());
    }

    #[test]
    fn test_load_song_resets_transport() {
        let mut f = fixture();
        f.session.edit(|song| song.add_note(f.pattern, 60, 0, 960, 1.0)).unwrap();
        f.session.start_playback();

        let mut replacement = Song::new("Other");
        replacement.set_tempo(Tempo::new(90.0));
        f.session.load_song(replacement);

        assert!(!f.session.is_playing());
        assert_eq!(releases(&f.calls), 1);
        assert_eq!(f.session.song().name(), "Other");
        assert_eq!(f.session.transport().tempo(), Tempo::new(90.0));
        assert_eq!(f.session.position(), 0.0);
    }

    #[test]
    fn test_panic_kills_voices() {
        let mut f = fixture();
        f.session.edit(|song| song.add_note(f.pattern, 60, 0, 960, 1.0)).unwrap();
        f.session.start_playback();
        f.session.panic();
        assert!(f.calls.lock().unwrap().contains(&Call::KillAll));
        assert_eq!(f.session.scheduler().sounding_count(), 0);
    }
}
