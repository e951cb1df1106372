// Scheduler - Lookahead note scheduling driven by the heartbeat
//
// Each pass covers the half-open tick window [last_scheduled_end, now + ahead).
// Onsets whose start falls in the window are sent to the track's instruments
// with a delay relative to the current position, and sounding notes whose end
// falls in the window are released. Because the window always starts where the
// previous one ended, a skipped heartbeat is caught up by the next pass and no
// onset is emitted twice.
//
// Loop seam: when the loop end comes within the lookahead, the window is
// clamped to loop.end, notes still sounding at the seam are cut there, and the
// transport is moved back by one loop length (phase preserved). A second pass
// then schedules the start of the next cycle. The boundary tick loop.end
// belongs to the post-wrap window, re-expressed as loop.start.

use crate::sequencer::note::NoteId;
use crate::sequencer::note_store::RangeMode;
use crate::sequencer::pattern::PatternId;
use crate::sequencer::timeline::Tick;
use crate::sequencer::transport::{LoopRegion, SeekTarget, TransportClock};
use crate::song::Song;
use crate::song::instrument::InstrumentId;
use crate::song::track::{PlaylistItemId, TrackId};
use std::collections::BTreeMap;

/// Default lookahead in seconds
pub const DEFAULT_LOOKAHEAD: f64 = 0.05;

/// Identity of one scheduled onset: a note as placed by one playlist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SoundingKey {
    pub item: PlaylistItemId,
    pub note: NoteId,
}

/// A note whose onset was emitted and whose offset was not
#[derive(Debug, Clone, PartialEq)]
pub struct SoundingNote {
    pub pitch: u8,
    /// Song tick of the onset
    pub start: Tick,
    /// Song tick of the offset
    pub end: Tick,
    pub track: TrackId,
    pub pattern: PatternId,
    /// Instruments the onset went to
    pub instruments: Vec<InstrumentId>,
}

/// Trigger call resolved during a pass, dispatched once the pass is done
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    Attack {
        instrument: InstrumentId,
        note_id: NoteId,
        pitch: u8,
        delay: f64,
        velocity: f32,
    },
    Release {
        instrument: InstrumentId,
        note_id: NoteId,
        delay: f64,
    },
}

/// What a heartbeat pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub onsets: usize,
    pub offsets: usize,
    pub wrapped: bool,
}

/// Lookahead scheduler; owns the set of sounding notes
#[derive(Debug)]
pub struct Scheduler {
    lookahead: f64,
    last_scheduled_end: i64,
    /// Transport was moved before loop.start and has not reached it yet
    seam_pending: bool,
    sounding: BTreeMap<SoundingKey, SoundingNote>,
}

impl Scheduler {
    pub fn new(lookahead_seconds: f64) -> Self {
        Self {
            lookahead: lookahead_seconds,
            last_scheduled_end: 0,
            seam_pending: false,
            sounding: BTreeMap::new(),
        }
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// End of the last scheduled window (may be negative during preroll)
    pub fn last_scheduled_end(&self) -> i64 {
        self.last_scheduled_end
    }

    pub fn sounding_count(&self) -> usize {
        self.sounding.len()
    }

    pub fn sounding(&self) -> impl Iterator<Item = (&SoundingKey, &SoundingNote)> {
        self.sounding.iter()
    }

    /// Restart scheduling at `start` (play, seek). Sounding notes are untouched.
    pub fn reset(&mut self, start: Tick) {
        self.last_scheduled_end = start as i64;
        self.seam_pending = false;
    }

    /// One heartbeat pass
    pub fn tick(&mut self, song: &mut Song, transport: &mut TransportClock) -> PassReport {
        let mut report = PassReport::default();
        let mut triggers = Vec::new();

        let wrap = self.schedule_window(song, transport, true, &mut triggers, &mut report);
        if let Some(region) = wrap {
            self.wrap(transport, region, &mut triggers, &mut report);
            self.schedule_window(song, transport, false, &mut triggers, &mut report);
        }

        dispatch(song, &triggers);
        report
    }

    fn schedule_window(
        &mut self,
        song: &Song,
        transport: &TransportClock,
        allow_wrap: bool,
        triggers: &mut Vec<Trigger>,
        report: &mut PassReport,
    ) -> Option<LoopRegion> {
        let tempo = transport.tempo();
        let position = transport.position();
        let now = tempo.seconds_to_ticks(position).floor() as i64;
        let ahead = tempo.seconds_to_ticks(self.lookahead).round().max(1.0) as i64;

        let region = transport.loop_region();
        let looping = region.is_active() && self.last_scheduled_end <= region.end as i64;
        if self.seam_pending && now >= region.start as i64 {
            self.seam_pending = false;
        }
        let do_wrap =
            allow_wrap && looping && !self.seam_pending && (region.end as i64 - now) < ahead;

        let mut end = now + ahead;
        if looping {
            end = end.min(region.end as i64);
        }
        let start = self.last_scheduled_end;
        let end = end.max(start);

        if transport.is_playing() && end > start {
            self.schedule_onsets(
                song,
                start.max(0) as Tick,
                end.max(0) as Tick,
                position,
                transport,
                triggers,
                report,
            );
        }

        // Offsets due inside the window
        let due: Vec<SoundingKey> = self
            .sounding
            .iter()
            .filter(|(_, s)| (s.end as i64) < end)
            .map(|(k, _)| *k)
            .collect();
        for key in due {
            if let Some(note) = self.sounding.remove(&key) {
                let delay = (tempo.ticks_to_seconds(note.end as f64) - position).max(0.0);
                push_release(triggers, key.note, &note, delay);
                report.offsets += 1;
            }
        }

        self.last_scheduled_end = end;
        do_wrap.then_some(region)
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule_onsets(
        &mut self,
        song: &Song,
        start: Tick,
        end: Tick,
        position: f64,
        transport: &TransportClock,
        triggers: &mut Vec<Trigger>,
        report: &mut PassReport,
    ) {
        if end <= start {
            return;
        }
        let tempo = transport.tempo();

        for track in song.tracks() {
            let instruments: Vec<InstrumentId> = track.targets.iter().copied().collect();
            for item in &track.playlist {
                let Some((from, to)) = item.local_window(start, end) else {
                    continue;
                };
                // Dangling placement: nothing to play
                let Some(pattern) = song.pattern(item.pattern) else {
                    continue;
                };

                for note in pattern.notes.range_query(from, to, RangeMode::StartOnly) {
                    let key = SoundingKey {
                        item: item.id,
                        note: note.id,
                    };
                    let onset = item.start.saturating_add(note.start);
                    let delay = (tempo.ticks_to_seconds(onset as f64) - position).max(0.0);

                    // Still sounding from an earlier onset: close it first
                    if let Some(previous) = self.sounding.remove(&key) {
                        push_release(triggers, note.id, &previous, delay);
                        report.offsets += 1;
                    }

                    for instrument in &instruments {
                        triggers.push(Trigger::Attack {
                            instrument: *instrument,
                            note_id: note.id,
                            pitch: note.pitch,
                            delay,
                            velocity: note.velocity,
                        });
                    }
                    self.sounding.insert(
                        key,
                        SoundingNote {
                            pitch: note.pitch,
                            start: onset,
                            end: item.start.saturating_add(note.end()).min(item.end()),
                            track: track.id,
                            pattern: pattern.id,
                            instruments: instruments.clone(),
                        },
                    );
                    report.onsets += 1;
                }
            }
        }
    }

    fn wrap(
        &mut self,
        transport: &mut TransportClock,
        region: LoopRegion,
        triggers: &mut Vec<Trigger>,
        report: &mut PassReport,
    ) {
        let tempo = transport.tempo();
        let position = transport.position();
        let loop_start = tempo.ticks_to_seconds(region.start as f64);
        let loop_end = tempo.ticks_to_seconds(region.end as f64);

        // Cut notes crossing the seam
        let crossing: Vec<SoundingKey> = self
            .sounding
            .iter()
            .filter(|(_, s)| s.end >= region.end)
            .map(|(k, _)| *k)
            .collect();
        let delay = (loop_end - position).max(0.0);
        for key in crossing {
            if let Some(note) = self.sounding.remove(&key) {
                push_release(triggers, key.note, &note, delay);
                report.offsets += 1;
            }
        }

        let overshoot = position - loop_end;
        let target = if overshoot < 0.0 {
            loop_start + overshoot
        } else {
            loop_start + overshoot % (loop_end - loop_start)
        };
        transport.seek(SeekTarget::Seconds(target));

        self.last_scheduled_end = region.start as i64;
        self.seam_pending = overshoot < 0.0;
        report.wrapped = true;
        log::trace!(
            "Loop wrap: {:.4}s -> {:.4}s (seam in {:.4}s)",
            position,
            target,
            delay
        );
    }

    /// Release every sounding note matching `pred` immediately
    pub fn release_matching<F>(&mut self, song: &mut Song, pred: F) -> usize
    where
        F: Fn(&SoundingKey, &SoundingNote) -> bool,
    {
        let keys: Vec<SoundingKey> = self
            .sounding
            .iter()
            .filter(|(k, s)| pred(k, s))
            .map(|(k, _)| *k)
            .collect();

        let mut triggers = Vec::new();
        for key in &keys {
            if let Some(note) = self.sounding.remove(key) {
                push_release(&mut triggers, key.note, &note, 0.0);
            }
        }
        dispatch(song, &triggers);
        keys.len()
    }

    /// Release every sounding note (stop, seek, undo)
    pub fn release_all(&mut self, song: &mut Song) -> usize {
        self.release_matching(song, |_, _| true)
    }

    pub fn release_note(&mut self, song: &mut Song, pattern: PatternId, note: NoteId) -> usize {
        self.release_matching(song, |k, s| s.pattern == pattern && k.note == note)
    }

    pub fn release_pattern(&mut self, song: &mut Song, pattern: PatternId) -> usize {
        self.release_matching(song, |_, s| s.pattern == pattern)
    }

    pub fn release_track(&mut self, song: &mut Song, track: TrackId) -> usize {
        self.release_matching(song, |_, s| s.track == track)
    }

    pub fn release_item(&mut self, song: &mut Song, item: PlaylistItemId) -> usize {
        self.release_matching(song, |k, _| k.item == item)
    }

    /// Release what one instrument is playing; other targets keep sounding
    pub fn release_instrument(&mut self, song: &mut Song, instrument: InstrumentId) -> usize {
        let mut triggers = Vec::new();
        let mut emptied = Vec::new();
        for (key, note) in self.sounding.iter_mut() {
            let before = note.instruments.len();
            note.instruments.retain(|i| *i != instrument);
            if note.instruments.len() != before {
                triggers.push(Trigger::Release {
                    instrument,
                    note_id: key.note,
                    delay: 0.0,
                });
            }
            if note.instruments.is_empty() {
                emptied.push(*key);
            }
        }
        for key in emptied {
            self.sounding.remove(&key);
        }
        dispatch(song, &triggers);
        triggers.len()
    }

    /// Release everything and hard-silence every instrument
    pub fn panic(&mut self, song: &mut Song) {
        self.release_all(song);
        for instrument in song.instruments_mut() {
            instrument.voice.kill_all_notes();
        }
        log::warn!("All notes killed");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKAHEAD)
    }
}

fn push_release(triggers: &mut Vec<Trigger>, note_id: NoteId, note: &SoundingNote, delay: f64) {
    for instrument in &note.instruments {
        triggers.push(Trigger::Release {
            instrument: *instrument,
            note_id,
            delay,
        });
    }
}

/// Deliver triggers; targets that no longer exist are skipped
fn dispatch(song: &mut Song, triggers: &[Trigger]) {
    for trigger in triggers {
        match *trigger {
            Trigger::Attack {
                instrument,
                note_id,
                pitch,
                delay,
                velocity,
            } => {
                if let Some(target) = song.instrument_mut(instrument) {
                    log::trace!(
                        "attack {} pitch {} in {:.4}s -> {}",
                        note_id,
                        pitch,
                        delay,
                        instrument
                    );
                    target.voice.trigger_attack(note_id, pitch, delay, velocity);
                }
            }
            Trigger::Release {
                instrument,
                note_id,
                delay,
            } => {
                if let Some(target) = song.instrument_mut(instrument) {
                    log::trace!("release {} in {:.4}s -> {}", note_id, delay, instrument);
                    target.voice.trigger_release(note_id, delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::timeline::Tempo;
    use crate::sequencer::transport::ManualClock;
    use crate::song::SongOptions;
    use crate::song::instrument::{Voice, VoiceFactory};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Attack(NoteId, u8, f64),
        Release(NoteId, f64),
        KillAll,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Voice for Recorder {
        fn trigger_attack(&mut self, note_id: NoteId, pitch: u8, delay: f64, _velocity: f32) {
            self.calls.lock().unwrap().push(Call::Attack(note_id, pitch, delay));
        }

        fn trigger_release(&mut self, note_id: NoteId, delay: f64) {
            self.calls.lock().unwrap().push(Call::Release(note_id, delay));
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
        song: Song,
        transport: TransportClock,
        clock: ManualClock,
        scheduler: Scheduler,
        calls: Arc<Mutex<Vec<Call>>>,
        pattern: PatternId,
    }

    fn fixture(pattern_length: Tick) -> Fixture {
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        let mut song = Song::with_options(
            "Test",
            SongOptions {
                voice_factory: Box::new(recorder),
                ..SongOptions::default()
            },
        );
        let pattern = song.add_pattern("P", pattern_length).unwrap();
        let track = song.add_track("T").unwrap();
        let synth = song.add_instrument("Synth", "synth").unwrap();
        song.add_track_target(track, synth).unwrap();
        song.add_playlist_item(track, pattern, 0, None).unwrap();

        let clock = ManualClock::new();
        clock.set(10.0);
        let transport = TransportClock::new(Box::new(clock.clone()), Tempo::new(120.0), 0.0);
        Fixture {
            song,
            transport,
            clock,
            scheduler: Scheduler::new(DEFAULT_LOOKAHEAD),
            calls,
            pattern,
        }
    }

    impl Fixture {
        fn play(&mut self) {
            self.scheduler.reset(0);
            self.transport.start();
        }

        fn step(&mut self, seconds: f64) -> PassReport {
            self.clock.advance(seconds);
            self.scheduler.tick(&mut self.song, &mut self.transport)
        }

        fn attacks(&self, id: NoteId) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, Call::Attack(n, _, _) if *n == id))
                .count()
        }

        fn releases(&self, id: NoteId) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, Call::Release(n, _) if *n == id))
                .count()
        }
    }

    #[test]
    fn test_onset_delay_relative_to_position() {
        let mut f = fixture(1920);
        let id = f.song.add_note(f.pattern, 60, 24, 48, 1.0).unwrap();
        f.play();

        let report = f.scheduler.tick(&mut f.song, &mut f.transport);
        assert_eq!(report.onsets, 1);
        // 24 ticks at 120 BPM = 25 ms
        match f.calls.lock().unwrap()[0] {
            Call::Attack(note, 60, delay) => {
                assert_eq!(note, id);
                assert!((delay - 0.025).abs() < 1e-9);
            }
            ref other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_zero_elapsed_time_does_not_reemit() {
        let mut f = fixture(1920);
        let id = f.song.add_note(f.pattern, 60, 10, 480, 1.0).unwrap();
        f.play();

        f.scheduler.tick(&mut f.song, &mut f.transport);
        let second = f.scheduler.tick(&mut f.song, &mut f.transport);
        assert_eq!(second.onsets, 0);
        assert_eq!(f.attacks(id), 1);
    }

    #[test]
    fn test_skipped_heartbeats_catch_up() {
        let mut f = fixture(1920);
        let a = f.song.add_note(f.pattern, 60, 100, 10, 1.0).unwrap();
        let b = f.song.add_note(f.pattern, 62, 200, 10, 1.0).unwrap();
        f.play();
        f.scheduler.tick(&mut f.song, &mut f.transport);

        // Long stall, then one pass
        let report = f.step(0.3);
        assert_eq!(report.onsets, 2);
        assert_eq!((f.attacks(a), f.attacks(b)), (1, 1));
        // Late onsets are clamped to "now"
        assert!(f.calls.lock().unwrap().iter().all(|c| match c {
            Call::Attack(_, _, d) | Call::Release(_, d) => *d >= 0.0,
            Call::KillAll => true,
        }));
    }

    #[test]
    fn test_offsets_follow_onsets() {
        let mut f = fixture(1920);
        let id = f.song.add_note(f.pattern, 60, 0, 96, 1.0).unwrap();
        f.play();
        for _ in 0..20 {
            f.step(0.01);
        }
        assert_eq!(f.attacks(id), 1);
        assert_eq!(f.releases(id), 1);
        assert_eq!(f.scheduler.sounding_count(), 0);
    }

    #[test]
    fn test_loop_wrap_single_onset_and_offset() {
        let mut f = fixture(3840);
        let id = f.song.add_note(f.pattern, 60, 1900, 100, 1.0).unwrap();
        f.transport.set_loop_region(LoopRegion::new(true, 0, 1920));
        f.play();

        let mut wraps = 0;
        // Run to just past the seam and well into the second cycle, before 1900 again
        for _ in 0..300 {
            if f.step(0.01).wrapped {
                wraps += 1;
            }
        }
        assert_eq!(wraps, 1);
        assert_eq!(f.attacks(id), 1);
        assert_eq!(f.releases(id), 1);
        assert_eq!(f.scheduler.sounding_count(), 0);
        assert!(f.transport.position_ticks() < 1920.0);
    }

    #[test]
    fn test_loop_start_note_scheduled_across_seam() {
        let mut f = fixture(1920);
        let first = f.song.add_note(f.pattern, 60, 0, 100, 1.0).unwrap();
        f.transport.set_loop_region(LoopRegion::new(true, 0, 960));
        f.play();

        // One full cycle plus a bit: the note at 0 plays twice
        for _ in 0..110 {
            f.step(0.01);
        }
        assert_eq!(f.attacks(first), 2);
    }

    #[test]
    fn test_stop_releases_each_sounding_note_once() {
        let mut f = fixture(1920);
        for pitch in [60, 64, 67] {
            f.song.add_note(f.pattern, pitch, 0, 1000, 1.0).unwrap();
        }
        f.play();
        f.step(0.01);
        assert_eq!(f.scheduler.sounding_count(), 3);

        f.calls.lock().unwrap().clear();
        assert_eq!(f.scheduler.release_all(&mut f.song), 3);
        let calls = f.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| matches!(c, Call::Release(_, d) if *d == 0.0)));
        assert_eq!(f.scheduler.sounding_count(), 0);
    }

    #[test]
    fn test_absent_instrument_dropped() {
        let mut f = fixture(1920);
        f.song.add_note(f.pattern, 60, 0, 10, 1.0).unwrap();
        let synth = f.song.instruments().next().unwrap().id;
        f.song.remove_instrument(synth).unwrap();
        f.play();

        let report = f.step(0.01);
        assert_eq!(report.onsets, 1);
        assert!(f.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_item_length_clips_offset() {
        let mut f = fixture(1920);
        let id = f.song.add_note(f.pattern, 60, 0, 1000, 1.0).unwrap();
        let track = f.song.tracks().next().unwrap().id;
        let item = f.song.track(track).unwrap().playlist[0].id;
        f.song.remove_playlist_item(track, item).unwrap();
        f.song.add_playlist_item(track, f.pattern, 0, Some(200)).unwrap();
        f.play();

        f.step(0.01);
        let sounding: Vec<Tick> = f.scheduler.sounding().map(|(_, s)| s.end).collect();
        assert_eq!(sounding, vec![200]);
        for _ in 0..20 {
            f.step(0.01);
        }
        assert_eq!(f.releases(id), 1);
    }

    #[test]
    fn test_panic_kills_all() {
        let mut f = fixture(1920);
        f.song.add_note(f.pattern, 60, 0, 1000, 1.0).unwrap();
        f.play();
        f.step(0.01);

        f.scheduler.panic(&mut f.song);
        assert_eq!(f.scheduler.sounding_count(), 0);
        assert!(f.calls.lock().unwrap().contains(&Call::KillAll));
    }
}
