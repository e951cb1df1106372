use ringbuf::traits::Consumer;
use score_engine::config::OutputConfig;
use score_engine::messaging::TriggerConsumer;
use score_engine::project::ProjectLoadOptions;
use score_engine::routing::Connection;
use score_engine::sequencer::note::pitch_name;
use score_engine::{
    ChannelVoice, EngineConfig, LoopRegion, NodeId, PlaybackEngine, ProjectManager, Session, Song,
    SongOptions, SystemClock, TriggerEvent, Voice, VoiceFactory,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// How long the demo plays before stopping
const PLAY_SECONDS: u64 = 4;

/// How often the output side drains its channels
const DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// Consumer halves of every instrument's trigger channel, tagged with the instrument kind
type Taps = Arc<Mutex<Vec<(String, TriggerConsumer)>>>;

/// Gives each instrument its own trigger channel sized from the config
struct ChannelVoiceFactory {
    output: OutputConfig,
    taps: Taps,
}

impl VoiceFactory for ChannelVoiceFactory {
    fn create(&mut self, kind: &str) -> Box<dyn Voice> {
        let (tx, rx) = self.output.trigger_channel();
        self.taps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind.to_string(), rx));
        Box::new(ChannelVoice::new(tx))
    }
}

/// Stand-in for an audio thread: log whatever arrived
fn drain(taps: &Taps) {
    let mut taps = taps.lock().unwrap_or_else(PoisonError::into_inner);
    for (name, rx) in taps.iter_mut() {
        while let Some(event) = rx.try_pop() {
            match event {
                TriggerEvent::Attack {
                    note_id,
                    pitch,
                    delay,
                    velocity,
                } => log::info!(
                    "[{}] attack {} {} vel {:.2} in {:.1} ms",
                    name,
                    note_id,
                    pitch_name(pitch),
                    velocity,
                    delay * 1000.0
                ),
                TriggerEvent::Release { note_id, delay } => {
                    log::info!("[{}] release {} in {:.1} ms", name, note_id, delay * 1000.0)
                }
                TriggerEvent::KillAll => log::info!("[{}] all notes off", name),
            }
        }
    }
}

fn song_options(config: &EngineConfig, taps: &Taps) -> SongOptions {
    SongOptions {
        voice_factory: Box::new(ChannelVoiceFactory {
            output: config.output.clone(),
            taps: taps.clone(),
        }),
        ..config.song_options()
    }
}

/// Two-bar arpeggio on one track, looped
fn demo_song(config: &EngineConfig, taps: &Taps) -> Result<Song, score_engine::EditError> {
    let mut song = Song::with_options("Demo", song_options(config, taps));
    let pattern = song.add_pattern("Arpeggio", 1920)?;
    for (step, pitch) in [60u8, 64, 67, 72, 67, 64, 60, 55].into_iter().enumerate() {
        song.add_note(pattern, pitch, step as u64 * 240, 200, 0.8)?;
    }
    let track = song.add_track("Lead")?;
    let synth = song.add_instrument("Synth", "synth")?;
    let reverb = song.add_effect("Reverb", "reverb")?;
    song.add_track_target(track, synth)?;
    song.connect(Connection::new(NodeId(synth), 0, NodeId(reverb), 0))?;
    song.add_playlist_item(track, pattern, 0, None)?;
    song.set_loop_region(LoopRegion::new(true, 0, 1920))?;
    song.clear_history();
    Ok(song)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::load_or_default();
    log::info!(
        "Heartbeat {} ms, lookahead {} ms",
        config.scheduler.heartbeat_ms,
        config.scheduler.lookahead_ms
    );

    let taps = Taps::default();
    let song = match std::env::args().nth(1) {
        Some(dir) => {
            let manager = ProjectManager::new();
            let options = song_options(&config, &taps);
            match manager.load_song(&dir, options, &ProjectLoadOptions::default()) {
                Ok(song) => song,
                Err(e) => {
                    log::error!("Could not load {}: {}", dir, e);
                    std::process::exit(1);
                }
            }
        }
        None => match demo_song(&config, &taps) {
            Ok(song) => song,
            Err(e) => {
                log::error!("Could not build demo song: {}", e);
                std::process::exit(1);
            }
        },
    };

    let session = Session::from_config(song, Box::new(SystemClock::new()), &config);
    let mut engine = PlaybackEngine::from_config(session, &config);

    if let Err(e) = engine.start_playback() {
        log::error!("Playback failed: {}", e);
        std::process::exit(1);
    }
    let until = Instant::now() + Duration::from_secs(PLAY_SECONDS);
    while Instant::now() < until {
        std::thread::sleep(DRAIN_INTERVAL);
        drain(&taps);
    }
    engine.stop_playback();
    drain(&taps);
    log::info!("Stopped at {}", engine.lock().musical_position());
}
