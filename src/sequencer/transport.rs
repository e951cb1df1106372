// Transport - Playback state and position against a monotonic hardware clock
//
// While playing, position = clock.now() - base. While stopped the position is
// frozen. Seeking while playing rebases `base` so the reported position jumps
// to the requested value without touching the hardware clock.

use super::timeline::{Tempo, Tick};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic time source in seconds
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Wall-clock source backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for deterministic tests and offline rendering
///
/// Clones share the same time value.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }
}

/// Loop bounds in song ticks; `end` is exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoopRegion {
    pub enabled: bool,
    pub start: Tick,
    pub end: Tick,
}

impl LoopRegion {
    pub fn new(enabled: bool, start: Tick, end: Tick) -> Self {
        Self {
            enabled,
            start,
            end,
        }
    }

    /// Enabled and non-empty
    pub fn is_active(&self) -> bool {
        self.enabled && self.end > self.start
    }

    pub fn length(&self) -> Tick {
        self.end.saturating_sub(self.start)
    }
}

/// Where to seek to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    Seconds(f64),
    Ticks(Tick),
}

/// Transport clock
/// Owns play/stop state, the playhead, tempo, and loop bounds
pub struct TransportClock {
    clock: Box<dyn Clock>,
    state: TransportState,
    /// Hardware time at which the playhead was at 0 (while playing)
    base: f64,
    /// Frozen playhead (while stopped)
    stopped_position: f64,
    /// Playback begins this far before the requested start
    preroll: f64,
    tempo: Tempo,
    loop_region: LoopRegion,
}

impl TransportClock {
    pub fn new(clock: Box<dyn Clock>, tempo: Tempo, preroll_seconds: f64) -> Self {
        Self {
            clock,
            state: TransportState::Stopped,
            base: 0.0,
            stopped_position: 0.0,
            preroll: preroll_seconds.max(0.0),
            tempo,
            loop_region: LoopRegion::default(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Start playing from the frozen position. Returns false if already playing.
    pub fn start(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }
        let begin = self.stopped_position - self.preroll;
        self.base = self.clock.now() - begin;
        self.state = TransportState::Playing;
        log::debug!("Transport started at {:.3}s", self.stopped_position);
        true
    }

    /// Stop and freeze the position. Returns false if not playing.
    pub fn stop(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.stopped_position = self.position();
        self.state = TransportState::Stopped;
        log::debug!("Transport stopped at {:.3}s", self.stopped_position);
        true
    }

    /// Move the playhead; the reported position equals `target` afterwards
    pub fn seek(&mut self, target: SeekTarget) {
        let seconds = match target {
            SeekTarget::Seconds(s) => s,
            SeekTarget::Ticks(t) => self.tempo.ticks_to_seconds(t as f64),
        };
        if self.is_playing() {
            self.base = self.clock.now() - seconds;
        } else {
            self.stopped_position = seconds;
        }
    }

    /// Current position in seconds
    pub fn position(&self) -> f64 {
        match self.state {
            TransportState::Playing => self.clock.now() - self.base,
            TransportState::Stopped => self.stopped_position,
        }
    }

    /// Current position in (fractional) ticks
    pub fn position_ticks(&self) -> f64 {
        self.tempo.seconds_to_ticks(self.position())
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub fn set_loop_region(&mut self, region: LoopRegion) {
        self.loop_region = region;
    }

    pub fn is_loop_enabled(&self) -> bool {
        self.loop_region.enabled
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_region.enabled = enabled;
    }

    /// Set loop start/end ticks (end exclusive)
    pub fn set_loop_bounds(&mut self, start: Tick, end: Tick) {
        self.loop_region.start = start;
        self.loop_region.end = end;
    }
}
