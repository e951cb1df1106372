// Timeline - Symbolic time representation
// Handles conversion between ticks, seconds, and bars:beats:ticks display

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic time unit. Song and pattern positions are expressed in ticks.
pub type Tick = u64;

/// Ticks per quarter note (PPQN - Pulses Per Quarter Note)
pub const TICKS_PER_QUARTER: Tick = 480;

/// Latest tick a note or placement may end on (years of song time at any tempo)
pub const MAX_TICK: Tick = 1 << 40;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Self {
        assert!(numerator > 0, "Time signature numerator must be > 0");
        assert!(
            denominator.is_power_of_two(),
            "Time signature denominator must be power of 2"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Ticks in one beat of this signature
    pub fn ticks_per_beat(&self) -> Tick {
        TICKS_PER_QUARTER * 4 / self.denominator as Tick
    }

    /// Ticks in one full bar
    pub fn ticks_per_bar(&self) -> Tick {
        self.ticks_per_beat() * self.numerator as Tick
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute)
///
/// BPM is fixed for the lifetime of a song; there is no tempo automation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo, returning None outside [20, 999] BPM
    pub fn try_new(bpm: f64) -> Option<Self> {
        (Self::MIN_BPM..=Self::MAX_BPM)
            .contains(&bpm)
            .then_some(Self { bpm })
    }

    /// Creates a new tempo
    /// BPM must be in range [20.0, 999.0]
    pub fn new(bpm: f64) -> Self {
        Self::try_new(bpm).expect("BPM must be between 20 and 999")
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// `t / 480 / BPM * 60`, arranged so that whole-beat values stay exact
    pub fn ticks_to_seconds(&self, ticks: f64) -> f64 {
        ticks * 60.0 / (TICKS_PER_QUARTER as f64 * self.bpm)
    }

    /// Exact inverse of [`Tempo::ticks_to_seconds`]
    pub fn seconds_to_ticks(&self, seconds: f64) -> f64 {
        seconds * TICKS_PER_QUARTER as f64 * self.bpm / 60.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Bars:beats:ticks display position; bar and beat count from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MusicalTime {
    pub bar: u32,
    pub beat: u8,
    pub tick: u16,
}

impl MusicalTime {
    pub fn new(bar: u32, beat: u8, tick: u16) -> Self {
        Self { bar, beat, tick }
    }

    /// Song start, shown as 1:01:000
    pub fn zero() -> Self {
        Self::new(1, 1, 0)
    }

    pub fn to_total_ticks(&self, time_signature: &TimeSignature) -> Tick {
        let bar_0 = self.bar.saturating_sub(1) as Tick;
        let beat_0 = self.beat.saturating_sub(1) as Tick;

        bar_0 * time_signature.ticks_per_bar()
            + beat_0 * time_signature.ticks_per_beat()
            + self.tick as Tick
    }

    pub fn from_total_ticks(total: Tick, time_signature: &TimeSignature) -> Self {
        let per_beat = time_signature.ticks_per_beat();
        let per_bar = time_signature.ticks_per_bar();
        let in_bar = total % per_bar;

        Self::new(
            (total / per_bar + 1) as u32,
            (in_bar / per_beat + 1) as u8,
            (in_bar % per_beat) as u16,
        )
    }
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:03}", self.bar, self.beat, self.tick)
    }
}

/// Round a tick to the nearest multiple of `grid` (grid of 0 leaves it untouched)
pub fn quantize_tick(tick: Tick, grid: Tick) -> Tick {
    if grid == 0 {
        return tick;
    }
    ((tick + grid / 2) / grid) * grid
}
