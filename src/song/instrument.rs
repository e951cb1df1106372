// Instruments and effects - Graph nodes backed by the synthesis backend
//
// An instrument owns an opaque `Voice` handle; the scheduler drives it through
// the trigger contract. Effects carry no trigger surface and only take part in
// routing.

use crate::routing::node::PortLayout;
use crate::sequencer::note::NoteId;

pub type InstrumentId = u64;
pub type EffectId = u64;

/// Trigger contract of a synthesis backend instrument
///
/// Delays are seconds from "now" and never negative. Pitches above 127 must
/// be ignored.
pub trait Voice: Send {
    fn trigger_attack(&mut self, note_id: NoteId, pitch: u8, delay: f64, velocity: f32);

    fn trigger_release(&mut self, note_id: NoteId, delay: f64);

    /// Silence everything immediately
    fn kill_all_notes(&mut self);

    /// Port layout of the node wrapping this voice
    fn ports(&self) -> PortLayout {
        PortLayout::instrument()
    }
}

/// Creates backend voices by instrument kind ("synth", "sampler", ...)
pub trait VoiceFactory: Send {
    fn create(&mut self, kind: &str) -> Box<dyn Voice>;
}

/// Voice that produces no sound
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentVoice;

impl Voice for SilentVoice {
    fn trigger_attack(&mut self, _note_id: NoteId, _pitch: u8, _delay: f64, _velocity: f32) {}

    fn trigger_release(&mut self, _note_id: NoteId, _delay: f64) {}

    fn kill_all_notes(&mut self) {}
}

/// Factory handing out `SilentVoice`s
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentVoiceFactory;

impl VoiceFactory for SilentVoiceFactory {
    fn create(&mut self, _kind: &str) -> Box<dyn Voice> {
        Box::new(SilentVoice)
    }
}

/// An instrument node
pub struct Instrument {
    pub id: InstrumentId,
    pub name: String,
    /// Backend type the voice was created from
    pub kind: String,
    pub voice: Box<dyn Voice>,
}

impl Instrument {
    pub fn new(id: InstrumentId, name: String, kind: String, voice: Box<dyn Voice>) -> Self {
        Self {
            id,
            name,
            kind,
            voice,
        }
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// An effect node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub id: EffectId,
    pub name: String,
    pub kind: String,
}
