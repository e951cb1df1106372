// ChannelVoice - Voice that forwards triggers into a lock-free channel
// The consumer half lives on the audio thread; pushing never blocks.

use crate::messaging::channels::{TriggerEvent, TriggerProducer};
use crate::sequencer::note::{MAX_PITCH, NoteId};
use crate::song::instrument::Voice;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct ChannelVoice {
    tx: TriggerProducer,
    dropped: Arc<AtomicU64>,
}

impl ChannelVoice {
    pub fn new(tx: TriggerProducer) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of events lost to a full channel
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }

    fn send(&mut self, event: TriggerEvent) {
        if ringbuf::traits::Producer::try_push(&mut self.tx, event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("Trigger channel full, dropping {:?}", event);
        }
    }
}

impl Voice for ChannelVoice {
    fn trigger_attack(&mut self, note_id: NoteId, pitch: u8, delay: f64, velocity: f32) {
        if pitch > MAX_PITCH {
            return;
        }
        self.send(TriggerEvent::Attack {
            note_id,
            pitch,
            delay: delay.max(0.0),
            velocity,
        });
    }

    fn trigger_release(&mut self, note_id: NoteId, delay: f64) {
        self.send(TriggerEvent::Release {
            note_id,
            delay: delay.max(0.0),
        });
    }

    fn kill_all_notes(&mut self) {
        self.send(TriggerEvent::KillAll);
    }
}
