// Lock-free trigger channel - Scheduler → audio thread

use crate::sequencer::note::NoteId;
use ringbuf::{HeapRb, traits::Split};

/// Trigger event as seen by the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerEvent {
    Attack {
        note_id: NoteId,
        pitch: u8,
        delay: f64,
        velocity: f32,
    },
    Release {
        note_id: NoteId,
        delay: f64,
    },
    KillAll,
}

pub type TriggerProducer = ringbuf::HeapProd<TriggerEvent>;
pub type TriggerConsumer = ringbuf::HeapCons<TriggerEvent>;

pub fn create_trigger_channel(capacity: usize) -> (TriggerProducer, TriggerConsumer) {
    let rb = HeapRb::<TriggerEvent>::new(capacity);
    rb.split()
}
