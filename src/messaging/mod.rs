// Messaging - Lock-free delivery of trigger events to an audio thread

pub mod channels;
pub mod voice;

pub use channels::{TriggerConsumer, TriggerEvent, TriggerProducer, create_trigger_channel};
pub use voice::ChannelVoice;
