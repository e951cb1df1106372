// Sequencer module
// Timeline, note storage, transport, and the heartbeat-driven scheduler

pub mod heartbeat;
pub mod note;
pub mod note_store;
pub mod pattern;
pub mod recorder;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use heartbeat::Heartbeat;
pub use note::{Note, NoteEdit, NoteId, RuntimeNote};
pub use note_store::{NoteCounter, NoteStore, PickMode, RangeMode};
pub use pattern::{Pattern, PatternId};
pub use recorder::RecordBuffer;
pub use scheduler::{PassReport, Scheduler};
pub use timeline::{MAX_TICK, MusicalTime, Tempo, Tick, TimeSignature, TICKS_PER_QUARTER};
pub use transport::{
    Clock, LoopRegion, ManualClock, SeekTarget, SystemClock, TransportClock, TransportState,
};
