// Score engine - Library exports for tests, benchmarks and the demo binary

pub mod config;
pub mod engine;
pub mod messaging;
pub mod project;
pub mod routing;
pub mod sequencer;
pub mod session;
pub mod song;
pub mod undo;

// Re-export commonly used types for convenience
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, PlaybackEngine};
pub use messaging::{ChannelVoice, TriggerEvent, create_trigger_channel};
pub use project::{ProjectError, ProjectLoadOptions, ProjectManager};
pub use routing::{Connection, GraphError, LinkBackend, NodeId, RoutingGraph};
pub use sequencer::{
    Heartbeat, LoopRegion, ManualClock, MusicalTime, Note, NoteEdit, NoteId, PassReport,
    PatternId, RangeMode, Scheduler, SeekTarget, SystemClock, Tempo, Tick, TimeSignature,
    TransportClock, TransportState,
};
pub use session::{Session, SharedSession};
pub use song::instrument::{Voice, VoiceFactory};
pub use song::{EditError, EditResult, Song, SongOptions};
