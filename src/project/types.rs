// Types for song persistence

use serde::{Deserialize, Serialize};

use crate::routing::node::Port;
use crate::sequencer::note::NoteId;
use crate::sequencer::pattern::PatternId;
use crate::sequencer::timeline::{Tick, TimeSignature};
use crate::sequencer::transport::LoopRegion;
use crate::song::track::PlaylistItem;

/// File format version
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FormatVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        Self::new(1, 0, 0)
    }

    /// Same major version as the running code
    pub fn is_compatible(&self) -> bool {
        self.major == Self::current().major
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Song metadata (also written alone as the manifest)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SongMetadata {
    /// Song name
    pub name: String,
    /// Version of the file format
    pub version: FormatVersion,
    /// Creation timestamp (RFC 3339)
    pub created: String,
    /// Last modification timestamp (RFC 3339)
    pub modified: String,
    /// Song tempo (BPM), fixed for the whole song
    pub tempo: f64,
    pub time_signature: TimeSignature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SongMetadata {
    pub fn new(name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name,
            version: FormatVersion::current(),
            created: now.clone(),
            modified: now,
            tempo: 120.0,
            time_signature: TimeSignature::four_four(),
            author: None,
            description: None,
        }
    }
}

/// Persisted note (selection is editor state and is not saved)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NoteFile {
    pub id: NoteId,
    pub pitch: u8,
    pub start: Tick,
    pub length: Tick,
    pub velocity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternFile {
    pub id: PatternId,
    pub name: String,
    pub color: [u8; 3],
    /// Length in ticks
    pub length: Tick,
    /// Notes in ascending start order
    pub notes: Vec<NoteFile>,
}

/// Port lists of a graph node, connections included
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeFile {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackFile {
    pub id: u64,
    pub name: String,
    pub playlist: Vec<PlaylistItem>,
    /// Instrument ids this track triggers
    pub targets: Vec<u64>,
    pub node: NodeFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentFile {
    pub id: u64,
    pub name: String,
    /// Backend type used to recreate the voice
    pub kind: String,
    pub node: NodeFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectFile {
    pub id: u64,
    pub name: String,
    pub kind: String,
    pub node: NodeFile,
}

/// Whole-song file body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SongFile {
    pub metadata: SongMetadata,
    /// Song length in ticks
    pub length: Tick,
    #[serde(default)]
    pub loop_region: LoopRegion,
    pub patterns: Vec<PatternFile>,
    pub tracks: Vec<TrackFile>,
    pub instruments: Vec<InstrumentFile>,
    pub effects: Vec<EffectFile>,
    /// Id high-water mark at save time
    pub next_id: u64,
}
