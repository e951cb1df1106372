// Serialization utilities for song persistence

use crate::project::ProjectError;
use crate::project::types::*;
use crate::routing::node::{Node, NodeId, NodeKind, PortLayout};
use crate::sequencer::note::Note;
use crate::sequencer::timeline::Tempo;
use crate::song::instrument::Effect;
use crate::song::track::Track;
use crate::song::{Song, SongOptions};
use ron::ser::PrettyConfig;

/// Serialize a song file to RON format
pub fn serialize_to_ron(file: &SongFile) -> Result<String, ProjectError> {
    ron::ser::to_string_pretty(file, PrettyConfig::default()).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to serialize to RON: {}", e))
    })
}

/// Deserialize a song file from RON format
pub fn deserialize_from_ron(ron_data: &str) -> Result<SongFile, ProjectError> {
    ron::from_str(ron_data).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to deserialize from RON: {}", e))
    })
}

/// Serialize song metadata to JSON format
pub fn serialize_metadata_to_json(metadata: &SongMetadata) -> Result<String, ProjectError> {
    serde_json::to_string_pretty(metadata).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to serialize metadata to JSON: {}", e))
    })
}

/// Deserialize song metadata from JSON format
pub fn deserialize_metadata_from_json(json_data: &str) -> Result<SongMetadata, ProjectError> {
    serde_json::from_str(json_data).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to deserialize metadata from JSON: {}", e))
    })
}

fn node_file(song: &Song, id: u64) -> NodeFile {
    song.graph()
        .node(NodeId(id))
        .map(|node| NodeFile {
            inputs: node.inputs().to_vec(),
            outputs: node.outputs().to_vec(),
        })
        .unwrap_or_default()
}

/// Capture a song as a file body; `metadata` supplies timestamps and authorship
pub fn song_to_file(song: &Song, mut metadata: SongMetadata) -> SongFile {
    metadata.name = song.name().to_string();
    metadata.version = FormatVersion::current();
    metadata.tempo = song.tempo().bpm();
    metadata.time_signature = song.time_signature();

    let patterns = song
        .patterns()
        .map(|pattern| PatternFile {
            id: pattern.id,
            name: pattern.name.clone(),
            color: pattern.color,
            length: pattern.length,
            notes: pattern
                .notes
                .to_ordered_snapshot()
                .into_iter()
                .map(|note| NoteFile {
                    id: note.id,
                    pitch: note.pitch,
                    start: note.start,
                    length: note.length,
                    velocity: note.velocity,
                })
                .collect(),
        })
        .collect();

    let tracks = song
        .tracks()
        .map(|track| TrackFile {
            id: track.id,
            name: track.name.clone(),
            playlist: track.playlist.clone(),
            targets: track.targets.iter().copied().collect(),
            node: node_file(song, track.id),
        })
        .collect();

    let instruments = song
        .instruments()
        .map(|instrument| InstrumentFile {
            id: instrument.id,
            name: instrument.name.clone(),
            kind: instrument.kind.clone(),
            node: node_file(song, instrument.id),
        })
        .collect();

    let effects = song
        .effects()
        .map(|effect| EffectFile {
            id: effect.id,
            name: effect.name.clone(),
            kind: effect.kind.clone(),
            node: node_file(song, effect.id),
        })
        .collect();

    SongFile {
        metadata,
        length: song.length(),
        loop_region: song.loop_region(),
        patterns,
        tracks,
        instruments,
        effects,
        next_id: song.next_id(),
    }
}

/// Rebuild a persisted node; its ports must match the layout of its kind
fn import_node(id: u64, name: &str, kind: NodeKind, file: NodeFile) -> Result<Node, ProjectError> {
    let node = Node::from_parts(NodeId(id), name.to_string(), kind, file.inputs, file.outputs);
    let expected = PortLayout::for_kind(kind);
    if node.layout() != expected {
        return Err(ProjectError::InvalidStructure(format!(
            "{:?} node {} has ports {:?}, expected {:?}",
            kind,
            id,
            node.layout(),
            expected
        )));
    }
    Ok(node)
}

/// Rebuild a song from a file body
///
/// Import order: patterns, tracks, instruments and effects, graph repair, and
/// the id high-water mark last. The result has an empty undo history.
pub fn song_from_file(file: SongFile, options: SongOptions) -> Result<Song, ProjectError> {
    let tempo = Tempo::try_new(file.metadata.tempo).ok_or_else(|| {
        ProjectError::InvalidStructure(format!("Tempo {} out of range", file.metadata.tempo))
    })?;
    let ts = file.metadata.time_signature;
    if ts.numerator == 0 || !ts.denominator.is_power_of_two() {
        return Err(ProjectError::InvalidStructure(format!(
            "Time signature {} is not usable",
            ts
        )));
    }

    let mut song = Song::with_options(file.metadata.name, options);
    song.import_settings(file.length, tempo, file.metadata.time_signature, file.loop_region)?;

    for pattern in file.patterns {
        let notes = pattern
            .notes
            .into_iter()
            .map(|n| Note::new(n.id, n.pitch, n.start, n.length, n.velocity))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                ProjectError::InvalidStructure(format!("Pattern {}: {}", pattern.id, e))
            })?;
        song.import_pattern(pattern.id, pattern.name, pattern.color, pattern.length, notes)?;
    }

    for track in file.tracks {
        let node = import_node(track.id, &track.name, NodeKind::Track, track.node)?;
        let mut restored = Track::new(track.id, track.name);
        for item in track.playlist {
            restored.insert_item(item);
        }
        restored.targets = track.targets.into_iter().collect();
        song.import_track(restored, node)?;
    }

    for instrument in file.instruments {
        let node = import_node(
            instrument.id,
            &instrument.name,
            NodeKind::Instrument,
            instrument.node,
        )?;
        song.import_instrument(instrument.id, instrument.name, instrument.kind, node)?;
    }

    for effect in file.effects {
        let node = import_node(effect.id, &effect.name, NodeKind::Effect, effect.node)?;
        song.import_effect(
            Effect {
                id: effect.id,
                name: effect.name,
                kind: effect.kind,
            },
            node,
        )?;
    }

    let report = song.repair_graph();
    if report.pruned > 0 {
        log::warn!("Pruned {} dangling connection entries on load", report.pruned);
    }

    song.restore_next_id(file.next_id)?;
    song.clear_history();
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::graph::Connection;
    use crate::routing::node::PortType;
    use crate::sequencer::transport::LoopRegion;
    use crate::song::ids::RUNTIME_ID_BASE;

    fn demo_song() -> Song {
        let mut song = Song::new("Demo");
        let pattern = song.add_pattern("Verse", 1920).unwrap();
        song.add_note(pattern, 60, 0, 480, 0.8).unwrap();
        song.add_note(pattern, 64, 480, 480, 0.6).unwrap();
        let track = song.add_track("Lead").unwrap();
        let synth = song.add_instrument("Synth", "synth").unwrap();
        let reverb = song.add_effect("Reverb", "reverb").unwrap();
        song.add_track_target(track, synth).unwrap();
        song.add_playlist_item(track, pattern, 0, None).unwrap();
        song.connect(Connection::new(NodeId(synth), 0, NodeId(reverb), 0)).unwrap();
        song.set_loop_region(LoopRegion::new(true, 0, 1920)).unwrap();
        song
    }

    #[test]
    fn test_ron_serialization() {
        let song = demo_song();
        let file = song_to_file(&song, SongMetadata::new("ignored".to_string()));
        let ron_data = serialize_to_ron(&file).unwrap();

        assert!(ron_data.contains("Demo"));
        assert!(ron_data.contains("Verse"));

        let parsed = deserialize_from_ron(&ron_data).unwrap();
        assert_eq!(parsed, file);
    }

    #[test]
    fn test_json_metadata_serialization() {
        let mut metadata = SongMetadata::new("Test Song".to_string());
        metadata.author = Some("Test Author".to_string());

        let json = serialize_metadata_to_json(&metadata).unwrap();
        assert!(json.contains("Test Author"));
        assert_eq!(deserialize_metadata_from_json(&json).unwrap(), metadata);
    }

    #[test]
    fn test_rebuild_preserves_structure() {
        let song = demo_song();
        let file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        let rebuilt = song_from_file(file, SongOptions::default()).unwrap();

        assert_eq!(rebuilt.name(), "Demo");
        assert_eq!(rebuilt.note_count(), 2);
        assert_eq!(rebuilt.graph().connections(), song.graph().connections());
        assert_eq!(rebuilt.loop_region(), song.loop_region());
        assert_eq!(rebuilt.next_id(), song.next_id());
        assert!(!rebuilt.can_undo());
    }

    #[test]
    fn test_next_id_never_below_seen_ids() {
        let song = demo_song();
        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.next_id = 1;

        let rebuilt = song_from_file(file, SongOptions::default()).unwrap();
        assert_eq!(rebuilt.next_id(), song.next_id());
    }

    #[test]
    fn test_runtime_range_ids_rejected() {
        let song = demo_song();
        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.next_id = RUNTIME_ID_BASE;
        assert!(matches!(
            song_from_file(file, SongOptions::default()),
            Err(ProjectError::Import(_))
        ));

        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.patterns[0].notes[0].id = u64::MAX;
        assert!(matches!(
            song_from_file(file, SongOptions::default()),
            Err(ProjectError::Import(_))
        ));
    }

    #[test]
    fn test_node_layout_must_match_kind() {
        let song = demo_song();
        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.effects[0].node.inputs.pop();
        assert!(matches!(
            song_from_file(file, SongOptions::default()),
            Err(ProjectError::InvalidStructure(_))
        ));

        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.instruments[0].node.inputs[0].port_type = PortType::Audio;
        assert!(matches!(
            song_from_file(file, SongOptions::default()),
            Err(ProjectError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_spans_past_last_tick_rejected() {
        let song = demo_song();
        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.tracks[0].playlist[0].start = u64::MAX - 1;
        assert!(matches!(
            song_from_file(file, SongOptions::default()),
            Err(ProjectError::Import(_))
        ));

        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.length = u64::MAX;
        assert!(song_from_file(file, SongOptions::default()).is_err());
    }

    #[test]
    fn test_invalid_note_rejected() {
        let song = demo_song();
        let mut file = song_to_file(&song, SongMetadata::new("Demo".to_string()));
        file.patterns[0].notes[0].pitch = 200;
        assert!(matches!(
            song_from_file(file, SongOptions::default()),
            Err(ProjectError::InvalidStructure(_))
        ));
    }
}
