// Song persistence
// A song is saved as a directory holding a JSON manifest and a RON body

pub mod manager;
pub mod serialization;
pub mod types;

use crate::routing::node::{NodeKind, PortLayout};
use crate::sequencer::note::Note;
use crate::sequencer::timeline::{MAX_TICK, Tempo, Tick};
use crate::song::ids::{IdAllocator, RUNTIME_ID_BASE};
use std::collections::{HashMap, HashSet};

pub use manager::{MANIFEST_FILE, ProjectError, ProjectLoadOptions, ProjectManager, SONG_FILE};
pub use serialization::{song_from_file, song_to_file};
pub use types::{FormatVersion, NodeFile, SongFile, SongMetadata};

fn invalid(message: String) -> ProjectError {
    ProjectError::InvalidStructure(message)
}

fn check_name(what: &str, name: &str) -> Result<(), ProjectError> {
    if name.trim().is_empty() {
        return Err(invalid(format!("{} name cannot be empty", what)));
    }
    if name.len() > 255 {
        return Err(invalid(format!("{} name cannot exceed 255 characters", what)));
    }
    Ok(())
}

fn check_span(what: String, start: Tick, length: Tick) -> Result<(), ProjectError> {
    match start.checked_add(length) {
        Some(end) if end <= MAX_TICK => Ok(()),
        _ => Err(invalid(format!("{} ends past tick {}", what, MAX_TICK))),
    }
}

fn check_ports(kind: NodeKind, id: u64, node: &NodeFile) -> Result<(), ProjectError> {
    let layout = PortLayout::new(
        node.inputs.iter().map(|p| p.port_type).collect(),
        node.outputs.iter().map(|p| p.port_type).collect(),
    );
    if layout != PortLayout::for_kind(kind) {
        return Err(invalid(format!("{:?} {} has the wrong port layout", kind, id)));
    }
    Ok(())
}

/// Validate a song file before importing it
pub fn validate_song_file(file: &SongFile, note_limit: usize) -> Result<(), ProjectError> {
    let metadata = &file.metadata;
    check_name("Song", &metadata.name)?;

    if !metadata.version.is_compatible() {
        return Err(ProjectError::InvalidVersion(metadata.version));
    }

    if Tempo::try_new(metadata.tempo).is_none() {
        return Err(invalid(format!(
            "Tempo must be between {} and {} BPM",
            Tempo::MIN_BPM,
            Tempo::MAX_BPM
        )));
    }

    let ts = metadata.time_signature;
    if ts.numerator == 0 || ts.numerator > 32 {
        return Err(invalid(
            "Time signature numerator must be between 1 and 32".to_string(),
        ));
    }
    if !ts.denominator.is_power_of_two() || ts.denominator > 32 {
        return Err(invalid(
            "Time signature denominator must be a power of 2 and ≤ 32".to_string(),
        ));
    }

    if file.length == 0 {
        return Err(invalid("Song length must be at least one tick".to_string()));
    }
    check_span("Song".to_string(), 0, file.length)?;
    check_span("Loop".to_string(), file.loop_region.start, file.loop_region.length())?;

    if file.next_id >= RUNTIME_ID_BASE {
        return Err(invalid(format!(
            "Next id {} reaches the runtime id range",
            file.next_id
        )));
    }

    if file.loop_region.enabled && file.loop_region.end <= file.loop_region.start {
        return Err(invalid(format!(
            "Loop end {} must be after loop start {}",
            file.loop_region.end, file.loop_region.start
        )));
    }

    // Every persisted id, of any kind, is unique
    let mut seen = HashSet::new();
    let mut claim = |what: &str, id: u64| {
        if !IdAllocator::is_persisted(id) {
            return Err(invalid(format!("{} id {} outside the persisted range", what, id)));
        }
        if !seen.insert(id) {
            return Err(invalid(format!("Duplicate id {} ({})", id, what)));
        }
        Ok(())
    };

    let mut pattern_lengths = HashMap::new();
    for pattern in &file.patterns {
        claim("pattern", pattern.id)?;
        check_name(&format!("Pattern {}", pattern.id), &pattern.name)?;
        if pattern.length == 0 {
            return Err(invalid(format!("Pattern {} has zero length", pattern.id)));
        }
        check_span(format!("Pattern {}", pattern.id), 0, pattern.length)?;
        if pattern.notes.len() > note_limit {
            return Err(invalid(format!(
                "Pattern {} holds {} notes, limit is {}",
                pattern.id,
                pattern.notes.len(),
                note_limit
            )));
        }
        for note in &pattern.notes {
            claim("note", note.id)?;
            Note::new(note.id, note.pitch, note.start, note.length, note.velocity).map_err(
                |e| invalid(format!("Note {} in pattern {}: {}", note.id, pattern.id, e)),
            )?;
        }
        pattern_lengths.insert(pattern.id, pattern.length);
    }

    for track in &file.tracks {
        claim("track", track.id)?;
        check_name(&format!("Track {}", track.id), &track.name)?;
        check_ports(NodeKind::Track, track.id, &track.node)?;
        for item in &track.playlist {
            claim("playlist item", item.id)?;
            if !pattern_lengths.contains_key(&item.pattern) {
                return Err(invalid(format!(
                    "Playlist item {} references missing pattern {}",
                    item.id, item.pattern
                )));
            }
            if item.length == 0 {
                return Err(invalid(format!("Playlist item {} has zero length", item.id)));
            }
            check_span(format!("Playlist item {}", item.id), item.start, item.length)?;
        }
    }

    for instrument in &file.instruments {
        claim("instrument", instrument.id)?;
        check_name(&format!("Instrument {}", instrument.id), &instrument.name)?;
        check_ports(NodeKind::Instrument, instrument.id, &instrument.node)?;
    }
    for effect in &file.effects {
        claim("effect", effect.id)?;
        check_name(&format!("Effect {}", effect.id), &effect.name)?;
        check_ports(NodeKind::Effect, effect.id, &effect.node)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::Song;

    fn valid_file() -> SongFile {
        let mut song = Song::new("Valid");
        let pattern = song.add_pattern("P", 960).unwrap();
        song.add_note(pattern, 60, 0, 120, 1.0).unwrap();
        let track = song.add_track("T").unwrap();
        song.add_playlist_item(track, pattern, 0, None).unwrap();
        song.add_instrument("I", "synth").unwrap();
        song_to_file(&song, SongMetadata::new("Valid".to_string()))
    }

    #[test]
    fn test_valid_file_passes() {
        assert!(validate_song_file(&valid_file(), 100).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut file = valid_file();
        file.metadata.name = "   ".to_string();
        assert!(validate_song_file(&file, 100).is_err());
    }

    #[test]
    fn test_bad_time_signature_rejected() {
        let mut file = valid_file();
        file.metadata.time_signature.denominator = 6;
        assert!(validate_song_file(&file, 100).is_err());
    }

    #[test]
    fn test_duplicate_id_across_kinds_rejected() {
        let mut file = valid_file();
        file.instruments[0].id = file.patterns[0].id;
        assert!(validate_song_file(&file, 100).is_err());
    }

    #[test]
    fn test_dangling_pattern_reference_rejected() {
        let mut file = valid_file();
        file.patterns.clear();
        assert!(validate_song_file(&file, 100).is_err());
    }

    #[test]
    fn test_note_limit_enforced() {
        let file = valid_file();
        assert!(validate_song_file(&file, 0).is_err());
    }

    #[test]
    fn test_next_id_in_runtime_range_rejected() {
        let mut file = valid_file();
        file.next_id = RUNTIME_ID_BASE;
        assert!(validate_song_file(&file, 100).is_err());

        file.next_id = RUNTIME_ID_BASE - 1;
        assert!(validate_song_file(&file, 100).is_ok());
    }

    #[test]
    fn test_span_past_last_tick_rejected() {
        let mut file = valid_file();
        file.tracks[0].playlist[0].start = MAX_TICK;
        assert!(validate_song_file(&file, 100).is_err());

        let mut file = valid_file();
        file.patterns[0].notes[0].start = u64::MAX - 5;
        assert!(validate_song_file(&file, 100).is_err());
    }

    #[test]
    fn test_port_layout_checked_per_kind() {
        let mut file = valid_file();
        file.tracks[0].node.outputs.clear();
        assert!(validate_song_file(&file, 100).is_err());
    }

    #[test]
    fn test_inverted_loop_rejected() {
        let mut file = valid_file();
        file.loop_region.enabled = true;
        file.loop_region.start = 960;
        file.loop_region.end = 480;
        assert!(validate_song_file(&file, 100).is_err());
    }
}
