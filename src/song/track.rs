// Track - Playlist of pattern placements routed to instruments

use crate::sequencer::pattern::PatternId;
use crate::sequencer::timeline::Tick;
use crate::song::instrument::InstrumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type TrackId = u64;
pub type PlaylistItemId = u64;

/// One placement of a pattern in song time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: PlaylistItemId,
    pub pattern: PatternId,
    /// Song tick where pattern tick 0 lands
    pub start: Tick,
    /// Visible length; pattern content past it is not played
    pub length: Tick,
}

impl PlaylistItem {
    pub fn end(&self) -> Tick {
        self.start.saturating_add(self.length)
    }

    /// Intersection with the song-time window [start, end), in pattern-local ticks
    pub fn local_window(&self, start: Tick, end: Tick) -> Option<(Tick, Tick)> {
        let from = start.max(self.start);
        let to = end.min(self.end());
        (from < to).then(|| (from - self.start, to - self.start))
    }
}

/// A track: ordered playlist plus the instruments it triggers
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub playlist: Vec<PlaylistItem>,
    pub targets: BTreeSet<InstrumentId>,
}

impl Track {
    pub fn new(id: TrackId, name: String) -> Self {
        Self {
            id,
            name,
            playlist: Vec::new(),
            targets: BTreeSet::new(),
        }
    }

    pub fn item(&self, id: PlaylistItemId) -> Option<&PlaylistItem> {
        self.playlist.iter().find(|i| i.id == id)
    }

    /// Insert keeping the playlist ordered by start tick
    pub(crate) fn insert_item(&mut self, item: PlaylistItem) {
        let index = self
            .playlist
            .partition_point(|i| (i.start, i.id) <= (item.start, item.id));
        self.playlist.insert(index, item);
    }

    pub(crate) fn remove_item(&mut self, id: PlaylistItemId) -> Option<PlaylistItem> {
        let index = self.playlist.iter().position(|i| i.id == id)?;
        Some(self.playlist.remove(index))
    }

    /// Song end of the last placement
    pub fn end(&self) -> Tick {
        self.playlist.iter().map(PlaylistItem::end).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, start: Tick, length: Tick) -> PlaylistItem {
        PlaylistItem {
            id,
            pattern: 1,
            start,
            length,
        }
    }

    #[test]
    fn test_local_window() {
        let placed = item(1, 1920, 960);
        assert_eq!(placed.local_window(0, 1920), None);
        assert_eq!(placed.local_window(1900, 2000), Some((0, 80)));
        assert_eq!(placed.local_window(2800, 4000), Some((880, 960)));
        assert_eq!(placed.local_window(2880, 4000), None);
    }

    #[test]
    fn test_playlist_ordering() {
        let mut track = Track::new(1, "Lead".to_string());
        track.insert_item(item(3, 960, 100));
        track.insert_item(item(4, 0, 100));
        track.insert_item(item(5, 480, 100));

        let starts: Vec<Tick> = track.playlist.iter().map(|i| i.start).collect();
        assert_eq!(starts, vec![0, 480, 960]);
        assert_eq!(track.end(), 1060);

        assert_eq!(track.remove_item(5).map(|i| i.start), Some(480));
        assert!(track.item(5).is_none());
    }
}
