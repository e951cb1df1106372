// Id allocation for persisted and runtime objects
//
// Persisted ids (patterns, notes, tracks, playlist items, instruments, effects)
// come from one song-owned allocator and are never reused within a session.
// Runtime ids (preview and record-time notes) start at RUNTIME_ID_BASE so the
// two spaces never meet.

use serde::{Deserialize, Serialize};

/// First id of the runtime id space
pub const RUNTIME_ID_BASE: u64 = 1 << 62;

/// An id that cannot live in the persisted space
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("id {0} is outside the persisted id range")]
pub struct IdOutOfRange(pub u64);

/// Monotonic allocator for persisted ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Hand out the next id
    pub fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// High-water mark: the id the next allocation returns
    pub fn next_id(&self) -> u64 {
        self.next
    }

    /// Make sure `id` is never handed out
    pub fn observe(&mut self, id: u64) -> Result<(), IdOutOfRange> {
        if !Self::is_persisted(id) {
            return Err(IdOutOfRange(id));
        }
        if id >= self.next {
            self.next = id + 1;
        }
        Ok(())
    }

    /// Raise the high-water mark; never lowers it
    ///
    /// A mark at or past `RUNTIME_ID_BASE` would hand out runtime ids and is refused.
    pub fn restore(&mut self, next: u64) -> Result<(), IdOutOfRange> {
        if next >= RUNTIME_ID_BASE {
            return Err(IdOutOfRange(next));
        }
        self.next = self.next.max(next);
        Ok(())
    }

    /// Whether `id` belongs to the persisted space
    pub fn is_persisted(id: u64) -> bool {
        id > 0 && id < RUNTIME_ID_BASE
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocator for preview and record-time notes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeIds {
    next: u64,
}

impl RuntimeIds {
    pub fn new() -> Self {
        Self {
            next: RUNTIME_ID_BASE,
        }
    }

    pub fn allocate(&mut self) -> u64 {
        let id = self.next;
        // Wrap inside the runtime space
        self.next = if self.next == u64::MAX {
            RUNTIME_ID_BASE
        } else {
            self.next + 1
        };
        id
    }
}

impl Default for RuntimeIds {
    fn default() -> Self {
        Self::new()
    }
}
