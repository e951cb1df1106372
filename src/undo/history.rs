// UndoLog - Bounded stack of inverse actions (undo history)

use super::action::UndoAction;
use std::collections::VecDeque;

/// Default maximum number of actions to keep in history
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Bounded undo history
///
/// The most recent action sits at the back. When the capacity is reached the
/// oldest action is dropped. There is no redo stack: actions are inverses
/// captured at edit time, not replayable commands.
pub struct UndoLog<T> {
    stack: VecDeque<UndoAction<T>>,
    capacity: usize,
}

impl<T> UndoLog<T> {
    /// Create a log with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }

    /// Create a log keeping at most `capacity` actions
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_HISTORY)),
            capacity,
        }
    }

    /// Record an inverse action, evicting the oldest on overflow
    pub fn push(&mut self, action: UndoAction<T>) {
        if self.capacity == 0 {
            return;
        }
        self.stack.push_back(action);
        if self.stack.len() > self.capacity {
            self.stack.pop_front();
        }
    }

    /// Take the most recent action
    pub fn pop(&mut self) -> Option<UndoAction<T>> {
        self.stack.pop_back()
    }

    pub fn can_undo(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Description of the action that would be undone next
    pub fn undo_description(&self) -> Option<&str> {
        self.stack.back().map(|a| a.description())
    }

    /// Drop every action (after a bulk load)
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for UndoLog<T> {
    fn default() -> Self {
        Self::new()
    }
}
