// UndoAction - A captured inverse operation

use std::fmt;

/// Inverse of one edit, holding the pre-mutation state by value
///
/// Reverting consumes the action. The closure must restore state through
/// non-recording paths so that running it never pushes a new action.
pub struct UndoAction<T> {
    description: String,
    revert: Box<dyn FnOnce(&mut T) + Send>,
}

impl<T> UndoAction<T> {
    pub fn new<F>(description: impl Into<String>, revert: F) -> Self
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        Self {
            description: description.into(),
            revert: Box::new(revert),
        }
    }

    /// Human-readable description (for UI)
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the inverse operation against `target`
    pub fn revert(self, target: &mut T) {
        (self.revert)(target)
    }
}

impl<T> fmt::Debug for UndoAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
