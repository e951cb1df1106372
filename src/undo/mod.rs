// Undo system - Inverse actions recorded by every song mutator

pub mod action;
pub mod history;

pub use action::UndoAction;
pub use history::{DEFAULT_MAX_HISTORY, UndoLog};
