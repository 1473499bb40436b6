//! # State
//!
//! The document model: a [`book::Book`] of [`page::Page`]s of [`crate::Stroke`]s.

pub mod book;
pub mod page;

/// An edit or navigation that did nothing because it ran off the end of its range. Not an error,
/// the user just gets an alert.
#[derive(thiserror::Error, Copy, Clone, PartialEq, Eq, Debug)]
pub enum Boundary {
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("already on the first page")]
    FirstPage,
}
