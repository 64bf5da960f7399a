//! Accept/reject operations on hunks.
//!
//! Accepting a hunk replaces its full marker span with the inserted text;
//! rejecting replaces it with the deleted text. Both are expressed as
//! ordinary transactions, so undoing an accept works exactly like undoing
//! a keystroke. The bulk variants cover every hunk in one transaction — a
//! single atomic undo step. These are pure functions of the buffer and
//! hunk list; callers own application and persistence.

use ropey::Rope;
use thiserror::Error;

use crate::{
  Tendril,
  hunk::{
    Hunk,
    HunkId,
  },
  transaction::{
    Transaction,
    TransactionError,
  },
};

pub type Result<T> = std::result::Result<T, TransformError>;

#[derive(Debug, Error)]
pub enum TransformError {
  #[error("no hunk with id {0:?}")]
  UnknownHunk(HunkId),
  #[error(transparent)]
  Transaction(#[from] TransactionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
  Accept,
  Reject,
}

impl Resolution {
  fn surviving_text(self, hunk: &Hunk) -> Tendril {
    match self {
      Resolution::Accept => hunk.inserted_text.clone(),
      Resolution::Reject => hunk.deleted_text.clone(),
    }
  }
}

/// Collapse one hunk, keeping its surviving side.
pub fn resolve(
  doc: &Rope,
  hunks: &[Hunk],
  id: HunkId,
  resolution: Resolution,
) -> Result<Transaction> {
  let hunk = hunks
    .iter()
    .find(|hunk| hunk.id == id)
    .ok_or(TransformError::UnknownHunk(id))?;

  Ok(Transaction::change(doc, vec![(
    hunk.buffer_range.start,
    hunk.buffer_range.end,
    Some(resolution.surviving_text(hunk)),
  )])?)
}

/// Collapse every hunk in one transaction. Hunks are ordered and disjoint
/// by construction, so the changes compose without overlap.
pub fn resolve_all(doc: &Rope, hunks: &[Hunk], resolution: Resolution) -> Result<Transaction> {
  Ok(Transaction::change(
    doc,
    hunks.iter().map(|hunk| {
      (
        hunk.buffer_range.start,
        hunk.buffer_range.end,
        Some(resolution.surviving_text(hunk)),
      )
    }),
  )?)
}

pub fn accept(doc: &Rope, hunks: &[Hunk], id: HunkId) -> Result<Transaction> {
  resolve(doc, hunks, id, Resolution::Accept)
}

pub fn reject(doc: &Rope, hunks: &[Hunk], id: HunkId) -> Result<Transaction> {
  resolve(doc, hunks, id, Resolution::Reject)
}

pub fn accept_all(doc: &Rope, hunks: &[Hunk]) -> Result<Transaction> {
  resolve_all(doc, hunks, Resolution::Accept)
}

pub fn reject_all(doc: &Rope, hunks: &[Hunk]) -> Result<Transaction> {
  resolve_all(doc, hunks, Resolution::Reject)
}
