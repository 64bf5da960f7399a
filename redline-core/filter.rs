//! Commit-time veto for proposed user edits.
//!
//! [`evaluate`] is a pure predicate: it sees the committed buffer, the
//! current hunks, and the proposed edit batch, and returns a verdict
//! without mutating anything. It runs synchronously before a transaction
//! commits. One blocked operation vetoes the whole batch; there is no
//! partial application. System-originated mutations (accept/reject,
//! reconciliation) never pass through here.

use ropey::Rope;

use crate::{
  hunk::{
    Hunk,
    HunkId,
  },
  marker,
  transaction::Change,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerdict {
  Allow,
  Block(BlockReason),
}

impl EditVerdict {
  #[inline]
  pub fn is_allowed(&self) -> bool {
    matches!(self, EditVerdict::Allow)
  }
}

/// Why a batch was vetoed. This is a normal decision outcome, not an
/// error; the editing surface shows it as a transient notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
  /// The replaced span or the inserted text contains a marker codepoint.
  MarkerInEdit,
  /// The edit touches read-only baseline text inside a hunk.
  EditsDeletion { hunk: HunkId },
  /// A zero-width insertion would split a hunk's deletion/insertion pair.
  SplitsHunkPair { hunk: HunkId },
  /// The edit range does not fit the current buffer.
  OutOfBounds { from: usize, to: usize },
}

/// Judge a proposed edit batch against the current buffer state.
///
/// Edits fully inside insertion regions and edits outside all hunks are
/// allowed; everything listed in [`BlockReason`] vetoes the batch.
pub fn evaluate(doc: &Rope, hunks: &[Hunk], changes: &[Change]) -> EditVerdict {
  for change in changes {
    if let Some(reason) = check_change(doc, hunks, change) {
      return EditVerdict::Block(reason);
    }
  }
  EditVerdict::Allow
}

fn check_change(doc: &Rope, hunks: &[Hunk], change: &Change) -> Option<BlockReason> {
  let (from, to, insert) = change;
  let (from, to) = (*from, *to);

  if from > to || to > doc.len_chars() {
    return Some(BlockReason::OutOfBounds { from, to });
  }

  if let Some(text) = insert {
    if marker::fragment_has_marker(text) {
      return Some(BlockReason::MarkerInEdit);
    }
  }
  if marker::slice_has_marker(doc.slice(from..to)) {
    return Some(BlockReason::MarkerInEdit);
  }

  for hunk in hunks {
    let Some(deletion) = &hunk.deletion_span else {
      continue;
    };

    // Any overlap with the deletion pair, markers included. Spans that
    // merely touch its boundary from outside do not overlap.
    if from < deletion.end && to > deletion.start {
      return Some(BlockReason::EditsDeletion { hunk: hunk.id });
    }

    // A zero-width insertion between DEL_END and INS_START would break
    // the atomic pairing of the hunk.
    if from == to && insert.is_some() && Some(from) == hunk.pair_gap() {
      return Some(BlockReason::SplitsHunkPair { hunk: hunk.id });
    }
  }

  None
}
