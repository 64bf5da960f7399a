//! Hunk extraction from a marker-annotated merged buffer.
//!
//! A single left-to-right scan drives the marker state machine and yields
//! the ordered change regions. The scan tracks three coordinate systems at
//! once (buffer, baseline projection, draft projection) so consumers can
//! map positions between representations without a second pass. It runs in
//! O(n) and is cheap enough to execute on every edit transaction; hunks
//! are derived values and must never be cached across mutations.

use std::ops::Range;

use ropey::RopeSlice;
use thiserror::Error;

use crate::{
  Tendril,
  marker::Marker,
};

pub type Result<T> = std::result::Result<T, Corruption>;

/// A marker arrangement that violates the state machine. The buffer is
/// unsafe to parse; the only sanctioned recovery is rebuilding it from the
/// last known-good (baseline, draft) pair.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Corruption {
  #[error("unexpected {marker} marker at offset {offset}")]
  UnexpectedMarker { marker: Marker, offset: usize },
  #[error("deletion ending at offset {offset} has no paired insertion")]
  OrphanedDeletion { offset: usize },
  #[error("change region still open at end of buffer")]
  UnterminatedHunk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HunkId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkKind {
  Deletion,
  Insertion,
  Replacement,
}

/// One coherent changed region between baseline and draft.
///
/// All ranges are in chars. `buffer_range` covers the full marker span,
/// from the first marker through one past the last. `baseline_range` and
/// `draft_range` locate the deleted and inserted text in the respective
/// projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
  pub id:             HunkId,
  pub kind:           HunkKind,
  pub buffer_range:   Range<usize>,
  pub baseline_range: Range<usize>,
  pub draft_range:    Range<usize>,
  /// Buffer span of the deletion pair, markers included. `None` for a
  /// pure-insertion hunk serialized without its empty deletion pair.
  pub deletion_span:  Option<Range<usize>>,
  /// Buffer span of the insertion pair, markers included.
  pub insertion_span: Range<usize>,
  pub deleted_text:   Tendril,
  pub inserted_text:  Tendril,
}

impl Hunk {
  /// Offset where the deletion-close marker meets the insertion-open
  /// marker. Inserting at exactly this offset would split the atomic pair.
  pub fn pair_gap(&self) -> Option<usize> {
    self.deletion_span.as_ref().map(|span| span.end)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
  Outside,
  InDeletion,
  AfterDeletion,
  InInsertion,
}

/// Scan the merged buffer and return its hunks in order.
///
/// The builder always emits the full form (both marker pairs, empty sides
/// included). An insertion pair with no preceding deletion pair is
/// tolerated on input; a deletion pair not immediately followed by an
/// insertion pair is corruption, as is any marker outside its expected
/// state or a scan that does not terminate outside all regions.
pub fn extract(buffer: RopeSlice) -> Result<Vec<Hunk>> {
  let mut hunks = Vec::new();
  let mut state = ScanState::Outside;

  let mut baseline_pos = 0usize;
  let mut draft_pos = 0usize;

  let mut buffer_start = 0usize;
  let mut baseline_start = 0usize;
  let mut draft_start = 0usize;
  let mut deletion_span: Option<Range<usize>> = None;
  let mut insertion_start = 0usize;
  let mut deleted = Tendril::new();
  let mut inserted = Tendril::new();

  for (offset, ch) in buffer.chars().enumerate() {
    let marker = Marker::from_char(ch);
    match state {
      ScanState::Outside => match marker {
        None => {
          baseline_pos += 1;
          draft_pos += 1;
        },
        Some(Marker::DelStart) => {
          buffer_start = offset;
          baseline_start = baseline_pos;
          draft_start = draft_pos;
          state = ScanState::InDeletion;
        },
        Some(Marker::InsStart) => {
          // Tolerated omitted-deletion form: the hunk is pure insertion.
          buffer_start = offset;
          baseline_start = baseline_pos;
          draft_start = draft_pos;
          insertion_start = offset;
          state = ScanState::InInsertion;
        },
        Some(marker) => return Err(Corruption::UnexpectedMarker { marker, offset }),
      },
      ScanState::InDeletion => match marker {
        None => {
          deleted.push(ch);
          baseline_pos += 1;
        },
        Some(Marker::DelEnd) => {
          deletion_span = Some(buffer_start..offset + 1);
          state = ScanState::AfterDeletion;
        },
        Some(marker) => return Err(Corruption::UnexpectedMarker { marker, offset }),
      },
      // The insertion pair must follow with zero intervening characters,
      // otherwise the deletion is orphaned.
      ScanState::AfterDeletion => match marker {
        Some(Marker::InsStart) => {
          insertion_start = offset;
          state = ScanState::InInsertion;
        },
        _ => return Err(Corruption::OrphanedDeletion { offset }),
      },
      ScanState::InInsertion => match marker {
        None => {
          inserted.push(ch);
          draft_pos += 1;
        },
        Some(Marker::InsEnd) => {
          let kind = match (deleted.is_empty(), inserted.is_empty()) {
            (false, true) => HunkKind::Deletion,
            (true, false) => HunkKind::Insertion,
            _ => HunkKind::Replacement,
          };
          hunks.push(Hunk {
            id: HunkId(hunks.len()),
            kind,
            buffer_range: buffer_start..offset + 1,
            baseline_range: baseline_start..baseline_pos,
            draft_range: draft_start..draft_pos,
            deletion_span: deletion_span.take(),
            insertion_span: insertion_start..offset + 1,
            deleted_text: std::mem::take(&mut deleted),
            inserted_text: std::mem::take(&mut inserted),
          });
          state = ScanState::Outside;
        },
        Some(marker) => return Err(Corruption::UnexpectedMarker { marker, offset }),
      },
    }
  }

  match state {
    ScanState::Outside => Ok(hunks),
    ScanState::AfterDeletion => Err(Corruption::OrphanedDeletion {
      offset: buffer.len_chars(),
    }),
    ScanState::InDeletion | ScanState::InInsertion => Err(Corruption::UnterminatedHunk),
  }
}
