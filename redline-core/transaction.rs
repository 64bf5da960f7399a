//! Operational primitives for buffer mutation.
//!
//! Every mutation of the merged buffer — a keystroke, an accept/reject, an
//! undo — is a [`Transaction`] built from a [`ChangeSet`] of sequential
//! operations: retain `n` chars, delete `n` chars, insert a fragment.
//! Transactions can be inverted against the original text, which is what
//! makes accept/reject undoable exactly like ordinary typing.

use std::borrow::Cow;

use ropey::{
  Rope,
  RopeBuilder,
  RopeSlice,
};
use thiserror::Error;

use crate::Tendril;

pub type Result<T> = std::result::Result<T, TransactionError>;

/// (from, to, replacement) in char offsets of the current buffer.
pub type Change = (usize, usize, Option<Tendril>);

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransactionError {
  #[error("changeset length mismatch: expected {expected}, got {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("invalid change range: start {from} is after end {to}")]
  InvalidRange { from: usize, to: usize },
  #[error("change range {from}..{to} is out of bounds for document length {len}")]
  RangeOutOfBounds {
    from: usize,
    to:   usize,
    len:  usize,
  },
  #[error("change range {from}..{to} overlaps previous end {prev_end}")]
  OverlappingRange {
    prev_end: usize,
    from:     usize,
    to:       usize,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  /// Move past n characters unchanged.
  Retain(usize),

  /// Delete n characters.
  Delete(usize),

  /// Insert text at the current position.
  Insert(Tendril),
}

/// Which side of an insertion a mapped position sticks to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
  Before,
  After,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
  changes:   Vec<Operation>,
  /// The required document length. Applying fails unless it matches.
  len:       usize,
  len_after: usize,
}

impl ChangeSet {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      changes:   Vec::with_capacity(capacity),
      len:       0,
      len_after: 0,
    }
  }

  #[must_use]
  pub fn new(doc: RopeSlice) -> Self {
    let len = doc.len_chars();
    Self {
      changes: Vec::new(),
      len,
      len_after: len,
    }
  }

  pub fn changes(&self) -> &[Operation] {
    &self.changes
  }

  /// Returns the expected document length for this changeset.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn len_after(&self) -> usize {
    self.len_after
  }

  pub fn delete(&mut self, n: usize) {
    use Operation::*;

    if n == 0 {
      return;
    }

    self.len += n;

    if let Some(Delete(count)) = self.changes.last_mut() {
      *count += n;
    } else {
      self.changes.push(Delete(n))
    }
  }

  pub fn insert(&mut self, fragment: Tendril) {
    use Operation::*;

    if fragment.is_empty() {
      return;
    }

    self.len_after += fragment.chars().count();

    // Keep replacements normalized as Insert followed by Delete.
    let new_last = match self.changes.as_mut_slice() {
      [.., Insert(prev)] | [.., Insert(prev), Delete(_)] => {
        prev.push_str(&fragment);
        return;
      },
      [.., last @ Delete(_)] => std::mem::replace(last, Insert(fragment)),
      _ => Insert(fragment),
    };

    self.changes.push(new_last);
  }

  pub fn retain(&mut self, n: usize) {
    use Operation::*;

    if n == 0 {
      return;
    }

    self.len += n;
    self.len_after += n;

    if let Some(Retain(count)) = self.changes.last_mut() {
      *count += n;
    } else {
      self.changes.push(Retain(n))
    }
  }

  /// Returns a changeset that reverts this one. The document parameter is
  /// the original text from before this changeset was applied.
  pub fn invert(&self, original_doc: &Rope) -> Result<Self> {
    if self.changes.is_empty() {
      return Ok(ChangeSet {
        changes:   Vec::new(),
        len:       self.len_after,
        len_after: self.len,
      });
    }

    self.ensure_len(original_doc.len_chars())?;

    let mut changes = Self::with_capacity(self.changes.len());
    let mut pos = 0;

    for change in &self.changes {
      use Operation::*;
      match change {
        Retain(n) => {
          changes.retain(*n);
          pos += n;
        },
        Delete(n) => {
          let text = Cow::from(original_doc.slice(pos..pos + *n));
          changes.insert(Tendril::from(text.as_ref()));
          pos += n;
        },
        Insert(s) => {
          changes.delete(s.chars().count());
        },
      }
    }

    Ok(changes)
  }

  fn ensure_len(&self, text_len: usize) -> Result<()> {
    if text_len != self.len {
      return Err(TransactionError::LengthMismatch {
        expected: self.len,
        actual:   text_len,
      });
    }
    Ok(())
  }

  /// Apply this changeset in-place.
  pub fn apply(&self, text: &mut Rope) -> Result<()> {
    self.ensure_len(text.len_chars())?;
    let mut pos = 0;

    for change in &self.changes {
      use Operation::*;
      match change {
        Retain(n) => pos += n,
        Delete(n) => text.remove(pos..pos + *n),
        Insert(s) => {
          text.insert(pos, s);
          pos += s.chars().count();
        },
      }
    }

    Ok(())
  }

  /// Apply this changeset to a rope and return the updated rope.
  pub fn apply_to(&self, text: &Rope) -> Result<Rope> {
    self.ensure_len(text.len_chars())?;
    if self.is_empty() {
      return Ok(text.clone());
    }

    let mut builder = RopeBuilder::new();
    let mut pos = 0;

    let append_slice = |from: usize, to: usize, builder: &mut RopeBuilder| {
      if from >= to {
        return;
      }
      let slice = text.slice(from..to);
      for chunk in slice.chunks() {
        builder.append(chunk);
      }
    };

    for change in &self.changes {
      use Operation::*;
      match change {
        Retain(n) => {
          append_slice(pos, pos + *n, &mut builder);
          pos += n;
        },
        Delete(n) => {
          pos += n;
        },
        Insert(s) => {
          builder.append(s.as_str());
        },
      }
    }

    append_slice(pos, self.len, &mut builder);

    Ok(builder.finish())
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.changes.is_empty() || self.changes == [Operation::Retain(self.len)]
  }

  /// Map a position through the changes.
  ///
  /// `assoc` picks the side of an insertion at exactly that position:
  /// `Before` stays in front of the inserted text, `After` moves past it.
  pub fn map_pos(&self, pos: usize, assoc: Assoc) -> usize {
    use Operation::*;

    let mut old_pos = 0;
    let mut new_pos = 0;
    let mut iter = self.changes.iter().peekable();

    while let Some(change) = iter.next() {
      match change {
        Retain(n) => {
          if pos < old_pos + n {
            return new_pos + (pos - old_pos);
          }
          old_pos += n;
          new_pos += n;
        },
        Delete(n) => {
          if pos < old_pos + n {
            return new_pos;
          }
          old_pos += n;
        },
        Insert(s) => {
          let ins = s.chars().count();
          // An insert directly followed by a delete is a replacement.
          if let Some(Operation::Delete(n)) = iter.peek().copied() {
            let n = *n;
            iter.next();
            if pos < old_pos + n {
              return match assoc {
                Assoc::Before => new_pos,
                Assoc::After => new_pos + ins,
              };
            }
            old_pos += n;
            new_pos += ins;
          } else {
            if pos == old_pos && assoc == Assoc::Before {
              return new_pos;
            }
            new_pos += ins;
          }
        },
      }
    }

    new_pos
  }

  pub fn changes_iter(&self) -> ChangeIterator<'_> {
    ChangeIterator::new(self)
  }
}

pub struct ChangeIterator<'a> {
  iter: std::iter::Peekable<std::slice::Iter<'a, Operation>>,
  pos:  usize,
}

impl<'a> ChangeIterator<'a> {
  fn new(changeset: &'a ChangeSet) -> Self {
    let iter = changeset.changes.iter().peekable();
    Self { iter, pos: 0 }
  }
}

impl Iterator for ChangeIterator<'_> {
  type Item = Change;

  fn next(&mut self) -> Option<Self::Item> {
    use Operation::*;

    loop {
      match self.iter.next()? {
        Retain(len) => {
          self.pos += len;
        },
        Delete(len) => {
          let start = self.pos;
          self.pos += len;
          return Some((start, self.pos, None));
        },
        Insert(s) => {
          let start = self.pos;
          // A subsequent delete means a replace, consume it.
          if let Some(Delete(len)) = self.iter.peek() {
            let len = *len;
            self.iter.next();

            self.pos += len;
            return Some((start, self.pos, Some(s.clone())));
          } else {
            return Some((start, start, Some(s.clone())));
          }
        },
      }
    }
  }
}

fn validate_change_bounds(from: usize, to: usize, len: usize) -> Result<()> {
  if from > to {
    return Err(TransactionError::InvalidRange { from, to });
  }
  if to > len {
    return Err(TransactionError::RangeOutOfBounds { from, to, len });
  }
  Ok(())
}

impl From<ChangeSet> for Transaction {
  fn from(changes: ChangeSet) -> Self {
    Self { changes }
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transaction {
  changes: ChangeSet,
}

impl Transaction {
  pub fn new(doc: &Rope) -> Self {
    Self {
      changes: ChangeSet::new(doc.slice(..)),
    }
  }

  /// Changes made to the buffer.
  pub fn changes(&self) -> &ChangeSet {
    &self.changes
  }

  /// Apply this transaction in-place.
  pub fn apply(&self, doc: &mut Rope) -> Result<()> {
    self.changes.apply(doc)
  }

  /// Apply this transaction to a rope and return the updated rope.
  pub fn apply_to(&self, doc: &Rope) -> Result<Rope> {
    self.changes.apply_to(doc)
  }

  /// Generate a transaction that reverts this one.
  pub fn invert(&self, original: &Rope) -> Result<Self> {
    Ok(Self {
      changes: self.changes.invert(original)?,
    })
  }

  /// Generate a transaction from a set of changes. Changes must be sorted
  /// and non-overlapping.
  pub fn change<I>(doc: &Rope, changes: I) -> Result<Self>
  where
    I: IntoIterator<Item = Change>,
  {
    let len = doc.len_chars();
    let changes = changes.into_iter();
    let (lower, upper) = changes.size_hint();
    let size = upper.unwrap_or(lower);
    let mut changeset = ChangeSet::with_capacity(2 * size + 1); // rough estimate

    let mut last = 0;
    for (from, to, tendril) in changes {
      validate_change_bounds(from, to, len)?;
      if from < last {
        return Err(TransactionError::OverlappingRange {
          prev_end: last,
          from,
          to,
        });
      }

      // Retain from last "to" to current "from".
      changeset.retain(from - last);
      let span = to - from;
      match tendril {
        Some(text) => {
          changeset.insert(text);
          changeset.delete(span);
        },
        None => changeset.delete(span),
      }
      last = to;
    }

    changeset.retain(len - last);

    Ok(Self::from(changeset))
  }

  pub fn changes_iter(&self) -> ChangeIterator<'_> {
    self.changes.changes_iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::marker::{
    DEL_END,
    DEL_START,
    INS_END,
    INS_START,
  };

  // "The cat sat." -> "The dog sat." as one replacement hunk. The marker
  // span is chars 4..14; the deleted word sits at 5..8, the inserted word
  // at 10..13. Total length 19.
  fn merged_fixture() -> Rope {
    let mut text = String::from("The ");
    text.push(DEL_START);
    text.push_str("cat");
    text.push(DEL_END);
    text.push(INS_START);
    text.push_str("dog");
    text.push(INS_END);
    text.push_str(" sat.");
    Rope::from(text.as_str())
  }

  #[test]
  fn invert() {
    // Collapse the hunk like an accept does.
    let doc = merged_fixture();
    let changes = Transaction::change(&doc, vec![(4, 14, Some("dog".into()))])
      .unwrap()
      .changes()
      .clone();

    let revert = changes.invert(&doc).unwrap();

    let mut doc2 = doc.clone();
    changes.apply(&mut doc2).unwrap();
    assert_eq!(doc2, Rope::from("The dog sat."));

    // A revert is a different changeset, and inverting it again gives the
    // original one back.
    assert_ne!(changes, revert);
    assert_eq!(changes, revert.invert(&doc2).unwrap());

    // Applying the revert restores the marker span, deleted word included.
    revert.apply(&mut doc2).unwrap();
    assert_eq!(doc, doc2);
  }

  #[test]
  fn transaction_change() {
    let mut doc = merged_fixture();
    let transaction = Transaction::change(&doc, vec![
      // A zero-width delete contributes nothing.
      (2, 2, None),
      // Retype the suggested word inside its marker pair.
      (10, 13, Some("fox".into())),
      // Drop the trailing period.
      (18, 19, None),
    ])
    .unwrap();
    transaction.apply(&mut doc).unwrap();

    let mut expected = String::from("The ");
    expected.push(DEL_START);
    expected.push_str("cat");
    expected.push(DEL_END);
    expected.push(INS_START);
    expected.push_str("fox");
    expected.push(INS_END);
    expected.push_str(" sat");
    assert_eq!(doc, Rope::from(expected.as_str()));
  }

  #[test]
  fn changes_iter() {
    let doc = merged_fixture();
    let changes = vec![(10, 13, Some("fox".into())), (14, 18, None)];
    let transaction = Transaction::change(&doc, changes.clone()).unwrap();
    assert_eq!(transaction.changes_iter().collect::<Vec<_>>(), changes);
  }

  #[test]
  fn overlapping_changes_are_rejected() {
    let doc = Rope::from("hello world");
    let err = Transaction::change(&doc, vec![
      (0, 5, Some("x".into())),
      (3, 8, Some("y".into())),
    ])
    .unwrap_err();
    assert!(matches!(err, TransactionError::OverlappingRange { .. }));

    let err = Transaction::change(&doc, vec![(4, 2, None)]).unwrap_err();
    assert!(matches!(err, TransactionError::InvalidRange { .. }));

    let err = Transaction::change(&doc, vec![(4, 100, None)]).unwrap_err();
    assert!(matches!(err, TransactionError::RangeOutOfBounds { .. }));
  }

  #[test]
  fn map_pos() {
    let doc = Rope::from("abcdefgh");

    // Insertion at 4.
    let cs = Transaction::change(&doc, vec![(4, 4, Some("!!".into()))])
      .unwrap()
      .changes()
      .clone();
    assert_eq!(cs.map_pos(0, Assoc::Before), 0);
    assert_eq!(cs.map_pos(4, Assoc::Before), 4);
    assert_eq!(cs.map_pos(4, Assoc::After), 6);
    assert_eq!(cs.map_pos(5, Assoc::Before), 7);

    // Deletion of 4..6.
    let cs = Transaction::change(&doc, vec![(4, 6, None)])
      .unwrap()
      .changes()
      .clone();
    assert_eq!(cs.map_pos(3, Assoc::Before), 3);
    assert_eq!(cs.map_pos(5, Assoc::Before), 4);
    assert_eq!(cs.map_pos(7, Assoc::Before), 5);

    // Replacement of 2..4 by a longer fragment.
    let cs = Transaction::change(&doc, vec![(2, 4, Some("wxyz".into()))])
      .unwrap()
      .changes()
      .clone();
    assert_eq!(cs.map_pos(2, Assoc::Before), 2);
    assert_eq!(cs.map_pos(3, Assoc::After), 6);
    assert_eq!(cs.map_pos(4, Assoc::Before), 6);
  }

  #[test]
  fn apply_to_matches_in_place() {
    // Accept the hunk and append shared text in the same transaction.
    let doc = merged_fixture();
    let transaction = Transaction::change(&doc, vec![
      (4, 14, Some("dog".into())),
      (19, 19, Some(" Twice.".into())),
    ])
    .unwrap();

    let mut in_place = doc.clone();
    transaction.apply(&mut in_place).unwrap();
    let persistent = transaction.apply_to(&doc).unwrap();

    assert_eq!(in_place, persistent);
    assert_eq!(in_place, Rope::from("The dog sat. Twice."));
    assert_eq!(doc, merged_fixture());
  }

  #[test]
  fn apply_errors_on_length_mismatch() {
    // A changeset recorded against the merged buffer must not apply to
    // the collapsed one.
    let doc = merged_fixture();
    let changes = ChangeSet::new(doc.slice(..));
    let mut resolved = Rope::from("The dog sat.");

    let err = changes.apply(&mut resolved).unwrap_err();
    assert!(matches!(err, TransactionError::LengthMismatch {
      expected: 19,
      actual:   12,
    }));
    assert_eq!(resolved, Rope::from("The dog sat."));
  }
}
