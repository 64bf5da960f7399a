//! Undo history for the merged buffer.
//!
//! The history is a vector of revisions rooted at an empty sentinel. Each
//! revision stores the transaction that produced it and an inversion of
//! that transaction (delete operations do not carry the deleted text, so
//! the inversion is captured at commit time against the original buffer).
//! Undo applies the inversion and moves to the parent; redo follows the
//! most recent child, so committing after an undo starts a new branch and
//! redo tracks the newest one.
//!
//! Reconciliation replaces the buffer wholesale and is deliberately not
//! represented here; the owning session discards the history instead,
//! since its revisions no longer describe the new buffer.

use std::num::NonZeroUsize;

use ropey::Rope;
use thiserror::Error;

use crate::transaction::{
  Transaction,
  TransactionError,
};

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
  #[error("transaction error: {0}")]
  Transaction(#[from] TransactionError),
}

#[derive(Debug)]
pub struct History {
  revisions: Vec<Revision>,
  current:   usize,
}

impl Default for History {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone, Default)]
struct Revision {
  parent:      usize,
  last_child:  Option<NonZeroUsize>,
  transaction: Transaction,
  inversion:   Transaction,
}

impl History {
  pub fn new() -> Self {
    // The root revision is a sentinel with empty transactions.
    Self {
      revisions: vec![Revision::default()],
      current:   0,
    }
  }

  /// Record a committed transaction. `original` is the buffer from before
  /// the transaction was applied.
  pub fn commit(&mut self, transaction: &Transaction, original: &Rope) -> Result<()> {
    let inversion = transaction.invert(original)?;

    let new_current = self.revisions.len();
    self.revisions[self.current].last_child = NonZeroUsize::new(new_current);
    self.revisions.push(Revision {
      parent: self.current,
      last_child: None,
      transaction: transaction.clone(),
      inversion,
    });
    self.current = new_current;
    Ok(())
  }

  #[inline]
  pub fn at_root(&self) -> bool {
    self.current == 0
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.revisions.len()
  }

  /// Whether the history holds only the root revision.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.revisions.len() <= 1
  }

  /// Transaction that undoes the current revision, or `None` at the root.
  /// The caller must apply it to the buffer.
  pub fn undo(&mut self) -> Option<Transaction> {
    if self.at_root() {
      return None;
    }

    let revision = &self.revisions[self.current];
    let transaction = revision.inversion.clone();
    self.current = revision.parent;
    Some(transaction)
  }

  /// Transaction that reapplies the latest child of the current revision,
  /// or `None` when there is nothing to redo.
  pub fn redo(&mut self) -> Option<Transaction> {
    let child = self.revisions[self.current].last_child?.get();
    self.current = child;
    Some(self.revisions[child].transaction.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transaction::Transaction;

  fn commit_change(
    history: &mut History,
    doc: &mut Rope,
    change: (usize, usize, &str),
  ) -> Transaction {
    let (from, to, text) = change;
    let tx = Transaction::change(doc, vec![(from, to, Some(text.into()))]).unwrap();
    let original = doc.clone();
    tx.apply(doc).unwrap();
    history.commit(&tx, &original).unwrap();
    tx
  }

  #[test]
  fn undo_redo_roundtrip() {
    let mut history = History::new();
    let mut doc = Rope::from("hello");

    commit_change(&mut history, &mut doc, (5, 5, " world"));
    assert_eq!(doc, Rope::from("hello world"));

    let undo = history.undo().unwrap();
    undo.apply(&mut doc).unwrap();
    assert_eq!(doc, Rope::from("hello"));
    assert!(history.at_root());

    let redo = history.redo().unwrap();
    redo.apply(&mut doc).unwrap();
    assert_eq!(doc, Rope::from("hello world"));

    assert!(history.redo().is_none());
  }

  #[test]
  fn undo_at_root_is_none() {
    let mut history = History::new();
    assert!(history.undo().is_none());
  }

  #[test]
  fn redo_follows_latest_branch() {
    let mut history = History::new();
    let mut doc = Rope::from("base");

    commit_change(&mut history, &mut doc, (4, 4, " one"));
    let undo = history.undo().unwrap();
    undo.apply(&mut doc).unwrap();

    // A new commit after undo starts a fresh branch.
    commit_change(&mut history, &mut doc, (4, 4, " two"));
    let undo = history.undo().unwrap();
    undo.apply(&mut doc).unwrap();

    let redo = history.redo().unwrap();
    redo.apply(&mut doc).unwrap();
    assert_eq!(doc, Rope::from("base two"));
  }
}
