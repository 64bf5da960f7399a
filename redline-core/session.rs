//! Client-side editing session for one merged document.
//!
//! The session owns the live buffer and is its single writer: user edits,
//! accept/reject, undo/redo, and reconciliation all go through it, in
//! strict arrival order. Persistence stays at the boundary — the session
//! produces save payloads and consumes save outcomes, it never talks to
//! the network itself.
//!
//! Externally sourced draft updates (the background writer, another
//! client) are gated on the dirty flag: while local edits are unconfirmed
//! they are stashed in an explicit pending slot instead of being applied,
//! so in-progress edits are structurally impossible to clobber. A save
//! that fails the revision check is handled the same way, and the save
//! loop stays halted until explicit reconciliation.

use ropey::Rope;
use thiserror::Error;
use tracing::debug;

use crate::{
  filter::{
    self,
    BlockReason,
    EditVerdict,
  },
  history::{
    History,
    HistoryError,
  },
  hunk::{
    self,
    Corruption,
    Hunk,
    HunkId,
  },
  merged,
  protocol::{
    DocumentSnapshot,
    Patch,
    UpdateRequest,
  },
  transaction::{
    Change,
    Transaction,
    TransactionError,
  },
  transform::{
    self,
    Resolution,
    TransformError,
  },
};

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("merged buffer is corrupt: {0}")]
  Corrupt(#[from] Corruption),
  #[error(transparent)]
  Transaction(#[from] TransactionError),
  #[error(transparent)]
  Transform(#[from] TransformError),
  #[error(transparent)]
  History(#[from] HistoryError),
}

/// Outcome of a proposed user edit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
  Applied,
  Blocked(BlockReason),
}

/// Outcome of an externally sourced draft update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
  Applied,
  Stashed,
}

/// Classification of a failed save.
///
/// Transient failures (timeouts, 5xx) leave the session retryable; the
/// driver owns the backoff schedule and asks for a fresh payload when it
/// fires. Permanent failures (validation-class 4xx) halt the save loop
/// until the cause is addressed; they are never silently retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
  Transient,
  Permanent,
}

/// A save payload plus the sequence number that ties its response back to
/// this session. Saves are coalesced by the caller; only the response to
/// the newest issued request is honored.
#[derive(Debug, Clone)]
pub struct SaveRequest {
  pub seq:     u64,
  pub payload: UpdateRequest,
}

#[derive(Debug, Clone, Copy)]
struct InFlightSave {
  seq:          u64,
  /// Buffer version when the payload was built; a success only clears the
  /// dirty flag when nothing changed in between.
  version:      u64,
  closes_draft: bool,
}

#[derive(Debug)]
pub struct Session {
  id:      String,
  buffer:  Rope,
  history: History,

  /// Last known-good projections, refreshed on every successful parse.
  /// Structural corruption is repaired by rebuilding from these.
  baseline: Rope,
  draft:    Option<Rope>,

  /// Last server-acknowledged revision token for this document.
  revision:    u64,
  diff_active: bool,

  dirty:   bool,
  pending: Option<DocumentSnapshot>,
  /// Saves stop after a conflict or corruption until explicitly resolved.
  halted:  bool,

  /// Bumped on every buffer mutation.
  version:   u64,
  save_seq:  u64,
  in_flight: Option<InFlightSave>,
}

impl Session {
  pub fn open(snapshot: &DocumentSnapshot) -> Self {
    let baseline = Rope::from(snapshot.content.as_str());
    let draft = snapshot.draft.as_deref().map(Rope::from);
    let buffer = merged::build(&baseline, draft.as_ref());
    Self {
      id: snapshot.id.clone(),
      buffer,
      history: History::new(),
      baseline,
      diff_active: draft.is_some(),
      draft,
      revision: snapshot.revision,
      dirty: false,
      pending: None,
      halted: false,
      version: 0,
      save_seq: 0,
      in_flight: None,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn buffer(&self) -> &Rope {
    &self.buffer
  }

  pub fn revision(&self) -> u64 {
    self.revision
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub fn is_halted(&self) -> bool {
    self.halted
  }

  pub fn pending(&self) -> Option<&DocumentSnapshot> {
    self.pending.as_ref()
  }

  /// Current hunks, recomputed by scanning the buffer. Never cached
  /// across mutations.
  pub fn hunks(&self) -> Result<Vec<Hunk>> {
    Ok(hunk::extract(self.buffer.slice(..))?)
  }

  /// Propose a user edit batch. The whole batch commits or the whole
  /// batch is vetoed; a veto leaves the buffer untouched and editing
  /// continues unaffected.
  pub fn apply_edit(&mut self, changes: Vec<Change>) -> Result<EditOutcome> {
    let hunks = self.hunks()?;
    match filter::evaluate(&self.buffer, &hunks, &changes) {
      EditVerdict::Block(reason) => {
        debug!(?reason, "edit batch vetoed");
        Ok(EditOutcome::Blocked(reason))
      },
      EditVerdict::Allow => {
        let tx = Transaction::change(&self.buffer, changes)?;
        self.apply_tracked(&tx)?;
        Ok(EditOutcome::Applied)
      },
    }
  }

  pub fn accept(&mut self, id: HunkId) -> Result<()> {
    self.resolve(id, Resolution::Accept)
  }

  pub fn reject(&mut self, id: HunkId) -> Result<()> {
    self.resolve(id, Resolution::Reject)
  }

  pub fn accept_all(&mut self) -> Result<()> {
    self.resolve_all(Resolution::Accept)
  }

  pub fn reject_all(&mut self) -> Result<()> {
    self.resolve_all(Resolution::Reject)
  }

  fn resolve(&mut self, id: HunkId, resolution: Resolution) -> Result<()> {
    let hunks = self.hunks()?;
    let tx = transform::resolve(&self.buffer, &hunks, id, resolution)?;
    self.apply_tracked(&tx)
  }

  fn resolve_all(&mut self, resolution: Resolution) -> Result<()> {
    let hunks = self.hunks()?;
    if hunks.is_empty() {
      return Ok(());
    }
    let tx = transform::resolve_all(&self.buffer, &hunks, resolution)?;
    self.apply_tracked(&tx)
  }

  pub fn undo(&mut self) -> Result<bool> {
    let Some(tx) = self.history.undo() else {
      return Ok(false);
    };
    tx.apply(&mut self.buffer)?;
    self.mark_mutated();
    Ok(true)
  }

  pub fn redo(&mut self) -> Result<bool> {
    let Some(tx) = self.history.redo() else {
      return Ok(false);
    };
    tx.apply(&mut self.buffer)?;
    self.mark_mutated();
    Ok(true)
  }

  /// Apply an externally sourced update. While dirty it is stashed, never
  /// applied; the caller must surface an explicit reconciliation action.
  pub fn external_update(&mut self, snapshot: DocumentSnapshot) -> UpdateOutcome {
    if self.dirty {
      debug!(
        revision = snapshot.revision,
        "stashing external update while dirty"
      );
      self.pending = Some(snapshot);
      return UpdateOutcome::Stashed;
    }
    self.adopt(snapshot);
    UpdateOutcome::Applied
  }

  /// Consume the pending snapshot and rebuild the buffer from it. Returns
  /// false when there is nothing to reconcile. In-progress local edits
  /// are discarded here deliberately — by an explicit user action, never
  /// silently.
  pub fn reconcile(&mut self) -> bool {
    let Some(snapshot) = self.pending.take() else {
      return false;
    };
    self.adopt(snapshot);
    true
  }

  /// Discard a corrupt buffer and rebuild it from the last known-good
  /// (baseline, draft) pair. The sanctioned recovery for
  /// [`Corruption`] — the buffer is never repaired by guessing.
  pub fn rebuild(&mut self) {
    self.buffer = merged::build(&self.baseline, self.draft.as_ref());
    self.history = History::new();
    self.halted = false;
    self.version += 1;
  }

  /// Build the next save payload, or `None` when there is nothing to
  /// save or saving is halted pending reconciliation. Corruption halts
  /// the save loop until [`Session::rebuild`].
  pub fn save_request(&mut self) -> Result<Option<SaveRequest>> {
    if self.halted || !self.dirty {
      return Ok(None);
    }

    let parsed = match merged::parse(&self.buffer) {
      Ok(parsed) => parsed,
      Err(err) => {
        self.halted = true;
        return Err(err.into());
      },
    };

    self.baseline = parsed.baseline.clone();
    self.draft = parsed.has_active_hunks.then(|| parsed.draft.clone());

    let closes_draft = self.diff_active && !parsed.has_active_hunks;
    let draft = if parsed.has_active_hunks {
      Patch::Value(parsed.draft.to_string())
    } else if closes_draft {
      Patch::Null
    } else {
      Patch::Absent
    };
    let base_revision = (!draft.is_absent()).then_some(self.revision);

    self.save_seq += 1;
    let seq = self.save_seq;
    self.in_flight = Some(InFlightSave {
      seq,
      version: self.version,
      closes_draft,
    });

    Ok(Some(SaveRequest {
      seq,
      payload: UpdateRequest {
        content: Some(parsed.baseline.to_string()),
        draft,
        base_revision,
      },
    }))
  }

  /// Record a successful save. Stale responses — superseded by a newer
  /// request or by reconciliation — are ignored entirely.
  pub fn save_succeeded(&mut self, seq: u64, revision: u64) {
    let Some(in_flight) = self.in_flight else {
      return;
    };
    if seq != in_flight.seq || seq != self.save_seq {
      debug!(seq, "ignoring stale save response");
      return;
    }

    self.in_flight = None;
    self.revision = revision;
    if in_flight.closes_draft {
      self.diff_active = false;
    }
    if in_flight.version == self.version {
      self.dirty = false;
    }
  }

  /// Record a save that failed in transport. Transient failures leave
  /// the session dirty and retryable; permanent ones halt the save loop
  /// until [`Session::resume_saves`] after the cause is addressed. Stale
  /// reports are ignored like stale successes.
  pub fn save_failed(&mut self, seq: u64, class: FailureClass) {
    let Some(in_flight) = self.in_flight else {
      return;
    };
    if seq != in_flight.seq {
      return;
    }

    self.in_flight = None;
    match class {
      FailureClass::Transient => {
        debug!(seq, "transient save failure; awaiting retry");
      },
      FailureClass::Permanent => {
        debug!(seq, "permanent save failure; halting saves");
        self.halted = true;
      },
    }
  }

  /// Resume saving after a permanent failure has been dealt with. A halt
  /// caused by a conflict still goes through [`Session::reconcile`]; the
  /// stashed snapshot keeps the halt in place here.
  pub fn resume_saves(&mut self) {
    if self.pending.is_none() {
      self.halted = false;
    }
  }

  /// Record a save rejected by the revision check. The server snapshot is
  /// stashed and the save loop halts; nothing is retried with the stale
  /// token, nothing is merged automatically.
  pub fn save_conflicted(&mut self, seq: u64, snapshot: DocumentSnapshot) {
    let Some(in_flight) = self.in_flight else {
      return;
    };
    if seq != in_flight.seq {
      return;
    }

    debug!(
      ours = self.revision,
      theirs = snapshot.revision,
      "save conflict; awaiting explicit reconciliation"
    );
    self.in_flight = None;
    self.halted = true;
    self.pending = Some(snapshot);
  }

  fn apply_tracked(&mut self, tx: &Transaction) -> Result<()> {
    let original = self.buffer.clone();
    tx.apply(&mut self.buffer)?;
    self.history.commit(tx, &original)?;
    self.mark_mutated();
    Ok(())
  }

  fn mark_mutated(&mut self) {
    self.dirty = true;
    self.version += 1;
  }

  /// Replace the buffer wholesale from a snapshot. Bypasses the edit
  /// filter and undo recording; the history is discarded because its
  /// revisions no longer describe this buffer.
  fn adopt(&mut self, snapshot: DocumentSnapshot) {
    self.baseline = Rope::from(snapshot.content.as_str());
    self.draft = snapshot.draft.as_deref().map(Rope::from);
    self.buffer = merged::build(&self.baseline, self.draft.as_ref());
    self.diff_active = self.draft.is_some();
    self.revision = snapshot.revision;
    self.history = History::new();
    self.dirty = false;
    self.pending = None;
    self.halted = false;
    self.in_flight = None;
    self.version += 1;
  }
}
