//! In-memory document store with revision-checked draft writes.
//!
//! The revision token orders draft writes, nothing else. Content-only
//! saves are last-writer-wins and leave the token alone; any write that
//! touches the draft field must present the token it last saw, and a
//! mismatch is rejected with the current state attached so the caller can
//! reconcile without a second round trip.

use std::collections::HashMap;

use chrono::{
  DateTime,
  Utc,
};
use parking_lot::RwLock;
use redline_core::protocol::{
  DocumentSnapshot,
  Patch,
  UpdateRequest,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("document not found")]
  NotFound,
  #[error("draft writes require a base revision")]
  MissingBaseRevision,
  #[error("base revision is only valid on a draft write")]
  UnexpectedBaseRevision,
  #[error("revision conflict: submitted {submitted}, current {current}")]
  Conflict {
    submitted: u64,
    current:   u64,
    snapshot:  Box<DocumentSnapshot>,
  },
}

#[derive(Debug, Clone)]
struct StoredDocument {
  content:    String,
  draft:      Option<String>,
  revision:   u64,
  updated_at: DateTime<Utc>,
}

impl StoredDocument {
  fn snapshot(&self, id: &str) -> DocumentSnapshot {
    DocumentSnapshot {
      id:         id.to_string(),
      content:    self.content.clone(),
      draft:      self.draft.clone(),
      revision:   self.revision,
      updated_at: self.updated_at,
    }
  }
}

#[derive(Debug, Default)]
pub struct Store {
  documents: RwLock<HashMap<String, StoredDocument>>,
}

impl Store {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn create(&self, content: String) -> DocumentSnapshot {
    let id = Uuid::new_v4().to_string();
    let document = StoredDocument {
      content,
      draft: None,
      revision: 0,
      updated_at: Utc::now(),
    };
    let snapshot = document.snapshot(&id);
    self.documents.write().insert(id, document);
    snapshot
  }

  pub fn get(&self, id: &str) -> Result<DocumentSnapshot> {
    self
      .documents
      .read()
      .get(id)
      .map(|document| document.snapshot(id))
      .ok_or(StoreError::NotFound)
  }

  pub fn list(&self) -> Vec<DocumentSnapshot> {
    let mut snapshots: Vec<_> = self
      .documents
      .read()
      .iter()
      .map(|(id, document)| document.snapshot(id))
      .collect();
    snapshots.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    snapshots
  }

  /// Apply an update atomically. The revision check and the write happen
  /// under a single lock acquisition, so exactly one of two racing draft
  /// writes with the same base revision can win.
  pub fn update(&self, id: &str, request: UpdateRequest) -> Result<DocumentSnapshot> {
    let mut documents = self.documents.write();
    let document = documents.get_mut(id).ok_or(StoreError::NotFound)?;

    // The revision token is required if and only if the draft field is
    // present; a content-only write carrying one is a malformed request.
    if !request.draft.is_absent() {
      let submitted = request.base_revision.ok_or(StoreError::MissingBaseRevision)?;
      if submitted != document.revision {
        debug!(id, submitted, current = document.revision, "draft write rejected");
        return Err(StoreError::Conflict {
          submitted,
          current: document.revision,
          snapshot: Box::new(document.snapshot(id)),
        });
      }
    } else if request.base_revision.is_some() {
      return Err(StoreError::UnexpectedBaseRevision);
    }

    if let Some(content) = request.content {
      document.content = content;
    }
    match request.draft {
      Patch::Absent => {},
      // An empty-string draft is a live value, only Null clears.
      Patch::Value(draft) => {
        document.draft = Some(draft);
        document.revision += 1;
      },
      Patch::Null => {
        document.draft = None;
        document.revision += 1;
      },
    }
    document.updated_at = Utc::now();

    Ok(document.snapshot(id))
  }

  pub fn delete(&self, id: &str) -> Result<()> {
    self
      .documents
      .write()
      .remove(id)
      .map(|_| ())
      .ok_or(StoreError::NotFound)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  fn draft_update(draft: Patch<String>, base_revision: u64) -> UpdateRequest {
    UpdateRequest {
      content: None,
      draft,
      base_revision: Some(base_revision),
    }
  }

  #[test]
  fn content_only_write_keeps_revision() {
    let store = Store::new();
    let doc = store.create("one".into());

    let updated = store
      .update(&doc.id, UpdateRequest {
        content:       Some("two".into()),
        draft:         Patch::Absent,
        base_revision: None,
      })
      .unwrap();

    assert_eq!(updated.content, "two");
    assert_eq!(updated.revision, 0);
  }

  #[test]
  fn draft_set_and_clear_each_bump_revision() {
    let store = Store::new();
    let doc = store.create("text".into());

    let updated = store
      .update(&doc.id, draft_update(Patch::Value("suggestion".into()), 0))
      .unwrap();
    assert_eq!(updated.draft.as_deref(), Some("suggestion"));
    assert_eq!(updated.revision, 1);

    let updated = store.update(&doc.id, draft_update(Patch::Null, 1)).unwrap();
    assert_eq!(updated.draft, None);
    assert_eq!(updated.revision, 2);
  }

  #[test]
  fn empty_string_draft_is_not_a_clear() {
    let store = Store::new();
    let doc = store.create("text".into());

    let updated = store
      .update(&doc.id, draft_update(Patch::Value(String::new()), 0))
      .unwrap();
    assert_eq!(updated.draft.as_deref(), Some(""));
    assert_eq!(updated.revision, 1);
  }

  #[test]
  fn stale_base_revision_is_rejected_with_current_state() {
    let store = Store::new();
    let doc = store.create("text".into());
    store
      .update(&doc.id, draft_update(Patch::Value("a".into()), 0))
      .unwrap();

    let err = store
      .update(&doc.id, draft_update(Patch::Value("b".into()), 0))
      .unwrap_err();
    match err {
      StoreError::Conflict {
        submitted,
        current,
        snapshot,
      } => {
        assert_eq!(submitted, 0);
        assert_eq!(current, 1);
        assert_eq!(snapshot.draft.as_deref(), Some("a"));
      },
      other => panic!("expected conflict, got {other:?}"),
    }
  }

  #[test]
  fn content_only_write_with_base_revision_is_rejected() {
    let store = Store::new();
    let doc = store.create("text".into());

    let err = store
      .update(&doc.id, UpdateRequest {
        content:       Some("new".into()),
        draft:         Patch::Absent,
        base_revision: Some(0),
      })
      .unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedBaseRevision));
    assert_eq!(store.get(&doc.id).unwrap().content, "text");
  }

  #[test]
  fn draft_write_without_base_revision_is_rejected() {
    let store = Store::new();
    let doc = store.create("text".into());

    let err = store
      .update(&doc.id, UpdateRequest {
        content:       None,
        draft:         Patch::Value("a".into()),
        base_revision: None,
      })
      .unwrap_err();
    assert!(matches!(err, StoreError::MissingBaseRevision));
  }

  #[test]
  fn racing_draft_writes_have_one_winner() {
    let store = Arc::new(Store::new());
    let doc = store.create("text".into());

    let handles: Vec<_> = (0..8)
      .map(|n| {
        let store = Arc::clone(&store);
        let id = doc.id.clone();
        std::thread::spawn(move || {
          store.update(&id, draft_update(Patch::Value(format!("draft {n}")), 0))
        })
      })
      .collect();

    let wins = handles
      .into_iter()
      .map(|handle| handle.join().unwrap())
      .filter(|outcome| outcome.is_ok())
      .count();

    assert_eq!(wins, 1);
    assert_eq!(store.get(&doc.id).unwrap().revision, 1);
  }
}
