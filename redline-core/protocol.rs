//! Wire types shared between the editing client and the document service.

use chrono::{
  DateTime,
  Utc,
};
use serde::{
  Deserialize,
  Deserializer,
  Serialize,
  Serializer,
};

/// Tri-state field update: an omitted field, an explicit null, and a value
/// are three different instructions. Empty string is a valid value,
/// distinct from null; for the draft field null closes the diff session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
  #[default]
  Absent,
  Null,
  Value(T),
}

impl<T> Patch<T> {
  #[inline]
  pub fn is_absent(&self) -> bool {
    matches!(self, Patch::Absent)
  }
}

impl<T: Serialize> Serialize for Patch<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match self {
      // Absent never reaches here; the field carries
      // skip_serializing_if = "Patch::is_absent".
      Patch::Absent | Patch::Null => serializer.serialize_none(),
      Patch::Value(value) => serializer.serialize_some(value),
    }
  }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    // Only reached when the field is present; #[serde(default)] on the
    // field covers absence.
    Ok(match Option::<T>::deserialize(deserializer)? {
      None => Patch::Null,
      Some(value) => Patch::Value(value),
    })
  }
}

/// The complete persisted state of one document, as returned by the
/// service. `revision` is the server-owned monotonic token attached to the
/// draft value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSnapshot {
  pub id:         String,
  pub content:    String,
  pub draft:      Option<String>,
  pub revision:   u64,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
  pub content: String,
}

/// Payload of the persisted-update endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,

  /// Absent: leave the draft alone. Null: clear it and close the diff
  /// session. String (including empty): set it.
  #[serde(default, skip_serializing_if = "Patch::is_absent")]
  pub draft: Patch<String>,

  /// The last revision token the writer observed. Required if and only if
  /// `draft` is present.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_revision: Option<u64>,
}

/// Typed conflict response: carries the full current snapshot so the
/// client can reconcile without a second round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictBody {
  pub error:    String,
  pub message:  String,
  pub revision: u64,
  pub snapshot: DocumentSnapshot,
}
