//! Reserved sentinel codepoints for the merged buffer.
//!
//! Change regions are delimited in-band with four characters from the
//! Unicode private use area, which never occur in user-authored text.
//! Everything that accepts user input must reject these characters; the
//! edit filter and the hunk state machine both rely on that.

use std::fmt;

use ropey::RopeSlice;

pub const DEL_START: char = '\u{E000}';
pub const DEL_END: char = '\u{E001}';
pub const INS_START: char = '\u{E002}';
pub const INS_END: char = '\u{E003}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
  DelStart,
  DelEnd,
  InsStart,
  InsEnd,
}

impl Marker {
  pub const fn as_char(self) -> char {
    match self {
      Marker::DelStart => DEL_START,
      Marker::DelEnd => DEL_END,
      Marker::InsStart => INS_START,
      Marker::InsEnd => INS_END,
    }
  }

  pub fn from_char(ch: char) -> Option<Self> {
    match ch {
      DEL_START => Some(Marker::DelStart),
      DEL_END => Some(Marker::DelEnd),
      INS_START => Some(Marker::InsStart),
      INS_END => Some(Marker::InsEnd),
      _ => None,
    }
  }
}

impl fmt::Display for Marker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Marker::DelStart => "deletion-start",
      Marker::DelEnd => "deletion-end",
      Marker::InsStart => "insertion-start",
      Marker::InsEnd => "insertion-end",
    };
    f.write_str(name)
  }
}

#[inline]
pub fn is_marker(ch: char) -> bool {
  matches!(ch, DEL_START..=INS_END)
}

pub fn fragment_has_marker(text: &str) -> bool {
  text.chars().any(is_marker)
}

pub fn slice_has_marker(slice: RopeSlice) -> bool {
  slice.chars().any(is_marker)
}
