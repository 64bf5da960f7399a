//! Building and parsing the merged buffer.
//!
//! The builder computes a word-level diff between the baseline and the
//! draft and serializes it into one buffer: shared text verbatim, each
//! changed region wrapped in deletion and insertion marker pairs. The
//! parser is the exact inverse; it validates the marker state machine
//! first and projects the buffer back into the (baseline, draft) pair.

use std::{
  sync::Arc,
  time::Instant,
};

use imara_diff::{
  Algorithm,
  Diff,
  InternedInput,
};
use ropey::{
  Rope,
  RopeBuilder,
  RopeSlice,
};

use crate::{
  hunk,
  marker::{
    DEL_END,
    DEL_START,
    INS_END,
    INS_START,
  },
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct WordToken(Arc<str>);

impl Default for WordToken {
  fn default() -> Self {
    Self(Arc::from(""))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenClass {
  Whitespace,
  Word,
  Other,
}

fn token_class(ch: char) -> TokenClass {
  if ch.is_whitespace() {
    TokenClass::Whitespace
  } else if ch.is_alphanumeric() || ch == '_' {
    TokenClass::Word
  } else {
    TokenClass::Other
  }
}

/// Split text into maximal runs of a single token class. Concatenating the
/// tokens reproduces the input exactly, which the round-trip property
/// depends on.
fn tokenize_words<I: Iterator<Item = char>>(iter: I) -> Vec<WordToken> {
  let mut tokens = Vec::new();
  let mut buf = String::new();
  let mut class = None;

  for ch in iter {
    let next_class = token_class(ch);
    if class == Some(next_class) {
      buf.push(ch);
      continue;
    }

    if !buf.is_empty() {
      tokens.push(WordToken(Arc::from(buf.as_str())));
      buf.clear();
    }
    buf.push(ch);
    class = Some(next_class);
  }

  if !buf.is_empty() {
    tokens.push(WordToken(Arc::from(buf.as_str())));
  }

  tokens
}

fn append_char(builder: &mut RopeBuilder, ch: char) {
  let mut buf = [0u8; 4];
  builder.append(ch.encode_utf8(&mut buf));
}

fn append_slice(builder: &mut RopeBuilder, slice: RopeSlice) {
  for chunk in slice.chunks() {
    builder.append(chunk);
  }
}

/// Serialize (baseline, draft) into one merged buffer.
///
/// An absent draft means no active diff session: the buffer equals the
/// baseline verbatim with zero hunks. Consecutive delete and insert runs
/// land in one replacement hunk, so each hunk stays one coherent edit.
/// Both marker pairs are always emitted, empty sides included.
pub fn build(baseline: &Rope, draft: Option<&Rope>) -> Rope {
  let Some(draft) = draft else {
    return baseline.clone();
  };

  let start = tracing::enabled!(tracing::Level::DEBUG).then(Instant::now);

  let mut input = InternedInput::default();
  input.update_before(tokenize_words(baseline.chars()).into_iter());
  input.update_after(tokenize_words(draft.chars()).into_iter());

  // Common words reoccur constantly in prose, which defeats the histogram
  // heuristic. Use Myers, as with character diffs.
  let mut diff = Diff::default();
  diff.compute_with(
    Algorithm::Myers,
    &input.before,
    &input.after,
    input.interner.num_tokens(),
  );

  let mut builder = RopeBuilder::new();
  let mut pos = 0u32;
  for imara_diff::Hunk { before, after } in diff.hunks() {
    for &token in &input.before[pos as usize..before.start as usize] {
      builder.append(input.interner[token].0.as_ref());
    }

    append_char(&mut builder, DEL_START);
    for &token in &input.before[before.start as usize..before.end as usize] {
      builder.append(input.interner[token].0.as_ref());
    }
    append_char(&mut builder, DEL_END);

    append_char(&mut builder, INS_START);
    for &token in &input.after[after.start as usize..after.end as usize] {
      builder.append(input.interner[token].0.as_ref());
    }
    append_char(&mut builder, INS_END);

    pos = before.end;
  }
  for &token in &input.before[pos as usize..] {
    builder.append(input.interner[token].0.as_ref());
  }

  let merged = builder.finish();

  if let Some(start) = start {
    tracing::debug!(
      "merged build took {}s",
      Instant::now().duration_since(start).as_secs_f64()
    );
  }
  merged
}

/// The projections recovered from a merged buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
  pub baseline:         Rope,
  pub draft:            Rope,
  pub has_active_hunks: bool,
}

/// Project the merged buffer back into its (baseline, draft) pair.
///
/// Validation runs first; a corrupt buffer fails with the distinct
/// [`hunk::Corruption`] error instead of a best-effort reconstruction.
/// Shared literal text appears identically in both projections.
pub fn parse(buffer: &Rope) -> hunk::Result<Parsed> {
  let hunks = hunk::extract(buffer.slice(..))?;

  let mut baseline = RopeBuilder::new();
  let mut draft = RopeBuilder::new();
  let mut pos = 0usize;

  for hunk in &hunks {
    let shared = buffer.slice(pos..hunk.buffer_range.start);
    append_slice(&mut baseline, shared);
    append_slice(&mut draft, shared);
    baseline.append(hunk.deleted_text.as_str());
    draft.append(hunk.inserted_text.as_str());
    pos = hunk.buffer_range.end;
  }
  let tail = buffer.slice(pos..);
  append_slice(&mut baseline, tail);
  append_slice(&mut draft, tail);

  Ok(Parsed {
    baseline:         baseline.finish(),
    draft:            draft.finish(),
    has_active_hunks: !hunks.is_empty(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hunk::HunkKind;

  fn roundtrip(baseline: &str, draft: &str) {
    let b = Rope::from(baseline);
    let d = Rope::from(draft);
    let merged = build(&b, Some(&d));
    let parsed = parse(&merged).unwrap();
    assert_eq!(parsed.baseline, b);
    assert_eq!(parsed.draft, d);
    assert_eq!(parsed.has_active_hunks, baseline != draft);
  }

  quickcheck::quickcheck! {
      fn roundtrip_arbitrary(a: String, b: String) -> bool {
          // Marker codepoints are never user-authored content.
          let a: String = a.chars().filter(|&c| !crate::marker::is_marker(c)).collect();
          let b: String = b.chars().filter(|&c| !crate::marker::is_marker(c)).collect();
          let baseline = Rope::from(a.as_str());
          let draft = Rope::from(b.as_str());
          let parsed = parse(&build(&baseline, Some(&draft))).unwrap();
          parsed.baseline == baseline && parsed.draft == draft
      }
  }

  #[test]
  fn absent_draft_is_verbatim_baseline() {
    let baseline = Rope::from("just the one text");
    let merged = build(&baseline, None);
    assert_eq!(merged, baseline);

    let parsed = parse(&merged).unwrap();
    assert!(!parsed.has_active_hunks);
    assert_eq!(parsed.baseline, baseline);
    assert_eq!(parsed.draft, baseline);
  }

  #[test]
  fn equal_inputs_yield_zero_hunks() {
    let baseline = Rope::from("same on both sides");
    let merged = build(&baseline, Some(&baseline.clone()));
    assert_eq!(merged, baseline);
    assert!(!parse(&merged).unwrap().has_active_hunks);
  }

  #[test]
  fn word_replacement_is_one_hunk() {
    let baseline = Rope::from("The cat sat.");
    let draft = Rope::from("The dog sat.");
    let merged = build(&baseline, Some(&draft));

    let hunks = crate::hunk::extract(merged.slice(..)).unwrap();
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].kind, HunkKind::Replacement);
    assert_eq!(hunks[0].deleted_text.as_str(), "cat");
    assert_eq!(hunks[0].inserted_text.as_str(), "dog");
  }

  #[test]
  fn adjacent_delete_and_insert_merge_into_replacement() {
    // A changed run covering several words must come out as one hunk, not
    // an adjacent pure-delete and pure-insert.
    let baseline = Rope::from("keep one two keep");
    let draft = Rope::from("keep three keep");
    let merged = build(&baseline, Some(&draft));

    let hunks = crate::hunk::extract(merged.slice(..)).unwrap();
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].kind, HunkKind::Replacement);
  }

  #[test]
  fn builder_output_always_validates() {
    for (a, b) in [
      ("", ""),
      ("", "added"),
      ("removed", ""),
      ("a b c", "a x c"),
      ("same", "same"),
      ("trailing\n", "trailing"),
      ("wörds wíth ünicode", "wörds wíthout ünicode"),
    ] {
      let merged = build(&Rope::from(a), Some(&Rope::from(b)));
      crate::hunk::extract(merged.slice(..)).unwrap();
    }
  }

  #[test]
  fn roundtrip_edges() {
    roundtrip("", "");
    roundtrip("", "new text");
    roundtrip("old text", "");
    roundtrip("The cat sat.", "The dog sat.");
    roundtrip("shared prefix then tail", "shared prefix other tail");
  }
}
