//! Line-level diff computation.
//!
//! [`compute_line_diffs`] compares two texts at line granularity and returns
//! an ordered list of change blocks (insertions, deletions, edits) with both
//! old- and new-coordinate line ranges and the literal text of each side.
//!
//! The run sequence (unchanged / added / removed lines) comes from the
//! [`similar`] crate; this module coalesces consecutive added/removed runs
//! into one block and classifies it. All line numbers are 1-indexed and
//! inclusive; an empty range is encoded as `end == start - 1`.
//!
//! The function is pure and deterministic: identical inputs always produce
//! byte-identical output in ascending line order. It is cheap enough to be
//! re-run on every streamed chunk.

use serde::Serialize;
use similar::{Algorithm, ChangeTag, TextDiff};

/// The classification of one computed change block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffKind {
    /// Lines present in the new text but not the old (old range is empty).
    Insertion,
    /// Lines present in the old text but not the new (new range is empty).
    Deletion,
    /// Lines replaced by different content (both ranges non-empty).
    Edit,
}

/// One contiguous change block produced by [`compute_line_diffs`].
///
/// `original_*` coordinates index into the old text, `start_line`/`end_line`
/// into the new text. For an [`DiffKind::Insertion`] the original range is
/// empty (`original_end_line == original_start_line - 1`); for a
/// [`DiffKind::Deletion`] the new range is empty the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedDiff {
    /// Change classification.
    pub kind: DiffKind,
    /// Literal old-text content of the block (empty for insertions).
    pub original_code: String,
    /// First old-text line of the block (1-indexed).
    pub original_start_line: usize,
    /// Last old-text line of the block (inclusive).
    pub original_end_line: usize,
    /// Literal new-text content of the block (empty for deletions).
    pub code: String,
    /// First new-text line of the block (1-indexed).
    pub start_line: usize,
    /// Last new-text line of the block (inclusive).
    pub end_line: usize,
}

/// Compare `old_text` and `new_text` line by line.
///
/// Both inputs are normalized to end with a trailing newline before diffing,
/// so identical content never produces a spurious trailing edit and trailing
/// additions classify as insertions rather than edits.
pub fn compute_line_diffs(old_text: &str, new_text: &str) -> Vec<ComputedDiff> {
    let old = ensure_trailing_newline(old_text);
    let new = ensure_trailing_newline(new_text);

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_lines(old.as_ref(), new.as_ref());

    let mut diffs = Vec::new();

    // Next unconsumed line on each side, 1-indexed.
    let mut old_line = 1usize;
    let mut new_line = 1usize;
    // Start of the current add/remove streak: (old_start, new_start).
    let mut streak: Option<(usize, usize)> = None;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                if let Some((old_start, new_start)) = streak.take() {
                    diffs.push(flush_streak(
                        old_start, new_start, old_line, new_line, &old_lines, &new_lines,
                    ));
                }
                old_line += 1;
                new_line += 1;
            }
            ChangeTag::Delete => {
                streak.get_or_insert((old_line, new_line));
                old_line += 1;
            }
            ChangeTag::Insert => {
                streak.get_or_insert((old_line, new_line));
                new_line += 1;
            }
        }
    }

    if let Some((old_start, new_start)) = streak {
        diffs.push(flush_streak(
            old_start, new_start, old_line, new_line, &old_lines, &new_lines,
        ));
    }

    diffs
}

/// Turn a finished streak into one [`ComputedDiff`].
///
/// `old_next`/`new_next` are the first lines *after* the streak on each side.
fn flush_streak(
    old_start: usize,
    new_start: usize,
    old_next: usize,
    new_next: usize,
    old_lines: &[&str],
    new_lines: &[&str],
) -> ComputedDiff {
    let old_end = old_next - 1;
    let new_end = new_next - 1;

    let kind = if new_end < new_start {
        DiffKind::Deletion
    } else if old_end < old_start {
        DiffKind::Insertion
    } else {
        DiffKind::Edit
    };

    ComputedDiff {
        kind,
        original_code: join_lines(old_lines, old_start, old_end),
        original_start_line: old_start,
        original_end_line: old_end,
        code: join_lines(new_lines, new_start, new_end),
        start_line: new_start,
        end_line: new_end,
    }
}

fn join_lines(lines: &[&str], start: usize, end: usize) -> String {
    if end < start {
        return String::new();
    }
    lines[start - 1..end].join("\n")
}

fn ensure_trailing_newline(text: &str) -> std::borrow::Cow<'_, str> {
    if text.ends_with('\n') {
        std::borrow::Cow::Borrowed(text)
    } else {
        std::borrow::Cow::Owned(format!("{text}\n"))
    }
}
