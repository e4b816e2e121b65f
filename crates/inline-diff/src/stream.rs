//! The stream-source boundary and the safe-prefix frontier.
//!
//! The engine does not care how the replacement text is produced; it only
//! consumes a monotonically growing string per region (each chunk's "full
//! text so far" extends the previous one) plus an end or error signal, and it
//! can ask the source to stop via [`StreamAbortHandle`].
//!
//! [`safe_prefix`] implements the flicker-avoidance frontier: the trailing
//! change block of a chunk may still grow with the next tokens, so it is held
//! back and the untouched remainder of the original text is kept in place
//! past the frontier. This keeps the visible line structure stable while the
//! stream is in flight.

use crate::differ::{ComputedDiff, DiffKind};
use crate::document::split_lines;

/// Cancels the in-flight LLM request feeding a region.
pub trait StreamAbortHandle {
    /// Signal the stream source to stop producing chunks. Idempotent.
    fn abort(&mut self);
}

/// An abort handle for sources that cannot be cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAbortHandle;

impl StreamAbortHandle for NoopAbortHandle {
    fn abort(&mut self) {}
}

/// The safe frontier of one differ run, in 1-indexed lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepBoundaries {
    /// First new-text line that is *not* yet safe to materialize.
    pub new_boundary: usize,
    /// First original-text line that is still unconsumed.
    pub old_boundary: usize,
}

/// Compute the frontier from the diffs of the current chunk.
///
/// The last diff marks where incoming text still churns: for an insertion or
/// edit the boundary sits at its last new line, for a deletion at its anchor
/// line; the original-side boundary is its first original line. With no diffs
/// (text identical so far) both boundaries are line 1.
pub fn sweep_boundaries(diffs: &[ComputedDiff]) -> SweepBoundaries {
    match diffs.last() {
        None => SweepBoundaries {
            new_boundary: 1,
            old_boundary: 1,
        },
        Some(last) => {
            let new_boundary = match last.kind {
                DiffKind::Insertion | DiffKind::Edit => last.end_line,
                DiffKind::Deletion => last.start_line,
            };
            SweepBoundaries {
                new_boundary,
                old_boundary: last.original_start_line,
            }
        }
    }
}

/// Build the text to materialize for one chunk: the new text up to (but not
/// including) the frontier line, followed by the untouched remainder of the
/// original text. Returns the stitched text and the number of confirmed new
/// lines.
pub fn safe_prefix(
    original_code: &str,
    text_so_far: &str,
    boundaries: SweepBoundaries,
) -> (String, usize) {
    let new_lines = split_lines(text_so_far);
    let old_lines = split_lines(original_code);

    let confirmed = boundaries.new_boundary.saturating_sub(1).min(new_lines.len());
    let old_from = (boundaries.old_boundary.saturating_sub(1)).min(old_lines.len());

    let mut parts: Vec<&str> = Vec::with_capacity(confirmed + old_lines.len() - old_from);
    parts.extend_from_slice(&new_lines[..confirmed]);
    parts.extend_from_slice(&old_lines[old_from..]);

    (parts.join("\n"), confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::compute_line_diffs;

    #[test]
    fn test_no_diffs_holds_everything_back() {
        let original = "a\nb\nc";
        let (text, confirmed) = safe_prefix(original, "a", sweep_boundaries(&[]));
        assert_eq!(text, original);
        assert_eq!(confirmed, 0);
    }

    #[test]
    fn test_trailing_edit_is_held_back() {
        let original = "a\nb\nc\nd";
        // The stream has rewritten "b" and is mid-way through rewriting "c".
        let incoming = "a\nB\nC?";
        let diffs = compute_line_diffs(original, incoming);
        let (text, confirmed) = safe_prefix(original, incoming, sweep_boundaries(&diffs));
        // Everything before the churning tail is materialized; the rest of
        // the original text stays in place.
        assert!(text.starts_with("a\n"));
        assert!(text.ends_with("c\nd"));
        assert!(confirmed < split_lines(incoming).len());
    }

    #[test]
    fn test_confirmed_prefix_grows_with_chunks() {
        let original = "a\nb\nc\nd\ne";
        let chunks = ["a\nB", "a\nB\nc\nD", "a\nB\nc\nD\ne"];
        let mut last_confirmed = 0;
        for chunk in chunks {
            let diffs = compute_line_diffs(original, chunk);
            let (_, confirmed) = safe_prefix(original, chunk, sweep_boundaries(&diffs));
            assert!(confirmed >= last_confirmed);
            last_confirmed = confirmed;
        }
    }

    #[test]
    fn test_boundaries_for_deletion_tail() {
        let original = "a\nx\ny\nb";
        let incoming = "a";
        let diffs = compute_line_diffs(original, incoming);
        let bounds = sweep_boundaries(&diffs);
        // A trailing run that currently looks like a deletion anchors the
        // frontier at its start; nothing past "a" is confirmed yet.
        assert_eq!(bounds.old_boundary, 2);
        let (text, _) = safe_prefix(original, incoming, bounds);
        assert_eq!(text, original);
    }
}
