//! The host document boundary.
//!
//! The engine never owns the text buffer it edits; the host editor does. It
//! reads and writes through the [`DocumentBuffer`] trait, whose write
//! operations sit *outside* the host's own undo stack (the engine provides
//! transaction-level undo itself).
//!
//! [`RopeDocument`] is the crate's in-memory implementation, backed by
//! [`ropey::Rope`]. Hosts with a native buffer implement the trait over it;
//! the test suite and embedded uses run on `RopeDocument` directly.

use ropey::Rope;

use crate::region::LineRange;

/// A mutable, line-addressed text buffer owned by the host.
///
/// Line numbers are 1-indexed; ranges are inclusive. Writes must not be
/// recorded in any host-side undo stack, and hosts must not report
/// engine-issued writes back through the engine's edit notification.
pub trait DocumentBuffer {
    /// The full document text.
    fn read_text(&self) -> String;

    /// Number of logical lines. A trailing newline does not open a new line;
    /// the empty document has one (empty) line.
    fn line_count(&self) -> usize;

    /// Replace the lines of `range` with `text` (interpreted as whole lines;
    /// the empty string is one empty line).
    ///
    /// An empty `range` inserts `text` before line `range.start`. Insertion
    /// at `line_count() + 1` appends below the last line, supplying the
    /// separating newline itself when the document lacks a trailing one.
    fn replace_lines(&mut self, range: LineRange, text: &str);

    /// Remove the lines of `range` entirely (including one line separator).
    fn remove_lines(&mut self, range: LineRange);

    /// Whether the document has been closed by the host. Writes against a
    /// disposed document are dropped by the engine.
    fn is_disposed(&self) -> bool {
        false
    }
}

/// An in-memory [`DocumentBuffer`] backed by a rope.
#[derive(Debug, Clone)]
pub struct RopeDocument {
    rope: Rope,
    disposed: bool,
}

impl RopeDocument {
    /// Create a document from initial text.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            disposed: false,
        }
    }

    /// Mark the document as closed.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    fn ends_with_newline(&self) -> bool {
        let len = self.rope.len_chars();
        len > 0 && self.rope.char(len - 1) == '\n'
    }

    /// Char offset of the start of 1-indexed `line`.
    fn line_start(&self, line: usize) -> usize {
        self.rope.line_to_char(line - 1)
    }

    /// Char offset just past 1-indexed `line`, including its newline if one
    /// exists.
    fn line_end_inclusive(&self, line: usize) -> usize {
        self.rope.line_to_char(line)
    }

    fn insert_before(&mut self, line: usize, text: &str) {
        let line_count = self.line_count();
        if line <= line_count {
            let offset = self.line_start(line);
            self.rope.insert(offset, &format!("{text}\n"));
        } else if self.ends_with_newline() || self.rope.len_chars() == 0 {
            let offset = self.rope.len_chars();
            self.rope.insert(offset, &format!("{text}\n"));
        } else {
            let offset = self.rope.len_chars();
            self.rope.insert(offset, &format!("\n{text}"));
        }
    }
}

impl DocumentBuffer for RopeDocument {
    fn read_text(&self) -> String {
        self.rope.to_string()
    }

    fn line_count(&self) -> usize {
        let lines = self.rope.len_lines();
        if self.ends_with_newline() {
            lines - 1
        } else {
            lines
        }
    }

    fn replace_lines(&mut self, range: LineRange, text: &str) {
        if range.is_empty() {
            self.insert_before(range.start, text);
            return;
        }

        let line_count = self.line_count();
        let start = range.start.clamp(1, line_count);
        let end = range.end.clamp(start, line_count);

        let start_char = self.line_start(start);
        let end_char = self.line_end_inclusive(end);
        let trailing_newline = end < line_count || self.ends_with_newline();

        self.rope.remove(start_char..end_char);
        let replacement = if trailing_newline {
            format!("{text}\n")
        } else {
            text.to_string()
        };
        self.rope.insert(start_char, &replacement);
    }

    fn remove_lines(&mut self, range: LineRange) {
        if range.is_empty() {
            return;
        }
        let line_count = self.line_count();
        let terminated = self.ends_with_newline();
        let start = range.start.clamp(1, line_count);
        let end = range.end.clamp(start, line_count);

        let start_char = self.line_start(start);
        let end_char = self.line_end_inclusive(end);
        self.rope.remove(start_char..end_char);

        // Removing through the end of an unterminated document must also drop
        // the separator that preceded the removed block.
        if end == line_count && !terminated {
            let len = self.rope.len_chars();
            if len > 0 && self.rope.char(len - 1) == '\n' {
                self.rope.remove(len - 1..len);
            }
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Strip one trailing newline so a full text can be written as a block of
/// whole lines.
pub(crate) fn as_line_block(text: &str) -> &str {
    text.strip_suffix('\n').unwrap_or(text)
}

/// Split `text` into logical lines; the empty text is one empty line.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        vec![""]
    } else {
        text.lines().collect()
    }
}

/// The lines of `range` within `text`, joined with `\n`. Out-of-range lines
/// are ignored.
pub(crate) fn slice_lines(text: &str, range: LineRange) -> String {
    if range.is_empty() {
        return String::new();
    }
    let lines = split_lines(text);
    let start = range.start.min(lines.len() + 1);
    let end = range.end.min(lines.len());
    if end < start {
        return String::new();
    }
    lines[start - 1..end].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_count_conventions() {
        assert_eq!(RopeDocument::new("").line_count(), 1);
        assert_eq!(RopeDocument::new("a").line_count(), 1);
        assert_eq!(RopeDocument::new("a\n").line_count(), 1);
        assert_eq!(RopeDocument::new("a\nb").line_count(), 2);
        assert_eq!(RopeDocument::new("a\nb\n").line_count(), 2);
    }

    #[test]
    fn test_replace_middle_lines() {
        let mut doc = RopeDocument::new("a\nb\nc\nd\n");
        doc.replace_lines(LineRange::new(2, 3), "X\nY\nZ");
        assert_eq!(doc.read_text(), "a\nX\nY\nZ\nd\n");
        assert_eq!(doc.line_count(), 5);
    }

    #[test]
    fn test_replace_last_line_preserves_missing_trailing_newline() {
        let mut doc = RopeDocument::new("a\nb");
        doc.replace_lines(LineRange::new(2, 2), "B");
        assert_eq!(doc.read_text(), "a\nB");
    }

    #[test]
    fn test_replace_last_line_preserves_trailing_newline() {
        let mut doc = RopeDocument::new("a\nb\n");
        doc.replace_lines(LineRange::new(2, 2), "B");
        assert_eq!(doc.read_text(), "a\nB\n");
    }

    #[test]
    fn test_replace_whole_document() {
        let mut doc = RopeDocument::new("a\nb\nc\n");
        doc.replace_lines(LineRange::new(1, 3), "x");
        assert_eq!(doc.read_text(), "x\n");
    }

    #[test]
    fn test_insert_before_line() {
        let mut doc = RopeDocument::new("a\nc\n");
        doc.replace_lines(LineRange::empty_at(2), "b");
        assert_eq!(doc.read_text(), "a\nb\nc\n");
    }

    #[test]
    fn test_insert_at_top() {
        let mut doc = RopeDocument::new("b\n");
        doc.replace_lines(LineRange::empty_at(1), "a");
        assert_eq!(doc.read_text(), "a\nb\n");
    }

    #[test]
    fn test_append_after_last_line_with_trailing_newline() {
        let mut doc = RopeDocument::new("a\n");
        doc.replace_lines(LineRange::empty_at(2), "b");
        assert_eq!(doc.read_text(), "a\nb\n");
    }

    #[test]
    fn test_append_after_last_line_without_trailing_newline() {
        let mut doc = RopeDocument::new("a\nb");
        doc.replace_lines(LineRange::empty_at(3), "c");
        assert_eq!(doc.read_text(), "a\nb\nc");
    }

    #[test]
    fn test_remove_middle_lines() {
        let mut doc = RopeDocument::new("a\nb\nc\nd\n");
        doc.remove_lines(LineRange::new(2, 3));
        assert_eq!(doc.read_text(), "a\nd\n");
        assert_eq!(doc.line_count(), 2);
    }

    #[test]
    fn test_remove_last_line_of_unterminated_document() {
        let mut doc = RopeDocument::new("a\nb\nc");
        doc.remove_lines(LineRange::new(3, 3));
        assert_eq!(doc.read_text(), "a\nb");
    }

    #[test]
    fn test_remove_last_line_of_terminated_document() {
        let mut doc = RopeDocument::new("a\nb\n");
        doc.remove_lines(LineRange::new(2, 2));
        assert_eq!(doc.read_text(), "a\n");
    }

    #[test]
    fn test_slice_lines() {
        assert_eq!(slice_lines("a\nb\nc\n", LineRange::new(2, 3)), "b\nc");
        assert_eq!(slice_lines("a\nb\nc", LineRange::new(1, 1)), "a");
        assert_eq!(slice_lines("a\nb", LineRange::empty_at(1)), "");
        assert_eq!(slice_lines("", LineRange::new(1, 1)), "");
    }

    #[test]
    fn test_disposed_flag() {
        let mut doc = RopeDocument::new("a");
        assert!(!doc.is_disposed());
        doc.dispose();
        assert!(doc.is_disposed());
    }
}
