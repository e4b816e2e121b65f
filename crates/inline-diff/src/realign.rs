//! Region realignment under document edits.
//!
//! Every discrete text edit applied to a document (a replaced line range plus
//! replacement text) moves or resizes the regions tracked on that document.
//! [`realign_range`] classifies one edit against one region and returns the
//! adjusted bounds together with a [`RegionImpact`] telling the caller
//! whether the region's diffs survived unchanged, shifted wholesale, or went
//! stale.
//!
//! Realignment runs synchronously inside the document-change notification,
//! before any other consumer observes the new text, so region bounds are
//! never stale relative to the text they are rendered against.

use crate::region::LineRange;

/// A discrete text edit: `range` is replaced by `new_height` lines.
///
/// An empty `range` (`end == start - 1`) is an insertion point: `new_height`
/// lines are inserted before line `range.start`. A `new_height` of zero with
/// a non-empty `range` is a pure removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEdit {
    /// The replaced line range (1-indexed, inclusive).
    pub range: LineRange,
    /// Line count of the replacement text.
    pub new_height: usize,
}

impl DocumentEdit {
    /// An edit replacing `range` with `text`.
    pub fn replacement(range: LineRange, text: &str) -> Self {
        Self {
            range,
            new_height: text_height(text),
        }
    }

    /// An edit inserting `text` before line `line`.
    pub fn insertion(line: usize, text: &str) -> Self {
        Self {
            range: LineRange::empty_at(line),
            new_height: text_height(text),
        }
    }

    /// An edit removing `range` entirely.
    pub fn removal(range: LineRange) -> Self {
        Self {
            range,
            new_height: 0,
        }
    }

    /// Net change in document line count.
    pub fn delta(&self) -> i64 {
        self.new_height as i64 - self.range.len() as i64
    }
}

/// Line count of a replacement text block (`newlines + 1`).
pub fn text_height(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count() + 1
}

/// How an edit affected a region's diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionImpact {
    /// The edit did not touch the region; bounds and diffs unchanged.
    Untouched,
    /// The edit landed entirely above; bounds and diffs shifted by the delta,
    /// content untouched.
    Shifted(i64),
    /// The edit touched the region's interior; its diffs are stale and must
    /// be re-derived from the baseline and the current text.
    Interior,
}

/// Adjust one region's bounds for one edit.
///
/// Returns the new bounds and the diff impact. The returned range may be
/// empty (`end == start - 1`); the caller prunes such regions.
pub fn realign_range(region: LineRange, edit: &DocumentEdit) -> (LineRange, RegionImpact) {
    let delta = edit.delta();
    let (rs, re) = (region.start, region.end);

    if edit.range.is_empty() {
        // Insertion of `new_height` lines before line `point`.
        let point = edit.range.start;
        return if point > re + 1 {
            (region, RegionImpact::Untouched)
        } else if point < rs {
            (region.shifted(delta), RegionImpact::Shifted(delta))
        } else {
            // Insertion inside the region, or at the line just past its end
            // (where rejected deletions restore their content).
            (
                clamp(rs, re as i64 + delta),
                RegionImpact::Interior,
            )
        };
    }

    let (es, ee) = (edit.range.start, edit.range.end);

    if es > re {
        // Edit entirely after the region.
        (region, RegionImpact::Untouched)
    } else if ee < rs {
        // Region entirely below the edit.
        (region.shifted(delta), RegionImpact::Shifted(delta))
    } else if es >= rs && ee <= re {
        // Edit fully inside the region.
        (clamp(rs, re as i64 + delta), RegionImpact::Interior)
    } else if es <= rs && ee >= re {
        // Region fully inside the edit: collapse to the replacement extent.
        (
            clamp(es, es as i64 + edit.new_height as i64 - 1),
            RegionImpact::Interior,
        )
    } else if es < rs {
        // Edit straddles the region's top: clamp the start to the last line
        // of the replacement extent, recompute the end via the delta.
        let start = es + edit.new_height.saturating_sub(1);
        (clamp(start, re as i64 + delta), RegionImpact::Interior)
    } else {
        // Edit straddles the region's bottom.
        let overlapping = (re - es + 1) as i64;
        (
            clamp(rs, re as i64 + edit.new_height as i64 - overlapping),
            RegionImpact::Interior,
        )
    }
}

fn clamp(start: usize, end: i64) -> LineRange {
    let start = start.max(1);
    let end = end.max(start as i64 - 1) as usize;
    LineRange::new(start, end)
}
