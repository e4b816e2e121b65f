//! Transaction snapshots and the per-document undo/redo stack.
//!
//! One logical AI action (a whole streaming run, or one accept/reject) maps
//! to one history entry, no matter how many intermediate document writes it
//! performed. An entry stores the full before/after state as immutable
//! snapshots of {region records, document text}.
//!
//! Diffs are deliberately *not* snapshotted: they are a pure function of a
//! region's original code and the document text, and are re-derived by
//! re-running the differ after a snapshot is restored.

use crate::region::{DiffRegion, DocumentKey, LineRange, RegionId, RegionKind, StreamState};

/// One region record captured by value, without diffs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSnapshot {
    /// The region's id (preserved across restore).
    pub id: RegionId,
    /// Bounds at capture time.
    pub range: LineRange,
    /// Kind payload at capture time.
    pub kind: RegionKind,
}

impl RegionSnapshot {
    /// Capture a region by value.
    pub fn of(region: &DiffRegion) -> Self {
        Self {
            id: region.id,
            range: region.range,
            kind: region.kind.clone(),
        }
    }

    /// Rebuild a live region record for `document`. Stream state is forced
    /// idle and the diff set starts empty; diffs are re-derived afterwards.
    pub fn into_region(self, document: DocumentKey) -> DiffRegion {
        let kind = match self.kind {
            RegionKind::StreamingEdit { original_code, .. } => RegionKind::StreamingEdit {
                original_code,
                stream: StreamState::Idle,
            },
            other => other,
        };
        DiffRegion {
            id: self.id,
            document,
            range: self.range,
            kind,
            diff_ids: Vec::new(),
        }
    }
}

/// Immutable capture of one document's engine state plus text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySnapshot {
    /// The captured document.
    pub document: DocumentKey,
    /// All region records, by value, without diffs.
    pub regions: Vec<RegionSnapshot>,
    /// The full document text.
    pub text: String,
}

/// One undo/redo entry: the state before and after a transaction.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Snapshot taken at `begin`.
    pub before: HistorySnapshot,
    /// Snapshot taken at `finish`.
    pub after: HistorySnapshot,
}

/// Per-document undo/redo stack of finished transactions.
#[derive(Debug, Default)]
pub struct HistoryStack {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl HistoryStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a finished transaction. Clears the redo stack, as any new action
    /// invalidates previously undone futures.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.redo.clear();
        self.undo.push(entry);
    }

    /// Whether there is something to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether there is something to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Pop the latest entry for undoing; the caller restores `before` and the
    /// entry moves to the redo stack.
    pub fn pop_undo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.undo.pop()?;
        self.redo.push(entry);
        self.redo.last()
    }

    /// Pop the latest undone entry for redoing; the caller restores `after`
    /// and the entry moves back to the undo stack.
    pub fn pop_redo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.redo.pop()?;
        self.undo.push(entry);
        self.undo.last()
    }

    /// Undo stack depth.
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Redo stack depth.
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}
