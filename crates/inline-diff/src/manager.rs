//! The engine facade.
//!
//! [`InlineDiffManager`] wires the store, the realigner, the streaming
//! writer, the history bridge, and the accept/reject controller behind one
//! API, and owns the per-document write guard that keeps its own writes from
//! re-entering the realignment path.
//!
//! # Overview
//!
//! A host attaches its documents, subscribes for change events, and then:
//!
//! - calls [`start_applying`](InlineDiffManager::start_applying) when an LLM
//!   edit begins, feeding the growing text through
//!   [`on_stream_chunk`](InlineDiffManager::on_stream_chunk) and closing with
//!   [`on_stream_end`](InlineDiffManager::on_stream_end) or
//!   [`on_stream_error`](InlineDiffManager::on_stream_error);
//! - reports user edits through
//!   [`document_edited`](InlineDiffManager::document_edited) so regions stay
//!   aligned;
//! - resolves diffs with [`accept_diff`](InlineDiffManager::accept_diff) /
//!   [`reject_diff`](InlineDiffManager::reject_diff);
//! - reads [`region_views`](InlineDiffManager::region_views) to render
//!   decorations.
//!
//! Every streaming run and every accept/reject is one undo/redo entry,
//! regardless of how many document writes happened in between.
//!
//! # Example
//!
//! ```rust
//! use inline_diff::{
//!     ApplyOptions, ApplyTarget, DocumentKey, InlineDiffManager, LineRange, RopeDocument,
//! };
//!
//! let mut manager = InlineDiffManager::new();
//! let key = DocumentKey::new("file:///demo.rs");
//! manager.attach_document(key.clone(), Box::new(RopeDocument::new("a\nb\nc\n")));
//!
//! let region = manager
//!     .start_applying(ApplyOptions {
//!         document: key.clone(),
//!         target: ApplyTarget::Lines(LineRange::new(1, 3)),
//!         abort: None,
//!     })
//!     .unwrap();
//!
//! manager.on_stream_chunk(region, "a\nB");
//! manager.on_stream_end(region, "a\nB\nc");
//!
//! let views = manager.region_views(&key);
//! assert_eq!(views.len(), 1);
//! assert_eq!(views[0].diffs.len(), 1);
//! ```

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::differ::compute_line_diffs;
use crate::document::{as_line_block, slice_lines, DocumentBuffer};
use crate::events::{EventCallback, InlineDiffEvent};
use crate::history::{HistoryEntry, HistorySnapshot, HistoryStack, RegionSnapshot};
use crate::realign::{realign_range, text_height, DocumentEdit, RegionImpact};
use crate::region::{
    DiffId, DiffView, DocumentKey, LineRange, RegionId, RegionKind, RegionView, RegionViewKind,
    StreamState,
};
use crate::store::RegionStore;
use crate::stream::{safe_prefix, sweep_boundaries, StreamAbortHandle};

/// What a streaming edit should rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTarget {
    /// A specific line range of the document.
    Lines(LineRange),
    /// The whole document.
    WholeDocument,
    /// The range held by a pending-instruction region, which is consumed
    /// (deleted and superseded by the new streaming-edit region).
    Instruction(RegionId),
}

/// Options for [`InlineDiffManager::start_applying`].
pub struct ApplyOptions {
    /// The target document.
    pub document: DocumentKey,
    /// The range to rewrite.
    pub target: ApplyTarget,
    /// Handle used to cancel the LLM request on
    /// [`interrupt_streaming`](InlineDiffManager::interrupt_streaming).
    pub abort: Option<Box<dyn StreamAbortHandle>>,
}

/// Bulk resolution behavior for
/// [`InlineDiffManager::accept_or_reject_all_in_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveBehavior {
    /// Fold every diff into the baseline.
    Accept,
    /// Revert every diff's document text.
    Reject,
}

/// Errors reported by the engine's fallible entry points.
///
/// Races against ids that no longer exist are deliberately *not* errors:
/// accept/reject/interrupt on a missing diff or region are no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InlineDiffError {
    /// The document was never attached (or has been detached).
    #[error("document `{0}` is not attached")]
    UnknownDocument(DocumentKey),
    /// The requested lines fall outside the document.
    #[error("lines {start}..={end} are outside the document ({line_count} lines)")]
    InvalidRange {
        /// Requested start line.
        start: usize,
        /// Requested end line.
        end: usize,
        /// The document's current line count.
        line_count: usize,
    },
    /// The requested range intersects an existing region. Nothing was
    /// mutated and no transaction was opened.
    #[error("target range overlaps {existing}")]
    RegionOverlap {
        /// The region already occupying part of the range.
        existing: RegionId,
    },
    /// The referenced region does not exist.
    #[error("{0} does not exist")]
    UnknownRegion(RegionId),
    /// The document already has a streaming edit (or an unresolved partial
    /// edit) in flight; its transaction must close first.
    #[error("document `{0}` already has an edit transaction in flight")]
    EditInFlight(DocumentKey),
}

/// The inline diff engine. See the [module docs](self) for the protocol.
#[derive(Default)]
pub struct InlineDiffManager {
    store: RegionStore,
    documents: HashMap<DocumentKey, Box<dyn DocumentBuffer>>,
    /// Documents currently inside a self-issued write. Edits observed while
    /// set are the engine's own and are not realigned a second time.
    writing: HashSet<DocumentKey>,
    history: HashMap<DocumentKey, HistoryStack>,
    /// Before-snapshots of transactions that have begun but not finished.
    open_transactions: HashMap<DocumentKey, HistorySnapshot>,
    abort_handles: HashMap<RegionId, Box<dyn StreamAbortHandle>>,
    callbacks: Vec<EventCallback>,
}

impl InlineDiffManager {
    /// Create an engine with no documents attached.
    pub fn new() -> Self {
        Self::default()
    }

    // ── documents ───────────────────────────────────────────────────────

    /// Register a host document under `key`.
    pub fn attach_document(&mut self, key: DocumentKey, buffer: Box<dyn DocumentBuffer>) {
        debug!(document = %key, "attach document");
        self.documents.insert(key, buffer);
    }

    /// Drop a document and everything tracked for it: regions, diffs,
    /// history, and any open transaction.
    pub fn detach_document(&mut self, key: &DocumentKey) {
        for region_id in self.store.region_ids_for(key) {
            self.abort_handles.remove(&region_id);
        }
        self.store.clear_document(key);
        self.history.remove(key);
        self.open_transactions.remove(key);
        self.writing.remove(key);
        if self.documents.remove(key).is_some() {
            debug!(document = %key, "detach document");
            self.emit(InlineDiffEvent::RegionsChanged {
                document: key.clone(),
            });
        }
    }

    /// The current text of an attached document.
    pub fn document_text(&self, key: &DocumentKey) -> Option<String> {
        self.documents.get(key).map(|doc| doc.read_text())
    }

    /// Subscribe to engine change events.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&InlineDiffEvent) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    // ── presentation views ──────────────────────────────────────────────

    /// Read-only projections of a document's regions, in ascending line
    /// order, for rendering decorations.
    pub fn region_views(&self, key: &DocumentKey) -> Vec<RegionView> {
        let mut regions = self.store.regions_for(key);
        regions.sort_by_key(|region| region.range.start);

        regions
            .into_iter()
            .map(|region| {
                let kind = match &region.kind {
                    RegionKind::StreamingEdit { stream, .. } => RegionViewKind::StreamingEdit {
                        sweep_line: match stream {
                            StreamState::Streaming { sweep_line } => Some(*sweep_line),
                            StreamState::Idle => None,
                        },
                    },
                    RegionKind::PendingInstruction { instruction } => {
                        RegionViewKind::PendingInstruction {
                            instruction: instruction.clone(),
                        }
                    }
                };
                let diffs = self
                    .store
                    .diffs_of(region.id)
                    .into_iter()
                    .map(|diff| DiffView {
                        id: diff.id,
                        kind: diff.kind,
                        range: diff.range,
                        original_range: diff.original_range,
                        original_code: diff.original_code.clone(),
                        code: diff.code.clone(),
                    })
                    .collect();
                RegionView {
                    id: region.id,
                    range: region.range,
                    kind,
                    diffs,
                }
            })
            .collect()
    }

    // ── user edits ──────────────────────────────────────────────────────

    /// Report a text edit the *host* applied to a document. Must be called
    /// once per discrete edit, in application order, synchronously before
    /// any other consumer reads the new text. Engine-issued edits are
    /// recognized by the write guard and skipped.
    pub fn document_edited(&mut self, key: &DocumentKey, edit: &DocumentEdit) {
        if self.writing.contains(key) {
            return;
        }
        if !self.documents.contains_key(key) {
            return;
        }
        self.apply_realignment(key, edit, None);
    }

    /// Apply an edit on the *user's* behalf (typing, paste) to an attached
    /// document, then realign regions exactly as a host-reported edit would.
    /// Hosts with their own buffers apply the edit themselves and call
    /// [`document_edited`](Self::document_edited) instead; this entry point
    /// serves embedded [`RopeDocument`](crate::RopeDocument) setups. Passing
    /// `None` removes the lines of `range`.
    pub fn apply_user_edit(
        &mut self,
        key: &DocumentKey,
        range: LineRange,
        text: Option<&str>,
    ) -> bool {
        match self.documents.get(key) {
            Some(doc) if !doc.is_disposed() => {}
            _ => return false,
        }

        let edit = match text {
            None => DocumentEdit::removal(range),
            Some(t) if range.is_empty() => DocumentEdit::insertion(range.start, t),
            Some(t) => DocumentEdit::replacement(range, t),
        };

        if let Some(doc) = self.documents.get_mut(key) {
            match text {
                Some(t) => doc.replace_lines(range, t),
                None => doc.remove_lines(range),
            }
        }
        self.apply_realignment(key, &edit, None);
        true
    }

    // ── instruction regions ─────────────────────────────────────────────

    /// Create a pending-instruction region over `range`. Fails if the range
    /// overlaps an existing region or falls outside the document.
    pub fn add_instruction_region(
        &mut self,
        key: &DocumentKey,
        range: LineRange,
        instruction: impl Into<String>,
    ) -> Result<RegionId, InlineDiffError> {
        let line_count = self
            .documents
            .get(key)
            .ok_or_else(|| InlineDiffError::UnknownDocument(key.clone()))?
            .line_count();
        validate_range(range, line_count)?;

        let region_id = self
            .store
            .create_region(
                key.clone(),
                range,
                RegionKind::PendingInstruction {
                    instruction: instruction.into(),
                },
            )
            .map_err(|err| match err {
                crate::store::StoreError::RegionOverlap { existing } => {
                    InlineDiffError::RegionOverlap { existing }
                }
                crate::store::StoreError::UnknownRegion(id) => InlineDiffError::UnknownRegion(id),
            })?;

        self.emit(InlineDiffEvent::RegionsChanged {
            document: key.clone(),
        });
        Ok(region_id)
    }

    // ── streaming ───────────────────────────────────────────────────────

    /// Begin a streaming edit. Snapshots the document, claims the target
    /// range as a streaming-edit region, and opens the transaction that the
    /// whole stream will resolve into one undo entry.
    pub fn start_applying(&mut self, opts: ApplyOptions) -> Result<RegionId, InlineDiffError> {
        let key = opts.document;
        let (text, line_count) = {
            let doc = self
                .documents
                .get(&key)
                .ok_or_else(|| InlineDiffError::UnknownDocument(key.clone()))?;
            (doc.read_text(), doc.line_count())
        };

        let (range, superseded) = match opts.target {
            ApplyTarget::Lines(range) => {
                validate_range(range, line_count)?;
                (range, None)
            }
            ApplyTarget::WholeDocument => (LineRange::new(1, line_count), None),
            ApplyTarget::Instruction(id) => {
                let region = self
                    .store
                    .region(id)
                    .filter(|r| r.document == key && !r.is_streaming_edit())
                    .ok_or(InlineDiffError::UnknownRegion(id))?;
                (region.range, Some(id))
            }
        };

        if let Some(existing) = self.store.find_overlap(&key, range, superseded) {
            return Err(InlineDiffError::RegionOverlap { existing });
        }
        if self.open_transactions.contains_key(&key) {
            return Err(InlineDiffError::EditInFlight(key));
        }

        // The snapshot predates region creation, so interrupting the stream
        // rolls the region itself back out of existence.
        let snapshot = self.take_snapshot(&key, &text);
        self.open_transactions.insert(key.clone(), snapshot);

        if let Some(id) = superseded {
            self.store.delete_region(id);
        }

        let original_code = slice_lines(&text, range);
        let region_id = self
            .store
            .create_region(
                key.clone(),
                range,
                RegionKind::StreamingEdit {
                    original_code,
                    stream: StreamState::Streaming {
                        sweep_line: range.start,
                    },
                },
            )
            .expect("overlap checked above");

        if let Some(handle) = opts.abort {
            self.abort_handles.insert(region_id, handle);
        }

        info!(document = %key, %region_id, start = range.start, end = range.end, "streaming edit started");
        self.emit(InlineDiffEvent::RegionsChanged {
            document: key.clone(),
        });
        self.emit(InlineDiffEvent::StreamStateChanged {
            document: key,
            region: region_id,
            streaming: true,
        });
        Ok(region_id)
    }

    /// Feed the next chunk of a stream: the *full* text produced so far.
    /// Re-diffs against the region's baseline, materializes the safe prefix
    /// into the document, and republishes the region's diff set (minus the
    /// still-churning trailing block). No-op if the region is gone or idle.
    pub fn on_stream_chunk(&mut self, region_id: RegionId, text_so_far: &str) {
        let Some(region) = self.store.region(region_id) else {
            return;
        };
        if !region.is_streaming() {
            return;
        }
        let key = region.document.clone();
        let range = region.range;
        let original = region
            .original_code()
            .expect("streaming regions carry a baseline")
            .to_string();

        let diffs = compute_line_diffs(&original, text_so_far);
        let bounds = sweep_boundaries(&diffs);
        let (write_text, confirmed) = safe_prefix(&original, text_so_far, bounds);

        if !self.guarded_write(&key, range, Some(&write_text), Some(region_id)) {
            return;
        }

        let new_end = range.start + text_height(&write_text) - 1;
        self.store
            .resize_region(region_id, LineRange::new(range.start, new_end));

        let sweep_line = range.start + confirmed;
        if let Some(region) = self.store.region_mut(region_id) {
            if let RegionKind::StreamingEdit { stream, .. } = &mut region.kind {
                *stream = StreamState::Streaming { sweep_line };
            }
        }

        // The trailing block is the not-yet-finalized tail; hold it back.
        let publish = if diffs.is_empty() {
            &diffs[..]
        } else {
            &diffs[..diffs.len() - 1]
        };
        let _ = self.store.replace_region_diffs(region_id, publish);

        debug!(%region_id, confirmed, published = publish.len(), "stream chunk");
        self.emit(InlineDiffEvent::DiffsChanged {
            document: key.clone(),
            region: region_id,
        });
        self.emit(InlineDiffEvent::StreamProgress {
            document: key,
            region: region_id,
            sweep_line,
        });
    }

    /// Close a stream successfully: write the final text in one shot, run
    /// the definitive diff pass, mark the region idle, and finish the
    /// transaction. A region left with zero diffs (the stream reproduced its
    /// baseline) is deleted.
    pub fn on_stream_end(&mut self, region_id: RegionId, final_text: &str) {
        let Some(region) = self.store.region(region_id) else {
            return;
        };
        if !region.is_streaming_edit() {
            return;
        }
        let key = region.document.clone();
        let range = region.range;
        let original = region
            .original_code()
            .expect("streaming regions carry a baseline")
            .to_string();

        let block = as_line_block(final_text);
        if !self.guarded_write(&key, range, Some(block), Some(region_id)) {
            return;
        }
        let new_end = range.start + text_height(block) - 1;
        self.store
            .resize_region(region_id, LineRange::new(range.start, new_end));

        let diffs = compute_line_diffs(&original, final_text);
        let _ = self.store.replace_region_diffs(region_id, &diffs);

        if let Some(region) = self.store.region_mut(region_id) {
            if let RegionKind::StreamingEdit { stream, .. } = &mut region.kind {
                *stream = StreamState::Idle;
            }
        }
        self.abort_handles.remove(&region_id);

        info!(document = %key, %region_id, diffs = diffs.len(), "streaming edit finished");
        self.emit(InlineDiffEvent::StreamStateChanged {
            document: key.clone(),
            region: region_id,
            streaming: false,
        });
        self.emit(InlineDiffEvent::DiffsChanged {
            document: key.clone(),
            region: region_id,
        });

        if diffs.is_empty() {
            self.store.delete_region(region_id);
            self.emit(InlineDiffEvent::RegionsChanged {
                document: key.clone(),
            });
        }

        self.finish_transaction(&key);
    }

    /// Record a stream failure. The region goes idle, the last safely
    /// written content stays in the document, and the transaction is left
    /// open so the caller can decide between
    /// [`keep_partial_edit`](Self::keep_partial_edit) and
    /// [`discard_partial_edit`](Self::discard_partial_edit). Not retried.
    pub fn on_stream_error(&mut self, region_id: RegionId, message: &str) {
        let Some(region) = self.store.region_mut(region_id) else {
            return;
        };
        let key = region.document.clone();
        if let RegionKind::StreamingEdit { stream, .. } = &mut region.kind {
            *stream = StreamState::Idle;
        }
        self.abort_handles.remove(&region_id);

        warn!(document = %key, %region_id, message, "stream failed");
        self.emit(InlineDiffEvent::StreamStateChanged {
            document: key.clone(),
            region: region_id,
            streaming: false,
        });
        self.emit(InlineDiffEvent::StreamFailed {
            document: key,
            region: region_id,
            message: message.to_string(),
        });
    }

    /// Cancel an in-flight stream: abort the LLM request, force the region
    /// idle, and roll the document and regions back to the pre-stream
    /// snapshot. No-op if the region no longer exists.
    pub fn interrupt_streaming(&mut self, region_id: RegionId) {
        if let Some(mut handle) = self.abort_handles.remove(&region_id) {
            handle.abort();
        }
        let Some(region) = self.store.region_mut(region_id) else {
            return;
        };
        let key = region.document.clone();
        if let RegionKind::StreamingEdit { stream, .. } = &mut region.kind {
            *stream = StreamState::Idle;
        }

        info!(document = %key, %region_id, "streaming edit interrupted");
        self.discard_partial_edit(&key);
    }

    /// Keep the partial content a failed stream left behind, closing its
    /// transaction into one undo entry. Returns whether a transaction was
    /// open.
    pub fn keep_partial_edit(&mut self, key: &DocumentKey) -> bool {
        if !self.open_transactions.contains_key(key) {
            return false;
        }
        self.finish_transaction(key);
        true
    }

    /// Throw away the partial content of an interrupted or failed stream,
    /// restoring the pre-stream snapshot. The aborted transaction leaves no
    /// undo entry. Returns whether a transaction was open.
    pub fn discard_partial_edit(&mut self, key: &DocumentKey) -> bool {
        let Some(before) = self.open_transactions.remove(key) else {
            return false;
        };
        self.restore_snapshot(&before);
        true
    }

    // ── accept / reject ─────────────────────────────────────────────────

    /// Fold a diff's new content into its region's baseline and remove it.
    /// The document text is untouched — the live text *is* the accepted
    /// text; only the baseline catches up, which is what makes the diff
    /// disappear. Regions left without diffs are deleted.
    ///
    /// Returns `false` (a benign no-op) if the diff or region is gone, the
    /// region is actively streaming, or the document has an open
    /// transaction.
    pub fn accept_diff(&mut self, diff_id: DiffId) -> bool {
        self.resolve_diff(diff_id, ResolveBehavior::Accept)
    }

    /// Revert the document text of a diff back to its original content and
    /// remove it. The baseline is untouched — rejection never advances it.
    /// Regions left without diffs are deleted.
    ///
    /// Returns `false` under the same benign conditions as
    /// [`accept_diff`](Self::accept_diff).
    pub fn reject_diff(&mut self, diff_id: DiffId) -> bool {
        self.resolve_diff(diff_id, ResolveBehavior::Reject)
    }

    fn resolve_diff(&mut self, diff_id: DiffId, behavior: ResolveBehavior) -> bool {
        let Some(key) = self.diff_document(diff_id) else {
            return false;
        };
        if self.open_transactions.contains_key(&key) {
            return false;
        }

        let snapshot = self.snapshot_now(&key);
        self.open_transactions.insert(key.clone(), snapshot);

        let resolved = match behavior {
            ResolveBehavior::Accept => self.accept_diff_inner(diff_id),
            ResolveBehavior::Reject => self.reject_diff_inner(diff_id),
        };

        if resolved {
            info!(document = %key, %diff_id, ?behavior, "diff resolved");
            self.finish_transaction(&key);
        } else {
            self.open_transactions.remove(&key);
        }
        resolved
    }

    /// Resolve every diff of a document the same way, inside one
    /// transaction (one undo entry for the whole sweep). Returns the number
    /// of diffs resolved.
    pub fn accept_or_reject_all_in_document(
        &mut self,
        key: &DocumentKey,
        behavior: ResolveBehavior,
    ) -> usize {
        if self.open_transactions.contains_key(key) {
            return 0;
        }
        let initial = self.store.diff_ids_for_document(key).len();
        if initial == 0 {
            return 0;
        }

        let snapshot = self.snapshot_now(key);
        self.open_transactions.insert(key.clone(), snapshot);

        let mut resolved = 0;
        // Diff ids are reallocated by each re-derivation, so resolve the
        // current first diff repeatedly instead of iterating a stale list.
        let mut attempts_left = initial * 4 + 16;
        while let Some(first) = self.store.diff_ids_for_document(key).first().copied() {
            let done = match behavior {
                ResolveBehavior::Accept => self.accept_diff_inner(first),
                ResolveBehavior::Reject => self.reject_diff_inner(first),
            };
            if !done {
                break;
            }
            resolved += 1;
            attempts_left -= 1;
            if attempts_left == 0 {
                warn!(document = %key, "bulk resolve did not converge");
                break;
            }
        }

        if resolved > 0 {
            info!(document = %key, resolved, ?behavior, "bulk resolve finished");
            self.finish_transaction(key);
        } else {
            self.open_transactions.remove(key);
        }
        resolved
    }

    fn accept_diff_inner(&mut self, diff_id: DiffId) -> bool {
        let Some(diff) = self.store.diff(diff_id).cloned() else {
            return false;
        };
        let Some(region) = self.store.region(diff.region_id) else {
            return false;
        };
        if !region.is_streaming_edit() || region.is_streaming() {
            return false;
        }
        let key = region.document.clone();
        let region_id = region.id;
        let original = region.original_code().unwrap_or_default().to_string();

        // Advance the baseline so it matches the live text over this block.
        let mut lines: Vec<String> = crate::document::split_lines(&original)
            .into_iter()
            .map(str::to_string)
            .collect();
        let start = diff.original_range.start.saturating_sub(1).min(lines.len());
        let end = diff.original_range.end.min(lines.len()).max(start);
        match diff.kind {
            crate::differ::DiffKind::Deletion => {
                lines.drain(start..end);
            }
            crate::differ::DiffKind::Insertion => {
                for (i, line) in crate::document::split_lines(&diff.code).iter().enumerate() {
                    lines.insert(start + i, (*line).to_string());
                }
            }
            crate::differ::DiffKind::Edit => {
                let replacement: Vec<String> = crate::document::split_lines(&diff.code)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                lines.splice(start..end, replacement);
            }
        }
        let new_original = lines.join("\n");

        if let Some(region) = self.store.region_mut(region_id) {
            if let RegionKind::StreamingEdit { original_code, .. } = &mut region.kind {
                *original_code = new_original;
            }
        }
        self.store.delete_diff(diff_id);
        self.rederive_region_diffs(region_id);
        self.drop_region_if_resolved(region_id, &key);
        true
    }

    fn reject_diff_inner(&mut self, diff_id: DiffId) -> bool {
        let Some(diff) = self.store.diff(diff_id).cloned() else {
            return false;
        };
        let Some(region) = self.store.region(diff.region_id) else {
            return false;
        };
        if !region.is_streaming_edit() || region.is_streaming() {
            return false;
        }
        let key = region.document.clone();
        let region_id = region.id;

        // Remove the record first; the write below re-derives the survivors.
        self.store.delete_diff(diff_id);

        let written = match diff.kind {
            crate::differ::DiffKind::Deletion => {
                // Re-insert the deleted lines at the deletion point. A point
                // past the document end becomes an append, which the buffer
                // realizes by supplying the separating newline itself.
                let line_count = self
                    .documents
                    .get(&key)
                    .map(|doc| doc.line_count())
                    .unwrap_or(0);
                let at = diff.range.start.min(line_count + 1);
                self.guarded_write(
                    &key,
                    LineRange::empty_at(at),
                    Some(&diff.original_code),
                    None,
                )
            }
            crate::differ::DiffKind::Insertion => self.guarded_write(&key, diff.range, None, None),
            crate::differ::DiffKind::Edit => {
                self.guarded_write(&key, diff.range, Some(&diff.original_code), None)
            }
        };
        if !written {
            return false;
        }

        self.drop_region_if_resolved(region_id, &key);
        true
    }

    fn drop_region_if_resolved(&mut self, region_id: RegionId, key: &DocumentKey) {
        match self.store.region(region_id) {
            // Already pruned (e.g. a rejected insertion emptied the region).
            None => {}
            Some(region) if region.diff_ids.is_empty() => {
                self.store.delete_region(region_id);
                self.abort_handles.remove(&region_id);
                self.emit(InlineDiffEvent::RegionsChanged {
                    document: key.clone(),
                });
            }
            Some(_) => {
                self.emit(InlineDiffEvent::DiffsChanged {
                    document: key.clone(),
                    region: region_id,
                });
            }
        }
    }

    // ── history ─────────────────────────────────────────────────────────

    /// Whether the document has an entry to undo.
    pub fn can_undo(&self, key: &DocumentKey) -> bool {
        self.history.get(key).is_some_and(HistoryStack::can_undo)
    }

    /// Whether the document has an entry to redo.
    pub fn can_redo(&self, key: &DocumentKey) -> bool {
        self.history.get(key).is_some_and(HistoryStack::can_redo)
    }

    /// Undo the latest finished transaction on a document, restoring its
    /// before-snapshot. Refused while a transaction is open.
    pub fn undo(&mut self, key: &DocumentKey) -> bool {
        if self.open_transactions.contains_key(key) {
            return false;
        }
        let snapshot = {
            let Some(stack) = self.history.get_mut(key) else {
                return false;
            };
            let Some(entry) = stack.pop_undo() else {
                return false;
            };
            entry.before.clone()
        };
        self.restore_snapshot(&snapshot);
        true
    }

    /// Redo the latest undone transaction, restoring its after-snapshot.
    pub fn redo(&mut self, key: &DocumentKey) -> bool {
        if self.open_transactions.contains_key(key) {
            return false;
        }
        let snapshot = {
            let Some(stack) = self.history.get_mut(key) else {
                return false;
            };
            let Some(entry) = stack.pop_redo() else {
                return false;
            };
            entry.after.clone()
        };
        self.restore_snapshot(&snapshot);
        true
    }

    fn diff_document(&self, diff_id: DiffId) -> Option<DocumentKey> {
        let diff = self.store.diff(diff_id)?;
        let region = self.store.region(diff.region_id)?;
        Some(region.document.clone())
    }

    fn take_snapshot(&self, key: &DocumentKey, text: &str) -> HistorySnapshot {
        HistorySnapshot {
            document: key.clone(),
            regions: self
                .store
                .regions_for(key)
                .into_iter()
                .map(RegionSnapshot::of)
                .collect(),
            text: text.to_string(),
        }
    }

    fn snapshot_now(&self, key: &DocumentKey) -> HistorySnapshot {
        let text = self.document_text(key).unwrap_or_default();
        self.take_snapshot(key, &text)
    }

    fn finish_transaction(&mut self, key: &DocumentKey) {
        let Some(before) = self.open_transactions.remove(key) else {
            return;
        };
        let after = self.snapshot_now(key);
        self.history
            .entry(key.clone())
            .or_default()
            .push(HistoryEntry { before, after });
    }

    /// Replay a snapshot: drop the document's region/diff state, overwrite
    /// the full text through the guard, rebuild the region records, and
    /// re-run the differ per streaming region to repopulate diffs.
    fn restore_snapshot(&mut self, snapshot: &HistorySnapshot) {
        let key = snapshot.document.clone();
        for region_id in self.store.region_ids_for(&key) {
            self.abort_handles.remove(&region_id);
        }
        self.store.clear_document(&key);

        let writable = self
            .documents
            .get(&key)
            .map(|doc| (!doc.is_disposed(), doc.line_count()));
        if let Some((true, line_count)) = writable {
            self.writing.insert(key.clone());
            if let Some(doc) = self.documents.get_mut(&key) {
                doc.replace_lines(LineRange::new(1, line_count), as_line_block(&snapshot.text));
            }
            self.writing.remove(&key);
        }

        let mut restored_regions = Vec::new();
        for region_snapshot in snapshot.regions.clone() {
            let region = region_snapshot.into_region(key.clone());
            restored_regions.push(region.id);
            self.store.restore_region(region);
        }
        for region_id in restored_regions {
            self.rederive_region_diffs(region_id);
            self.emit(InlineDiffEvent::DiffsChanged {
                document: key.clone(),
                region: region_id,
            });
        }
        self.emit(InlineDiffEvent::RegionsChanged { document: key });
    }

    // ── internals ───────────────────────────────────────────────────────

    /// Write into a document on the engine's behalf. Sets the write guard
    /// for the whole synchronous extent (including the realignment the write
    /// triggers), skips realignment for `skip` (the region whose bounds the
    /// caller manages directly), and silently drops writes to disposed or
    /// detached documents.
    fn guarded_write(
        &mut self,
        key: &DocumentKey,
        range: LineRange,
        text: Option<&str>,
        skip: Option<RegionId>,
    ) -> bool {
        match self.documents.get(key) {
            Some(doc) if !doc.is_disposed() => {}
            _ => return false,
        }

        let edit = match text {
            None => DocumentEdit::removal(range),
            Some(t) if range.is_empty() => DocumentEdit::insertion(range.start, t),
            Some(t) => DocumentEdit::replacement(range, t),
        };

        self.writing.insert(key.clone());
        if let Some(doc) = self.documents.get_mut(key) {
            match text {
                Some(t) => doc.replace_lines(range, t),
                None => doc.remove_lines(range),
            }
        }
        self.apply_realignment(key, &edit, skip);
        self.writing.remove(key);
        true
    }

    /// Realign every region of `key` for `edit`, re-derive diffs of idle
    /// regions whose interior was touched, and prune regions that collapsed
    /// to nothing.
    fn apply_realignment(&mut self, key: &DocumentKey, edit: &DocumentEdit, skip: Option<RegionId>) {
        let mut stale = Vec::new();
        let mut changed = false;

        for region_id in self.store.region_ids_for(key) {
            if Some(region_id) == skip {
                continue;
            }
            let Some(region) = self.store.region(region_id) else {
                continue;
            };
            let range_before = region.range;
            let actively_streaming = region.is_streaming();
            let (new_range, impact) = realign_range(range_before, edit);
            match impact {
                RegionImpact::Untouched => {}
                RegionImpact::Shifted(delta) => {
                    self.store.shift_region(region_id, delta);
                    changed = true;
                }
                RegionImpact::Interior => {
                    self.store.resize_region(region_id, new_range);
                    changed = true;
                    if !actively_streaming {
                        stale.push(region_id);
                    }
                }
            }
        }

        for region_id in self.store.region_ids_for(key) {
            let collapsed = self
                .store
                .region(region_id)
                .is_some_and(|region| region.range.is_empty());
            if collapsed {
                self.store.delete_region(region_id);
                self.abort_handles.remove(&region_id);
                stale.retain(|id| *id != region_id);
                changed = true;
            }
        }

        for region_id in &stale {
            self.rederive_region_diffs(*region_id);
            self.emit(InlineDiffEvent::DiffsChanged {
                document: key.clone(),
                region: *region_id,
            });
        }
        if changed {
            self.emit(InlineDiffEvent::RegionsChanged {
                document: key.clone(),
            });
        }
    }

    /// Recompute a region's diff set from its baseline and the current
    /// document text. Skipped for actively streaming regions (the chunk
    /// pipeline owns their diffs) and pending-instruction regions.
    fn rederive_region_diffs(&mut self, region_id: RegionId) {
        let Some(region) = self.store.region(region_id) else {
            return;
        };
        if !region.is_streaming_edit() || region.is_streaming() {
            return;
        }
        let key = region.document.clone();
        let range = region.range;
        let Some(original) = region.original_code().map(str::to_string) else {
            return;
        };
        let Some(text) = self.document_text(&key) else {
            return;
        };
        let current = slice_lines(&text, range);
        let diffs = compute_line_diffs(&original, &current);
        let _ = self.store.replace_region_diffs(region_id, &diffs);
    }

    fn emit(&mut self, event: InlineDiffEvent) {
        for callback in &mut self.callbacks {
            callback(&event);
        }
    }
}

fn validate_range(range: LineRange, line_count: usize) -> Result<(), InlineDiffError> {
    if range.start == 0 || range.is_empty() || range.end > line_count {
        return Err(InlineDiffError::InvalidRange {
            start: range.start,
            end: range.end,
            line_count,
        });
    }
    Ok(())
}
