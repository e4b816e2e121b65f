#![warn(missing_docs)]
//! Inline Diff - Streaming AI Edit Engine
//!
//! # Overview
//!
//! `inline-diff` is the headless core of an AI-assisted editor's inline
//! editing feature. It consumes a stream of incrementally-arriving text (an
//! LLM rewriting a region of a document), computes a line-level diff against
//! the region's original content in real time, projects that diff onto live
//! editor state as the stream progresses, and exposes a transactional
//! accept/reject protocol once the stream settles.
//!
//! It does not render anything and it does not talk to any model provider:
//! the host supplies the text stream and draws the decorations; this crate
//! guarantees that the visible document and the diff bookkeeping never
//! desynchronize — under streaming writes, concurrent user edits, undo/redo,
//! and mid-stream cancellation.
//!
//! # Core Features
//!
//! - **Line Differ**: deterministic LCS-based change blocks (insertion /
//!   deletion / edit) with old- and new-coordinate ranges
//! - **Region Tracking**: non-overlapping line regions per document,
//!   realigned on every edit
//! - **Streaming Writes**: flicker-free materialization of partial LLM
//!   output behind a safe-prefix frontier, with a live sweep line
//! - **Transactions**: one undo/redo entry per logical AI action, restored
//!   from immutable snapshots
//! - **Accept/Reject**: per-diff and whole-document resolution that advances
//!   the baseline (accept) or reverts the text (reject)
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  InlineDiffManager (facade + write guard)   │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  History (snapshots, undo/redo entries)     │  ← Transactions
//! ├─────────────────────────────────────────────┤
//! │  Region Store (regions, diffs, id pools)    │  ← Bookkeeping
//! ├─────────────────────────────────────────────┤
//! │  Realigner & Stream frontier                │  ← Coordinate logic
//! ├─────────────────────────────────────────────┤
//! │  Line Differ (LCS change blocks)            │  ← Pure computation
//! ├─────────────────────────────────────────────┤
//! │  DocumentBuffer (host text, rope-backed)    │  ← Text access
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use inline_diff::{
//!     ApplyOptions, ApplyTarget, DiffKind, DocumentKey, InlineDiffManager, LineRange,
//!     RopeDocument,
//! };
//!
//! let mut manager = InlineDiffManager::new();
//! let key = DocumentKey::new("file:///main.rs");
//! manager.attach_document(key.clone(), Box::new(RopeDocument::new("one\ntwo\nthree\n")));
//!
//! // An LLM starts rewriting lines 1..=3.
//! let region = manager
//!     .start_applying(ApplyOptions {
//!         document: key.clone(),
//!         target: ApplyTarget::Lines(LineRange::new(1, 3)),
//!         abort: None,
//!     })
//!     .unwrap();
//!
//! // Chunks arrive as the full text so far; the final message closes it.
//! manager.on_stream_chunk(region, "one\nTWO");
//! manager.on_stream_end(region, "one\nTWO\nthree");
//!
//! // One edit diff is now pending review.
//! let views = manager.region_views(&key);
//! assert_eq!(views[0].diffs.len(), 1);
//! assert_eq!(views[0].diffs[0].kind, DiffKind::Edit);
//!
//! // Accepting folds the new text into the baseline; the region dissolves.
//! let diff_id = views[0].diffs[0].id;
//! assert!(manager.accept_diff(diff_id));
//! assert!(manager.region_views(&key).is_empty());
//! assert_eq!(manager.document_text(&key).unwrap(), "one\nTWO\nthree\n");
//! ```
//!
//! # Module Description
//!
//! - [`differ`] - line-level diff computation
//! - [`region`] - regions, diffs, ids, and presentation views
//! - [`store`] - region/diff registries and id pools
//! - [`realign`] - region realignment under document edits
//! - [`document`] - the host text buffer boundary
//! - [`stream`] - the stream-source boundary and safe-prefix frontier
//! - [`history`] - transaction snapshots and undo/redo stacks
//! - [`events`] - change notifications for the presentation layer
//! - [`manager`] - the engine facade
//!
//! # Concurrency Model
//!
//! The engine is single-threaded and purely reactive: every operation is
//! synchronous CPU work driven by host callbacks (document edits, stream
//! chunks, user commands). Stream chunks per region must arrive in
//! monotonically growing order and edit notifications in application order;
//! both are the natural guarantees of an editor event loop.

pub mod differ;
pub mod document;
pub mod events;
pub mod history;
pub mod manager;
pub mod realign;
pub mod region;
pub mod store;
pub mod stream;

pub use differ::{compute_line_diffs, ComputedDiff, DiffKind};
pub use document::{DocumentBuffer, RopeDocument};
pub use events::{EventCallback, InlineDiffEvent};
pub use history::{HistoryEntry, HistorySnapshot, RegionSnapshot};
pub use manager::{
    ApplyOptions, ApplyTarget, InlineDiffError, InlineDiffManager, ResolveBehavior,
};
pub use realign::{realign_range, text_height, DocumentEdit, RegionImpact};
pub use region::{
    Diff, DiffId, DiffRegion, DiffView, DocumentKey, LineRange, RegionId, RegionKind, RegionView,
    RegionViewKind, StreamState,
};
pub use store::{RegionStore, StoreError};
pub use stream::{
    safe_prefix, sweep_boundaries, NoopAbortHandle, StreamAbortHandle, SweepBoundaries,
};
