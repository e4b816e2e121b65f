//! Change notifications for the presentation layer.
//!
//! The engine fires an [`InlineDiffEvent`] through every subscribed callback
//! whenever regions or diffs change, so the host can redraw decorations
//! without the engine knowing anything about rendering.

use crate::region::{DocumentKey, RegionId};

/// A change to engine state that the presentation layer may need to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineDiffEvent {
    /// Regions were added, removed, or resized on a document.
    RegionsChanged {
        /// The affected document.
        document: DocumentKey,
    },
    /// A region's diff set changed.
    DiffsChanged {
        /// The affected document.
        document: DocumentKey,
        /// The region whose diffs changed.
        region: RegionId,
    },
    /// A streaming write advanced; redraw the progress indicator.
    StreamProgress {
        /// The affected document.
        document: DocumentKey,
        /// The streaming region.
        region: RegionId,
        /// Last document line confirmed by the stream.
        sweep_line: usize,
    },
    /// A region started or stopped streaming.
    StreamStateChanged {
        /// The affected document.
        document: DocumentKey,
        /// The region whose stream state flipped.
        region: RegionId,
        /// Whether the region is now streaming.
        streaming: bool,
    },
    /// The stream source reported a failure; partial content is kept until
    /// the caller resolves it.
    StreamFailed {
        /// The affected document.
        document: DocumentKey,
        /// The region whose stream failed.
        region: RegionId,
        /// Host-facing error description.
        message: String,
    },
}

/// Subscriber callback type.
pub type EventCallback = Box<dyn FnMut(&InlineDiffEvent) + Send>;
