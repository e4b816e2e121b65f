//! Region and diff bookkeeping.
//!
//! [`RegionStore`] owns the registries mapping documents to their active
//! regions and regions to their computed diffs, plus the monotonic id pools.
//! It never touches document text or the presentation layer; every mutation
//! of region/diff state in the engine funnels through its methods, which
//! keeps mutation sites centralized and auditable.
//!
//! Ordered maps are used throughout so iteration order (and therefore views
//! and events) is deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::differ::ComputedDiff;
use crate::region::{Diff, DiffId, DiffRegion, DocumentKey, LineRange, RegionId, RegionKind};

/// Errors reported by [`RegionStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A new region's range intersects an existing region of the same
    /// document. Nothing was mutated.
    #[error("range overlaps existing {existing}")]
    RegionOverlap {
        /// The region already occupying part of the requested range.
        existing: RegionId,
    },
    /// The referenced region does not exist (or no longer exists).
    #[error("unknown {0}")]
    UnknownRegion(RegionId),
}

/// In-memory registry of regions and diffs, keyed by document.
#[derive(Debug, Default)]
pub struct RegionStore {
    regions: BTreeMap<RegionId, DiffRegion>,
    diffs: BTreeMap<DiffId, Diff>,
    by_document: HashMap<DocumentKey, BTreeSet<RegionId>>,
    next_region_id: u64,
    next_diff_id: u64,
}

impl RegionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the first existing region of `document` intersecting `range`,
    /// ignoring `exclude` if given.
    pub fn find_overlap(
        &self,
        document: &DocumentKey,
        range: LineRange,
        exclude: Option<RegionId>,
    ) -> Option<RegionId> {
        let ids = self.by_document.get(document)?;
        ids.iter()
            .filter(|id| Some(**id) != exclude)
            .find(|id| {
                self.regions
                    .get(id)
                    .is_some_and(|r| r.range.intersects(&range))
            })
            .copied()
    }

    /// Register a new region. Fails without mutating anything if `range`
    /// overlaps an existing region of the same document.
    pub fn create_region(
        &mut self,
        document: DocumentKey,
        range: LineRange,
        kind: RegionKind,
    ) -> Result<RegionId, StoreError> {
        if let Some(existing) = self.find_overlap(&document, range, None) {
            return Err(StoreError::RegionOverlap { existing });
        }

        let id = RegionId(self.next_region_id);
        self.next_region_id += 1;

        self.by_document
            .entry(document.clone())
            .or_default()
            .insert(id);
        self.regions.insert(
            id,
            DiffRegion {
                id,
                document,
                range,
                kind,
                diff_ids: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Re-insert a region record restored from a history snapshot, keeping
    /// its original id. The id pool stays monotonic; restored ids are always
    /// below `next_region_id`.
    pub fn restore_region(&mut self, region: DiffRegion) {
        debug_assert!(region.id.0 < self.next_region_id);
        debug_assert!(region.diff_ids.is_empty());
        self.by_document
            .entry(region.document.clone())
            .or_default()
            .insert(region.id);
        self.regions.insert(region.id, region);
    }

    /// Remove a region and all of its diffs. Returns the removed record, or
    /// `None` if the id is unknown.
    pub fn delete_region(&mut self, id: RegionId) -> Option<DiffRegion> {
        let region = self.regions.remove(&id)?;
        for diff_id in &region.diff_ids {
            self.diffs.remove(diff_id);
        }
        if let Some(ids) = self.by_document.get_mut(&region.document) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_document.remove(&region.document);
            }
        }
        Some(region)
    }

    /// Remove every region (and diff) of `document`. Returns the removed
    /// region ids.
    pub fn clear_document(&mut self, document: &DocumentKey) -> Vec<RegionId> {
        let ids: Vec<RegionId> = self
            .by_document
            .get(document)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for id in &ids {
            self.delete_region(*id);
        }
        ids
    }

    /// Shared access to a region.
    pub fn region(&self, id: RegionId) -> Option<&DiffRegion> {
        self.regions.get(&id)
    }

    /// Mutable access to a region.
    pub fn region_mut(&mut self, id: RegionId) -> Option<&mut DiffRegion> {
        self.regions.get_mut(&id)
    }

    /// Shared access to a diff.
    pub fn diff(&self, id: DiffId) -> Option<&Diff> {
        self.diffs.get(&id)
    }

    /// Region ids of `document`, in creation order.
    pub fn region_ids_for(&self, document: &DocumentKey) -> Vec<RegionId> {
        self.by_document
            .get(document)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Regions of `document`, in creation order.
    pub fn regions_for(&self, document: &DocumentKey) -> Vec<&DiffRegion> {
        self.region_ids_for(document)
            .into_iter()
            .filter_map(|id| self.regions.get(&id))
            .collect()
    }

    /// A region's diffs in ascending line order.
    pub fn diffs_of(&self, region_id: RegionId) -> Vec<&Diff> {
        self.regions
            .get(&region_id)
            .map(|region| {
                region
                    .diff_ids
                    .iter()
                    .filter_map(|id| self.diffs.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every diff id of every region of `document`, in region creation order
    /// and ascending line order within a region.
    pub fn diff_ids_for_document(&self, document: &DocumentKey) -> Vec<DiffId> {
        self.region_ids_for(document)
            .into_iter()
            .filter_map(|id| self.regions.get(&id))
            .flat_map(|region| region.diff_ids.iter().copied())
            .collect()
    }

    /// Attach one computed diff block to a region. Document coordinates are
    /// derived from the region's current start line, since the block's
    /// coordinates are relative to the region's text.
    pub fn create_diff(
        &mut self,
        region_id: RegionId,
        computed: &ComputedDiff,
    ) -> Result<DiffId, StoreError> {
        let region = self
            .regions
            .get_mut(&region_id)
            .ok_or(StoreError::UnknownRegion(region_id))?;
        let doc_offset = region.range.start as i64 - 1;

        let id = DiffId(self.next_diff_id);
        self.next_diff_id += 1;

        region.diff_ids.push(id);
        self.diffs.insert(
            id,
            Diff {
                id,
                region_id,
                kind: computed.kind,
                range: LineRange::new(computed.start_line, computed.end_line)
                    .shifted(doc_offset),
                original_range: LineRange::new(
                    computed.original_start_line,
                    computed.original_end_line,
                ),
                original_code: computed.original_code.clone(),
                code: computed.code.clone(),
            },
        );
        Ok(id)
    }

    /// Detach and remove a diff. Returns the removed record, or `None` if the
    /// id is unknown.
    pub fn delete_diff(&mut self, id: DiffId) -> Option<Diff> {
        let diff = self.diffs.remove(&id)?;
        if let Some(region) = self.regions.get_mut(&diff.region_id) {
            region.diff_ids.retain(|d| *d != id);
        }
        Some(diff)
    }

    /// Replace a region's entire diff set in one step (the per-chunk bulk
    /// refresh). Old diffs are removed, new ones allocated fresh ids.
    pub fn replace_region_diffs(
        &mut self,
        region_id: RegionId,
        computed: &[ComputedDiff],
    ) -> Result<(), StoreError> {
        let region = self
            .regions
            .get_mut(&region_id)
            .ok_or(StoreError::UnknownRegion(region_id))?;
        for diff_id in std::mem::take(&mut region.diff_ids) {
            self.diffs.remove(&diff_id);
        }
        for block in computed {
            self.create_diff(region_id, block)?;
        }
        Ok(())
    }

    /// Shift a region's bounds and every contained diff by `delta` lines.
    /// Used when an edit lands entirely above the region; content and ids are
    /// untouched.
    pub fn shift_region(&mut self, region_id: RegionId, delta: i64) {
        let Some(region) = self.regions.get_mut(&region_id) else {
            return;
        };
        region.range = region.range.shifted(delta);
        let diff_ids = region.diff_ids.clone();
        for diff_id in diff_ids {
            if let Some(diff) = self.diffs.get_mut(&diff_id) {
                diff.range = diff.range.shifted(delta);
            }
        }
    }

    /// Set a region's bounds directly (the streaming writer and realigner use
    /// this after computing new bounds).
    pub fn resize_region(&mut self, region_id: RegionId, range: LineRange) {
        if let Some(region) = self.regions.get_mut(&region_id) {
            region.range = range;
        }
    }

    /// Total number of live regions (all documents).
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Total number of live diffs (all documents).
    pub fn diff_count(&self) -> usize {
        self.diffs.len()
    }
}
