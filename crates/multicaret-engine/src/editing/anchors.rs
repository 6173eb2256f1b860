use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xi_rope::Rope;

use crate::editing::operation::{Operation, StickyBias};

/// Unique identifier for an anchor
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    pub fn new() -> Self {
        AnchorId(Uuid::new_v4())
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a range marker
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct RangeMarkerId(pub Uuid);

impl RangeMarkerId {
    pub fn new() -> Self {
        RangeMarkerId(Uuid::new_v4())
    }
}

impl Default for RangeMarkerId {
    fn default() -> Self {
        Self::new()
    }
}

/// How long a tracked position lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorLifetime {
    /// Dropped when the enclosing command (or transient editor) finishes
    Mutation,
    /// Lives as long as the document
    Document,
}

/// A tracked point that follows its logical position through edits
#[derive(Clone, Debug, PartialEq)]
pub struct Anchor {
    pub offset: usize,
    pub lifetime: AnchorLifetime,
    pub sticky: StickyBias,
}

/// A tracked interval; insertions at either boundary stay outside it
#[derive(Clone, Debug, PartialEq)]
pub struct RangeMarker {
    pub range: Range<usize>,
    pub lifetime: AnchorLifetime,
}

/// Upserts and removals delivered to an `AnchorStorage` in one call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnchorBatch {
    pub anchors: Vec<(AnchorId, Anchor)>,
    pub markers: Vec<(RangeMarkerId, RangeMarker)>,
    pub removed_anchors: Vec<AnchorId>,
    pub removed_markers: Vec<RangeMarkerId>,
}

impl AnchorBatch {
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
            && self.markers.is_empty()
            && self.removed_anchors.is_empty()
            && self.removed_markers.is_empty()
    }

    pub fn extend(&mut self, other: AnchorBatch) {
        self.anchors.extend(other.anchors);
        self.markers.extend(other.markers);
        self.removed_anchors.extend(other.removed_anchors);
        self.removed_markers.extend(other.removed_markers);
    }
}

/// Point anchors and range markers, rebased on every edit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnchorStorage {
    anchors: HashMap<AnchorId, Anchor>,
    markers: HashMap<RangeMarkerId, RangeMarker>,
}

impl AnchorStorage {
    pub fn create_anchor(
        &mut self,
        offset: usize,
        lifetime: AnchorLifetime,
        sticky: StickyBias,
    ) -> AnchorId {
        let id = AnchorId::new();
        self.anchors.insert(
            id,
            Anchor {
                offset,
                lifetime,
                sticky,
            },
        );
        id
    }

    pub fn remove_anchor(&mut self, id: AnchorId) -> bool {
        self.anchors.remove(&id).is_some()
    }

    /// `None` for unknown (or already removed) ids; anchors may always be stale
    pub fn resolve_anchor(&self, id: AnchorId) -> Option<usize> {
        self.anchors.get(&id).map(|anchor| anchor.offset)
    }

    pub fn anchor(&self, id: AnchorId) -> Option<&Anchor> {
        self.anchors.get(&id)
    }

    pub fn create_range_marker(
        &mut self,
        range: Range<usize>,
        lifetime: AnchorLifetime,
    ) -> RangeMarkerId {
        let id = RangeMarkerId::new();
        self.markers.insert(id, RangeMarker { range, lifetime });
        id
    }

    pub fn remove_range_marker(&mut self, id: RangeMarkerId) -> bool {
        self.markers.remove(&id).is_some()
    }

    pub fn resolve_range_marker(&self, id: RangeMarkerId) -> Option<Range<usize>> {
        self.markers.get(&id).map(|marker| marker.range.clone())
    }

    pub fn range_marker(&self, id: RangeMarkerId) -> Option<&RangeMarker> {
        self.markers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.anchors.len() + self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty() && self.markers.is_empty()
    }

    /// Storage state after `op` turned `before` into `after`
    pub fn edit(&self, before: &Rope, after: &Rope, op: &Operation) -> Self {
        debug_assert_eq!(
            op.map_offset(before.len(), StickyBias::Right),
            after.len(),
            "operation does not span the edited text"
        );
        self.rebased(op, after.len())
    }

    /// Rebase every entry through `op` without looking at text
    pub(crate) fn rebased(&self, op: &Operation, len: usize) -> Self {
        if op.is_identity() {
            return self.clone();
        }

        let anchors = self
            .anchors
            .iter()
            .map(|(id, anchor)| {
                let offset = op.map_offset(anchor.offset, anchor.sticky).min(len);
                (*id, Anchor { offset, ..anchor.clone() })
            })
            .collect();

        let markers = self
            .markers
            .iter()
            .map(|(id, marker)| {
                // Start moves past insertions at the boundary, end stays before them
                let end = op.map_offset(marker.range.end, StickyBias::Left).min(len);
                let start = op
                    .map_offset(marker.range.start, StickyBias::Right)
                    .min(end);
                (
                    *id,
                    RangeMarker {
                        range: start..end,
                        lifetime: marker.lifetime,
                    },
                )
            })
            .collect();

        Self { anchors, markers }
    }

    /// Apply all upserts, then all removals
    pub fn batch_update(&mut self, batch: AnchorBatch) {
        self.anchors.extend(batch.anchors);
        self.markers.extend(batch.markers);
        for id in batch.removed_anchors {
            self.anchors.remove(&id);
        }
        for id in batch.removed_markers {
            self.markers.remove(&id);
        }
    }

    /// Every entry with the given lifetime, as upserts
    pub fn export(&self, lifetime: AnchorLifetime) -> AnchorBatch {
        AnchorBatch {
            anchors: self
                .anchors
                .iter()
                .filter(|(_, anchor)| anchor.lifetime == lifetime)
                .map(|(id, anchor)| (*id, anchor.clone()))
                .collect(),
            markers: self
                .markers
                .iter()
                .filter(|(_, marker)| marker.lifetime == lifetime)
                .map(|(id, marker)| (*id, marker.clone()))
                .collect(),
            ..AnchorBatch::default()
        }
    }

    pub fn drop_lifetime(&mut self, lifetime: AnchorLifetime) {
        self.anchors.retain(|_, anchor| anchor.lifetime != lifetime);
        self.markers.retain(|_, marker| marker.lifetime != lifetime);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn edit(storage: &AnchorStorage, text: &str, op: &Operation) -> AnchorStorage {
        let before = Rope::from(text);
        let after = op.apply(&before).unwrap();
        storage.edit(&before, &after, op)
    }

    #[rstest]
    #[case::left_stays_before_insert(StickyBias::Left, 4)]
    #[case::right_moves_past_insert(StickyBias::Right, 7)]
    fn test_anchor_sticky_bias_at_insertion(#[case] sticky: StickyBias, #[case] expected: usize) {
        let mut storage = AnchorStorage::default();
        let id = storage.create_anchor(4, AnchorLifetime::Document, sticky);

        let storage = edit(&storage, "abcdefgh", &Operation::insert(4, "XYZ"));

        assert_eq!(storage.resolve_anchor(id), Some(expected));
    }

    #[test]
    fn test_anchor_inside_deletion_collapses_to_start() {
        let mut storage = AnchorStorage::default();
        let id = storage.create_anchor(5, AnchorLifetime::Document, StickyBias::Right);

        let storage = edit(&storage, "abcdefgh", &Operation::delete(3, "def"));

        assert_eq!(storage.resolve_anchor(id), Some(3));
    }

    #[test]
    fn test_range_marker_does_not_grow_at_boundaries() {
        let mut storage = AnchorStorage::default();
        let id = storage.create_range_marker(2..5, AnchorLifetime::Document);

        let op = Operation::insert(2, "<").compose(&Operation::insert(6, ">"))
            .unwrap();
        let storage = edit(&storage, "abcdefgh", &op);

        assert_eq!(storage.resolve_range_marker(id), Some(3..6));
    }

    #[test]
    fn test_range_marker_collapses_when_deleted() {
        let mut storage = AnchorStorage::default();
        let id = storage.create_range_marker(3..5, AnchorLifetime::Document);

        let storage = edit(&storage, "abcdefgh", &Operation::delete(2, "cdef"));

        assert_eq!(storage.resolve_range_marker(id), Some(2..2));
    }

    #[test]
    fn test_unknown_ids_resolve_to_none() {
        let storage = AnchorStorage::default();

        assert_eq!(storage.resolve_anchor(AnchorId::new()), None);
        assert_eq!(storage.resolve_range_marker(RangeMarkerId::new()), None);
    }

    #[test]
    fn test_batch_update_removal_wins() {
        let mut storage = AnchorStorage::default();
        let kept = AnchorId::new();
        let removed = AnchorId::new();
        let anchor = Anchor {
            offset: 1,
            lifetime: AnchorLifetime::Document,
            sticky: StickyBias::Left,
        };

        storage.batch_update(AnchorBatch {
            anchors: vec![(kept, anchor.clone()), (removed, anchor)],
            removed_anchors: vec![removed],
            ..AnchorBatch::default()
        });

        assert_eq!(storage.resolve_anchor(kept), Some(1));
        assert_eq!(storage.resolve_anchor(removed), None);
    }

    #[test]
    fn test_export_and_drop_by_lifetime() {
        let mut storage = AnchorStorage::default();
        let scoped = storage.create_anchor(1, AnchorLifetime::Mutation, StickyBias::Left);
        let durable = storage.create_anchor(2, AnchorLifetime::Document, StickyBias::Left);
        let marker = storage.create_range_marker(0..1, AnchorLifetime::Mutation);

        let exported = storage.export(AnchorLifetime::Document);
        assert_eq!(exported.anchors.len(), 1);
        assert_eq!(exported.anchors[0].0, durable);
        assert!(exported.markers.is_empty());

        storage.drop_lifetime(AnchorLifetime::Mutation);
        assert_eq!(storage.resolve_anchor(scoped), None);
        assert_eq!(storage.resolve_range_marker(marker), None);
        assert_eq!(storage.resolve_anchor(durable), Some(2));
    }
}
