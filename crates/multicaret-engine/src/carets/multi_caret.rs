use std::collections::HashMap;

use crate::carets::{Caret, CaretId, CaretMove, CaretPosition};
use crate::editing::operation::{Operation, StickyBias};

/// Outcome of comparing the running caret with the next one during a merge scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeDecision {
    /// Union the selections; the earlier caret keeps its identity and offset
    KeepCurrent,
    /// Union the selections; the later caret's identity and offset survive
    AdoptCandidate,
    /// No overlap; the candidate starts a new caret
    Separate,
}

impl MergeDecision {
    /// `current` must not have a larger offset than `candidate`
    pub fn between(current: &Caret, candidate: &Caret) -> Self {
        let current = current.position();
        let candidate = candidate.position();

        if current.selection_end() > candidate.offset()
            && current.offset() >= candidate.selection_start()
        {
            MergeDecision::KeepCurrent
        } else if current.selection_end() > candidate.selection_start()
            || current.offset() == candidate.offset()
        {
            MergeDecision::AdoptCandidate
        } else {
            MergeDecision::Separate
        }
    }
}

/// Sort by offset and merge crossing or coincident carets until none remain
pub fn merge_carets(mut carets: Vec<Caret>) -> Vec<Caret> {
    carets.sort_by_key(Caret::offset);
    loop {
        let before = carets.len();
        carets = merge_pass(carets);
        if carets.len() == before {
            return carets;
        }
    }
}

/// One left-to-right scan; a union can reach back past the previous caret, hence the loop above
fn merge_pass(carets: Vec<Caret>) -> Vec<Caret> {
    let mut merged: Vec<Caret> = Vec::with_capacity(carets.len());
    let mut carets = carets.into_iter();
    let Some(mut current) = carets.next() else {
        return merged;
    };

    for candidate in carets {
        current = match MergeDecision::between(&current, &candidate) {
            MergeDecision::KeepCurrent => {
                let position = current
                    .position()
                    .union_keeping_offset(&candidate.position());
                current.moved_to(position)
            }
            MergeDecision::AdoptCandidate => {
                let position = candidate
                    .position()
                    .union_keeping_offset(&current.position());
                candidate.moved_to(position)
            }
            MergeDecision::Separate => {
                merged.push(current);
                candidate
            }
        };
    }
    merged.push(current);
    merged
}

/// Pick the primary caret of a freshly merged list
///
/// With a target offset, the previous primary wins if it still contains the target, otherwise the
/// first caret containing it. Without one, the previous primary wins if it survived. Falls back to
/// the first caret, then to `CaretId::UNDEFINED`.
fn resolve_primary(carets: &[Caret], previous: CaretId, target: Option<usize>) -> CaretId {
    if let Some(target) = target {
        if carets
            .iter()
            .any(|caret| caret.id() == previous && caret.contains(target))
        {
            return previous;
        }
        if let Some(caret) = carets.iter().find(|caret| caret.contains(target)) {
            return caret.id();
        }
    } else if carets.iter().any(|caret| caret.id() == previous) {
        return previous;
    }
    carets.first().map(Caret::id).unwrap_or(CaretId::UNDEFINED)
}

/// Ordered, id-unique caret set in which no two carets cross or coincide
///
/// Every mutation returns a new value.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiCaretData {
    carets: Vec<Caret>,
    primary: CaretId,
}

impl Default for MultiCaretData {
    fn default() -> Self {
        Self {
            carets: Vec::new(),
            primary: CaretId::UNDEFINED,
        }
    }
}

impl MultiCaretData {
    /// Merge `carets` and keep `primary` if it survives (or whichever caret absorbed it)
    pub fn new(carets: Vec<Caret>, primary: CaretId) -> Self {
        let target = carets
            .iter()
            .find(|caret| caret.id() == primary)
            .map(Caret::offset);
        let carets = merge_carets(carets);
        let primary = resolve_primary(&carets, primary, target);
        Self { carets, primary }
    }

    pub fn single(position: CaretPosition) -> Self {
        let caret = Caret::new(position);
        let primary = caret.id();
        Self {
            carets: vec![caret],
            primary,
        }
    }

    pub fn carets(&self) -> &[Caret] {
        &self.carets
    }

    pub fn len(&self) -> usize {
        self.carets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carets.is_empty()
    }

    pub fn primary_id(&self) -> CaretId {
        self.primary
    }

    pub fn primary_caret(&self) -> Option<&Caret> {
        self.caret(self.primary)
    }

    pub fn caret(&self, id: CaretId) -> Option<&Caret> {
        self.carets.iter().find(|caret| caret.id() == id)
    }

    /// Add carets at `positions`, clamped to `[0, len]`
    ///
    /// Returns the new set and the caret that ended up holding the last added position.
    pub fn add_carets(&self, positions: &[CaretPosition], len: usize) -> (Self, Option<Caret>) {
        let added = positions
            .iter()
            .map(|position| Caret::new(*position))
            .collect();
        self.with_added(added, len)
    }

    /// Add prebuilt carets, so mirrored structures can share their ids
    pub(crate) fn with_added(&self, added: Vec<Caret>, len: usize) -> (Self, Option<Caret>) {
        let last = added.last().map(|caret| (caret.id(), caret.offset().min(len)));
        let target = self.primary_caret().map(Caret::offset);

        let mut carets = self.carets.clone();
        carets.extend(
            added
                .into_iter()
                .map(|caret| caret.moved_to(caret.position().clamped(len))),
        );
        let carets = merge_carets(carets);
        let primary = resolve_primary(&carets, self.primary, target);
        let next = Self { carets, primary };

        let holder = last.and_then(|(id, offset)| {
            next.caret(id)
                .or_else(|| next.carets.iter().find(|caret| caret.contains(offset)))
                .cloned()
        });
        (next, holder)
    }

    /// Remove carets by id; a removed primary hands over to the nearest caret before it
    pub fn remove_carets(&self, ids: &[CaretId]) -> Self {
        let survivors: Vec<Caret> = self
            .carets
            .iter()
            .filter(|caret| !ids.contains(&caret.id()))
            .cloned()
            .collect();

        let primary = if ids.contains(&self.primary) {
            let removed_offset = self.primary_caret().map(Caret::offset).unwrap_or(0);
            survivors
                .iter()
                .rev()
                .find(|caret| caret.offset() < removed_offset)
                .or_else(|| survivors.first())
                .map(Caret::id)
                .unwrap_or(CaretId::UNDEFINED)
        } else {
            self.primary
        };

        Self {
            carets: merge_carets(survivors),
            primary,
        }
    }

    /// Apply `moves` (clamped to `[0, len]`), merge, and re-resolve the primary caret
    pub fn move_carets(&self, moves: &[CaretMove], len: usize) -> Self {
        let target = moves
            .iter()
            .find(|mv| mv.id == self.primary)
            .map(|mv| mv.position.clamped(len).offset())
            .or_else(|| self.primary_caret().map(Caret::offset));

        let carets = self
            .exhaustive_moves(moves)
            .into_iter()
            .map(|caret| caret.moved_to(caret.position().clamped(len)))
            .collect();
        let carets = merge_carets(carets);
        let primary = resolve_primary(&carets, self.primary, target);
        Self { carets, primary }
    }

    /// Every caret after `moves`; carets without a move pass through unchanged
    pub fn exhaustive_moves(&self, moves: &[CaretMove]) -> Vec<Caret> {
        let by_id: HashMap<CaretId, &CaretMove> = moves.iter().map(|mv| (mv.id, mv)).collect();
        if by_id.len() < moves.len() || moves.iter().any(|mv| self.caret(mv.id).is_none()) {
            log::debug!("ignoring caret moves for duplicate or unknown caret ids");
        }

        self.carets
            .iter()
            .map(|caret| match by_id.get(&caret.id()) {
                Some(mv) => caret
                    .moved_to(mv.position)
                    .with_visual_column(mv.visual_column),
                None => caret.clone(),
            })
            .collect()
    }

    /// Relocate every caret through an edit, then re-merge carets the edit made coincide
    pub(crate) fn rebased(&self, op: &Operation, bias: StickyBias, len: usize) -> Self {
        if op.is_identity() {
            return self.clone();
        }
        let target = self
            .primary_caret()
            .map(|caret| op.map_offset(caret.offset(), bias).min(len));
        let carets = self
            .carets
            .iter()
            .map(|caret| caret.moved_to(caret.position().rebased(op, bias).clamped(len)))
            .collect();
        let carets = merge_carets(carets);
        let primary = resolve_primary(&carets, self.primary, target);
        Self { carets, primary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_yaml_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn pos(offset: usize, start: usize, end: usize) -> CaretPosition {
        CaretPosition::new(offset, start, end).unwrap()
    }

    fn caret(offset: usize, start: usize, end: usize) -> Caret {
        Caret::new(pos(offset, start, end))
    }

    fn positions(data: &MultiCaretData) -> Vec<CaretPosition> {
        data.carets().iter().map(Caret::position).collect()
    }

    fn assert_no_crossing(carets: &[Caret]) {
        for pair in carets.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            assert!(left.offset() < right.offset(), "offsets must be strictly ordered");
            assert!(
                left.selection().end <= right.selection().start,
                "selections must not overlap: {:?} vs {:?}",
                left.selection(),
                right.selection()
            );
        }
    }

    #[rstest]
    #[case::disjoint(caret(2, 2, 2), caret(5, 5, 5), MergeDecision::Separate)]
    #[case::touching_selections(caret(5, 2, 5), caret(8, 5, 8), MergeDecision::Separate)]
    #[case::coincident_empty(caret(5, 5, 5), caret(5, 5, 5), MergeDecision::AdoptCandidate)]
    #[case::overlap_reaching_candidate_offset(
        caret(4, 4, 8),
        caret(6, 2, 6),
        MergeDecision::KeepCurrent
    )]
    #[case::current_extends_over_candidate(
        caret(2, 2, 10),
        caret(5, 5, 5),
        MergeDecision::AdoptCandidate
    )]
    #[case::candidate_reaches_back(caret(5, 0, 5), caret(7, 3, 7), MergeDecision::AdoptCandidate)]
    fn test_merge_decision_table(
        #[case] current: Caret,
        #[case] candidate: Caret,
        #[case] expected: MergeDecision,
    ) {
        assert_eq!(MergeDecision::between(&current, &candidate), expected);
    }

    #[test]
    fn test_keep_current_preserves_earlier_identity() {
        let current = caret(4, 4, 8);
        let candidate = caret(6, 2, 6);
        let merged = merge_carets(vec![current.clone(), candidate]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id(), current.id());
        assert_eq!(merged[0].position(), pos(4, 2, 8));
    }

    #[test]
    fn test_adopt_candidate_takes_later_identity() {
        let current = caret(2, 2, 10);
        let candidate = caret(5, 5, 5);
        let merged = merge_carets(vec![current, candidate.clone()]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id(), candidate.id());
        // the survivor's offset sits strictly inside the union
        assert_eq!(merged[0].position(), pos(5, 2, 10));
    }

    #[test]
    fn test_coincident_carets_merge_into_one() {
        let data = MultiCaretData::single(CaretPosition::at(5));
        let (data, holder) = data.add_carets(&[CaretPosition::at(5)], 10);

        assert_eq!(data.len(), 1);
        assert_eq!(data.carets()[0].position(), CaretPosition::at(5));
        assert_eq!(holder.map(|caret| caret.id()), Some(data.carets()[0].id()));
    }

    #[test]
    fn test_merge_reaching_back_past_previous_caret() {
        let merged = merge_carets(vec![caret(4, 0, 4), caret(5, 5, 5), caret(6, 1, 6)]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].position(), pos(6, 0, 6));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merged = merge_carets(vec![
            caret(9, 9, 9),
            caret(1, 1, 3),
            caret(3, 3, 3),
            caret(6, 4, 6),
            caret(5, 5, 5),
            caret(12, 10, 14),
        ]);
        let again = merge_carets(merged.clone());

        assert_eq!(again, merged);
        assert_no_crossing(&merged);
    }

    #[test]
    fn test_merge_never_leaves_crossings() {
        // deterministic sweep over small selections, in scrambled order
        let mut carets = Vec::new();
        for i in 0..24usize {
            let start = (i * 7) % 20;
            let end = start + (i % 4);
            let offset = if i % 2 == 0 { start } else { end };
            carets.push(caret(offset, start, end));
        }

        let merged = merge_carets(carets);

        assert_no_crossing(&merged);
    }

    #[test]
    fn test_add_carets_clamps_and_sorts() {
        let data = MultiCaretData::single(CaretPosition::at(4));
        let (data, _) = data.add_carets(&[CaretPosition::at(50), CaretPosition::at(1)], 10);

        assert_yaml_snapshot!(positions(&data), @r"
        - offset: 1
          selection_start: 1
          selection_end: 1
        - offset: 4
          selection_start: 4
          selection_end: 4
        - offset: 10
          selection_start: 10
          selection_end: 10
        ");
    }

    #[test]
    fn test_add_to_empty_set_sets_primary() {
        let (data, holder) = MultiCaretData::default().add_carets(&[CaretPosition::at(3)], 10);

        assert_eq!(data.primary_id(), holder.unwrap().id());
    }

    #[test]
    fn test_remove_primary_promotes_nearest_smaller_offset() {
        let data = MultiCaretData::single(CaretPosition::at(2));
        let first = data.primary_id();
        let (data, second) = data.add_carets(&[CaretPosition::at(5)], 20);
        let (data, _) = data.add_carets(&[CaretPosition::at(9)], 20);
        let second = second.unwrap().id();
        let data = MultiCaretData::new(data.carets().to_vec(), second);
        assert_eq!(data.primary_id(), second);

        let data = data.remove_carets(&[second]);

        assert_eq!(data.primary_id(), first);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_remove_first_primary_promotes_first_remaining() {
        let data = MultiCaretData::single(CaretPosition::at(2));
        let primary = data.primary_id();
        let (data, other) = data.add_carets(&[CaretPosition::at(7)], 20);

        let data = data.remove_carets(&[primary]);

        assert_eq!(data.primary_id(), other.unwrap().id());
    }

    #[test]
    fn test_remove_last_caret_leaves_undefined_primary() {
        let data = MultiCaretData::single(CaretPosition::at(2));
        let data = data.remove_carets(&[data.primary_id()]);

        assert!(data.is_empty());
        assert!(data.primary_id().is_undefined());
    }

    #[test]
    fn test_exhaustive_moves_passes_unmoved_carets_through() {
        let data = MultiCaretData::single(CaretPosition::at(1));
        let (data, other) = data.add_carets(&[CaretPosition::at(6)], 20);
        let other = other.unwrap();

        let all = data.exhaustive_moves(&[CaretMove::new(other.id(), CaretPosition::at(8))]);

        assert_eq!(all.len(), 2);
        assert_eq!(all[0], data.carets()[0]);
        assert_eq!(all[1].id(), other.id());
        assert_eq!(all[1].offset(), 8);
    }

    #[test]
    fn test_move_onto_sibling_merges_and_keeps_primary_on_target() {
        let data = MultiCaretData::single(CaretPosition::at(2));
        let primary = data.primary_id();
        let (data, _) = data.add_carets(&[CaretPosition::at(6)], 20);

        // extend the primary's selection over the second caret
        let moved = data.carets()[0].position().move_to(8, true);
        let data = data.move_carets(&[CaretMove::new(primary, moved)], 20);

        assert_eq!(data.len(), 1);
        assert_eq!(data.carets()[0].position(), pos(8, 2, 8));
        assert_eq!(data.primary_id(), data.carets()[0].id());
    }

    #[test]
    fn test_move_clamps_to_document_length() {
        let data = MultiCaretData::single(CaretPosition::at(2));
        let data = data.move_carets(&[CaretMove::new(data.primary_id(), CaretPosition::at(99))], 7);

        assert_eq!(data.carets()[0].offset(), 7);
    }

    #[test]
    fn test_rebased_merges_carets_collapsed_by_delete() {
        let data = MultiCaretData::single(CaretPosition::at(3));
        let (data, _) = data.add_carets(&[CaretPosition::at(5)], 10);

        let op = Operation::delete(2, "abcd");
        let data = data.rebased(&op, StickyBias::Left, 6);

        assert_eq!(positions(&data), vec![CaretPosition::at(2)]);
    }

    #[test]
    fn test_moves_keep_identity_and_visibility() {
        let hidden = Caret::new(CaretPosition::at(2)).with_visibility(false);
        let id = hidden.id();
        let data = MultiCaretData::new(vec![hidden], id);

        let moved = data.move_carets(&[CaretMove::new(id, CaretPosition::at(5))], 10);

        let caret = moved.caret(id).unwrap();
        assert_eq!(caret.offset(), 5);
        assert!(!caret.is_visible());
    }
}
