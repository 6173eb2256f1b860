use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use xi_rope::Rope;

use crate::carets::{Caret, CaretId, CaretMove, CaretPosition, CaretSubset, MultiCaretData};
use crate::editing::anchors::{
    AnchorBatch, AnchorId, AnchorLifetime, AnchorStorage, RangeMarkerId,
};
use crate::editing::commands::CaretEditor;
use crate::editing::history::CommandKind;
use crate::editing::operation::{Operation, StickyBias};
use crate::editing::Document;
use crate::error::Result;

/// Where a sandbox's logic stands within the current run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SandboxState {
    Runnable,
    SuspendedAtCommit,
    Completed,
}

/// Sandbox state captured when a round starts, restored if the logic fails during it
#[derive(Debug)]
struct RoundStart {
    buffer: Rope,
    carets: MultiCaretData,
    anchors: AnchorStorage,
    all_carets: MultiCaretData,
    owned: HashSet<CaretId>,
}

/// One caret's private working copy
#[derive(Debug)]
pub(crate) struct Sandbox {
    /// Transient copy of the document; its carets are the local projection, its anchors only
    /// the ones created here
    pub(crate) view: Document,
    /// Full caret set as this sandbox sees it
    pub(crate) all_carets: MultiCaretData,
    /// Real document anchors as of the last round
    base_anchors: AnchorStorage,
    /// Edits since the last publish
    pub(crate) accumulated: Operation,
    removed_anchors: Vec<AnchorId>,
    removed_markers: Vec<RangeMarkerId>,
    pub(crate) checkpoint_requested: bool,
    pub(crate) state: SandboxState,
    /// Carets this sandbox is responsible for in the real document
    pub(crate) owned: HashSet<CaretId>,
    round_start: Option<RoundStart>,
}

impl Sandbox {
    /// A sandbox scoped to `caret` of `doc`
    pub(crate) fn new(doc: &Document, caret: &Caret) -> Result<Self> {
        let local = MultiCaretData::new(vec![caret.clone()], caret.id());
        let mut view = doc.transient_copy(local)?;
        view.anchors = AnchorStorage::default();
        Ok(Self {
            view,
            all_carets: doc.carets().clone(),
            base_anchors: doc.anchors().clone(),
            accumulated: Operation::identity(),
            removed_anchors: Vec::new(),
            removed_markers: Vec::new(),
            checkpoint_requested: false,
            state: SandboxState::Runnable,
            owned: HashSet::from([caret.id()]),
            round_start: None,
        })
    }

    pub(crate) fn begin_round(&mut self) {
        self.state = SandboxState::Runnable;
        self.round_start = Some(RoundStart {
            buffer: self.view.buffer.clone(),
            carets: self.view.carets.clone(),
            anchors: self.view.anchors.clone(),
            all_carets: self.all_carets.clone(),
            owned: self.owned.clone(),
        });
    }

    /// Discard everything done since the round started
    pub(crate) fn roll_back(&mut self) {
        if let Some(start) = self.round_start.take() {
            self.view
                .reset_state(start.buffer, start.carets, start.anchors);
            self.all_carets = start.all_carets;
            self.owned = start.owned;
        }
        self.accumulated = Operation::identity();
        self.removed_anchors.clear();
        self.removed_markers.clear();
        self.checkpoint_requested = false;
    }

    pub(crate) fn edit(&mut self, op: &Operation) -> Result<()> {
        let accumulated = self.accumulated.compose(op)?;
        self.view.edit(op)?;
        self.all_carets = self
            .all_carets
            .rebased(op, StickyBias::Left, self.view.len());
        self.accumulated = accumulated;
        Ok(())
    }

    /// Carry the sibling edits in `op` into this sandbox, leaving it in sync with `real_text`
    pub(crate) fn rebase(&mut self, op: &Operation, real_text: &Rope) {
        debug_assert!(
            op.apply(&self.view.buffer)
                .is_ok_and(|rebased| rebased.to_string() == real_text.to_string()),
            "sandbox rebase does not reproduce the real document"
        );
        let len = real_text.len();
        let carets = self.view.carets.rebased(op, StickyBias::Left, len);
        let anchors = self.view.anchors.rebased(op, len);
        self.view.reset_state(real_text.clone(), carets, anchors);
        self.all_carets = self.all_carets.rebased(op, StickyBias::Left, len);
        self.accumulated = Operation::identity();
        self.round_start = None;
    }

    /// Document-lifetime anchors created here plus removals, handed over to the real document
    pub(crate) fn take_forwarded(&mut self) -> AnchorBatch {
        let mut batch = self.view.anchors.export(AnchorLifetime::Document);
        for (id, _) in &batch.anchors {
            self.view.anchors.remove_anchor(*id);
        }
        for (id, _) in &batch.markers {
            self.view.anchors.remove_range_marker(*id);
        }
        batch.removed_anchors = std::mem::take(&mut self.removed_anchors);
        batch.removed_markers = std::mem::take(&mut self.removed_markers);
        batch
    }

    /// Adopt the real document's carets and anchors after a round
    pub(crate) fn refresh(&mut self, all_carets: &MultiCaretData, base_anchors: &AnchorStorage) {
        self.all_carets = all_carets.clone();
        self.base_anchors = base_anchors.clone();
    }

    pub(crate) fn complete(&mut self) {
        self.state = SandboxState::Completed;
        self.view.anchors.drop_lifetime(AnchorLifetime::Mutation);
    }

    fn resolve_anchor(&self, id: AnchorId) -> Option<usize> {
        if self.removed_anchors.contains(&id) {
            return None;
        }
        self.view.resolve_anchor(id).or_else(|| {
            self.base_anchors.anchor(id).map(|anchor| {
                self.accumulated
                    .map_offset(anchor.offset, anchor.sticky)
                    .min(self.view.len())
            })
        })
    }

    fn resolve_range_marker(&self, id: RangeMarkerId) -> Option<Range<usize>> {
        if self.removed_markers.contains(&id) {
            return None;
        }
        self.view.resolve_range_marker(id).or_else(|| {
            self.base_anchors.resolve_range_marker(id).map(|range| {
                let len = self.view.len();
                let end = self
                    .accumulated
                    .map_offset(range.end, StickyBias::Left)
                    .min(len);
                let start = self
                    .accumulated
                    .map_offset(range.start, StickyBias::Right)
                    .min(end);
                start..end
            })
        })
    }
}

/// Handle given to per-caret logic: a private view of the document scoped to one caret
///
/// Reads see this caret's own edits immediately. Edits reach the real document only when the
/// orchestrator publishes them at the end of a round, either at [`TransientEditor::commit`] or
/// when the logic finishes. Cloning the handle shares the sandbox.
#[derive(Clone, Debug)]
pub struct TransientEditor {
    sandbox: Rc<RefCell<Sandbox>>,
}

impl TransientEditor {
    pub(crate) fn new(sandbox: Rc<RefCell<Sandbox>>) -> Self {
        Self { sandbox }
    }

    pub fn text(&self) -> String {
        self.sandbox.borrow().view.text()
    }

    pub fn len(&self) -> usize {
        self.sandbox.borrow().view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice(&self, range: Range<usize>) -> Result<String> {
        self.sandbox
            .borrow()
            .view
            .slice(range)
            .map(|text| text.into_owned())
    }

    pub fn is_single_line(&self) -> bool {
        self.sandbox.borrow().view.is_single_line()
    }

    /// Carets this editor is scoped to
    pub fn carets(&self) -> MultiCaretData {
        self.sandbox.borrow().view.carets().clone()
    }

    /// The scoped primary caret
    pub fn caret(&self) -> Option<Caret> {
        self.sandbox.borrow().view.primary_caret().cloned()
    }

    /// Every caret of the document, as seen from here
    pub fn all_carets(&self) -> MultiCaretData {
        self.sandbox.borrow().all_carets.clone()
    }

    pub fn edit(&self, op: &Operation) -> Result<()> {
        self.sandbox.borrow_mut().edit(op)
    }

    pub fn insert(&self, at: usize, text: &str) -> Result<()> {
        self.edit(&Operation::insert(at, text))
    }

    pub fn delete(&self, range: Range<usize>) -> Result<()> {
        let old = self.slice(range.clone())?;
        self.edit(&Operation::delete(range.start, &old))
    }

    pub fn replace(&self, range: Range<usize>, text: &str) -> Result<()> {
        let old = self.slice(range.clone())?;
        self.edit(&Operation::replace(range.start, &old, text))
    }

    /// Edits made since the last publish
    pub fn accumulated_operation(&self) -> Operation {
        self.sandbox.borrow().accumulated.clone()
    }

    pub fn move_caret(&self, id: CaretId, position: CaretPosition) {
        self.move_carets(&[CaretMove::new(id, position)]);
    }

    pub fn move_carets(&self, moves: &[CaretMove]) {
        let mut sandbox = self.sandbox.borrow_mut();
        let sandbox = &mut *sandbox;
        let len = sandbox.view.len();
        let moves = sandbox.view.snap_moves(moves);
        CaretSubset::new(&mut sandbox.all_carets, &mut sandbox.view.carets).move_carets(&moves, len);
    }

    /// Add carets owned by this editor; returns the caret holding the last added position
    pub fn add_carets(&self, positions: &[CaretPosition]) -> Option<Caret> {
        let mut sandbox = self.sandbox.borrow_mut();
        let sandbox = &mut *sandbox;
        let len = sandbox.view.len();
        let before: HashSet<CaretId> = sandbox.view.carets.carets().iter().map(Caret::id).collect();

        let positions = sandbox.view.snap_positions(positions);
        let holder = CaretSubset::new(&mut sandbox.all_carets, &mut sandbox.view.carets)
            .add_carets(&positions, len);

        let added = sandbox
            .view
            .carets
            .carets()
            .iter()
            .map(Caret::id)
            .filter(|id| !before.contains(id));
        sandbox.owned.extend(added);
        holder
    }

    pub fn remove_carets(&self, ids: &[CaretId]) {
        let mut sandbox = self.sandbox.borrow_mut();
        let sandbox = &mut *sandbox;
        CaretSubset::new(&mut sandbox.all_carets, &mut sandbox.view.carets).remove_carets(ids);
    }

    pub fn create_anchor(
        &self,
        offset: usize,
        lifetime: AnchorLifetime,
        sticky: StickyBias,
    ) -> AnchorId {
        self.sandbox
            .borrow_mut()
            .view
            .create_anchor(offset, lifetime, sticky)
    }

    /// Falls back to the real document's anchors for ids not created here
    pub fn resolve_anchor(&self, id: AnchorId) -> Option<usize> {
        self.sandbox.borrow().resolve_anchor(id)
    }

    pub fn remove_anchor(&self, id: AnchorId) -> bool {
        let mut sandbox = self.sandbox.borrow_mut();
        if sandbox.view.remove_anchor(id) {
            return true;
        }
        if sandbox.base_anchors.anchor(id).is_some() && !sandbox.removed_anchors.contains(&id) {
            sandbox.removed_anchors.push(id);
            return true;
        }
        false
    }

    pub fn create_range_marker(
        &self,
        range: Range<usize>,
        lifetime: AnchorLifetime,
    ) -> RangeMarkerId {
        self.sandbox
            .borrow_mut()
            .view
            .create_range_marker(range, lifetime)
    }

    pub fn resolve_range_marker(&self, id: RangeMarkerId) -> Option<Range<usize>> {
        self.sandbox.borrow().resolve_range_marker(id)
    }

    pub fn remove_range_marker(&self, id: RangeMarkerId) -> bool {
        let mut sandbox = self.sandbox.borrow_mut();
        if sandbox.view.remove_range_marker(id) {
            return true;
        }
        if sandbox.base_anchors.range_marker(id).is_some()
            && !sandbox.removed_markers.contains(&id)
        {
            sandbox.removed_markers.push(id);
            return true;
        }
        false
    }

    /// Ask for a history checkpoint on the real document at the end of this round
    pub fn request_checkpoint(&self) {
        self.sandbox.borrow_mut().checkpoint_requested = true;
    }

    /// Publish pending edits; await it to let siblings catch up
    ///
    /// Completes immediately when nothing is pending. Otherwise the logic is suspended until the
    /// round ends, and resumes with every sibling's edits applied to this view.
    pub fn commit(&self) -> Commit {
        Commit {
            sandbox: Rc::clone(&self.sandbox),
            suspended: false,
        }
    }
}

impl CaretEditor for TransientEditor {
    fn text_len(&self) -> usize {
        self.len()
    }

    fn slice_text(&self, range: Range<usize>) -> Result<String> {
        self.slice(range)
    }

    fn prev_char_boundary(&self, offset: usize) -> Option<usize> {
        self.sandbox.borrow().view.prev_char_boundary(offset)
    }

    fn next_char_boundary(&self, offset: usize) -> Option<usize> {
        self.sandbox.borrow().view.next_char_boundary(offset)
    }

    fn caret_list(&self) -> Vec<Caret> {
        self.sandbox.borrow().view.carets().carets().to_vec()
    }

    fn apply_operation(&mut self, op: &Operation) -> Result<()> {
        self.edit(op)
    }

    fn relocate_carets(&mut self, moves: &[CaretMove]) -> Result<()> {
        self.move_carets(moves);
        Ok(())
    }

    /// Sandbox edits join whatever command wraps the whole run
    fn in_command<R>(
        &mut self,
        _kind: CommandKind,
        _group_key: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        f(self)
    }
}

/// Future returned by [`TransientEditor::commit`]
#[derive(Debug)]
#[must_use = "commit does nothing unless awaited"]
pub struct Commit {
    sandbox: Rc<RefCell<Sandbox>>,
    suspended: bool,
}

impl Future for Commit {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.suspended {
            return Poll::Ready(());
        }
        {
            let mut sandbox = self.sandbox.borrow_mut();
            if sandbox.accumulated.is_identity() {
                return Poll::Ready(());
            }
            sandbox.state = SandboxState::SuspendedAtCommit;
        }
        self.suspended = true;
        Poll::Pending
    }
}
