use serde::Serialize;
use xi_rope::Rope;

use crate::editing::operation::{Operation, StickyBias};
use crate::error::{EditorError, Result};

/// A caret offset together with the selection it bounds
///
/// Always satisfies `selection_start <= offset <= selection_end`. Values are immutable; every
/// move produces a new position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CaretPosition {
    offset: usize,
    selection_start: usize,
    selection_end: usize,
}

impl CaretPosition {
    /// An empty selection at `offset`
    pub fn at(offset: usize) -> Self {
        Self {
            offset,
            selection_start: offset,
            selection_end: offset,
        }
    }

    pub fn new(offset: usize, selection_start: usize, selection_end: usize) -> Result<Self> {
        if selection_start > offset || offset > selection_end {
            return Err(EditorError::InvalidCaretPosition {
                offset,
                selection_start,
                selection_end,
            });
        }
        Ok(Self {
            offset,
            selection_start,
            selection_end,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn selection_start(&self) -> usize {
        self.selection_start
    }

    pub fn selection_end(&self) -> usize {
        self.selection_end
    }

    pub fn selection(&self) -> std::ops::Range<usize> {
        self.selection_start..self.selection_end
    }

    pub fn has_selection(&self) -> bool {
        self.selection_start < self.selection_end
    }

    /// Move the caret to `target`, optionally extending the selection
    ///
    /// When extending, the edge the caret sits on moves and the opposite edge stays put. A caret
    /// strictly inside its selection (only reachable through a merge) extends from its own
    /// offset instead, dropping the old bounds.
    pub fn move_to(&self, target: usize, expand_selection: bool) -> Self {
        if !expand_selection {
            return Self::at(target);
        }

        let (start, end) = if self.offset == self.selection_start {
            (
                target.min(self.selection_end),
                target.max(self.selection_end),
            )
        } else if self.offset == self.selection_end {
            (
                target.min(self.selection_start),
                target.max(self.selection_start),
            )
        } else {
            (target.min(self.offset), target.max(self.offset))
        };

        Self {
            offset: target,
            selection_start: start,
            selection_end: end,
        }
    }

    /// Union of both selections, keeping `self`'s offset
    pub(crate) fn union_keeping_offset(&self, other: &CaretPosition) -> Self {
        Self {
            offset: self.offset,
            selection_start: self.selection_start.min(other.selection_start),
            selection_end: self.selection_end.max(other.selection_end),
        }
    }

    pub(crate) fn clamped(&self, len: usize) -> Self {
        Self {
            offset: self.offset.min(len),
            selection_start: self.selection_start.min(len),
            selection_end: self.selection_end.min(len),
        }
    }

    /// Clamp to `text` and pull every offset back onto a character boundary
    pub(crate) fn snapped(&self, text: &Rope) -> Self {
        let len = text.len();
        let snap = |offset: usize| {
            if offset == 0 || offset >= len {
                offset.min(len)
            } else {
                text.at_or_prev_codepoint_boundary(offset).unwrap_or(0)
            }
        };
        Self {
            offset: snap(self.offset),
            selection_start: snap(self.selection_start),
            selection_end: snap(self.selection_end),
        }
    }

    /// Relocate through an edit; the mapping is monotonic so the ordering invariant holds
    pub(crate) fn rebased(&self, op: &Operation, bias: StickyBias) -> Self {
        Self {
            offset: op.map_offset(self.offset, bias),
            selection_start: op.map_offset(self.selection_start, bias),
            selection_end: op.map_offset(self.selection_end, bias),
        }
    }
}
