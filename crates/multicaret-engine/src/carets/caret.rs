use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::carets::CaretPosition;

/// Process-unique caret identity; survives moves and merges
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct CaretId(pub Uuid);

impl CaretId {
    /// Primary id of a caret set with no carets
    pub const UNDEFINED: CaretId = CaretId(Uuid::nil());

    pub fn new() -> Self {
        CaretId(Uuid::new_v4())
    }

    pub fn is_undefined(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for CaretId {
    fn default() -> Self {
        Self::new()
    }
}

/// A caret with identity
#[derive(Clone, Debug, PartialEq)]
pub struct Caret {
    id: CaretId,
    position: CaretPosition,
    /// Column to aim for on vertical moves
    visual_column: Option<f32>,
    visible: bool,
}

impl Caret {
    pub fn new(position: CaretPosition) -> Self {
        Self::with_id(CaretId::new(), position)
    }

    pub fn with_id(id: CaretId, position: CaretPosition) -> Self {
        Self {
            id,
            position,
            visual_column: None,
            visible: true,
        }
    }

    pub fn id(&self) -> CaretId {
        self.id
    }

    pub fn position(&self) -> CaretPosition {
        self.position
    }

    pub fn offset(&self) -> usize {
        self.position.offset()
    }

    pub fn selection(&self) -> std::ops::Range<usize> {
        self.position.selection()
    }

    pub fn visual_column(&self) -> Option<f32> {
        self.visual_column
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Same caret at a new position
    pub fn moved_to(&self, position: CaretPosition) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    pub fn with_visual_column(self, visual_column: Option<f32>) -> Self {
        Self {
            visual_column,
            ..self
        }
    }

    pub fn with_visibility(self, visible: bool) -> Self {
        Self { visible, ..self }
    }

    pub(crate) fn contains(&self, offset: usize) -> bool {
        self.position.selection_start() <= offset && offset <= self.position.selection_end()
    }
}

/// Requested new position for an existing caret
#[derive(Clone, Debug, PartialEq)]
pub struct CaretMove {
    pub id: CaretId,
    pub position: CaretPosition,
    pub visual_column: Option<f32>,
}

impl CaretMove {
    pub fn new(id: CaretId, position: CaretPosition) -> Self {
        Self {
            id,
            position,
            visual_column: None,
        }
    }
}
