use serde::Serialize;

/// Result of applying an edit to a document
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Patch {
    /// Replaced ranges, in post-edit offsets
    pub changed: Vec<std::ops::Range<usize>>,
    /// Primary caret selection after the edit
    pub new_selection: std::ops::Range<usize>,
    pub version: u64,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}
