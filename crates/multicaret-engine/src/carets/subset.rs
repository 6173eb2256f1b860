use crate::carets::{Caret, CaretId, CaretMove, CaretPosition, MultiCaretData};

/// A caret subset that mirrors every mutation into the full caret set it was taken from
///
/// `local` holds only the carets in scope; `original` is the full structure. Each mutating call
/// rebuilds both explicitly. Carets added through the view get one id shared by both sides.
pub struct CaretSubset<'a> {
    original: &'a mut MultiCaretData,
    local: &'a mut MultiCaretData,
}

impl<'a> CaretSubset<'a> {
    pub fn new(original: &'a mut MultiCaretData, local: &'a mut MultiCaretData) -> Self {
        Self { original, local }
    }

    pub fn local(&self) -> &MultiCaretData {
        self.local
    }

    pub fn original(&self) -> &MultiCaretData {
        self.original
    }

    pub fn add_carets(&mut self, positions: &[CaretPosition], len: usize) -> Option<Caret> {
        let added: Vec<Caret> = positions
            .iter()
            .map(|position| Caret::new(*position))
            .collect();

        let (original, _) = self.original.with_added(added.clone(), len);
        let (local, holder) = self.local.with_added(added, len);
        *self.original = original;
        *self.local = local;
        holder
    }

    pub fn remove_carets(&mut self, ids: &[CaretId]) {
        *self.original = self.original.remove_carets(ids);
        *self.local = self.local.remove_carets(ids);
    }

    pub fn move_carets(&mut self, moves: &[CaretMove], len: usize) {
        *self.original = self.original.move_carets(moves, len);
        *self.local = self.local.move_carets(moves, len);
    }
}
