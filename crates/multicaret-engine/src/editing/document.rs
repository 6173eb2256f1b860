use std::borrow::Cow;
use std::ops::Range;

use multicaret_config::Config;
use xi_rope::Rope;

use crate::carets::{Caret, CaretId, CaretMove, CaretPosition, MultiCaretData};
use crate::editing::anchors::{AnchorBatch, AnchorId, AnchorLifetime, AnchorStorage, RangeMarkerId};
use crate::editing::commands::{CaretEditor, Cmd, compile_command};
use crate::editing::history::{CommandKind, History};
use crate::editing::operation::{Operation, StickyBias};
use crate::editing::patch::Patch;
use crate::error::{EditorError, Result};

/// Whether a document is the real one or a per-caret working copy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Persistent,
    Transient,
}

/// Text buffer plus the carets, anchors and history that follow it
///
/// Every edit goes through [`Document::edit`]: the operation is validated against the rope,
/// then anchors and carets are rebased through it (carets with left bias, so typing at a caret
/// does not drag it), and persistent documents record it for undo.
///
/// ```rust
/// # use multicaret_engine::editing::{Document, Cmd};
/// let mut doc = Document::from_bytes(b"hello").unwrap();
/// doc.apply(Cmd::InsertText { at: 5, text: " world".to_string() }).unwrap();
/// assert_eq!(doc.text(), "hello world");
/// assert!(doc.undo().unwrap());
/// assert_eq!(doc.text(), "hello");
/// ```
#[derive(Debug)]
pub struct Document {
    pub(crate) buffer: Rope,
    pub(crate) carets: MultiCaretData,
    pub(crate) anchors: AnchorStorage,
    history: History,
    /// Incremented on each applied edit
    version: u64,
    kind: DocumentKind,
    single_line: bool,
}

impl Document {
    /// A persistent document with one caret at the end of `text`
    pub fn new(text: &str) -> Self {
        Self::with_config(text, &Config::default())
    }

    pub fn with_config(text: &str, config: &Config) -> Self {
        let buffer = Rope::from(text);
        let len = buffer.len();
        Self {
            buffer,
            carets: MultiCaretData::single(CaretPosition::at(len)),
            anchors: AnchorStorage::default(),
            history: History::new(config.history.clone()),
            version: 0,
            kind: DocumentKind::Persistent,
            single_line: false,
        }
    }

    /// Create a new document from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Self::new(text))
    }

    /// A document that rejects line breaks
    pub fn single_line(text: &str) -> Result<Self> {
        if text.contains(['\n', '\r']) {
            return Err(EditorError::NewlineInSingleLine);
        }
        Ok(Self {
            single_line: true,
            ..Self::new(text)
        })
    }

    /// A transient working copy sharing this document's text and anchors
    ///
    /// Transient documents keep no history and cannot parent another copy.
    pub fn transient_copy(&self, carets: MultiCaretData) -> Result<Self> {
        if self.is_transient() {
            return Err(EditorError::NestedTransient);
        }
        Ok(Self {
            buffer: self.buffer.clone(),
            carets,
            anchors: self.anchors.clone(),
            history: History::default(),
            version: self.version,
            kind: DocumentKind::Transient,
            single_line: self.single_line,
        })
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.text().into_bytes()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    /// Text in `range`; fails on out-of-bounds ranges or ranges splitting a character
    pub fn slice(&self, range: Range<usize>) -> Result<Cow<'_, str>> {
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(EditorError::OperationMismatch {
                offset: range.start,
                reason: format!("range {range:?} outside text of length {len}"),
            });
        }
        for offset in [range.start, range.end] {
            if !self.buffer.is_codepoint_boundary(offset) {
                return Err(EditorError::OperationMismatch {
                    offset,
                    reason: "offset splits a character".to_string(),
                });
            }
        }
        Ok(self.buffer.slice_to_cow(range))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn is_transient(&self) -> bool {
        self.kind == DocumentKind::Transient
    }

    pub fn is_single_line(&self) -> bool {
        self.single_line
    }

    pub fn carets(&self) -> &MultiCaretData {
        &self.carets
    }

    pub fn primary_caret(&self) -> Option<&Caret> {
        self.carets.primary_caret()
    }

    pub fn anchors(&self) -> &AnchorStorage {
        &self.anchors
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Apply an operation to the buffer, rebasing carets and anchors through it
    pub fn edit(&mut self, op: &Operation) -> Result<Patch> {
        if self.single_line && op.inserts_newline() {
            return Err(EditorError::NewlineInSingleLine);
        }
        let carets_before = self.carets.clone();
        self.apply_unrecorded(op)?;
        if self.kind == DocumentKind::Persistent {
            self.history.record(op, &carets_before, &self.carets)?;
        }
        Ok(self.patch(op))
    }

    /// Apply a single command
    pub fn apply(&mut self, cmd: Cmd) -> Result<Patch> {
        let op = compile_command(&cmd, self.len(), |range| {
            self.slice(range).map(Cow::into_owned)
        })?;
        self.edit(&op)
    }

    fn apply_unrecorded(&mut self, op: &Operation) -> Result<()> {
        if op.is_identity() {
            return Ok(());
        }
        let after = op.apply(&self.buffer)?;
        self.anchors = self.anchors.edit(&self.buffer, &after, op);
        self.carets = self.carets.rebased(op, StickyBias::Left, after.len());
        self.buffer = after;
        self.version += 1;
        log::trace!(
            "edit v{} on {:?} document: {} segments, {} bytes",
            self.version,
            self.kind,
            op.segments().len(),
            self.buffer.len()
        );
        Ok(())
    }

    fn patch(&self, op: &Operation) -> Patch {
        Patch {
            changed: op.changed_ranges(),
            new_selection: self.primary_caret().map(Caret::selection).unwrap_or(0..0),
            version: self.version,
        }
    }

    /// Add carets; returns the caret holding the last added position
    pub fn add_carets(&mut self, positions: &[CaretPosition]) -> Option<Caret> {
        let positions = self.snap_positions(positions);
        let (carets, holder) = self.carets.add_carets(&positions, self.len());
        self.carets = carets;
        holder
    }

    pub fn remove_carets(&mut self, ids: &[CaretId]) {
        self.carets = self.carets.remove_carets(ids);
    }

    pub fn move_carets(&mut self, moves: &[CaretMove]) {
        let moves = self.snap_moves(moves);
        self.carets = self.carets.move_carets(&moves, self.len());
    }

    /// Replace all carets with fresh ones at `positions`; the first becomes primary
    pub fn set_carets(&mut self, positions: &[CaretPosition]) {
        let carets: Vec<Caret> = positions
            .iter()
            .map(|position| Caret::new(position.snapped(&self.buffer)))
            .collect();
        let primary = carets.first().map(Caret::id).unwrap_or(CaretId::UNDEFINED);
        self.carets = MultiCaretData::new(carets, primary);
    }

    /// Install a caret set built elsewhere, clamped to this document's text
    pub fn replace_carets(&mut self, carets: MultiCaretData) {
        let snapped = carets
            .carets()
            .iter()
            .map(|caret| caret.moved_to(caret.position().snapped(&self.buffer)))
            .collect();
        self.carets = MultiCaretData::new(snapped, carets.primary_id());
    }

    /// Caret positions pulled onto character boundaries of this document
    pub(crate) fn snap_positions(&self, positions: &[CaretPosition]) -> Vec<CaretPosition> {
        positions
            .iter()
            .map(|position| position.snapped(&self.buffer))
            .collect()
    }

    pub(crate) fn snap_moves(&self, moves: &[CaretMove]) -> Vec<CaretMove> {
        moves
            .iter()
            .map(|mv| CaretMove {
                position: mv.position.snapped(&self.buffer),
                ..mv.clone()
            })
            .collect()
    }

    pub fn create_anchor(
        &mut self,
        offset: usize,
        lifetime: AnchorLifetime,
        sticky: StickyBias,
    ) -> AnchorId {
        self.anchors
            .create_anchor(offset.min(self.len()), lifetime, sticky)
    }

    pub fn resolve_anchor(&self, id: AnchorId) -> Option<usize> {
        self.anchors.resolve_anchor(id)
    }

    pub fn remove_anchor(&mut self, id: AnchorId) -> bool {
        self.anchors.remove_anchor(id)
    }

    pub fn create_range_marker(
        &mut self,
        range: Range<usize>,
        lifetime: AnchorLifetime,
    ) -> RangeMarkerId {
        let len = self.len();
        let end = range.end.min(len);
        self.anchors
            .create_range_marker(range.start.min(end)..end, lifetime)
    }

    pub fn resolve_range_marker(&self, id: RangeMarkerId) -> Option<Range<usize>> {
        self.anchors.resolve_range_marker(id)
    }

    pub fn remove_range_marker(&mut self, id: RangeMarkerId) -> bool {
        self.anchors.remove_range_marker(id)
    }

    /// Apply anchor and marker updates from several sources in one step
    pub fn batch_update_anchors(&mut self, batch: AnchorBatch) {
        self.anchors.batch_update(batch);
    }

    /// Run `f` as one undoable command
    ///
    /// Nested commands join the outermost one. Mutation-lifetime anchors are dropped when the
    /// outermost command ends, whether or not `f` succeeded.
    pub fn command<R>(
        &mut self,
        kind: CommandKind,
        group_key: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.history.begin(kind, group_key, &self.carets);
        let result = f(self);
        if self.history.end(&self.carets) {
            self.anchors.drop_lifetime(AnchorLifetime::Mutation);
        }
        result
    }

    /// Close the current undo group
    pub fn checkpoint(&mut self) {
        self.history.checkpoint(&self.carets);
    }

    /// Revert the newest undo group; `false` when there is nothing to undo
    pub fn undo(&mut self) -> Result<bool> {
        let Some(group) = self.history.peek_undo() else {
            return Ok(false);
        };
        let op = group.operation.invert();
        let carets = group.carets_before.clone();

        self.apply_unrecorded(&op)?;
        self.replace_carets(carets);
        self.history.commit_undo();
        Ok(true)
    }

    /// Reapply the newest undone group; `false` when there is nothing to redo
    pub fn redo(&mut self) -> Result<bool> {
        let Some(group) = self.history.peek_redo() else {
            return Ok(false);
        };
        let op = group.operation.clone();
        let carets = group.carets_after.clone();

        self.apply_unrecorded(&op)?;
        self.replace_carets(carets);
        self.history.commit_redo();
        Ok(true)
    }

    /// Overwrite buffer, carets and anchors with state computed elsewhere
    pub(crate) fn reset_state(
        &mut self,
        buffer: Rope,
        carets: MultiCaretData,
        anchors: AnchorStorage,
    ) {
        self.buffer = buffer;
        self.carets = carets;
        self.anchors = anchors;
    }
}

impl CaretEditor for Document {
    fn text_len(&self) -> usize {
        self.len()
    }

    fn slice_text(&self, range: Range<usize>) -> Result<String> {
        self.slice(range).map(Cow::into_owned)
    }

    fn prev_char_boundary(&self, offset: usize) -> Option<usize> {
        self.buffer.prev_codepoint_offset(offset)
    }

    fn next_char_boundary(&self, offset: usize) -> Option<usize> {
        self.buffer.next_codepoint_offset(offset)
    }

    fn caret_list(&self) -> Vec<Caret> {
        self.carets.carets().to_vec()
    }

    fn apply_operation(&mut self, op: &Operation) -> Result<()> {
        self.edit(op).map(|_| ())
    }

    fn relocate_carets(&mut self, moves: &[CaretMove]) -> Result<()> {
        self.move_carets(moves);
        Ok(())
    }

    fn in_command<R>(
        &mut self,
        kind: CommandKind,
        group_key: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.command(kind, group_key, f)
    }
}

impl Clone for Document {
    /// Clones text, carets and anchors; the clone starts with empty history
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            carets: self.carets.clone(),
            anchors: self.anchors.clone(),
            history: History::default(),
            version: self.version,
            kind: self.kind,
            single_line: self.single_line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::commands::handle_default_typing;
    use multicaret_config::HistorySettings;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_document_from_bytes_valid_utf8() {
        let doc = Document::from_bytes("héllo".as_bytes()).unwrap();

        assert_eq!(doc.text(), "héllo");
        assert_eq!(doc.len(), 6);
        assert_eq!(doc.carets().carets()[0].offset(), 6);
    }

    #[test]
    fn test_document_from_bytes_invalid_utf8() {
        let invalid = vec![0xff, 0xfe, 0xfd];
        assert!(Document::from_bytes(&invalid).is_err());
    }

    #[test]
    fn test_document_to_bytes_preserves_content() {
        let content = "line one\r\nline two\n\tindented";
        let doc = Document::from_bytes(content.as_bytes()).unwrap();

        assert_eq!(doc.to_bytes(), content.as_bytes());
    }

    #[test]
    fn test_edit_rebases_carets_left_and_bumps_version() {
        let mut doc = Document::new("abcdef");
        doc.set_carets(&[CaretPosition::at(2), CaretPosition::at(4)]);

        let patch = doc.edit(&Operation::insert(2, "XY")).unwrap();

        assert_eq!(doc.text(), "abXYcdef");
        let offsets: Vec<_> = doc.carets().carets().iter().map(Caret::offset).collect();
        assert_eq!(offsets, vec![2, 6]);
        assert_eq!(patch.changed, vec![2..4]);
        assert_eq!(patch.version, 1);
    }

    #[test]
    fn test_mismatched_operation_leaves_document_untouched() {
        let mut doc = Document::new("abc");

        let result = doc.edit(&Operation::delete(1, "zz"));

        assert!(matches!(result, Err(EditorError::OperationMismatch { offset: 1, .. })));
        assert_eq!(doc.text(), "abc");
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_edit_inside_a_character_is_rejected() {
        let mut doc = Document::new("é");

        let result = doc.edit(&Operation::insert(1, "x"));

        assert!(matches!(result, Err(EditorError::OperationMismatch { offset: 1, .. })));
        assert_eq!(doc.text(), "é");
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_caret_api_snaps_to_char_boundaries() {
        let mut doc = Document::new("aéb");
        doc.set_carets(&[CaretPosition::at(2)]);
        assert_eq!(doc.carets().carets()[0].offset(), 1);

        let holder = doc.add_carets(&[CaretPosition::new(2, 2, 4).unwrap()]).unwrap();
        assert_eq!(holder.selection(), 1..4);

        let id = doc.carets().carets()[0].id();
        doc.move_carets(&[CaretMove::new(id, CaretPosition::at(2))]);
        let offsets: Vec<_> = doc.carets().carets().iter().map(Caret::offset).collect();
        assert_eq!(offsets, vec![1]);
    }

    #[test]
    fn test_single_line_rejects_newline_text() {
        assert!(matches!(
            Document::single_line("a\nb"),
            Err(EditorError::NewlineInSingleLine)
        ));

        let mut doc = Document::single_line("ab").unwrap();
        let result = doc.apply(Cmd::InsertText {
            at: 1,
            text: "\r\n".to_string(),
        });
        assert!(matches!(result, Err(EditorError::NewlineInSingleLine)));
        assert_eq!(doc.text(), "ab");
    }

    #[test]
    fn test_slice_rejects_split_character() {
        let doc = Document::new("aéb");

        assert_eq!(doc.slice(1..3).unwrap(), "é");
        assert!(doc.slice(1..2).is_err());
        assert!(doc.slice(2..9).is_err());
    }

    #[test]
    fn test_transient_copy_cannot_nest() {
        let doc = Document::single_line("abc").unwrap();
        let copy = doc.transient_copy(doc.carets().clone()).unwrap();

        assert!(copy.is_transient());
        assert!(copy.is_single_line());
        assert!(matches!(
            copy.transient_copy(MultiCaretData::default()),
            Err(EditorError::NestedTransient)
        ));
    }

    #[test]
    fn test_transient_copy_keeps_no_history() {
        let doc = Document::new("abc");
        let mut copy = doc.transient_copy(doc.carets().clone()).unwrap();

        copy.edit(&Operation::insert(0, "x")).unwrap();

        assert!(!copy.history().can_undo());
        assert!(!copy.undo().unwrap());
    }

    #[test]
    fn test_mutation_anchors_dropped_after_outermost_command() {
        let mut doc = Document::new("abcdef");
        let durable = doc.create_anchor(3, AnchorLifetime::Document, StickyBias::Left);

        let scoped = doc
            .command(CommandKind::Other, None, |doc| {
                let scoped = doc.create_anchor(1, AnchorLifetime::Mutation, StickyBias::Left);
                doc.command(CommandKind::Other, None, |doc| {
                    doc.edit(&Operation::insert(0, "__"))
                })?;
                assert_eq!(doc.resolve_anchor(scoped), Some(3));
                Ok(scoped)
            })
            .unwrap();

        assert_eq!(doc.resolve_anchor(scoped), None);
        assert_eq!(doc.resolve_anchor(durable), Some(5));
    }

    #[test]
    fn test_undo_redo_restores_text_and_carets() {
        let mut doc = Document::new("abc");
        doc.set_carets(&[CaretPosition::at(1)]);
        let before = doc.carets().clone();

        handle_default_typing(&mut doc, "X").unwrap();
        let after = doc.carets().clone();
        assert_eq!(doc.text(), "aXbc");

        assert!(doc.undo().unwrap());
        assert_eq!(doc.text(), "abc");
        assert_eq!(doc.carets(), &before);

        assert!(doc.redo().unwrap());
        assert_eq!(doc.text(), "aXbc");
        assert_eq!(doc.carets(), &after);

        assert!(!doc.redo().unwrap());
    }

    #[test]
    fn test_typing_coalesces_until_checkpoint() {
        let mut doc = Document::new("");
        handle_default_typing(&mut doc, "a").unwrap();
        handle_default_typing(&mut doc, "b").unwrap();
        doc.checkpoint();
        handle_default_typing(&mut doc, "c").unwrap();

        assert_eq!(doc.history().undo_groups().count(), 2);
        assert!(doc.undo().unwrap());
        assert_eq!(doc.text(), "ab");
        assert!(doc.undo().unwrap());
        assert_eq!(doc.text(), "");
        assert!(!doc.undo().unwrap());
    }

    #[test]
    fn test_with_config_applies_history_settings() {
        let config = Config {
            history: HistorySettings {
                max_undo_groups: 1,
                merge_same_group_key: false,
            },
            ..Config::default()
        };
        let mut doc = Document::with_config("", &config);
        handle_default_typing(&mut doc, "a").unwrap();
        handle_default_typing(&mut doc, "b").unwrap();

        assert_eq!(doc.history().undo_groups().count(), 1);
        assert!(doc.undo().unwrap());
        assert_eq!(doc.text(), "a");
        assert!(!doc.undo().unwrap());
    }
}
