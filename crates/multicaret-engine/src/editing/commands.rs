use std::ops::Range;

use crate::carets::{Caret, CaretMove, CaretPosition};
use crate::editing::history::CommandKind;
use crate::editing::operation::{Operation, Segment};
use crate::error::{EditorError, Result};

/// Single edits that can be applied to a document
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    InsertText { at: usize, text: String },
    DeleteRange { range: Range<usize> },
    ReplaceRange { range: Range<usize>, text: String },
}

/// Compile a command into an operation against `text_len` bytes of current text
///
/// `slice` reads the text the command replaces, so the operation carries it for validation.
pub(crate) fn compile_command(
    cmd: &Cmd,
    text_len: usize,
    slice: impl Fn(Range<usize>) -> Result<String>,
) -> Result<Operation> {
    let (range, new) = match cmd {
        Cmd::InsertText { at, text } => (*at..*at, text.as_str()),
        Cmd::DeleteRange { range } => (range.clone(), ""),
        Cmd::ReplaceRange { range, text } => (range.clone(), text.as_str()),
    };
    if range.start > range.end || range.end > text_len {
        return Err(EditorError::OperationMismatch {
            offset: range.start,
            reason: format!("range {range:?} outside text of length {text_len}"),
        });
    }
    let old = slice(range.clone())?;
    Ok(Operation::replace(range.start, &old, new))
}

/// Anything multi-caret commands can run against: the real document or a transient editor
pub trait CaretEditor {
    fn text_len(&self) -> usize;

    fn slice_text(&self, range: Range<usize>) -> Result<String>;

    /// Start of the character ending at `offset`
    fn prev_char_boundary(&self, offset: usize) -> Option<usize>;

    /// End of the character starting at `offset`
    fn next_char_boundary(&self, offset: usize) -> Option<usize>;

    /// Carets in offset order
    fn caret_list(&self) -> Vec<Caret>;

    fn apply_operation(&mut self, op: &Operation) -> Result<()>;

    fn relocate_carets(&mut self, moves: &[CaretMove]) -> Result<()>;

    /// Run `f` as one undoable command
    fn in_command<R>(
        &mut self,
        kind: CommandKind,
        group_key: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R>
    where
        Self: Sized;
}

/// Replace every caret's selection with `text`, leaving an empty caret after it
pub fn handle_default_typing<E: CaretEditor>(editor: &mut E, text: &str) -> Result<()> {
    editor.in_command(CommandKind::Typing, Some("typing"), |editor| {
        edit_at_carets(editor, |_, caret| {
            Ok(Some((caret.selection(), text.to_string())))
        })
    })
}

/// Insert `text` at every caret offset, leaving an empty caret after it
pub fn insert_at_all_carets<E: CaretEditor>(editor: &mut E, text: &str) -> Result<()> {
    editor.in_command(CommandKind::Paste, None, |editor| {
        edit_at_carets(editor, |_, caret| {
            Ok(Some((caret.offset()..caret.offset(), text.to_string())))
        })
    })
}

/// Backspace: delete each selection, or the character before each empty caret
pub fn delete_backward<E: CaretEditor>(editor: &mut E) -> Result<()> {
    editor.in_command(CommandKind::Deletion, Some("delete-backward"), |editor| {
        edit_at_carets(editor, |editor, caret| {
            if caret.position().has_selection() {
                return Ok(Some((caret.selection(), String::new())));
            }
            Ok(editor
                .prev_char_boundary(caret.offset())
                .map(|start| (start..caret.offset(), String::new())))
        })
    })
}

/// Delete each selection, or the character after each empty caret
pub fn delete_forward<E: CaretEditor>(editor: &mut E) -> Result<()> {
    editor.in_command(CommandKind::Deletion, Some("delete-forward"), |editor| {
        edit_at_carets(editor, |editor, caret| {
            if caret.position().has_selection() {
                return Ok(Some((caret.selection(), String::new())));
            }
            Ok(editor
                .next_char_boundary(caret.offset())
                .map(|end| (caret.offset()..end, String::new())))
        })
    })
}

/// Build one operation from a replacement per caret, apply it, then park each caret after its text
fn edit_at_carets<E: CaretEditor>(
    editor: &mut E,
    mut replacement: impl FnMut(&E, &Caret) -> Result<Option<(Range<usize>, String)>>,
) -> Result<()> {
    let mut segments = Vec::new();
    let mut moves = Vec::new();
    let mut pos = 0;
    let mut shift: isize = 0;

    for caret in editor.caret_list() {
        let Some((range, new)) = replacement(&*editor, &caret)? else {
            continue;
        };
        if range.start < pos {
            continue;
        }
        let old = editor.slice_text(range.clone())?;

        let target = (range.start as isize + shift) as usize + new.len();
        moves.push(CaretMove::new(caret.id(), CaretPosition::at(target)));
        shift += new.len() as isize - old.len() as isize;

        segments.push(Segment::Retain(range.start - pos));
        segments.push(Segment::Replace { old, new });
        pos = range.end;
    }

    let op = Operation::from_segments(segments);
    editor.apply_operation(&op)?;
    editor.relocate_carets(&moves)
}
