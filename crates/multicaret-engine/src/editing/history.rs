use std::collections::VecDeque;

use multicaret_config::HistorySettings;
use serde::Serialize;

use crate::carets::MultiCaretData;
use crate::editing::operation::Operation;
use crate::error::Result;

/// What kind of user action produced an undo group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CommandKind {
    Typing,
    Deletion,
    Paste,
    Other,
}

/// One undoable unit: the composed operation plus the carets around it
#[derive(Clone, Debug, PartialEq)]
pub struct UndoGroup {
    pub kind: CommandKind,
    pub group_key: Option<String>,
    pub operation: Operation,
    pub carets_before: MultiCaretData,
    pub carets_after: MultiCaretData,
    /// Sealed groups never absorb later edits
    sealed: bool,
}

impl UndoGroup {
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn accepts(&self, kind: CommandKind, group_key: Option<&str>) -> bool {
        !self.sealed
            && self.kind == kind
            && group_key.is_some()
            && self.group_key.as_deref() == group_key
    }
}

#[derive(Debug)]
struct OpenCommand {
    kind: CommandKind,
    group_key: Option<String>,
    depth: usize,
    carets_before: MultiCaretData,
    /// Whether the top of the undo stack belongs to this command
    has_group: bool,
}

/// Undo and redo stacks for one persistent document
#[derive(Debug)]
pub struct History {
    settings: HistorySettings,
    undo: VecDeque<UndoGroup>,
    redo: Vec<UndoGroup>,
    open: Option<OpenCommand>,
    checkpoints: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HistorySettings::default())
    }
}

impl History {
    pub fn new(settings: HistorySettings) -> Self {
        Self {
            settings,
            undo: VecDeque::new(),
            redo: Vec::new(),
            open: None,
            checkpoints: 0,
        }
    }

    /// Enter a command; nested calls join the outermost one
    pub fn begin(&mut self, kind: CommandKind, group_key: Option<&str>, carets: &MultiCaretData) {
        match &mut self.open {
            Some(open) => open.depth += 1,
            None => {
                self.open = Some(OpenCommand {
                    kind,
                    group_key: group_key.map(str::to_string),
                    depth: 1,
                    carets_before: carets.clone(),
                    has_group: false,
                })
            }
        }
    }

    /// Leave a command; returns true when the outermost command just ended
    ///
    /// `carets` become the closing caret state of the command's undo group.
    pub fn end(&mut self, carets: &MultiCaretData) -> bool {
        let Some(open) = &mut self.open else {
            return false;
        };
        open.depth -= 1;
        if open.depth > 0 {
            return false;
        }
        if open.has_group
            && let Some(last) = self.undo.back_mut()
        {
            last.carets_after = carets.clone();
        }
        self.open = None;
        true
    }

    pub fn in_command(&self) -> bool {
        self.open.is_some()
    }

    /// Record an applied edit
    pub fn record(
        &mut self,
        operation: &Operation,
        carets_before: &MultiCaretData,
        carets_after: &MultiCaretData,
    ) -> Result<()> {
        if operation.is_identity() {
            return Ok(());
        }
        self.redo.clear();

        let Some(open) = &mut self.open else {
            self.push(UndoGroup {
                kind: CommandKind::Other,
                group_key: None,
                operation: operation.clone(),
                carets_before: carets_before.clone(),
                carets_after: carets_after.clone(),
                sealed: false,
            });
            return Ok(());
        };

        let joins_last = open.has_group
            || (self.settings.merge_same_group_key
                && self
                    .undo
                    .back()
                    .is_some_and(|last| last.accepts(open.kind, open.group_key.as_deref())));
        open.has_group = true;

        if joins_last && let Some(last) = self.undo.back_mut() {
            last.operation = last.operation.compose(operation)?;
            last.carets_after = carets_after.clone();
            return Ok(());
        }

        let group = UndoGroup {
            kind: open.kind,
            group_key: open.group_key.clone(),
            operation: operation.clone(),
            carets_before: open.carets_before.clone(),
            carets_after: carets_after.clone(),
            sealed: false,
        };
        self.push(group);
        Ok(())
    }

    /// Close the current group so later edits start a new one
    pub fn checkpoint(&mut self, carets: &MultiCaretData) {
        self.checkpoints += 1;
        if let Some(last) = self.undo.back_mut() {
            last.sealed = true;
        }
        if let Some(open) = &mut self.open {
            open.has_group = false;
            open.carets_before = carets.clone();
        }
        log::debug!(
            "history checkpoint #{} ({} undo groups)",
            self.checkpoints,
            self.undo.len()
        );
    }

    pub fn checkpoints(&self) -> usize {
        self.checkpoints
    }

    pub fn undo_groups(&self) -> impl Iterator<Item = &UndoGroup> {
        self.undo.iter()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub(crate) fn peek_undo(&self) -> Option<&UndoGroup> {
        self.undo.back()
    }

    pub(crate) fn peek_redo(&self) -> Option<&UndoGroup> {
        self.redo.last()
    }

    /// Move the newest undo group onto the redo stack
    pub(crate) fn commit_undo(&mut self) {
        if let Some(mut group) = self.undo.pop_back() {
            group.sealed = true;
            self.redo.push(group);
        }
    }

    /// Move the newest redo group back onto the undo stack
    pub(crate) fn commit_redo(&mut self) {
        if let Some(group) = self.redo.pop() {
            self.push(group);
        }
    }

    fn push(&mut self, group: UndoGroup) {
        self.undo.push_back(group);
        while self.undo.len() > self.settings.max_undo_groups {
            self.undo.pop_front();
        }
    }
}
