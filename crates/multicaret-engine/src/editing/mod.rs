/*!
 * # Editing Core Module
 *
 * The document model the caret engine edits, and the edit algebra every change flows through.
 *
 * ## Architecture Overview
 *
 * ### 1. Single Source of Truth: xi-rope Buffer
 * - The entire document text lives in one **`xi_rope::Rope`**
 * - Offsets everywhere are byte offsets into that rope
 *
 * ### 2. Operations, not Deltas
 * - Every change is an **`Operation`**: retain/replace segments carrying the text they replace
 * - Operations compose, transform against each other, invert for undo, and map offsets
 *   without looking at text, which is what lets carets and anchors follow edits
 *
 * ### 3. Commands
 * - Single edits are **`Cmd`** values compiled into operations
 * - Multi-caret commands (`handle_default_typing`, `delete_backward`, ...) build one operation
 *   for all carets and run against anything implementing **`CaretEditor`**: the real document
 *   or a per-caret transient editor
 *
 * ### 4. Anchors and Range Markers
 * - Tracked points and intervals, rebased on every edit with their sticky bias
 * - Mutation-lifetime entries die with the command that created them
 *
 * ### 5. History
 * - Commands group their edits into undo groups; checkpoints split groups
 *
 * ## Module Structure
 *
 * - **`operation`**: `Operation`, `Segment`, `StickyBias`
 * - **`anchors`**: `AnchorStorage` and friends
 * - **`history`**: undo groups, checkpoints, undo/redo stacks
 * - **`document`**: `Document`, the buffer plus carets, anchors and history
 * - **`commands`**: `Cmd`, `CaretEditor` and the multi-caret editor commands
 * - **`patch`**: what one applied edit changed
 *
 * ## Usage Pattern
 *
 * ```rust
 * use multicaret_engine::carets::CaretPosition;
 * use multicaret_engine::editing::*;
 *
 * let mut doc = Document::from_bytes(b"one two").unwrap();
 * doc.set_carets(&[CaretPosition::at(3), CaretPosition::at(7)]);
 *
 * handle_default_typing(&mut doc, "!").unwrap();
 * assert_eq!(doc.text(), "one! two!");
 *
 * doc.undo().unwrap();
 * assert_eq!(doc.text(), "one two");
 * ```
 */

pub mod anchors;
pub mod commands;
pub mod document;
pub mod history;
pub mod operation;
pub mod patch;

pub use anchors::{
    Anchor, AnchorBatch, AnchorId, AnchorLifetime, AnchorStorage, RangeMarker, RangeMarkerId,
};
pub use commands::{
    CaretEditor, Cmd, delete_backward, delete_forward, handle_default_typing, insert_at_all_carets,
};
pub use document::{Document, DocumentKind};
pub use history::{CommandKind, History, UndoGroup};
pub use operation::{Operation, Segment, StickyBias};
pub use patch::Patch;
