//! Per-caret transient editors and the orchestrator that reconciles them
//!
//! Caller logic runs once per caret against a [`TransientEditor`], a private copy of the
//! document scoped to that caret. The logic is an `async` block whose only suspension point is
//! [`TransientEditor::commit`]; the [`PerCaretOrchestrator`] polls every block once per round,
//! applies the round's edits to the real document in a single edit and rebases each sandbox
//! onto the edits of all the others.

pub mod orchestrator;
pub mod sandbox;

pub use orchestrator::{PerCaretOrchestrator, RunSummary, for_each_caret};
pub use sandbox::{Commit, SandboxState, TransientEditor};
