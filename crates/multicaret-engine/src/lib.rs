pub mod carets;
pub mod editing;
pub mod error;
pub mod transient;

// Re-export key types for easier usage
pub use carets::{Caret, CaretId, CaretMove, CaretPosition, MultiCaretData};
pub use editing::{Cmd, Document, Operation, Patch, StickyBias};
pub use error::{EditorError, Result};
pub use transient::{PerCaretOrchestrator, RunSummary, TransientEditor, for_each_caret};
