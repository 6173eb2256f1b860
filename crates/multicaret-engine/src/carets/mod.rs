//! Caret values and caret sets
//!
//! - **`position`**: `CaretPosition`, an offset plus the selection it bounds
//! - **`caret`**: `Caret` identity wrapper and `CaretMove` requests
//! - **`multi_caret`**: `MultiCaretData`, the merged caret set and its merge decision table
//! - **`subset`**: `CaretSubset`, a scoped view mirroring mutations into the full set

pub mod caret;
pub mod multi_caret;
pub mod position;
pub mod subset;

pub use caret::{Caret, CaretId, CaretMove};
pub use multi_caret::{MergeDecision, MultiCaretData, merge_carets};
pub use position::CaretPosition;
pub use subset::CaretSubset;
