use thiserror::Error;

/// Errors raised by the caret engine and the transient editors built on it
#[derive(Debug, Error)]
pub enum EditorError {
    /// A caret offset outside its own selection; always a caller bug
    #[error("caret offset {offset} lies outside its selection {selection_start}..{selection_end}")]
    InvalidCaretPosition {
        offset: usize,
        selection_start: usize,
        selection_end: usize,
    },

    #[error("cannot insert a line break into a single-line document")]
    NewlineInSingleLine,

    #[error("a transient document cannot parent another transient editor")]
    NestedTransient,

    /// The operation was built against different text than the one it is applied to
    #[error("operation does not match the document at offset {offset}: {reason}")]
    OperationMismatch { offset: usize, reason: String },

    /// First failure raised by per-caret logic; later failures ride along in `suppressed`
    #[error("per-caret logic failed: {source}")]
    CaretLogic {
        #[source]
        source: anyhow::Error,
        suppressed: Vec<anyhow::Error>,
    },

    #[error("per-caret logic suspended somewhere other than commit")]
    ForeignSuspension,

    #[error("multi-caret run did not finish within {max_rounds} rounds")]
    RoundLimitExceeded { max_rounds: usize },
}

impl EditorError {
    /// For a `CaretLogic` failure, the engine error that caused it (if it was one)
    pub fn caret_logic_cause(&self) -> Option<&EditorError> {
        match self {
            EditorError::CaretLogic { source, .. } => source.downcast_ref::<EditorError>(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;
