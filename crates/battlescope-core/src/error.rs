use thiserror::Error;

/// Typed error kinds for the clustering core.
///
/// One enum, one `kind()` accessor, so an HTTP handler layer can map to a
/// status code without matching on the error itself.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("duplicate killmail {0}")]
    Duplicate(i64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A clustering invariant was violated during reconciliation. Never
    /// raised by the pure engine itself (it tolerates bad inputs) — only by
    /// the clusterer service when persisting would break a Battle invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorKind {
    Duplicate,
    NotFound,
    InvalidInput,
    Conflict,
    InvariantViolation,
    Internal,
}

impl CoreError {
    pub fn kind(&self) -> CoreErrorKind {
        match self {
            Self::Duplicate(_) => CoreErrorKind::Duplicate,
            Self::NotFound(_) => CoreErrorKind::NotFound,
            Self::InvalidInput(_) => CoreErrorKind::InvalidInput,
            Self::Conflict(_) => CoreErrorKind::Conflict,
            Self::InvariantViolation(_) => CoreErrorKind::InvariantViolation,
            Self::Internal(_) => CoreErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
