use thiserror::Error;

/// Crate-wide error type.
///
/// `Clone` is required: a coalesced mutation hands the same result to every
/// duplicate caller through a shared future, and batch outcomes carry the
/// per-item failure reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid mutation state transition: {0}")]
    InvalidState(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl<T> From<std::sync::PoisonError<T>> for SyncError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
