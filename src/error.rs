use thiserror::Error;

/// Failures surfaced by storage backends and the repositories on top of them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached. Backend implementations outside this
    /// crate report their own failures through this variant.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A conditional write kept losing to concurrent writers.
    #[error("conflicting concurrent update")]
    Conflict,
}

/// Why a grant did not happen. A failed grant leaves the domain blocked; the
/// caller must not start a countdown.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("grant duration must be a positive number of minutes")]
    InvalidDuration,

    #[error("not a usable domain: {0:?}")]
    InvalidDomain(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a block-list edit was rejected.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("not a valid domain: {0:?}")]
    InvalidDomain(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
