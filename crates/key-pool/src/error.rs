//! Error types for key rotation

/// Terminal outcomes of a rotated call. Rate limits never appear here
/// individually; they either recover through rotation or end as
/// `Exhausted` / `NoBackupKeys`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no API keys configured")]
    NoKeys,

    #[error("no backup keys available")]
    NoBackupKeys,

    #[error("all {keys} API keys are rate limited after {attempts} attempts")]
    Exhausted { keys: usize, attempts: usize },

    #[error("API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// True when the failure means "no key could serve the request".
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Error::Exhausted { .. } | Error::NoBackupKeys)
    }
}

/// Result alias for rotation operations.
pub type Result<T> = std::result::Result<T, Error>;
