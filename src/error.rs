//! Error types for vote-lock

use crate::models::PollId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Poll not found: {0}")]
    PollNotFound(PollId),

    #[error("Invalid option for this poll: {option}")]
    InvalidOption { poll_id: PollId, option: String },

    #[error("Poll {poll_id} is busy, gave up after {attempts} attempts")]
    Busy { poll_id: PollId, attempts: u32 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Malformed input. Never retried; always fixable by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Question must be at least {min} characters long.")]
    QuestionTooShort { min: usize },

    #[error("Question must be at most {max} characters long.")]
    QuestionTooLong { max: usize },

    #[error("At least two options are required.")]
    TooFewOptions,

    #[error("Voter id must be at least {min} characters long.")]
    VoterIdTooShort { min: usize },

    #[error("Poll id must not be empty.")]
    EmptyPollId,
}

/// Coarse classification of an [`Error`] for callers deciding what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix your input.
    Invalid,
    /// The poll does not exist.
    NotFound,
    /// Try again later.
    Transient,
    /// Infrastructure fault.
    Unavailable,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::InvalidOption { .. } => ErrorKind::Invalid,
            Error::PollNotFound(_) => ErrorKind::NotFound,
            Error::Busy { .. } => ErrorKind::Transient,
            Error::StorageUnavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Is this worth resubmitting unchanged later?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::StorageUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::StorageUnavailable(format!("corrupt record: {}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::StorageUnavailable("poll lock poisoned".to_string())
    }
}
