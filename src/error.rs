// Error taxonomy for the tracker
// Lookup misses are Option::None, everything below is a real failure.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::temporal::AccountId;

/// Result type alias used throughout the library
pub type Result<T> = std::result::Result<T, TwackError>;

#[derive(Debug, Error)]
pub enum TwackError {
    /// Missing credential, unreadable or malformed config file
    #[error("configuration error: {0}")]
    Config(String),

    /// Diff invoked with non-increasing timestamps (caller bug)
    #[error("loads out of order: previous {prev} is not before current {curr}")]
    Ordering {
        prev: DateTime<Utc>,
        curr: DateTime<Utc>,
    },

    #[error("cannot diff loads of different accounts ({left} vs {right})")]
    AccountMismatch { left: AccountId, right: AccountId },

    #[error("account {account_id} already has a load at {at}")]
    DuplicateLoad {
        account_id: AccountId,
        at: DateTime<Utc>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row that cannot be decoded (bad timestamp, unknown verb)
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("api error: {0}")]
    Api(String),
}

impl TwackError {
    /// True for errors raised by a unique index (duplicate load instant)
    pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<ureq::Error> for TwackError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, resp) => {
                TwackError::Api(format!("{} returned HTTP {}", resp.get_url(), code))
            }
            ureq::Error::Transport(t) => TwackError::Api(t.to_string()),
        }
    }
}
