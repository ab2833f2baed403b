//! Error type shared by the backend adapter, the synchroniser and both front ends.

use thiserror::Error;

/// Everything that can go wrong between the dashboard and the backend.
#[derive(Debug, Error)]
pub enum Error {
    /// A full fetch could not be completed; the UI shows a blocking error screen.
    #[error("could not connect to the backend: {0}")]
    Connection(String),

    /// A required form field was empty; nothing was written.
    #[error("{field} is required")]
    Validation { field: &'static str },

    /// A form field held something that could not be interpreted.
    #[error("{field} '{value}' is not valid")]
    Invalid { field: &'static str, value: String },

    /// An insert, update or delete was rejected or never reached the backend.
    #[error("{op} failed: {message}")]
    Write { op: String, message: String },

    /// The realtime change feed broke.
    #[error("realtime feed: {0}")]
    Realtime(String),

    /// A department, task or member reference did not resolve.
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(field: &'static str) -> Self {
        Error::Validation { field }
    }

    pub fn write(op: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Write {
            op: op.into(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::Invalid { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failure() {
        assert_eq!(Error::validation("Title").to_string(), "Title is required");
        assert_eq!(
            Error::Connection("HTTP 500".into()).to_string(),
            "could not connect to the backend: HTTP 500"
        );
        let err = Error::write("delete task 7", "HTTP 404");
        assert_eq!(err.to_string(), "delete task 7 failed: HTTP 404");
        assert!(!err.is_validation());
        let bad_date = Error::Invalid { field: "Due date", value: "someday".into() };
        assert_eq!(bad_date.to_string(), "Due date 'someday' is not valid");
        assert!(bad_date.is_validation());
    }
}
