//! Error taxonomy for the triage pipeline.
//!
//! Nothing in this crate retries. Every error propagates to the caller and
//! the binary maps it onto a process exit code via [`TriageError::exit_code`].
//!
//! | Variant             | Raised by          | Exit code |
//! |---------------------|--------------------|-----------|
//! | `NotFound`          | ticketing client   | 2         |
//! | `Transport`         | ticketing client   | 3         |
//! | `MalformedResponse` | ticketing client   | 3         |
//! | `MalformedRecord`   | record parsing     | 3         |
//! | `ModelCall`         | model client/agent | 3         |
//! | `NotImplemented`    | placeholder agents | 4         |
//! | `Configuration`     | config loading     | 5         |
//! | anything else       |                    | 1         |

use thiserror::Error;

/// Result alias used throughout the library.
pub type TriageResult<T> = Result<T, TriageError>;

/// Exit code for errors that do not fit a more specific bucket.
pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_NOT_FOUND: i32 = 2;
pub const EXIT_UPSTREAM: i32 = 3;
pub const EXIT_NOT_IMPLEMENTED: i32 = 4;
pub const EXIT_CONFIGURATION: i32 = 5;

#[derive(Debug, Error)]
pub enum TriageError {
    /// A single-record lookup returned zero rows.
    #[error("{table} record with sys_id {sys_id} not found")]
    NotFound { table: String, sys_id: String },

    /// The ticketing API could not be reached or answered with a non-success status.
    #[error("ticketing request to {url} failed{}: {message}", status_suffix(.status))]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// The ticketing API answered 2xx but the body is not a table response.
    #[error("malformed ticketing response: {0}")]
    MalformedResponse(String),

    /// A row is missing a required field or carries an unparseable value.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The model call failed in transport, timed out, or returned unparseable output.
    #[error("model call failed: {0}")]
    ModelCall(String),

    /// The agent variant has no analysis logic yet.
    #[error("agent `{agent}` is not implemented")]
    NotImplemented { agent: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value failed construction-time validation.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("agent key `{0}` is already registered")]
    DuplicateAgent(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl TriageError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => EXIT_NOT_FOUND,
            Self::Transport { .. }
            | Self::MalformedResponse(_)
            | Self::MalformedRecord(_)
            | Self::ModelCall(_) => EXIT_UPSTREAM,
            Self::NotImplemented { .. } => EXIT_NOT_IMPLEMENTED,
            Self::Configuration(_) => EXIT_CONFIGURATION,
            Self::Validation(_) | Self::DuplicateAgent(_) => EXIT_GENERIC,
        }
    }

    /// Build a `Transport` variant conveniently.
    pub fn transport(
        url: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by a `Transport` error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}
