use thiserror::Error;

use crate::constants::{MAX_ERROR_MESSAGE_CHARS, USER_REJECTION_PATTERNS};
use crate::types::{CreatedObject, ObjectId};

/// Typed error hierarchy for the margin engine.
///
/// Library-internal errors use specific variants; application code wraps with
/// `anyhow::Context` for propagation.
#[derive(Error, Debug)]
pub enum EngineError {
    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error("unknown coin: {0}")]
    UnknownCoin(String),

    // -- Input --------------------------------------------------------------
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("no price available for {0}")]
    MissingPrice(String),

    // -- Decoding -----------------------------------------------------------
    #[error("decode error: {reason}")]
    Decode { reason: String },

    // -- Ledger -------------------------------------------------------------
    #[error("simulation failed: {reason}")]
    Simulation { reason: String },

    #[error("execution failed: {message}")]
    Execution { message: String },

    #[error("request cancelled by signer")]
    UserRejected,

    #[error("no position container found in execution effects")]
    ContainerNotCreated,

    #[error("operation cancelled")]
    Cancelled,

    // -- Collaborators ------------------------------------------------------
    #[error("metadata store error: {reason}")]
    Store { reason: String },

    #[error("oracle error: {reason}")]
    Oracle { reason: String },

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// How a submitted plan ended, as reported to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Applied by the ledger.
    Executed {
        digest: String,
        created: Vec<CreatedObject>,
        container_id: Option<ObjectId>,
    },
    /// The signer declined. Neutral status, not an error.
    Cancelled,
    /// Any other failure, message already truncated for display.
    Failed { message: String },
}

impl SubmissionOutcome {
    /// Classify a remote failure message into `Cancelled` or `Failed`.
    pub fn from_failure(message: &str) -> Self {
        if is_user_rejection(message) {
            Self::Cancelled
        } else {
            Self::Failed {
                message: truncate_message(message),
            }
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

/// Whether a failure message means the signer declined the request.
pub fn is_user_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    USER_REJECTION_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Cut a message to the display limit on a char boundary.
pub fn truncate_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_MESSAGE_CHARS - 3).collect();
    out.push_str("...");
    out
}
