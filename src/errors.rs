use thiserror::Error;

use crate::driver::hierarchy::ViewHierarchy;

/// Errors raised while interpreting a flow.
///
/// `CommandSkipped` is a control signal, not a user-visible failure: the
/// flow driver turns it into an `on_command_skipped` callback and moves on.
#[derive(Debug, Error)]
pub enum OrchestraError {
    #[error("element not found: {description}")]
    ElementNotFound {
        description: String,
        hierarchy: ViewHierarchy,
    },

    #[error("assertion failed: {description}")]
    AssertionFailure {
        description: String,
        hierarchy: ViewHierarchy,
    },

    #[error("outgoing request assertion failed: {description}")]
    OutgoingRequestAssertionFailure { description: String },

    #[error("unable to clear state for app {app_id}")]
    UnableToClearState {
        app_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unable to launch app {app_id}")]
    UnableToLaunchApp {
        app_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unable to copy text from element: {description}")]
    UnableToCopyTextFromElement { description: String },

    #[error("unicode input is not supported by this driver: {text}")]
    UnicodeNotSupported { text: String },

    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("script error: {0}")]
    Script(String),

    #[error("command skipped")]
    CommandSkipped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type OrchestraResult<T> = Result<T, OrchestraError>;
