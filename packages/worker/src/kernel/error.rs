//! Structured errors for the worker.
//!
//! `WorkerError` is what the critical write path and the execution state
//! machine return. Collaborators (store, queue, evaluators) speak
//! `anyhow::Error`; those errors pass through `WorkerError::Store`
//! untouched.
//!
//! # The envelope rule
//!
//! Callers of `execute` never see a raw error from a handler. Failures are
//! converted into a [`SerializedError`] and placed in the result envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::common::RequestId;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The action contract is unknown, or it exists but has no handler.
    #[error("invalid action {action}: {reason}")]
    InvalidAction { action: String, reason: String },

    /// A referenced type, input, actor or target is missing.
    #[error("no such {kind}: {reference}")]
    NoElement {
        kind: &'static str,
        reference: String,
    },

    #[error("{subject} does not match its schema: {}", errors.join("; "))]
    SchemaMismatch { subject: String, errors: Vec<String> },

    /// A patch target does not carry a version.
    #[error("contract {slug} has no version")]
    InvalidVersion { slug: String },

    #[error("invalid ISO-8601 duration: {interval:?}")]
    InvalidDuration { interval: String },

    /// The terminal result event could not be posted; whoever waits on the
    /// request would hang.
    #[error("could not post the result of request {request}: {source}")]
    NoExecuteEvent {
        request: RequestId,
        #[source]
        source: anyhow::Error,
    },

    #[error("type {type_ref} has no schema")]
    NoSuchType { type_ref: String },

    #[error("slug {slug} is provided by more than one plugin: {}", plugins.join(", "))]
    DuplicateSlug { slug: String, plugins: Vec<String> },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// An anticipated business condition (e.g. a duplicate username).
    #[error("{message}")]
    Rejected { message: String },

    /// Store-native failures (permissions, conflicts, backend).
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl WorkerError {
    pub fn no_element(kind: &'static str, reference: impl ToString) -> Self {
        WorkerError::NoElement {
            kind,
            reference: reference.to_string(),
        }
    }

    pub fn invalid_action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkerError::InvalidAction {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        WorkerError::Rejected {
            message: message.into(),
        }
    }

    /// Recovers a `WorkerError` that travelled through `anyhow`; anything
    /// else becomes [`WorkerError::Store`].
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        match error.downcast::<WorkerError>() {
            Ok(worker_error) => worker_error,
            Err(error) => WorkerError::Store(error),
        }
    }

    /// Stable taxonomy tag, used as `name` in serialized errors.
    pub fn name(&self) -> &'static str {
        match self {
            WorkerError::InvalidAction { .. } => "InvalidAction",
            WorkerError::NoElement { .. } => "NoElement",
            WorkerError::SchemaMismatch { .. } => "SchemaMismatch",
            WorkerError::InvalidVersion { .. } => "InvalidVersion",
            WorkerError::InvalidDuration { .. } => "InvalidDuration",
            WorkerError::NoExecuteEvent { .. } => "NoExecuteEvent",
            WorkerError::NoSuchType { .. } => "NoSuchType",
            WorkerError::DuplicateSlug { .. } => "DuplicateSlug",
            WorkerError::InvalidSchema { .. } => "InvalidSchema",
            WorkerError::Rejected { .. } => "Rejected",
            WorkerError::Store(_) => "StoreError",
        }
    }

    /// Expected errors are business conditions, logged below `error`.
    pub fn is_expected(&self) -> bool {
        matches!(self, WorkerError::Rejected { .. })
    }
}

/// Wire shape of an error inside an action result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub expected: bool,
}

impl SerializedError {
    /// Serializes any error, recognising `WorkerError`s wrapped in `anyhow`.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<WorkerError>() {
            Some(worker_error) => Self::from(worker_error),
            None => Self {
                name: "Error".to_string(),
                message: format!("{:#}", error),
                expected: false,
            },
        }
    }
}

impl From<&WorkerError> for SerializedError {
    fn from(error: &WorkerError) -> Self {
        Self {
            name: error.name().to_string(),
            message: error.to_string(),
            expected: error.is_expected(),
        }
    }
}

/// Logs a failure at `warn` when it is expected and `error` otherwise.
pub(crate) fn log_failure(context: &str, error: &SerializedError) {
    if error.expected {
        warn!(error.name = %error.name, error = %error.message, "{}", context);
    } else {
        error!(error.name = %error.name, error = %error.message, "{}", context);
    }
}
