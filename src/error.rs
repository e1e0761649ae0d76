use thiserror::Error;

use crate::planner::RunStatus;

/// Errors raised by the planning engine and its run controller.
///
/// Failures of an individual generation call are modelled separately by
/// [`ExecutionError`]; only the ones that escalate (a fatal executor error)
/// surface here.
///
/// # Examples
///
/// ```
/// use novel_goap::{GoapError, RunStatus};
///
/// let err = GoapError::InvalidTransition {
///     from: RunStatus::Completed,
///     operation: "start",
/// };
/// assert_eq!(format!("{}", err), "Invalid transition: cannot start a run that is completed");
/// ```
#[derive(Error, Debug)]
pub enum GoapError {
    /// An operation was called in a status that does not allow it
    #[error("Invalid transition: cannot {operation} a run that is {from}")]
    InvalidTransition {
        from: RunStatus,
        operation: &'static str,
    },

    /// The executor reported a fatal error; the run has been stopped
    #[error("Fatal execution error in action {action}: {message}")]
    Fatal { action: String, message: String },

    /// The persistence collaborator failed to store or load a snapshot
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The project context could not be assembled for a step
    #[error("Project context error: {0}")]
    Context(String),

    /// An action definition is malformed
    #[error("Invalid action {name}: {reason}")]
    InvalidAction { name: String, reason: String },

    /// Two catalog entries share the same name
    #[error("Action already in catalog: {0}")]
    DuplicateAction(String),

    /// Applying effects produced a state that breaks a world-state invariant
    #[error("World state invariant violated: {0}")]
    InvariantViolation(String),

    /// An effect could not be applied to the current state
    #[error("Cannot apply effect on {key}: {reason}")]
    EffectFailed { key: String, reason: String },

    /// No run is registered under the given id
    #[error("Unknown run: {0}")]
    UnknownRun(String),

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Result type alias for planning operations.
pub type Result<T> = std::result::Result<T, GoapError>;

/// Classification of a failed generation call.
///
/// The planner decides what to do with a failed step from the kind alone:
/// transient errors are retried, content errors wait for a human, fatal
/// errors stop the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Network failure, rate limit or timeout. Safe to retry.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Output was malformed or rejected. Retrying the same prompt will not help.
    #[error("Content error: {0}")]
    Content(String),

    /// Misconfiguration such as missing provider credentials.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl ExecutionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Fatal(_))
    }

    /// Short machine-friendly kind, used in log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Transient(_) => "transient",
            ExecutionError::Content(_) => "content",
            ExecutionError::Fatal(_) => "fatal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutionError::Transient(m) | ExecutionError::Content(m) | ExecutionError::Fatal(m) => {
                m
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_invalid_transition_display() {
        let err = GoapError::InvalidTransition {
            from: RunStatus::Running,
            operation: "start",
        };
        assert_eq!(
            format!("{}", err),
            "Invalid transition: cannot start a run that is running"
        );
    }

    #[test]
    fn test_fatal_display() {
        let err = GoapError::Fatal {
            action: "generate_title".to_string(),
            message: "missing api key".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Fatal execution error in action generate_title: missing api key"
        );
    }

    #[test]
    fn test_duplicate_action_display() {
        let err = GoapError::DuplicateAction("draft_chapters".to_string());
        assert_eq!(format!("{}", err), "Action already in catalog: draft_chapters");
    }

    #[test]
    fn test_execution_error_classification() {
        let transient = ExecutionError::Transient("rate limited".into());
        let content = ExecutionError::Content("empty output".into());
        let fatal = ExecutionError::Fatal("no credentials".into());

        assert!(transient.is_retryable());
        assert!(!content.is_retryable());
        assert!(!fatal.is_retryable());
        assert!(fatal.is_fatal());

        assert_eq!(transient.kind(), "transient");
        assert_eq!(content.kind(), "content");
        assert_eq!(fatal.kind(), "fatal");
        assert_eq!(content.message(), "empty output");
    }

    #[test]
    fn test_error_trait() {
        let err = GoapError::UnknownRun("abc".into());
        let _ = err.source(); // Should be None
    }
}
