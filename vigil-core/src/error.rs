//! Error types for vigil-core

use thiserror::Error;

use crate::assessment::ConditionState;

/// Errors raised while building a condition from its configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Condition '{condition}' references team member '{member}' but no team roster was provided")]
    MissingRoster { condition: String, member: String },

    #[error("Condition '{condition}' references team member '{member}' that isn't in the team roster")]
    UnknownTeamMember { condition: String, member: String },

    #[error("Duplicate authored rule in condition '{condition}': {rule}")]
    DuplicateRule { condition: String, rule: String },

    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a condition during its lifecycle
#[derive(Error, Debug)]
pub enum ConditionError {
    #[error("Condition is already initialized")]
    AlreadyInitialized,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ConditionState,
        to: ConditionState,
    },

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),
}

/// Errors from the timer subsystem
#[derive(Error, Debug)]
pub enum TimerError {
    #[error("No async runtime is available to drive the timer worker")]
    NoRuntime,

    #[error("Timer callback failed: {0}")]
    CallbackFailed(String),
}
