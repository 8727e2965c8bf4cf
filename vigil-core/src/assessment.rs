//! Assessment levels, condition lifecycle states and scoring categories

use serde::{Deserialize, Serialize};

/// Qualitative assessment produced by a condition.
///
/// Levels are compared by equality only; no ordering is implied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentLevel {
    #[default]
    Unknown,
    BelowExpectation,
    AtExpectation,
    AboveExpectation,
}

impl AssessmentLevel {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::BelowExpectation => "below_expectation",
            Self::AtExpectation => "at_expectation",
            Self::AboveExpectation => "above_expectation",
        }
    }
}

impl std::fmt::Display for AssessmentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a condition
///
/// ```text
/// Created ─► Initialized ─► Started ─► Assessing ─┬─► Completed
///    └────────────────────────┘            │       └─► Stopped
///                                          └──────────► (either)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionState {
    /// Built from configuration, not yet wired to a notifier
    Created,
    /// Notifier bound
    Initialized,
    /// Live evaluation started, no event handled yet
    Started,
    /// At least one event has been evaluated
    Assessing,
    /// The condition reached its own terminal outcome
    Completed,
    /// Externally stopped
    Stopped,
}

impl ConditionState {
    /// Whether events are evaluated in this state.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Started | Self::Assessing)
    }

    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Assessing => "assessing",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ConditionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// After-action-review scorer categories a condition type can populate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringType {
    /// Number of scoring events
    Count,
    /// Accumulated time spent violating
    ViolationTime,
    /// Time from start until the condition completed
    CompletionTime,
}
