//! Capability interface implemented by each condition kind

use crate::assessment::{AssessmentLevel, ScoringType};
use crate::error::ConditionError;
use crate::events::{EventKind, SimEvent};
use crate::subject::Subject;

use super::context::PredicateContext;

/// Which predicate-owned timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFired {
    /// The single-slot timer, with the key it was scheduled for
    Slot(u64),
    /// The duration watchdog exceeded its budget
    Watchdog,
}

/// Outcome of evaluating one event or timer
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationDelta {
    /// Nothing the core needs to act on
    None,
    /// The subject is failing the condition
    Violating(Subject),
    /// The subject satisfies the condition
    Compliant(Subject),
    /// Set the level and explanation directly, bypassing violator tracking
    Assess {
        level: AssessmentLevel,
        explanation: Option<String>,
    },
    /// Set the level and explanation, then complete the condition
    Complete {
        level: AssessmentLevel,
        explanation: Option<String>,
    },
}

/// Domain rule layered on the condition core.
///
/// Predicates decide who is violating. The core owns everything else:
/// violator bookkeeping, scoring, level changes and notifications. All
/// methods run under the condition's lock.
pub trait ConditionPredicate: Send + 'static {
    /// Short identifier for logs and reports, e.g. `speed_limit`.
    fn kind(&self) -> &'static str;

    /// Event kinds this predicate evaluates. Fixed per kind.
    fn interests(&self) -> &'static [EventKind];

    /// Whether the condition can reach a completed state on its own.
    fn can_complete(&self) -> bool {
        false
    }

    /// Scorer categories this condition populates.
    fn scoring_types(&self) -> &'static [ScoringType] {
        &[ScoringType::Count, ScoringType::ViolationTime]
    }

    /// Whether violators go stale when their entity stops reporting.
    ///
    /// Predicates whose violations are not tied to a live entity stream
    /// return false and keep violators until they recover.
    fn tracks_staleness(&self) -> bool {
        true
    }

    /// Phrase appended to the violator names in explanations.
    fn violation_phrase(&self) -> &str;

    fn on_start(&mut self, _ctx: &mut PredicateContext<'_>) -> Result<(), ConditionError> {
        Ok(())
    }

    /// Evaluate an event from the interest set.
    fn evaluate(
        &mut self,
        event: &SimEvent,
        ctx: &mut PredicateContext<'_>,
    ) -> Result<ViolationDelta, ConditionError>;

    fn on_timer(&mut self, _fired: TimerFired, _ctx: &mut PredicateContext<'_>) -> ViolationDelta {
        ViolationDelta::None
    }

    /// Stale violators were evicted by the core.
    fn on_violators_evicted(&mut self, _evicted: &[Subject], _ctx: &mut PredicateContext<'_>) {}

    /// Level to settle on when the condition is stopped, if any.
    fn final_assessment(&mut self, _ctx: &mut PredicateContext<'_>) -> Option<AssessmentLevel> {
        None
    }
}
