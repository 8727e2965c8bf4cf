//! Application completed: the training application should finish within an
//! ideal duration
//!
//! A watchdog measures active application time; pause and resume markers
//! suspend it. Exceeding the ideal duration drops the level to below
//! expectation straight away. Completion ends the condition at below
//! expectation if the watchdog had fired and at expectation otherwise.

use std::time::Duration;

use tracing::debug;

use crate::assessment::{AssessmentLevel, ScoringType};
use crate::condition::{ConditionPredicate, PredicateContext, TimerFired, ViolationDelta};
use crate::error::ConditionError;
use crate::events::{EventKind, LifecyclePhase, SimEvent};
use crate::explanation;

const PHRASE: &str = "took longer than the ideal completion time";

pub struct ApplicationCompleted {
    ideal_duration: Duration,
    expired: bool,
    completed: bool,
}

impl ApplicationCompleted {
    pub fn new(ideal_duration: Duration) -> Self {
        Self {
            ideal_duration,
            expired: false,
            completed: false,
        }
    }

    fn overtime_explanation(ctx: &PredicateContext<'_>) -> Option<String> {
        let learner = ctx.learner();
        explanation::render([&learner], PHRASE)
    }
}

impl ConditionPredicate for ApplicationCompleted {
    fn kind(&self) -> &'static str {
        "application_completed"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::Lifecycle]
    }

    fn can_complete(&self) -> bool {
        true
    }

    fn scoring_types(&self) -> &'static [ScoringType] {
        &[ScoringType::CompletionTime]
    }

    fn violation_phrase(&self) -> &str {
        PHRASE
    }

    fn on_start(&mut self, ctx: &mut PredicateContext<'_>) -> Result<(), ConditionError> {
        ctx.start_watchdog(self.ideal_duration)
    }

    fn evaluate(
        &mut self,
        event: &SimEvent,
        ctx: &mut PredicateContext<'_>,
    ) -> Result<ViolationDelta, ConditionError> {
        let SimEvent::Lifecycle { phase } = event else {
            return Ok(ViolationDelta::None);
        };

        match phase {
            LifecyclePhase::Paused | LifecyclePhase::Stopped => {
                ctx.pause_watchdog();
                Ok(ViolationDelta::None)
            }
            LifecyclePhase::Started | LifecyclePhase::Resumed => {
                ctx.resume_watchdog();
                Ok(ViolationDelta::None)
            }
            LifecyclePhase::Completed => {
                debug!(
                    active = ?ctx.watchdog_elapsed(),
                    ideal = ?self.ideal_duration,
                    expired = self.expired,
                    "Application completed"
                );
                ctx.cancel_watchdog();
                self.completed = true;
                if self.expired {
                    Ok(ViolationDelta::Complete {
                        level: AssessmentLevel::BelowExpectation,
                        explanation: Self::overtime_explanation(ctx),
                    })
                } else {
                    Ok(ViolationDelta::Complete {
                        level: AssessmentLevel::AtExpectation,
                        explanation: None,
                    })
                }
            }
        }
    }

    fn on_timer(&mut self, fired: TimerFired, ctx: &mut PredicateContext<'_>) -> ViolationDelta {
        if fired != TimerFired::Watchdog || self.completed {
            return ViolationDelta::None;
        }
        self.expired = true;
        ViolationDelta::Assess {
            level: AssessmentLevel::BelowExpectation,
            explanation: Self::overtime_explanation(ctx),
        }
    }

    /// Stopped without the application ever completing.
    fn final_assessment(&mut self, _ctx: &mut PredicateContext<'_>) -> Option<AssessmentLevel> {
        (!self.completed).then_some(AssessmentLevel::BelowExpectation)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::assessment::ConditionState;
    use crate::condition::ConditionCore;
    use crate::notify::{ChannelNotifier, ConditionNotification};

    fn lifecycle(phase: LifecyclePhase) -> SimEvent {
        SimEvent::Lifecycle { phase }
    }

    fn condition(ideal_secs: u64) -> ConditionCore {
        ConditionCore::builder(
            "finish on time",
            ApplicationCompleted::new(Duration::from_secs(ideal_secs)),
        )
        .build()
    }

    #[tokio::test(start_paused = true)]
    async fn completing_on_time_is_at_expectation() {
        let condition = condition(60);
        let (notifier, mut rx) = ChannelNotifier::new();
        condition.initialize(Arc::new(notifier)).unwrap();
        condition.start().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(condition.handle_event(&lifecycle(LifecyclePhase::Completed)));

        assert_eq!(condition.state(), ConditionState::Completed);
        assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);
        assert_eq!(
            condition.scoring_report().completion_time,
            Some(Duration::from_secs(30))
        );

        assert!(matches!(
            rx.try_recv().unwrap(),
            ConditionNotification::AssessmentChanged(_)
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ConditionNotification::Completed(_)
        ));

        // The watchdog was cancelled with the condition.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn exceeding_ideal_duration_drops_level() {
        let condition = condition(60);
        condition.start().unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
        assert_eq!(
            condition.assessment_explanation().as_deref(),
            Some("{learner} took longer than the ideal completion time")
        );

        assert!(!condition.handle_event(&lifecycle(LifecyclePhase::Completed)));
        assert_eq!(condition.state(), ConditionState::Completed);
        assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_time_is_not_counted() {
        let condition = condition(60);
        condition.start().unwrap();

        tokio::time::sleep(Duration::from_secs(50)).await;
        condition.handle_event(&lifecycle(LifecyclePhase::Paused));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::Unknown);

        condition.handle_event(&lifecycle(LifecyclePhase::Resumed));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::Unknown);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_before_completion_is_below_expectation() {
        let condition = condition(60);
        condition.start().unwrap();

        assert!(condition.stop().unwrap());
        assert_eq!(condition.state(), ConditionState::Stopped);
        assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
    }
}
