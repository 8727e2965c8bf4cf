//! Slide dwell: the learner must stay on each slide for a minimum time
//!
//! Every slide change reschedules the single dwell timer, keyed by the new
//! slide. If that cancelled a pending timer, the previous slide was left
//! too early. A timer that fires means the current slide was dwelt on long
//! enough.

use std::time::Duration;

use tracing::debug;

use crate::condition::{ConditionPredicate, PredicateContext, TimerFired, ViolationDelta};
use crate::error::ConditionError;
use crate::events::{EventKind, SimEvent};

pub struct SlideDwell {
    min_dwell: Duration,
    current: Option<u32>,
}

impl SlideDwell {
    pub fn new(min_dwell: Duration) -> Self {
        Self {
            min_dwell,
            current: None,
        }
    }
}

impl ConditionPredicate for SlideDwell {
    fn kind(&self) -> &'static str {
        "slide_dwell"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::SlideChanged]
    }

    /// A slide has no entity behind it to go quiet.
    fn tracks_staleness(&self) -> bool {
        false
    }

    fn violation_phrase(&self) -> &str {
        "left a slide before the minimum dwell time"
    }

    fn evaluate(
        &mut self,
        event: &SimEvent,
        ctx: &mut PredicateContext<'_>,
    ) -> Result<ViolationDelta, ConditionError> {
        let SimEvent::SlideChanged { slide } = event else {
            return Ok(ViolationDelta::None);
        };
        if self.current == Some(*slide) {
            return Ok(ViolationDelta::None);
        }

        let left_early = ctx.schedule_slot(self.min_dwell, u64::from(*slide))?;
        let previous = self.current.replace(*slide);

        if left_early {
            debug!(?previous, next = slide, "Slide left before minimum dwell");
            return Ok(ViolationDelta::Violating(ctx.learner()));
        }
        Ok(ViolationDelta::None)
    }

    fn on_timer(&mut self, fired: TimerFired, ctx: &mut PredicateContext<'_>) -> ViolationDelta {
        match fired {
            TimerFired::Slot(slide) if self.current.map(u64::from) == Some(slide) => {
                ViolationDelta::Compliant(ctx.learner())
            }
            _ => ViolationDelta::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::AssessmentLevel;
    use crate::condition::ConditionCore;

    fn slide(slide: u32) -> SimEvent {
        SimEvent::SlideChanged { slide }
    }

    #[tokio::test(start_paused = true)]
    async fn dwelling_long_enough_is_compliant() {
        let condition =
            ConditionCore::builder("slides", SlideDwell::new(Duration::from_secs(10))).build();
        condition.start().unwrap();

        assert!(!condition.handle_event(&slide(1)));
        assert!(!condition.handle_event(&slide(1)));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);

        // Slide 1 was satisfied, so leaving it is not a violation.
        assert!(!condition.handle_event(&slide(2)));
        assert_eq!(condition.violator_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_early_violates_until_next_dwell() {
        let condition =
            ConditionCore::builder("slides", SlideDwell::new(Duration::from_secs(10))).build();
        condition.start().unwrap();

        condition.handle_event(&slide(1));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(condition.handle_event(&slide(2)));
        assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
        assert_eq!(
            condition.assessment_explanation().as_deref(),
            Some("{learner} left a slide before the minimum dwell time")
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);
        assert_eq!(condition.assessment_explanation(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn violation_outlives_stale_threshold() {
        let condition =
            ConditionCore::builder("slides", SlideDwell::new(Duration::from_secs(60)))
                .stale_after(Duration::from_secs(10))
                .stale_check_interval(Duration::from_secs(5))
                .build();
        condition.start().unwrap();

        condition.handle_event(&slide(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(condition.handle_event(&slide(2)));

        // No input for twice the stale threshold.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
        assert_eq!(condition.violator_count(), 1);
        assert!(condition.scoring_report().global.active);

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);
        assert_eq!(condition.violator_count(), 0);
    }
}
