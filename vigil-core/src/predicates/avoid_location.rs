//! Avoid location: entities must stay outside a sphere

use crate::condition::{ConditionPredicate, PredicateContext, ViolationDelta};
use crate::error::ConditionError;
use crate::events::{EventKind, SimEvent, magnitude};

pub struct AvoidLocation {
    center: [f64; 3],
    radius_m: f64,
}

impl AvoidLocation {
    pub fn new(center: [f64; 3], radius_m: f64) -> Self {
        Self { center, radius_m }
    }

    fn distance(&self, position: &[f64; 3]) -> f64 {
        magnitude(&[
            position[0] - self.center[0],
            position[1] - self.center[1],
            position[2] - self.center[2],
        ])
    }
}

impl ConditionPredicate for AvoidLocation {
    fn kind(&self) -> &'static str {
        "avoid_location"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::EntityState]
    }

    fn violation_phrase(&self) -> &str {
        "entered a location to avoid"
    }

    fn evaluate(
        &mut self,
        event: &SimEvent,
        ctx: &mut PredicateContext<'_>,
    ) -> Result<ViolationDelta, ConditionError> {
        let SimEvent::EntityState {
            entity, position, ..
        } = event
        else {
            return Ok(ViolationDelta::None);
        };

        let Some(subject) = ctx.resolve_subject(*entity) else {
            return Ok(ViolationDelta::None);
        };

        let distance = self.distance(position);
        if !distance.is_finite() {
            return Err(ConditionError::MalformedEvent(format!(
                "entity {entity} reported a non-finite position"
            )));
        }

        if distance <= self.radius_m {
            Ok(ViolationDelta::Violating(subject))
        } else {
            Ok(ViolationDelta::Compliant(subject))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::AssessmentLevel;
    use crate::condition::ConditionCore;
    use crate::subject::EntityId;

    fn at(entity: u64, x: f64) -> SimEvent {
        SimEvent::EntityState {
            entity: EntityId::new(entity),
            position: [x, 0.0, 0.0],
            velocity: [0.0; 3],
        }
    }

    #[test]
    fn distance_is_euclidean() {
        let predicate = AvoidLocation::new([1.0, 2.0, 3.0], 1.0);
        assert_eq!(predicate.distance(&[4.0, 6.0, 3.0]), 5.0);
    }

    #[tokio::test]
    async fn inside_radius_violates() {
        let condition = ConditionCore::builder(
            "minefield",
            AvoidLocation::new([100.0, 0.0, 0.0], 10.0),
        )
        .build();
        condition.start().unwrap();

        assert!(condition.handle_event(&at(1, 0.0)));
        assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);

        assert!(condition.handle_event(&at(1, 90.0)));
        assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
        assert_eq!(
            condition.assessment_explanation().as_deref(),
            Some("{learner} entered a location to avoid")
        );

        assert!(condition.handle_event(&at(1, 111.0)));
        assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);
    }

    #[tokio::test]
    async fn non_finite_position_is_ignored() {
        let condition =
            ConditionCore::builder("minefield", AvoidLocation::new([0.0; 3], 10.0)).build();
        condition.start().unwrap();

        assert!(!condition.handle_event(&at(1, f64::INFINITY)));
        assert_eq!(condition.violator_count(), 0);
    }
}
