//! Speed limit: entities must not move faster than a maximum speed
//!
//! With a minimum speed configured, an entity that has once moved faster
//! than the minimum is also violating whenever it drops to or below it.

use std::collections::HashSet;

use crate::condition::{ConditionPredicate, PredicateContext, ViolationDelta};
use crate::error::ConditionError;
use crate::events::{EventKind, SimEvent, magnitude};
use crate::subject::{EntityId, Subject};

pub struct SpeedLimit {
    max_speed_mps: f64,
    min_speed_mps: Option<f64>,
    /// Entities that have exceeded the minimum speed at least once
    moving: HashSet<EntityId>,
}

impl SpeedLimit {
    pub fn new(max_speed_mps: f64, min_speed_mps: Option<f64>) -> Self {
        Self {
            max_speed_mps,
            min_speed_mps,
            moving: HashSet::new(),
        }
    }
}

impl ConditionPredicate for SpeedLimit {
    fn kind(&self) -> &'static str {
        "speed_limit"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::EntityState]
    }

    fn violation_phrase(&self) -> &str {
        "violated the speed limit"
    }

    fn evaluate(
        &mut self,
        event: &SimEvent,
        ctx: &mut PredicateContext<'_>,
    ) -> Result<ViolationDelta, ConditionError> {
        let SimEvent::EntityState {
            entity, velocity, ..
        } = event
        else {
            return Ok(ViolationDelta::None);
        };

        let Some(subject) = ctx.resolve_subject(*entity) else {
            return Ok(ViolationDelta::None);
        };

        let speed = magnitude(velocity);
        if !speed.is_finite() {
            return Err(ConditionError::MalformedEvent(format!(
                "entity {entity} reported a non-finite velocity"
            )));
        }

        if speed > self.max_speed_mps {
            return Ok(ViolationDelta::Violating(subject));
        }

        if let Some(min) = self.min_speed_mps {
            if speed > min {
                self.moving.insert(*entity);
            } else if self.moving.contains(entity) {
                return Ok(ViolationDelta::Violating(subject));
            }
        }

        Ok(ViolationDelta::Compliant(subject))
    }

    fn on_violators_evicted(&mut self, evicted: &[Subject], _ctx: &mut PredicateContext<'_>) {
        for subject in evicted {
            self.moving.remove(&subject.key());
        }
    }
}
