//! Reference condition kinds built on the condition core
//!
//! Each kind is a small [`ConditionPredicate`] that decides who is violating.
//! Violator tracking, scoring and notifications stay in the core.

mod application_completed;
mod avoid_location;
mod slide_dwell;
mod speed_limit;

use std::time::Duration;

pub use application_completed::ApplicationCompleted;
pub use avoid_location::AvoidLocation;
pub use slide_dwell::SlideDwell;
pub use speed_limit::SpeedLimit;

use crate::condition::ConditionPredicate;
use crate::config::ConditionParams;
use crate::error::ConfigError;

/// Build the predicate selected by a condition's parameters.
pub fn build(params: &ConditionParams) -> Result<Box<dyn ConditionPredicate>, ConfigError> {
    params.validate()?;

    let predicate: Box<dyn ConditionPredicate> = match params {
        ConditionParams::SpeedLimit {
            max_speed_mps,
            min_speed_mps,
        } => Box::new(SpeedLimit::new(*max_speed_mps, *min_speed_mps)),
        ConditionParams::AvoidLocation { center, radius_m } => {
            Box::new(AvoidLocation::new(*center, *radius_m))
        }
        ConditionParams::SlideDwell { min_dwell_ms } => {
            Box::new(SlideDwell::new(Duration::from_millis(*min_dwell_ms)))
        }
        ConditionParams::ApplicationCompleted { ideal_duration_ms } => Box::new(
            ApplicationCompleted::new(Duration::from_millis(*ideal_duration_ms)),
        ),
    };
    Ok(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_matches_kind() {
        let params = [
            ConditionParams::SpeedLimit {
                max_speed_mps: 10.0,
                min_speed_mps: None,
            },
            ConditionParams::AvoidLocation {
                center: [0.0, 0.0, 0.0],
                radius_m: 5.0,
            },
            ConditionParams::SlideDwell { min_dwell_ms: 1000 },
            ConditionParams::ApplicationCompleted {
                ideal_duration_ms: 1000,
            },
        ];

        for params in &params {
            let predicate = build(params).unwrap();
            assert_eq!(predicate.kind(), params.kind());
        }
    }

    #[test]
    fn build_rejects_invalid_parameters() {
        let result = build(&ConditionParams::AvoidLocation {
            center: [0.0, 0.0, 0.0],
            radius_m: -1.0,
        });
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }
}
