//! Simulation and training-application events delivered to conditions

use serde::{Deserialize, Serialize};

use crate::subject::EntityId;

/// Kind of event, used to declare a condition's interest set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EntityState,
    WeaponFire,
    LearnerAction,
    SlideChanged,
    Lifecycle,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityState => "entity_state",
            Self::WeaponFire => "weapon_fire",
            Self::LearnerAction => "learner_action",
            Self::SlideChanged => "slide_changed",
            Self::Lifecycle => "lifecycle",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Training application lifecycle markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Started,
    Paused,
    Resumed,
    Completed,
    Stopped,
}

/// Event from the simulation or training application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    /// Entity position and velocity update (meters, meters/second)
    EntityState {
        entity: EntityId,
        #[serde(default)]
        position: [f64; 3],
        #[serde(default)]
        velocity: [f64; 3],
    },

    /// A weapon was discharged
    WeaponFire { shooter: EntityId },

    /// The learner performed a named action
    LearnerAction {
        #[serde(default)]
        entity: Option<EntityId>,
        action: String,
    },

    /// The presentation moved to another slide
    SlideChanged { slide: u32 },

    /// Application lifecycle marker
    Lifecycle { phase: LifecyclePhase },
}

impl SimEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::EntityState { .. } => EventKind::EntityState,
            Self::WeaponFire { .. } => EventKind::WeaponFire,
            Self::LearnerAction { .. } => EventKind::LearnerAction,
            Self::SlideChanged { .. } => EventKind::SlideChanged,
            Self::Lifecycle { .. } => EventKind::Lifecycle,
        }
    }

    /// The entity this event is about, if any.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::EntityState { entity, .. } => Some(*entity),
            Self::WeaponFire { shooter } => Some(*shooter),
            Self::LearnerAction { entity, .. } => *entity,
            Self::SlideChanged { .. } | Self::Lifecycle { .. } => None,
        }
    }
}

/// Magnitude of a 3-vector.
pub fn magnitude(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}
