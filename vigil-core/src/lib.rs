//! vigil-core: Condition evaluation engine for simulation-based training
//!
//! A condition watches simulation events and keeps a qualitative assessment
//! of trainee performance, with scoring for after-action review:
//!
//! - **Conditions** - [`ConditionCore`] state machine around a pluggable [`ConditionPredicate`]
//! - **Violators** - [`ViolatorSet`] tracking who is currently failing, with stale eviction
//! - **Scoring** - [`ScoringClock`] intervals and [`AuthoredRules`] level overrides
//! - **Timers** - [`RescheduleableTimer`] single-slot timer and [`DurationWatchdog`]
//! - **Configuration** - [`ScenarioConfig`] loaded from TOML
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vigil_core::{ChannelNotifier, ScenarioConfig, SimEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scenario = ScenarioConfig::load("scenario.toml")?;
//! let (notifier, mut notifications) = ChannelNotifier::new();
//! let notifier = Arc::new(notifier);
//!
//! let conditions = scenario.build_conditions()?;
//! for condition in &conditions {
//!     condition.initialize(notifier.clone())?;
//!     condition.start()?;
//! }
//!
//! let event: SimEvent = serde_json::from_str(
//!     r#"{"type":"entity_state","entity":1,"velocity":[30.0,0.0,0.0]}"#,
//! )?;
//! for condition in &conditions {
//!     condition.handle_event(&event);
//! }
//!
//! while let Ok(notification) = notifications.try_recv() {
//!     println!("{:?}", notification);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! SimEvent ─► ConditionCore::handle_event
//!                 │
//!                 ├─► ConditionPredicate::evaluate ─► ViolationDelta
//!                 ├─► ViolatorSet add/remove
//!                 ├─► ScoringClock start/end (subject, then group)
//!                 ├─► AuthoredRules override, else violator-set emptiness
//!                 └─► ConditionNotifier (only on a new level or explanation)
//! ```

pub mod assessment;
pub mod condition;
pub mod config;
pub mod error;
pub mod events;
pub mod explanation;
pub mod notify;
pub mod predicates;
pub mod scoring;
pub mod subject;
pub mod timer;
pub mod violators;
pub mod watchdog;

// Re-export key types for convenience
pub use assessment::{AssessmentLevel, ConditionState, ScoringType};
pub use condition::{
    ConditionBuilder, ConditionCore, ConditionPredicate, PredicateContext, TimerFired,
    ViolationDelta,
};
pub use config::{ConditionConfig, ConditionParams, EngineConfig, ScenarioConfig};
pub use error::{ConditionError, ConfigError, TimerError};
pub use events::{EventKind, LifecyclePhase, SimEvent};
pub use notify::{AssessmentUpdate, ChannelNotifier, ConditionNotification, ConditionNotifier};
pub use scoring::{AuthoredRule, AuthoredRules, Comparison, RuleMetric, ScoringClock, ScoringReport};
pub use subject::{EntityId, StaticRoster, Subject, TeamMember, TeamMemberConfig, TeamRoster};
pub use timer::{ExpiryHandler, RescheduleableTimer};
pub use violators::ViolatorSet;
pub use watchdog::{DurationWatchdog, WatchdogPhase};
