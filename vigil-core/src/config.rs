//! Scenario configuration types.
//!
//! A scenario file describes the engine settings, the team roster and the
//! conditions to evaluate. Every section is optional except each condition's
//! `params` table, which selects the condition kind.
//!
//! ```toml
//! [engine]
//! stale_after_ms = 10000
//!
//! [[team]]
//! name = "alpha"
//! entity = 1
//!
//! [[conditions]]
//! name = "convoy speed"
//! assessed_members = ["alpha"]
//!
//! [conditions.params]
//! kind = "speed_limit"
//! max_speed_mps = 20.0
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assessment::AssessmentLevel;
use crate::condition::ConditionCore;
use crate::error::ConfigError;
use crate::scoring::AuthoredRule;
use crate::subject::{StaticRoster, TeamMemberConfig, TeamRoster};

/// Complete scenario: engine settings, team roster and conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Settings shared by every condition.
    pub engine: EngineConfig,
    /// Team roster. Empty means learners are evaluated anonymously.
    pub team: Vec<TeamMemberConfig>,
    /// Conditions to evaluate.
    pub conditions: Vec<ConditionConfig>,
}

impl ScenarioConfig {
    /// Load a scenario from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a scenario from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        for condition in &self.conditions {
            condition.params.validate()?;
        }
        Ok(())
    }

    /// Roster built from the `team` section, if any.
    pub fn roster(&self) -> Option<Arc<dyn TeamRoster>> {
        if self.team.is_empty() {
            return None;
        }
        Some(Arc::new(StaticRoster::from_config(&self.team)))
    }

    /// Build every configured condition, failing on the first invalid one.
    pub fn build_conditions(&self) -> Result<Vec<ConditionCore>, ConfigError> {
        let roster = self.roster();
        self.conditions
            .iter()
            .map(|condition| ConditionCore::from_config(condition, &self.engine, roster.clone()))
            .collect()
    }
}

/// Settings shared by every condition in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A violator not seen violating for this long is evicted.
    pub stale_after_ms: u64,
    /// How often violators are checked for staleness.
    pub stale_check_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 10_000,
            stale_check_interval_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn stale_check_interval(&self) -> Duration {
        Duration::from_millis(self.stale_check_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_check_interval_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "engine.stale_check_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// One condition to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Name shown in notifications and reports.
    pub name: String,
    /// Team member names this condition assesses. Empty assesses everyone
    /// anonymously.
    #[serde(default)]
    pub assessed_members: Vec<String>,
    /// Level reported before any evidence arrives.
    #[serde(default)]
    pub initial_assessment: AssessmentLevel,
    /// Return to the initial level this long after each assessment change.
    #[serde(default)]
    pub reset_after_ms: Option<u64>,
    /// Level adopted when every violator was evicted as stale.
    #[serde(default)]
    pub eviction_level: AssessmentLevel,
    /// Authored real-time assessment rules, in precedence order.
    #[serde(default)]
    pub rules: Vec<AuthoredRule>,
    /// Condition kind and its parameters.
    pub params: ConditionParams,
}

impl ConditionConfig {
    pub fn new(name: impl Into<String>, params: ConditionParams) -> Self {
        Self {
            name: name.into(),
            assessed_members: Vec::new(),
            initial_assessment: AssessmentLevel::default(),
            reset_after_ms: None,
            eviction_level: AssessmentLevel::default(),
            rules: Vec::new(),
            params,
        }
    }

    pub fn reset_after(&self) -> Option<Duration> {
        self.reset_after_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Kind-specific parameters, selected by the `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionParams {
    /// Entities must stay under a maximum speed (and over an optional minimum).
    SpeedLimit {
        max_speed_mps: f64,
        #[serde(default)]
        min_speed_mps: Option<f64>,
    },
    /// Entities must stay out of a sphere.
    AvoidLocation { center: [f64; 3], radius_m: f64 },
    /// The learner must stay on each slide for a minimum time.
    SlideDwell { min_dwell_ms: u64 },
    /// The application should complete within an ideal duration.
    ApplicationCompleted { ideal_duration_ms: u64 },
}

impl ConditionParams {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpeedLimit { .. } => "speed_limit",
            Self::AvoidLocation { .. } => "avoid_location",
            Self::SlideDwell { .. } => "slide_dwell",
            Self::ApplicationCompleted { .. } => "application_completed",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::SpeedLimit {
                max_speed_mps,
                min_speed_mps,
            } => {
                positive("max_speed_mps", *max_speed_mps)?;
                if let Some(min) = min_speed_mps {
                    if !min.is_finite() || *min < 0.0 {
                        return Err(invalid("min_speed_mps", "must be a non-negative number"));
                    }
                    if min >= max_speed_mps {
                        return Err(invalid("min_speed_mps", "must be below max_speed_mps"));
                    }
                }
            }
            Self::AvoidLocation { center, radius_m } => {
                positive("radius_m", *radius_m)?;
                if center.iter().any(|c| !c.is_finite()) {
                    return Err(invalid("center", "coordinates must be finite"));
                }
            }
            Self::SlideDwell { min_dwell_ms } => {
                if *min_dwell_ms == 0 {
                    return Err(invalid("min_dwell_ms", "must be greater than zero"));
                }
            }
            Self::ApplicationCompleted { ideal_duration_ms } => {
                if *ideal_duration_ms == 0 {
                    return Err(invalid("ideal_duration_ms", "must be greater than zero"));
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a positive number"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::scoring::{Comparison, RuleMetric};

    const SCENARIO: &str = r#"
        [engine]
        stale_after_ms = 4000

        [[team]]
        name = "alpha"
        entity = 1

        [[team]]
        name = "bravo"
        entity = 2

        [[conditions]]
        name = "convoy speed"
        assessed_members = ["alpha", "bravo"]
        reset_after_ms = 30000

        [[conditions.rules]]
        metric = "count"
        op = "ge"
        value = 3
        level = "below_expectation"

        [conditions.params]
        kind = "speed_limit"
        max_speed_mps = 20.0

        [[conditions]]
        name = "slides"

        [conditions.params]
        kind = "slide_dwell"
        min_dwell_ms = 10000
    "#;

    #[test]
    fn default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stale_after(), Duration::from_secs(10));
        assert_eq!(config.stale_check_interval(), Duration::from_secs(5));
    }

    #[test]
    fn parses_full_scenario() {
        let config = ScenarioConfig::from_toml_str(SCENARIO).unwrap();

        assert_eq!(config.engine.stale_after_ms, 4000);
        assert_eq!(config.engine.stale_check_interval_ms, 5000);
        assert_eq!(config.team.len(), 2);
        assert_eq!(config.conditions.len(), 2);

        let speed = &config.conditions[0];
        assert_eq!(speed.assessed_members, vec!["alpha", "bravo"]);
        assert_eq!(speed.reset_after(), Some(Duration::from_secs(30)));
        assert_eq!(speed.rules[0].metric, RuleMetric::Count);
        assert_eq!(speed.rules[0].comparison, Comparison::Ge);
        assert_eq!(
            speed.params,
            ConditionParams::SpeedLimit {
                max_speed_mps: 20.0,
                min_speed_mps: None
            }
        );

        let slides = &config.conditions[1];
        assert!(slides.assessed_members.is_empty());
        assert_eq!(slides.eviction_level, AssessmentLevel::Unknown);
        assert_eq!(slides.params.kind(), "slide_dwell");
    }

    #[test]
    fn empty_scenario_uses_defaults() {
        let config = ScenarioConfig::from_toml_str("").unwrap();
        assert!(config.conditions.is_empty());
        assert!(config.roster().is_none());
        assert_eq!(config.engine.stale_after_ms, 10_000);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let err = ScenarioConfig::from_toml_str(
            r#"
            [[conditions]]
            name = "bad"
            [conditions.params]
            kind = "speed_limit"
            max_speed_mps = 10.0
            min_speed_mps = 12.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { ref field, .. } if field == "min_speed_mps"));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = ScenarioConfig::from_toml_str(
            r#"
            [[conditions]]
            name = "bad"
            [conditions.params]
            kind = "teleport"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let config = ScenarioConfig::load(file.path()).unwrap();
        assert_eq!(config.conditions[0].name, "convoy speed");

        let roster = config.roster().unwrap();
        assert_eq!(roster.member_named("bravo").unwrap().entity.as_u64(), 2);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScenarioConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
