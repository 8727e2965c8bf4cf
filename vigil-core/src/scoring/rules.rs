//! Author-supplied real-time assessment rules
//!
//! A rule is a threshold on the global scoring event (count of violations or
//! accumulated violation time) mapped to an assessment level. Rules are
//! checked in authoring order; the first rule whose threshold holds decides
//! the level.

use serde::{Deserialize, Serialize};

use super::clock::ScoringSnapshot;
use crate::assessment::AssessmentLevel;
use crate::error::ConfigError;

/// Which scoring measurement a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMetric {
    /// Number of scoring events
    Count,
    /// Accumulated violation time in milliseconds
    ViolationTime,
}

/// Comparison between the measured value and the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparison {
    fn holds(&self, measured: u64, threshold: u64) -> bool {
        match self {
            Self::Lt => measured < threshold,
            Self::Le => measured <= threshold,
            Self::Eq => measured == threshold,
            Self::Ge => measured >= threshold,
            Self::Gt => measured > threshold,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ge => ">=",
            Self::Gt => ">",
        }
    }
}

/// One authored threshold rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthoredRule {
    pub metric: RuleMetric,
    #[serde(rename = "op")]
    pub comparison: Comparison,
    /// Count, or milliseconds for [`RuleMetric::ViolationTime`]
    pub value: u64,
    pub level: AssessmentLevel,
}

impl AuthoredRule {
    pub fn new(
        metric: RuleMetric,
        comparison: Comparison,
        value: u64,
        level: AssessmentLevel,
    ) -> Self {
        Self {
            metric,
            comparison,
            value,
            level,
        }
    }

    fn matches(&self, scoring: &ScoringSnapshot) -> bool {
        let measured = match self.metric {
            RuleMetric::Count => u64::from(scoring.count),
            RuleMetric::ViolationTime => {
                u64::try_from(scoring.duration.as_millis()).unwrap_or(u64::MAX)
            }
        };
        self.comparison.holds(measured, self.value)
    }
}

impl std::fmt::Display for AuthoredRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metric = match self.metric {
            RuleMetric::Count => "count",
            RuleMetric::ViolationTime => "violation_time_ms",
        };
        write!(
            f,
            "{} {} {} => {}",
            metric,
            self.comparison.symbol(),
            self.value,
            self.level
        )
    }
}

/// Ordered, validated rule list
#[derive(Debug, Clone, Default)]
pub struct AuthoredRules {
    rules: Vec<AuthoredRule>,
}

impl AuthoredRules {
    /// Validate and keep the rules in authoring order.
    ///
    /// Two rules with the same metric, comparison and threshold are rejected.
    pub fn new(condition: &str, rules: Vec<AuthoredRule>) -> Result<Self, ConfigError> {
        for (i, a) in rules.iter().enumerate() {
            let duplicate = rules[i + 1..].iter().any(|b| {
                a.metric == b.metric && a.comparison == b.comparison && a.value == b.value
            });
            if duplicate {
                return Err(ConfigError::DuplicateRule {
                    condition: condition.to_string(),
                    rule: a.to_string(),
                });
            }
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Level of the first matching rule, if any.
    ///
    /// Pure: call again whenever the scoring state may have moved.
    pub fn evaluate(&self, scoring: &ScoringSnapshot) -> Option<AssessmentLevel> {
        self.rules
            .iter()
            .find(|rule| rule.matches(scoring))
            .map(|rule| rule.level)
    }
}
