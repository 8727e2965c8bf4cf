//! Scoring events and authored assessment rules

pub mod clock;
pub mod rules;

pub use clock::{ScoringClock, ScoringReport, ScoringSnapshot};
pub use rules::{AuthoredRule, AuthoredRules, Comparison, RuleMetric};
