//! Condition lifecycle and the predicate interface
//!
//! A condition is a [`ConditionCore`] wrapped around a
//! [`ConditionPredicate`]. The predicate says who is violating; the core
//! turns that into assessment levels, explanations, scoring and
//! notifications.

mod context;
mod predicate;
mod state;

pub use context::PredicateContext;
pub use predicate::{ConditionPredicate, TimerFired, ViolationDelta};
pub use state::{ConditionBuilder, ConditionCore};
