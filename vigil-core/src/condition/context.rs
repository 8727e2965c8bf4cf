//! Services the condition core lends to a predicate during evaluation

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::Instant;

use crate::assessment::AssessmentLevel;
use crate::error::ConditionError;
use crate::scoring::ScoringClock;
use crate::subject::{EntityId, Subject, TeamMember, TeamRoster};
use crate::timer::RescheduleableTimer;
use crate::violators::ViolatorSet;
use crate::watchdog::DurationWatchdog;

use super::predicate::TimerFired;
use super::state::{Expiry, Shared, expiry_handler};

/// Per-condition bookkeeping shared by the core and its predicate
pub(crate) struct Tracking {
    pub(crate) violators: ViolatorSet,
    pub(crate) scoring: ScoringClock,
    pub(crate) roster: Option<Arc<dyn TeamRoster>>,
    pub(crate) assessed: Vec<TeamMember>,
    pub(crate) slot_timer: Option<RescheduleableTimer<u64>>,
    pub(crate) watchdog: Option<DurationWatchdog>,
}

impl Tracking {
    pub(crate) fn new(roster: Option<Arc<dyn TeamRoster>>, assessed: Vec<TeamMember>) -> Self {
        Self {
            violators: ViolatorSet::new(),
            scoring: ScoringClock::new(),
            roster,
            assessed,
            slot_timer: None,
            watchdog: None,
        }
    }

    /// Cancel and drop the predicate-owned timers.
    pub(crate) fn shutdown_timers(&mut self) {
        if let Some(timer) = self.slot_timer.take() {
            timer.cancel();
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.cancel();
        }
    }
}

/// View of the condition handed to predicate callbacks
pub struct PredicateContext<'a> {
    now: Instant,
    level: AssessmentLevel,
    name: &'a str,
    tracking: &'a mut Tracking,
    condition: &'a Weak<Shared>,
}

impl<'a> PredicateContext<'a> {
    pub(crate) fn new(
        now: Instant,
        level: AssessmentLevel,
        name: &'a str,
        tracking: &'a mut Tracking,
        condition: &'a Weak<Shared>,
    ) -> Self {
        Self {
            now,
            level,
            name,
            tracking,
            condition,
        }
    }

    /// Time the event or timer is being evaluated at.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Level currently reported by the condition.
    pub fn level(&self) -> AssessmentLevel {
        self.level
    }

    pub fn violator_count(&self) -> usize {
        self.tracking.violators.len()
    }

    /// Subject an entity is evaluated as, or `None` if this condition does
    /// not assess it.
    ///
    /// Without assessed members every entity is an anonymous learner.
    pub fn resolve_subject(&self, entity: EntityId) -> Option<Subject> {
        if self.tracking.assessed.is_empty() {
            return Some(Subject::anonymous(entity));
        }
        let member = self.tracking.roster.as_ref()?.lookup(entity)?;
        self.tracking
            .assessed
            .contains(&member)
            .then(|| Subject::member(&member))
    }

    /// Subject for outcomes that carry no entity, such as slide changes.
    pub fn learner(&self) -> Subject {
        match self.tracking.assessed.as_slice() {
            [only] => Subject::member(only),
            _ => Subject::group(),
        }
    }

    /// Schedule the condition's single-slot timer.
    ///
    /// Returns true if a pending task was cancelled by this call.
    pub fn schedule_slot(&mut self, delay: Duration, key: u64) -> Result<bool, ConditionError> {
        if self.tracking.slot_timer.is_none() {
            let handler = expiry_handler(self.condition.clone(), |key: u64| {
                Expiry::Predicate(TimerFired::Slot(key))
            });
            let timer = RescheduleableTimer::new(format!("{}/slot", self.name), handler)?;
            self.tracking.slot_timer = Some(timer);
        }
        Ok(self
            .tracking
            .slot_timer
            .as_ref()
            .is_some_and(|timer| timer.schedule(delay, key)))
    }

    /// Start the duration watchdog, replacing any previous one.
    pub fn start_watchdog(&mut self, budget: Duration) -> Result<(), ConditionError> {
        let handler = expiry_handler(self.condition.clone(), |_: ()| {
            Expiry::Predicate(TimerFired::Watchdog)
        });
        let watchdog = DurationWatchdog::start(format!("{}/watchdog", self.name), budget, handler)?;
        if let Some(previous) = self.tracking.watchdog.replace(watchdog) {
            previous.cancel();
        }
        Ok(())
    }

    pub fn pause_watchdog(&mut self) -> bool {
        self.tracking.watchdog.as_ref().is_some_and(|w| w.pause())
    }

    pub fn resume_watchdog(&mut self) -> bool {
        self.tracking.watchdog.as_ref().is_some_and(|w| w.resume())
    }

    pub fn cancel_watchdog(&mut self) -> bool {
        self.tracking.watchdog.as_ref().is_some_and(|w| w.cancel())
    }

    /// Active time measured by the watchdog.
    pub fn watchdog_elapsed(&self) -> Option<Duration> {
        self.tracking.watchdog.as_ref().map(|w| w.elapsed())
    }
}
