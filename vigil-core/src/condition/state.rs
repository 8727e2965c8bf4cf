//! Condition state machine and violator-driven assessment
//!
//! [`ConditionCore`] owns every piece of mutable condition state behind a
//! single mutex: lifecycle state, assessment level and explanation, the
//! violator set, scoring and timers. Events and timer callbacks both take
//! that lock, so a timer racing a `stop()` sees the terminal state and
//! backs off.
//!
//! Group assessment follows the emptiness of the violator set rather than
//! individual event outcomes: the level moves to below expectation when the
//! first violator appears and back to at expectation when the last one
//! recovers, unless an authored rule overrides it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::assessment::{AssessmentLevel, ConditionState, ScoringType};
use crate::config::{ConditionConfig, EngineConfig};
use crate::error::{ConditionError, ConfigError, TimerError};
use crate::events::{EventKind, SimEvent};
use crate::explanation;
use crate::notify::{AssessmentUpdate, ConditionNotifier};
use crate::predicates;
use crate::scoring::{AuthoredRules, ScoringReport, ScoringSnapshot};
use crate::subject::{TeamMember, TeamRoster};
use crate::timer::{ExpiryHandler, RescheduleableTimer};

use super::context::{PredicateContext, Tracking};
use super::predicate::{ConditionPredicate, TimerFired, ViolationDelta};

/// Internal timer routed back into the condition
pub(crate) enum Expiry {
    Predicate(TimerFired),
    Reset,
    StaleSweep,
}

/// Build a timer callback that re-enters the condition, if it still exists.
pub(crate) fn expiry_handler<K>(
    condition: Weak<Shared>,
    route: impl Fn(K) -> Expiry + Send + Sync + 'static,
) -> impl ExpiryHandler<K> {
    move |key: K| -> Result<(), TimerError> {
        if let Some(shared) = condition.upgrade() {
            shared.expire(route(key));
        }
        Ok(())
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Settings {
    default_level: AssessmentLevel,
    reset_after: Option<Duration>,
    eviction_level: AssessmentLevel,
    stale_after: Duration,
    stale_check_interval: Duration,
}

#[derive(Debug, Default, Clone, Copy)]
struct Change {
    level: bool,
    explanation: bool,
    complete: bool,
}

impl Change {
    fn observable(&self) -> bool {
        self.level || self.explanation
    }
}

struct Inner {
    state: ConditionState,
    level: AssessmentLevel,
    explanation: Option<String>,
    notifier: Option<Arc<dyn ConditionNotifier>>,
    predicate: Box<dyn ConditionPredicate>,
    rules: AuthoredRules,
    tracking: Tracking,
    started_at: Option<Instant>,
    completed_at: Option<DateTime<Utc>>,
    reset_timer: Option<RescheduleableTimer<()>>,
    sweep_timer: Option<RescheduleableTimer<()>>,
}

impl Inner {
    fn set_explanation(&mut self, explanation: Option<String>) -> bool {
        if self.explanation == explanation {
            return false;
        }
        self.explanation = explanation;
        true
    }

    fn render_explanation(&mut self) -> bool {
        let rendered = explanation::render(
            self.tracking.violators.snapshot(),
            self.predicate.violation_phrase(),
        );
        self.set_explanation(rendered)
    }

    /// Rule override on the global scoring event, else the violator mapping.
    fn group_level(&self, now: Instant) -> AssessmentLevel {
        let global = self.tracking.scoring.snapshot(None, now);
        self.rules.evaluate(&global).unwrap_or(if self.tracking.violators.is_empty() {
            AssessmentLevel::AtExpectation
        } else {
            AssessmentLevel::BelowExpectation
        })
    }

    fn shutdown_timers(&mut self) {
        if let Some(timer) = self.reset_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.sweep_timer.take() {
            timer.cancel();
        }
        self.tracking.shutdown_timers();
    }
}

pub(crate) struct Shared {
    id: Uuid,
    name: String,
    kind: &'static str,
    interests: &'static [EventKind],
    scoring_types: &'static [ScoringType],
    can_complete: bool,
    tracks_staleness: bool,
    settings: Settings,
    inner: Mutex<Inner>,
}

impl Shared {
    fn with_context<R>(
        self: &Arc<Self>,
        inner: &mut Inner,
        now: Instant,
        f: impl FnOnce(&mut dyn ConditionPredicate, &mut PredicateContext<'_>) -> R,
    ) -> R {
        let condition = Arc::downgrade(self);
        let Inner {
            predicate,
            tracking,
            level,
            ..
        } = inner;
        let mut ctx = PredicateContext::new(now, *level, &self.name, tracking, &condition);
        f(predicate.as_mut(), &mut ctx)
    }

    fn update(&self, inner: &Inner) -> AssessmentUpdate {
        AssessmentUpdate {
            condition_id: self.id,
            condition: self.name.clone(),
            kind: self.kind.to_string(),
            level: inner.level,
            explanation: inner.explanation.clone(),
            state: inner.state,
            at: Utc::now(),
        }
    }

    fn notify_changed(&self, inner: &Inner) {
        match &inner.notifier {
            Some(notifier) => notifier.on_assessment_changed(&self.update(inner)),
            None => trace!(condition = %self.name, "no notifier bound, change not reported"),
        }
    }

    fn notify_completed(&self, inner: &Inner) {
        if let Some(notifier) = &inner.notifier {
            notifier.on_condition_completed(&self.update(inner));
        }
    }

    /// The single gate for level changes.
    fn set_level(&self, inner: &mut Inner, level: AssessmentLevel) -> bool {
        if inner.level == level {
            return false;
        }
        debug!(
            condition = %self.name,
            kind = self.kind,
            from = %inner.level,
            to = %level,
            "Assessment changed"
        );
        inner.level = level;

        if level != self.settings.default_level
            && let (Some(timer), Some(delay)) = (&inner.reset_timer, self.settings.reset_after)
        {
            timer.schedule(delay, ());
        }
        true
    }

    fn arm_stale_sweep(&self, inner: &Inner) {
        if !self.tracks_staleness {
            return;
        }
        if let Some(timer) = &inner.sweep_timer
            && !timer.is_scheduled()
        {
            timer.schedule(self.settings.stale_check_interval, ());
        }
    }

    fn disarm_stale_sweep(&self, inner: &Inner) {
        if let Some(timer) = &inner.sweep_timer {
            timer.cancel();
        }
    }

    /// Apply the violator protocol for one predicate outcome.
    fn apply(&self, inner: &mut Inner, delta: ViolationDelta, now: Instant) -> Change {
        match delta {
            ViolationDelta::None => Change::default(),

            ViolationDelta::Violating(subject) => {
                let key = subject.key();
                let was_empty = inner.tracking.violators.is_empty();
                if inner.tracking.violators.add(subject, now) {
                    debug!(condition = %self.name, subject = %key, "Violator added");
                }
                inner.tracking.scoring.start(Some(key), now);
                if was_empty {
                    inner.tracking.scoring.start(None, now);
                }
                self.arm_stale_sweep(inner);
                self.settle(inner, now)
            }

            ViolationDelta::Compliant(subject) => {
                let key = subject.key();
                if inner.tracking.violators.remove(key) {
                    debug!(condition = %self.name, subject = %key, "Violator recovered");
                    inner.tracking.scoring.end(Some(key), now);
                    if inner.tracking.violators.is_empty() {
                        inner.tracking.scoring.end(None, now);
                        self.disarm_stale_sweep(inner);
                    }
                }
                self.settle(inner, now)
            }

            ViolationDelta::Assess { level, explanation } => Change {
                level: self.set_level(inner, level),
                explanation: inner.set_explanation(explanation),
                complete: false,
            },

            ViolationDelta::Complete { level, explanation } => Change {
                level: self.set_level(inner, level),
                explanation: inner.set_explanation(explanation),
                complete: true,
            },
        }
    }

    fn settle(&self, inner: &mut Inner, now: Instant) -> Change {
        let level = inner.group_level(now);
        Change {
            level: self.set_level(inner, level),
            explanation: inner.render_explanation(),
            complete: false,
        }
    }

    fn finish(&self, inner: &mut Inner, change: Change, now: Instant) -> bool {
        if change.observable() {
            self.notify_changed(inner);
        }
        if change.complete {
            self.complete(inner, now);
        }
        change.observable()
    }

    fn complete(&self, inner: &mut Inner, now: Instant) {
        inner.shutdown_timers();
        if let Some(started) = inner.started_at {
            inner
                .tracking
                .scoring
                .record_completion(now.saturating_duration_since(started));
        }
        inner.tracking.scoring.close_all(now);
        inner.state = ConditionState::Completed;
        inner.completed_at = Some(Utc::now());
        info!(condition = %self.name, level = %inner.level, "Condition completed");
        self.notify_completed(inner);
    }

    fn expire(self: &Arc<Self>, expiry: Expiry) {
        let mut inner = lock(&self.inner);
        if !inner.state.is_live() {
            debug!(condition = %self.name, state = %inner.state, "Timer fired after condition ended, ignoring");
            return;
        }
        let now = Instant::now();

        let change = match expiry {
            Expiry::Predicate(fired) => {
                let delta = self.with_context(&mut inner, now, |predicate, ctx| {
                    predicate.on_timer(fired, ctx)
                });
                self.apply(&mut inner, delta, now)
            }
            Expiry::Reset => {
                debug!(condition = %self.name, "Assessment reset delay elapsed");
                Change {
                    level: self.set_level(&mut inner, self.settings.default_level),
                    explanation: inner.set_explanation(None),
                    complete: false,
                }
            }
            Expiry::StaleSweep => self.sweep(&mut inner, now),
        };

        self.finish(&mut inner, change, now);
    }

    fn sweep(self: &Arc<Self>, inner: &mut Inner, now: Instant) -> Change {
        let evicted = inner
            .tracking
            .violators
            .evict_stale(now, self.settings.stale_after);

        if evicted.is_empty() {
            if !inner.tracking.violators.is_empty() {
                self.arm_stale_sweep(inner);
            }
            return Change::default();
        }

        for subject in &evicted {
            inner.tracking.scoring.end(Some(subject.key()), now);
            info!(condition = %self.name, subject = %subject, "Evicted stale violator");
        }
        self.with_context(inner, now, |predicate, ctx| {
            predicate.on_violators_evicted(&evicted, ctx)
        });

        let mut change = Change::default();
        if inner.tracking.violators.is_empty() {
            // No longer reporting is not the same as confirmed compliant.
            inner.tracking.scoring.end(None, now);
            let global = inner.tracking.scoring.snapshot(None, now);
            let level = inner
                .rules
                .evaluate(&global)
                .unwrap_or(self.settings.eviction_level);
            change.level = self.set_level(inner, level);
        } else {
            self.arm_stale_sweep(inner);
        }
        change.explanation = inner.render_explanation();
        change
    }
}

/// A live condition: lifecycle, assessment and violator bookkeeping around a
/// [`ConditionPredicate`].
///
/// Cloning yields another handle to the same condition.
#[derive(Clone)]
pub struct ConditionCore {
    shared: Arc<Shared>,
}

impl ConditionCore {
    pub fn builder(name: impl Into<String>, predicate: impl ConditionPredicate) -> ConditionBuilder {
        ConditionBuilder::new(name, Box::new(predicate))
    }

    /// Build a condition from scenario configuration.
    ///
    /// Fails if an assessed member is missing from the roster, a rule is
    /// duplicated or a parameter is out of range.
    pub fn from_config(
        config: &ConditionConfig,
        engine: &EngineConfig,
        roster: Option<Arc<dyn TeamRoster>>,
    ) -> Result<Self, ConfigError> {
        config.params.validate()?;

        let mut assessed = Vec::with_capacity(config.assessed_members.len());
        for name in &config.assessed_members {
            let roster = roster.as_ref().ok_or_else(|| ConfigError::MissingRoster {
                condition: config.name.clone(),
                member: name.clone(),
            })?;
            let member = roster
                .member_named(name)
                .ok_or_else(|| ConfigError::UnknownTeamMember {
                    condition: config.name.clone(),
                    member: name.clone(),
                })?;
            assessed.push(member);
        }

        let rules = AuthoredRules::new(&config.name, config.rules.clone())?;
        let predicate = predicates::build(&config.params)?;

        let mut builder = ConditionBuilder::new(config.name.clone(), predicate)
            .assessed_members(roster, assessed)
            .rules(rules)
            .initial_assessment(config.initial_assessment)
            .eviction_level(config.eviction_level)
            .stale_after(engine.stale_after())
            .stale_check_interval(engine.stale_check_interval());
        if let Some(delay) = config.reset_after() {
            builder = builder.reset_after(delay);
        }
        Ok(builder.build())
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> &'static str {
        self.shared.kind
    }

    pub fn state(&self) -> ConditionState {
        lock(&self.shared.inner).state
    }

    /// Event kinds this condition evaluates.
    pub fn interests(&self) -> &'static [EventKind] {
        self.shared.interests
    }

    pub fn is_interested(&self, kind: EventKind) -> bool {
        self.shared.interests.contains(&kind)
    }

    /// Scorer categories this condition populates.
    pub fn scoring_types(&self) -> &'static [ScoringType] {
        self.shared.scoring_types
    }

    pub fn can_complete(&self) -> bool {
        self.shared.can_complete
    }

    pub fn assessment(&self) -> AssessmentLevel {
        lock(&self.shared.inner).level
    }

    pub fn assessment_explanation(&self) -> Option<String> {
        lock(&self.shared.inner).explanation.clone()
    }

    pub fn violator_count(&self) -> usize {
        lock(&self.shared.inner).tracking.violators.len()
    }

    /// Wall-clock time the condition completed, if it did.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.shared.inner).completed_at
    }

    /// Scores for after-action review.
    pub fn scoring_report(&self) -> ScoringReport {
        lock(&self.shared.inner)
            .tracking
            .scoring
            .report(Instant::now())
    }

    /// Bind the notification sink.
    pub fn initialize(&self, notifier: Arc<dyn ConditionNotifier>) -> Result<(), ConditionError> {
        let mut inner = lock(&self.shared.inner);
        if inner.notifier.is_some() {
            warn!(condition = %self.shared.name, "Condition initialized twice");
            return Err(ConditionError::AlreadyInitialized);
        }
        if inner.state != ConditionState::Created {
            return Err(ConditionError::InvalidTransition {
                from: inner.state,
                to: ConditionState::Initialized,
            });
        }
        inner.notifier = Some(notifier);
        inner.state = ConditionState::Initialized;
        info!(condition = %self.shared.name, kind = self.shared.kind, "Condition initialized");
        Ok(())
    }

    /// Begin live evaluation. Requires a tokio runtime for the timers.
    pub fn start(&self) -> Result<(), ConditionError> {
        let shared = &self.shared;
        let mut inner = lock(&shared.inner);
        match inner.state {
            ConditionState::Created | ConditionState::Initialized => {}
            from => {
                warn!(condition = %shared.name, state = %from, "Start requested in wrong state");
                return Err(ConditionError::InvalidTransition {
                    from,
                    to: ConditionState::Started,
                });
            }
        }

        let sweep_timer = RescheduleableTimer::new(
            format!("{}/stale-sweep", shared.name),
            expiry_handler(Arc::downgrade(shared), |_: ()| Expiry::StaleSweep),
        )?;
        let reset_timer = match shared.settings.reset_after {
            Some(_) => Some(RescheduleableTimer::new(
                format!("{}/reset", shared.name),
                expiry_handler(Arc::downgrade(shared), |_: ()| Expiry::Reset),
            )?),
            None => None,
        };

        let now = Instant::now();
        if let Err(e) = shared.with_context(&mut inner, now, |predicate, ctx| predicate.on_start(ctx)) {
            inner.tracking.shutdown_timers();
            return Err(e);
        }

        inner.sweep_timer = Some(sweep_timer);
        inner.reset_timer = reset_timer;
        inner.started_at = Some(now);
        inner.state = ConditionState::Started;
        info!(condition = %shared.name, kind = shared.kind, level = %inner.level, "Condition started");
        Ok(())
    }

    /// Evaluate one event.
    ///
    /// Returns true iff the level or the explanation changed. Events outside
    /// the interest set, events while not live and malformed events are
    /// ignored and return false.
    pub fn handle_event(&self, event: &SimEvent) -> bool {
        let shared = &self.shared;
        let kind = event.kind();
        if !shared.interests.contains(&kind) {
            trace!(condition = %shared.name, %kind, "Event outside interest set, ignoring");
            return false;
        }

        let mut inner = lock(&shared.inner);
        if !inner.state.is_live() {
            debug!(condition = %shared.name, state = %inner.state, %kind, "Condition not live, ignoring event");
            return false;
        }

        let now = Instant::now();
        let delta = match shared.with_context(&mut inner, now, |predicate, ctx| {
            predicate.evaluate(event, ctx)
        }) {
            Ok(delta) => delta,
            Err(e) => {
                warn!(condition = %shared.name, %kind, error = %e, "Ignoring event");
                return false;
            }
        };

        if inner.state == ConditionState::Started {
            inner.state = ConditionState::Assessing;
        }
        let change = shared.apply(&mut inner, delta, now);
        shared.finish(&mut inner, change, now)
    }

    /// Set the level directly. Returns whether it changed; unchanged levels
    /// are not reported.
    pub fn update_assessment(&self, level: AssessmentLevel) -> bool {
        let mut inner = lock(&self.shared.inner);
        let changed = self.shared.set_level(&mut inner, level);
        if changed {
            self.shared.notify_changed(&inner);
        }
        changed
    }

    /// Stop evaluation, cancel timers and close open scoring intervals.
    ///
    /// Returns `Ok(false)` if the condition had already ended.
    pub fn stop(&self) -> Result<bool, ConditionError> {
        let shared = &self.shared;
        let mut inner = lock(&shared.inner);
        match inner.state {
            ConditionState::Started | ConditionState::Assessing => {}
            ConditionState::Completed | ConditionState::Stopped => {
                warn!(condition = %shared.name, state = %inner.state, "Stop ignored, condition already ended");
                return Ok(false);
            }
            from => {
                return Err(ConditionError::InvalidTransition {
                    from,
                    to: ConditionState::Stopped,
                });
            }
        }

        let now = Instant::now();
        let final_level = shared.with_context(&mut inner, now, |predicate, ctx| {
            predicate.final_assessment(ctx)
        });
        inner.shutdown_timers();

        if let Some(level) = final_level
            && shared.set_level(&mut inner, level)
        {
            shared.notify_changed(&inner);
        }

        inner.tracking.scoring.close_all(now);
        inner.state = ConditionState::Stopped;
        info!(condition = %shared.name, level = %inner.level, "Condition stopped");
        shared.notify_completed(&inner);
        Ok(true)
    }

    /// Complete the condition. Only the first call on a live, completable
    /// condition has any effect.
    pub fn condition_completed(&self) -> bool {
        let shared = &self.shared;
        let mut inner = lock(&shared.inner);
        if !shared.can_complete {
            warn!(condition = %shared.name, kind = shared.kind, "Condition kind cannot complete");
            return false;
        }
        if !inner.state.is_live() {
            warn!(condition = %shared.name, state = %inner.state, "Completion ignored");
            return false;
        }
        shared.complete(&mut inner, Instant::now());
        true
    }
}

impl std::fmt::Debug for ConditionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionCore")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("kind", &self.shared.kind)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConditionCore`]
pub struct ConditionBuilder {
    name: String,
    predicate: Box<dyn ConditionPredicate>,
    roster: Option<Arc<dyn TeamRoster>>,
    assessed: Vec<TeamMember>,
    rules: AuthoredRules,
    initial_assessment: AssessmentLevel,
    reset_after: Option<Duration>,
    eviction_level: AssessmentLevel,
    stale_after: Duration,
    stale_check_interval: Duration,
}

impl ConditionBuilder {
    fn new(name: impl Into<String>, predicate: Box<dyn ConditionPredicate>) -> Self {
        let engine = EngineConfig::default();
        Self {
            name: name.into(),
            predicate,
            roster: None,
            assessed: Vec::new(),
            rules: AuthoredRules::default(),
            initial_assessment: AssessmentLevel::Unknown,
            reset_after: None,
            eviction_level: AssessmentLevel::Unknown,
            stale_after: engine.stale_after(),
            stale_check_interval: engine.stale_check_interval(),
        }
    }

    /// Restrict evaluation to these members, resolved through the roster.
    pub fn assessed_members(
        mut self,
        roster: Option<Arc<dyn TeamRoster>>,
        members: Vec<TeamMember>,
    ) -> Self {
        self.roster = roster;
        self.assessed = members;
        self
    }

    pub fn rules(mut self, rules: AuthoredRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn initial_assessment(mut self, level: AssessmentLevel) -> Self {
        self.initial_assessment = level;
        self
    }

    pub fn reset_after(mut self, delay: Duration) -> Self {
        self.reset_after = Some(delay).filter(|d| !d.is_zero());
        self
    }

    pub fn eviction_level(mut self, level: AssessmentLevel) -> Self {
        self.eviction_level = level;
        self
    }

    pub fn stale_after(mut self, after: Duration) -> Self {
        self.stale_after = after;
        self
    }

    pub fn stale_check_interval(mut self, interval: Duration) -> Self {
        self.stale_check_interval = interval;
        self
    }

    pub fn build(self) -> ConditionCore {
        let default_level = self
            .rules
            .evaluate(&ScoringSnapshot::default())
            .unwrap_or(self.initial_assessment);

        let shared = Shared {
            id: Uuid::new_v4(),
            kind: self.predicate.kind(),
            interests: self.predicate.interests(),
            scoring_types: self.predicate.scoring_types(),
            can_complete: self.predicate.can_complete(),
            tracks_staleness: self.predicate.tracks_staleness(),
            settings: Settings {
                default_level,
                reset_after: self.reset_after,
                eviction_level: self.eviction_level,
                stale_after: self.stale_after,
                stale_check_interval: self.stale_check_interval,
            },
            inner: Mutex::new(Inner {
                state: ConditionState::Created,
                level: default_level,
                explanation: None,
                notifier: None,
                predicate: self.predicate,
                rules: self.rules,
                tracking: Tracking::new(self.roster, self.assessed),
                started_at: None,
                completed_at: None,
                reset_timer: None,
                sweep_timer: None,
            }),
            name: self.name,
        };

        ConditionCore {
            shared: Arc::new(shared),
        }
    }
}
