//! Scoring-event bookkeeping for after-action review
//!
//! A scoring event is an open/close interval. The clock keeps one event for
//! the whole condition (the global event) and one per subject. The two are
//! independent: callers decide when both need to move.
//!
//! Starting an open event and ending a closed event are both no-ops, so
//! repeated violation detections never double count.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::subject::EntityId;

#[derive(Debug, Clone, Default)]
struct ScoringEvent {
    started_at: Option<Instant>,
    count: u32,
    accumulated: Duration,
}

impl ScoringEvent {
    fn start(&mut self, now: Instant) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        self.count += 1;
        true
    }

    fn end(&mut self, now: Instant) -> bool {
        match self.started_at.take() {
            Some(started) => {
                self.accumulated += now.saturating_duration_since(started);
                true
            }
            None => false,
        }
    }

    fn duration(&self, now: Instant) -> Duration {
        let open = self
            .started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        self.accumulated + open
    }

    fn snapshot(&self, now: Instant) -> ScoringSnapshot {
        ScoringSnapshot {
            count: self.count,
            duration: self.duration(now),
            active: self.started_at.is_some(),
        }
    }
}

/// Point-in-time view of one scoring event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoringSnapshot {
    /// Number of intervals opened so far
    pub count: u32,
    /// Closed intervals plus the open one, if any
    pub duration: Duration,
    /// Whether an interval is currently open
    pub active: bool,
}

/// Scores gathered by a condition, for after-action review
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringReport {
    pub global: ScoringSnapshot,
    /// Per-subject scores ordered by entity
    pub subjects: Vec<(EntityId, ScoringSnapshot)>,
    pub completion_time: Option<Duration>,
}

/// Per-subject and global scoring-event clock
#[derive(Debug, Clone, Default)]
pub struct ScoringClock {
    global: ScoringEvent,
    subjects: HashMap<EntityId, ScoringEvent>,
    completion_time: Option<Duration>,
}

impl ScoringClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn event(&self, key: Option<EntityId>) -> Option<&ScoringEvent> {
        match key {
            None => Some(&self.global),
            Some(entity) => self.subjects.get(&entity),
        }
    }

    /// Open a scoring event. `None` addresses the global event.
    ///
    /// Returns false when the event was already open.
    pub fn start(&mut self, key: Option<EntityId>, now: Instant) -> bool {
        match key {
            None => self.global.start(now),
            Some(entity) => self.subjects.entry(entity).or_default().start(now),
        }
    }

    /// Close a scoring event. `None` addresses the global event.
    ///
    /// Returns false when the event was not open.
    pub fn end(&mut self, key: Option<EntityId>, now: Instant) -> bool {
        match key {
            None => self.global.end(now),
            Some(entity) => self
                .subjects
                .get_mut(&entity)
                .is_some_and(|event| event.end(now)),
        }
    }

    /// Whether the events for all given subjects are open.
    ///
    /// An empty slice asks about the global event.
    pub fn is_active(&self, keys: &[EntityId]) -> bool {
        if keys.is_empty() {
            return self.global.started_at.is_some();
        }
        keys.iter().all(|key| {
            self.subjects
                .get(key)
                .is_some_and(|event| event.started_at.is_some())
        })
    }

    pub fn count(&self, key: Option<EntityId>) -> u32 {
        self.event(key).map(|e| e.count).unwrap_or(0)
    }

    pub fn duration(&self, key: Option<EntityId>, now: Instant) -> Duration {
        self.event(key).map(|e| e.duration(now)).unwrap_or_default()
    }

    pub fn snapshot(&self, key: Option<EntityId>, now: Instant) -> ScoringSnapshot {
        self.event(key)
            .map(|e| e.snapshot(now))
            .unwrap_or_default()
    }

    pub fn record_completion(&mut self, elapsed: Duration) {
        self.completion_time = Some(elapsed);
    }

    pub fn completion_time(&self) -> Option<Duration> {
        self.completion_time
    }

    /// Close every open interval, global and per subject.
    pub fn close_all(&mut self, now: Instant) {
        self.global.end(now);
        for event in self.subjects.values_mut() {
            event.end(now);
        }
    }

    pub fn report(&self, now: Instant) -> ScoringReport {
        let mut subjects: Vec<_> = self
            .subjects
            .iter()
            .map(|(entity, event)| (*entity, event.snapshot(now)))
            .collect();
        subjects.sort_by_key(|(entity, _)| *entity);

        ScoringReport {
            global: self.global.snapshot(now),
            subjects,
            completion_time: self.completion_time,
        }
    }
}
