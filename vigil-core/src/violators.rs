//! Per-condition set of subjects currently violating
//!
//! Entries keep insertion order so explanation text stays stable while
//! membership is unchanged. Re-adding a present subject only refreshes its
//! timestamp (last writer wins).

use std::time::Duration;

use tokio::time::Instant;

use crate::subject::{EntityId, Subject};

#[derive(Debug, Clone)]
struct Violator {
    subject: Subject,
    last_violation: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct ViolatorSet {
    entries: Vec<Violator>,
}

impl ViolatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation. Returns true if the subject was newly added.
    pub fn add(&mut self, subject: Subject, now: Instant) -> bool {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|v| v.subject.key() == subject.key())
        {
            existing.last_violation = now;
            existing.subject = subject;
            return false;
        }
        self.entries.push(Violator {
            subject,
            last_violation: now,
        });
        true
    }

    /// Remove a subject. Returns true if it was present.
    pub fn remove(&mut self, key: EntityId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|v| v.subject.key() != key);
        self.entries.len() != before
    }

    pub fn contains(&self, key: EntityId) -> bool {
        self.entries.iter().any(|v| v.subject.key() == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last violation time of a subject.
    pub fn last_violation(&self, key: EntityId) -> Option<Instant> {
        self.entries
            .iter()
            .find(|v| v.subject.key() == key)
            .map(|v| v.last_violation)
    }

    /// Remove subjects whose last violation is older than `stale_after`.
    ///
    /// Returns the evicted subjects in insertion order.
    pub fn evict_stale(&mut self, now: Instant, stale_after: Duration) -> Vec<Subject> {
        let mut evicted = Vec::new();
        self.entries.retain(|v| {
            if now.saturating_duration_since(v.last_violation) > stale_after {
                evicted.push(v.subject.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Current violators in insertion order.
    pub fn snapshot(&self) -> impl Iterator<Item = &Subject> {
        self.entries.iter().map(|v| &v.subject)
    }
}
