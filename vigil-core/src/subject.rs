//! Subjects under assessment and the team-roster lookup seam
//!
//! The core never owns the team roster. It resolves entity identifiers to
//! [`TeamMember`]s through a [`TeamRoster`] and keeps only the resulting
//! [`Subject`] values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifier of a simulation entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Sentinel used for whole-group subjects that no single entity stands for.
    pub const GROUP: EntityId = EntityId(u64::MAX);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::GROUP {
            write!(f, "group")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A named role in the team organization, played by one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub entity: EntityId,
}

impl TeamMember {
    pub fn new(name: impl Into<String>, entity: impl Into<EntityId>) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
        }
    }
}

/// Who a violation or success is attributed to.
///
/// Subjects resolved from a team roster carry the member name. Subjects
/// evaluated without a roster are anonymous: they are still keyed by entity,
/// but render as the generic learner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    entity: EntityId,
    name: Option<String>,
}

impl Subject {
    /// Word used for subjects with no team member name.
    pub const ANONYMOUS_NAME: &'static str = "learner";

    pub fn member(member: &TeamMember) -> Self {
        Self {
            entity: member.entity,
            name: Some(member.name.clone()),
        }
    }

    pub fn anonymous(entity: impl Into<EntityId>) -> Self {
        Self {
            entity: entity.into(),
            name: None,
        }
    }

    /// The whole group, for outcomes not attributable to one entity.
    pub fn group() -> Self {
        Self::anonymous(EntityId::GROUP)
    }

    /// Key identifying this subject in violator and scoring bookkeeping.
    pub fn key(&self) -> EntityId {
        self.entity
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    /// Name used when rendering explanations.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(Self::ANONYMOUS_NAME)
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.entity)
    }
}

/// Resolves entities and role names to team members
pub trait TeamRoster: Send + Sync {
    /// Find the team member played by an entity.
    fn lookup(&self, entity: EntityId) -> Option<TeamMember>;

    /// Find a team member by role name.
    fn member_named(&self, name: &str) -> Option<TeamMember>;
}

/// Team member entry as written in a scenario file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMemberConfig {
    pub name: String,
    pub entity: u64,
}

/// Fixed roster built once from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    by_entity: HashMap<EntityId, TeamMember>,
    by_name: HashMap<String, TeamMember>,
}

impl StaticRoster {
    pub fn new(members: impl IntoIterator<Item = TeamMember>) -> Self {
        let mut roster = Self::default();
        for member in members {
            roster.by_entity.insert(member.entity, member.clone());
            roster.by_name.insert(member.name.clone(), member);
        }
        roster
    }

    pub fn from_config(entries: &[TeamMemberConfig]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|e| TeamMember::new(e.name.clone(), e.entity)),
        )
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl TeamRoster for StaticRoster {
    fn lookup(&self, entity: EntityId) -> Option<TeamMember> {
        self.by_entity.get(&entity).cloned()
    }

    fn member_named(&self, name: &str) -> Option<TeamMember> {
        self.by_name.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_subject_renders_as_learner() {
        let subject = Subject::anonymous(7);
        assert!(subject.is_anonymous());
        assert_eq!(subject.display_name(), "learner");
        assert_eq!(subject.key(), EntityId::new(7));
    }

    #[test]
    fn member_subject_uses_member_name() {
        let member = TeamMember::new("alpha", 3);
        let subject = Subject::member(&member);
        assert_eq!(subject.name(), Some("alpha"));
        assert_eq!(subject.key(), EntityId::new(3));
    }

    #[test]
    fn group_subject_uses_sentinel_entity() {
        assert_eq!(Subject::group().key(), EntityId::GROUP);
        assert_eq!(EntityId::GROUP.to_string(), "group");
    }

    #[test]
    fn static_roster_resolves_by_entity_and_name() {
        let roster = StaticRoster::from_config(&[
            TeamMemberConfig {
                name: "alpha".to_string(),
                entity: 1,
            },
            TeamMemberConfig {
                name: "bravo".to_string(),
                entity: 2,
            },
        ]);

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.lookup(EntityId::new(2)).unwrap().name, "bravo");
        assert_eq!(roster.member_named("alpha").unwrap().entity, EntityId::new(1));
        assert!(roster.lookup(EntityId::new(9)).is_none());
    }
}
