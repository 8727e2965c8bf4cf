//! Notification sink for assessment changes and terminal transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::assessment::{AssessmentLevel, ConditionState};

/// What a condition reports to the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentUpdate {
    pub condition_id: Uuid,
    pub condition: String,
    pub kind: String,
    pub level: AssessmentLevel,
    pub explanation: Option<String>,
    pub state: ConditionState,
    pub at: DateTime<Utc>,
}

/// Receives condition notifications
///
/// Conditions call the sink while holding their state lock, so
/// implementations must return quickly and must not call back into the
/// condition that notified them.
pub trait ConditionNotifier: Send + Sync {
    /// The level or the explanation changed.
    fn on_assessment_changed(&self, update: &AssessmentUpdate);

    /// The condition reached a terminal state. Called once per condition.
    fn on_condition_completed(&self, update: &AssessmentUpdate);
}

/// Notification forwarded by [`ChannelNotifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNotification {
    AssessmentChanged(AssessmentUpdate),
    Completed(AssessmentUpdate),
}

impl ConditionNotification {
    pub fn update(&self) -> &AssessmentUpdate {
        match self {
            Self::AssessmentChanged(update) | Self::Completed(update) => update,
        }
    }
}

/// Forwards notifications over an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ConditionNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConditionNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConditionNotifier for ChannelNotifier {
    fn on_assessment_changed(&self, update: &AssessmentUpdate) {
        // A dropped receiver means nobody is listening any more.
        let _ = self
            .tx
            .send(ConditionNotification::AssessmentChanged(update.clone()));
    }

    fn on_condition_completed(&self, update: &AssessmentUpdate) {
        let _ = self.tx.send(ConditionNotification::Completed(update.clone()));
    }
}
