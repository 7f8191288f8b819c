use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{ActionId, BatchId, QuestionId};

/// What a queued client action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    Reveal { question_id: QuestionId },
    /// Navigation target as sent by the client; may be out of range.
    Navigate { index: i64 },
    Complete,
}

/// A single user interaction, stamped with the client's clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAction {
    pub id: ActionId,
    #[serde(flatten)]
    pub kind: ActionKind,
    pub at: DateTime<Utc>,
}

impl SyncAction {
    #[must_use]
    pub fn new(kind: ActionKind, at: DateTime<Utc>) -> Self {
        Self {
            id: ActionId::generate(),
            kind,
            at,
        }
    }

    #[must_use]
    pub fn reveal(question_id: QuestionId, at: DateTime<Utc>) -> Self {
        Self::new(ActionKind::Reveal { question_id }, at)
    }

    #[must_use]
    pub fn navigate(index: i64, at: DateTime<Utc>) -> Self {
        Self::new(ActionKind::Navigate { index }, at)
    }

    #[must_use]
    pub fn complete(at: DateTime<Utc>) -> Self {
        Self::new(ActionKind::Complete, at)
    }
}

/// A group of actions flushed together.
///
/// The batch id is assigned when the batch is first cut and kept across
/// retries, so the server can recognise a redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBatch {
    pub id: BatchId,
    pub actions: Vec<SyncAction>,
}

impl ActionBatch {
    #[must_use]
    pub fn new(actions: Vec<SyncAction>) -> Self {
        Self {
            id: BatchId::generate(),
            actions,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn action_serializes_with_flat_kind_tag() {
        let action = SyncAction::navigate(3, fixed_now());
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["kind"], "navigate");
        assert_eq!(value["index"], 3);
        assert!(value["at"].is_string());

        let back: SyncAction = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn reveal_action_carries_question_id() {
        let action = SyncAction::reveal(QuestionId::new("q7"), fixed_now());
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["kind"], "reveal");
        assert_eq!(value["question_id"], "q7");
    }
}
