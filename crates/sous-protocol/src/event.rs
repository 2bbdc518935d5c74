//! Session events.
//!
//! Every transition the store actually applies is published as one
//! [`SessionEvent`]. Observers render from these (or from snapshots); they
//! never derive elapsed time themselves.

use crate::ids::RecipeId;
use serde::{Deserialize, Serialize};

/// Why a session moved to its next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceCause {
    /// The step's countdown reached zero.
    Expired,
    /// The operator stopped the step early.
    Skipped,
}

/// Why a session record was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCause {
    /// The last step's countdown reached zero.
    Completed,
    /// The operator stopped the last step.
    Stopped,
    /// Explicit end-session command.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        recipe_id: RecipeId,
        step_remaining_seconds: u64,
        overall_remaining_seconds: u64,
    },
    /// A start was refused because a different recipe holds the session.
    StartRejected {
        requested: RecipeId,
        active: RecipeId,
    },
    Paused {
        recipe_id: RecipeId,
    },
    Resumed {
        recipe_id: RecipeId,
    },
    Ticked {
        recipe_id: RecipeId,
        elapsed_seconds: u64,
        step_remaining_seconds: u64,
        overall_remaining_seconds: u64,
    },
    StepAdvanced {
        recipe_id: RecipeId,
        step_index: usize,
        step_remaining_seconds: u64,
        overall_remaining_seconds: u64,
        cause: AdvanceCause,
    },
    Ended {
        recipe_id: RecipeId,
        cause: EndCause,
    },
}

impl SessionEvent {
    pub fn recipe_id(&self) -> &RecipeId {
        match self {
            Self::StartRejected { requested, .. } => requested,
            Self::Started { recipe_id, .. }
            | Self::Paused { recipe_id }
            | Self::Resumed { recipe_id }
            | Self::Ticked { recipe_id, .. }
            | Self::StepAdvanced { recipe_id, .. }
            | Self::Ended { recipe_id, .. } => recipe_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::StartRejected { .. } => "start_rejected",
            Self::Paused { .. } => "paused",
            Self::Resumed { .. } => "resumed",
            Self::Ticked { .. } => "ticked",
            Self::StepAdvanced { .. } => "step_advanced",
            Self::Ended { .. } => "ended",
        }
    }
}

/// An event stamped with the store clock at the moment it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEventRecord {
    pub at_ms: u64,
    /// Position in the store's total order of applied transitions.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let record = SessionEventRecord {
            at_ms: 42,
            sequence: 3,
            event: SessionEvent::StepAdvanced {
                recipe_id: "r1".into(),
                step_index: 1,
                step_remaining_seconds: 600,
                overall_remaining_seconds: 600,
                cause: AdvanceCause::Expired,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "step_advanced");
        assert_eq!(json["cause"], "expired");
        assert_eq!(json["sequence"], 3);
    }

    #[test]
    fn start_rejected_is_keyed_by_requested_recipe() {
        let event = SessionEvent::StartRejected {
            requested: "b".into(),
            active: "a".into(),
        };
        assert_eq!(event.recipe_id().as_str(), "b");
        assert_eq!(event.name(), "start_rejected");
    }
}
