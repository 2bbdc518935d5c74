//! Session record and table types.

use crate::ids::RecipeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-record lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No record: never started, or ended.
    #[default]
    Absent,
    Running,
    Paused,
}

/// Countdown state of one recipe's in-progress session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub current_step_index: usize,
    pub is_running: bool,
    pub step_remaining_seconds: u64,
    /// Current step plus every later step. Never below `step_remaining_seconds`.
    pub overall_remaining_seconds: u64,
    /// Wall-clock millis at which the counters were last authoritatively updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tick_ms: Option<u64>,
}

impl SessionRecord {
    pub fn state(&self) -> SessionState {
        if self.is_running {
            SessionState::Running
        } else {
            SessionState::Paused
        }
    }

    pub fn is_step_expired(&self) -> bool {
        self.step_remaining_seconds == 0
    }
}

/// Process-wide session table. Holds at most the active session's record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_recipe_id: Option<RecipeId>,
    #[serde(default)]
    pub by_recipe_id: HashMap<RecipeId, SessionRecord>,
}

impl SessionTable {
    pub fn record(&self, recipe_id: &RecipeId) -> Option<&SessionRecord> {
        self.by_recipe_id.get(recipe_id)
    }

    pub fn active_record(&self) -> Option<(&RecipeId, &SessionRecord)> {
        let active = self.active_recipe_id.as_ref()?;
        self.by_recipe_id.get(active).map(|record| (active, record))
    }

    pub fn state(&self, recipe_id: &RecipeId) -> SessionState {
        self.record(recipe_id)
            .map_or(SessionState::Absent, SessionRecord::state)
    }

    pub fn is_empty(&self) -> bool {
        self.active_recipe_id.is_none() && self.by_recipe_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(is_running: bool) -> SessionRecord {
        SessionRecord {
            current_step_index: 0,
            is_running,
            step_remaining_seconds: 60,
            overall_remaining_seconds: 120,
            last_tick_ms: Some(1_000),
        }
    }

    #[test]
    fn state_reflects_running_flag() {
        assert_eq!(record(true).state(), SessionState::Running);
        assert_eq!(record(false).state(), SessionState::Paused);
    }

    #[test]
    fn active_record_requires_matching_entry() {
        let mut table = SessionTable::default();
        assert!(table.is_empty());
        assert!(table.active_record().is_none());

        let id = RecipeId::from_string("r1");
        table.active_recipe_id = Some(id.clone());
        assert!(table.active_record().is_none());

        table.by_recipe_id.insert(id.clone(), record(true));
        let (active, _) = table.active_record().unwrap();
        assert_eq!(active, &id);
        assert_eq!(table.state(&id), SessionState::Running);
        assert_eq!(table.state(&"other".into()), SessionState::Absent);
    }

    #[test]
    fn table_serializes_with_string_keys() {
        let mut table = SessionTable::default();
        let id = RecipeId::from_string("r1");
        table.active_recipe_id = Some(id.clone());
        table.by_recipe_id.insert(id, record(false));
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["active_recipe_id"], "r1");
        assert_eq!(json["by_recipe_id"]["r1"]["is_running"], false);
    }
}
