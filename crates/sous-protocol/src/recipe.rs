//! Recipe model consumed read-only by the session core.
//!
//! Step order is execution order. Durations are authored in minutes and
//! converted to seconds here, so every caller derives store arguments the
//! same way.

use crate::error::RecipeError;
use crate::ids::RecipeId;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_MINUTE: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub description: String,
    pub duration_minutes: u32,
}

impl Step {
    pub fn new(description: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            description: description.into(),
            duration_minutes,
        }
    }

    pub fn duration_seconds(&self) -> u64 {
        u64::from(self.duration_minutes) * SECONDS_PER_MINUTE
    }
}

/// Arguments for moving a session onto its next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    /// Full duration of the step being entered.
    pub duration_seconds: u64,
    /// Sum of the entered step and every later step.
    pub overall_remaining_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    #[serde(default)]
    pub title: String,
    pub steps: Vec<Step>,
}

impl Recipe {
    pub fn new(id: impl Into<RecipeId>, title: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            steps,
        }
    }

    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.steps.is_empty() {
            return Err(RecipeError::NoSteps);
        }
        if let Some(index) = self.steps.iter().position(|step| step.duration_minutes == 0) {
            return Err(RecipeError::ZeroDuration { index });
        }
        Ok(())
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Duration of the step at `index`, or 0 past the end.
    pub fn step_duration_seconds(&self, index: usize) -> u64 {
        self.steps.get(index).map_or(0, Step::duration_seconds)
    }

    pub fn total_duration_seconds(&self) -> u64 {
        self.remaining_from(0)
    }

    /// Sum of the durations of steps `index..`.
    pub fn remaining_from(&self, index: usize) -> u64 {
        self.steps
            .iter()
            .skip(index)
            .map(Step::duration_seconds)
            .sum()
    }

    pub fn is_last_step(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }

    /// Arguments for leaving `current_index`, or `None` when it is the last step.
    pub fn next_step(&self, current_index: usize) -> Option<NextStep> {
        if self.is_last_step(current_index) {
            return None;
        }
        let next = current_index + 1;
        Some(NextStep {
            duration_seconds: self.step_duration_seconds(next),
            overall_remaining_seconds: self.remaining_from(next),
        })
    }
}
