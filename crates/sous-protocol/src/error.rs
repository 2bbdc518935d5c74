//! Error types surfaced at the operator boundary.
//!
//! Session store transitions are total and never produce these; they exist
//! for callers that translate a no-op into something a human should see.

use crate::ids::RecipeId;
use thiserror::Error;

/// Problems with recipe content that make a session impossible to drive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecipeError {
    #[error("recipe has no steps")]
    NoSteps,
    #[error("step {index} has a zero duration")]
    ZeroDuration { index: usize },
}

/// Errors reported to whoever issued a session command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("another session is active: {active}")]
    AnotherSessionActive { active: RecipeId },
    #[error("recipe not found: {0}")]
    RecipeNotFound(RecipeId),
    #[error("invalid recipe {recipe_id}: {source}")]
    InvalidRecipe {
        recipe_id: RecipeId,
        #[source]
        source: RecipeError,
    },
}

/// Convenience result type for session commands.
pub type SessionResult<T> = Result<T, SessionError>;
