//! Boundary ports consumed by the core.

use crate::ids::RecipeId;
use crate::recipe::Recipe;

/// Read-only access to recipes owned by the recipe collaborator.
///
/// The core never mutates or persists recipes; it only derives step
/// durations from them when issuing start and advance commands.
pub trait RecipeCatalog: Send + Sync {
    fn recipe(&self, recipe_id: &RecipeId) -> Option<Recipe>;
}
