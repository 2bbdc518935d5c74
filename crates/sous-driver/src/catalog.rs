use std::collections::HashMap;

use parking_lot::RwLock;
use sous_protocol::{Recipe, RecipeCatalog, RecipeId};

/// Recipe catalog backed by a map; stands in for the recipe collaborator.
#[derive(Debug, Default)]
pub struct InMemoryRecipeCatalog {
    recipes: RwLock<HashMap<RecipeId, Recipe>>,
}

impl InMemoryRecipeCatalog {
    pub fn new(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        let catalog = Self::default();
        for recipe in recipes {
            catalog.insert(recipe);
        }
        catalog
    }

    /// Adds or replaces a recipe, returning the previous version.
    pub fn insert(&self, recipe: Recipe) -> Option<Recipe> {
        self.recipes.write().insert(recipe.id.clone(), recipe)
    }

    pub fn remove(&self, recipe_id: &RecipeId) -> Option<Recipe> {
        self.recipes.write().remove(recipe_id)
    }

    /// All recipes, ordered by id.
    pub fn list(&self) -> Vec<Recipe> {
        let mut recipes: Vec<Recipe> = self.recipes.read().values().cloned().collect();
        recipes.sort_by(|a, b| a.id.cmp(&b.id));
        recipes
    }
}

impl RecipeCatalog for InMemoryRecipeCatalog {
    fn recipe(&self, recipe_id: &RecipeId) -> Option<Recipe> {
        self.recipes.read().get(recipe_id).cloned()
    }
}
