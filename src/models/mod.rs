//! Data models for the recipe pipeline

pub mod parsed;
pub mod recipe;

pub use parsed::{NumOrText, ParsedIngredient, ParsedRecipe};
pub use recipe::{
    Difficulty, MealType, Recipe, RecipeFilters, RecipeIngredient, RecipeStats, EMBEDDING_DIM,
};
