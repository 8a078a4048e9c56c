//! Canonical recipe record and invariant checks
//!
//! The `Recipe` struct is the shape every parser output is coerced into, the
//! shape staged to disk between parse and load, and the shape the store hands
//! back. Loose parser output lives in [`super::parsed`] and never leaves the
//! extractor layer.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed dimension of recipe embeddings
pub const EMBEDDING_DIM: usize = 384;

/// Placeholder item emitted by the local parser when nothing survived the
/// ingredient filter. The validation gate rejects records made of these.
pub const PLACEHOLDER_INGREDIENT: &str = "Ingredients listed in recipe text";

/// Difficulty rating, normalized from free-text variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Normalize a loose difficulty string by substring match.
    ///
    /// `"super easy"` → Easy, `"moderate"` → Medium, `"quite difficult"` →
    /// Hard. Unknown values map to None rather than erroring.
    pub fn from_loose(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        const EASY: [&str; 4] = ["easy", "simple", "beginner", "quick"];
        const MEDIUM: [&str; 3] = ["medium", "moderate", "intermediate"];
        const HARD: [&str; 5] = ["hard", "difficult", "advanced", "complex", "challenging"];
        if EASY.iter().any(|k| s.contains(k)) {
            Some(Difficulty::Easy)
        } else if MEDIUM.iter().any(|k| s.contains(k)) {
            Some(Difficulty::Medium)
        } else if HARD.iter().any(|k| s.contains(k)) {
            Some(Difficulty::Hard)
        } else {
            None
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Meal type, normalized from free-text variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Dessert,
}

impl MealType {
    pub const ALL: [MealType; 5] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Snack,
        MealType::Dessert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
            MealType::Dessert => "dessert",
        }
    }

    /// Normalize a loose meal-type string by substring match.
    ///
    /// When several types are mentioned (`"Dinner or lunch"`), the first
    /// mention in the string wins.
    pub fn from_loose(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        MealType::ALL
            .iter()
            .filter_map(|meal| s.find(meal.as_str()).map(|pos| (pos, *meal)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, meal)| meal)
    }

    pub fn parse(s: &str) -> Option<Self> {
        MealType::ALL.iter().copied().find(|m| m.as_str() == s)
    }
}

/// One ingredient row of a recipe.
///
/// `amount` keeps the textual quantity as written (`"2-4"`, `"1/2"`); the
/// store coerces to the numeric low end where a number is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub item: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Position within the recipe; recomputed from array order on load
    #[serde(default, skip_serializing)]
    pub order_index: i64,
}

impl RecipeIngredient {
    pub fn is_placeholder(&self) -> bool {
        self.item == PLACEHOLDER_INGREDIENT
    }

    /// Amount with unit appended, e.g. `"1/2 cups"`.
    pub fn amount_with_unit(&self) -> String {
        match &self.unit {
            Some(unit) if !self.amount.is_empty() => format!("{} {}", self.amount, unit),
            Some(unit) => unit.clone(),
            None => self.amount.clone(),
        }
    }
}

/// Canonical recipe record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub identifier: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dietary_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_comments_count: Option<i64>,
    /// Present only when the enrichment path has run; never staged to disk
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Recipe {
    /// Validation gate applied before any store insert.
    ///
    /// Rejections here are per-item skips, not worker failures: an empty
    /// title, fewer than two real ingredient rows, or nothing but placeholder
    /// rows all mean the source text was not usable as a recipe.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("recipe title is empty".to_string()));
        }
        let real: Vec<&RecipeIngredient> = self
            .ingredients
            .iter()
            .filter(|i| !i.is_placeholder() && !i.item.trim().is_empty())
            .collect();
        if real.is_empty() {
            return Err(Error::Validation(format!(
                "recipe '{}' has no usable ingredients",
                self.title
            )));
        }
        if real.len() < 2 {
            return Err(Error::Validation(format!(
                "recipe '{}' has too few valid ingredients ({})",
                self.title,
                real.len()
            )));
        }
        if let Some(embedding) = &self.embedding {
            if embedding.len() != EMBEDDING_DIM {
                return Err(Error::Validation(format!(
                    "embedding has {} dimensions, expected {}",
                    embedding.len(),
                    EMBEDDING_DIM
                )));
            }
        }
        Ok(())
    }

    /// Title normalized the same way identifier derivation normalizes it.
    pub fn normalized_title(&self) -> String {
        crate::identity::normalize(&self.title)
    }
}

/// Filter options for store queries
#[derive(Debug, Clone, Default)]
pub struct RecipeFilters {
    pub cuisine_type: Option<String>,
    pub meal_type: Option<MealType>,
    pub difficulty: Option<Difficulty>,
    pub dietary_tags: Vec<String>,
    pub max_prep_minutes: Option<i64>,
    pub max_cook_minutes: Option<i64>,
    pub min_servings: Option<f64>,
}

/// Aggregate statistics for the `stats` command
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecipeStats {
    pub total_recipes: i64,
    pub unique_cuisines: i64,
    pub unique_meal_types: i64,
    pub avg_prep_minutes: Option<f64>,
    pub avg_cook_minutes: Option<f64>,
    pub avg_source_score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(item: &str) -> RecipeIngredient {
        RecipeIngredient {
            item: item.to_string(),
            amount: "1".to_string(),
            unit: None,
            notes: None,
            order_index: 0,
        }
    }

    fn recipe(ingredients: Vec<RecipeIngredient>) -> Recipe {
        Recipe {
            identifier: crate::identity::recipe_identifier("Test Recipe", None),
            title: "Test Recipe".to_string(),
            description: None,
            ingredients,
            instructions: vec!["Mix everything.".to_string()],
            prep_minutes: None,
            cook_minutes: None,
            total_minutes: None,
            servings: None,
            difficulty: None,
            cuisine_type: None,
            meal_type: None,
            dietary_tags: Vec::new(),
            source_url: None,
            source_post_id: None,
            source_author: None,
            source_score: None,
            source_comments_count: None,
            embedding: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn difficulty_from_loose_variants() {
        assert_eq!(Difficulty::from_loose("super easy"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::from_loose("Moderate"), Some(Difficulty::Medium));
        assert_eq!(
            Difficulty::from_loose("quite difficult"),
            Some(Difficulty::Hard)
        );
        assert_eq!(Difficulty::from_loose("unknown"), None);
    }

    #[test]
    fn meal_type_first_mention_wins() {
        assert_eq!(MealType::from_loose("Dinner or lunch"), Some(MealType::Dinner));
        assert_eq!(MealType::from_loose("lunch, not dinner"), Some(MealType::Lunch));
        assert_eq!(MealType::from_loose("midnight feast"), None);
    }

    #[test]
    fn validation_rejects_empty_title() {
        let mut r = recipe(vec![ingredient("flour"), ingredient("sugar")]);
        r.title = "  ".to_string();
        assert!(matches!(r.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn validation_rejects_single_ingredient() {
        let r = recipe(vec![ingredient("flour")]);
        assert!(matches!(r.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn validation_rejects_placeholder_only() {
        let r = recipe(vec![ingredient(PLACEHOLDER_INGREDIENT)]);
        assert!(matches!(r.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn validation_accepts_two_real_ingredients() {
        let r = recipe(vec![ingredient("flour"), ingredient("sugar")]);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn validation_checks_embedding_dimension() {
        let mut r = recipe(vec![ingredient("flour"), ingredient("sugar")]);
        r.embedding = Some(vec![0.0; 16]);
        assert!(r.validate().is_err());
        r.embedding = Some(vec![0.0; EMBEDDING_DIM]);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn staged_serialization_omits_embedding() {
        let mut r = recipe(vec![ingredient("flour"), ingredient("sugar")]);
        r.embedding = Some(vec![0.1; EMBEDDING_DIM]);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["title"], "Test Recipe");
        let back: Recipe = serde_json::from_value(json).unwrap();
        assert_eq!(back.title, r.title);
        assert!(back.embedding.is_none());
    }
}
