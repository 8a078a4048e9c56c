//! Repair pass for loose parser output
//!
//! Both extraction tracks produce the same loose shape; this pass coerces it
//! deterministically into the canonical record before staging. Field swaps,
//! instruction rows leaked into the ingredient list, markdown artifacts and
//! loose enum spellings are all handled here so neither parser has to be
//! perfect.

use crate::extractors::local;
use crate::identity;
use crate::models::{
    Difficulty, MealType, ParsedRecipe, Recipe, RecipeIngredient,
};

/// Source metadata attached while converting a parsed recipe into the
/// canonical record.
#[derive(Debug, Clone, Default)]
pub struct SourceMeta {
    pub url: Option<String>,
    pub post_id: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub comments_count: Option<i64>,
}

/// Apply the deterministic repairs to a loose parsed recipe.
pub fn repair(mut parsed: ParsedRecipe) -> ParsedRecipe {
    parsed.title = clean_text(&parsed.title);
    parsed.description = parsed
        .description
        .map(|d| clean_text(&d))
        .filter(|d| !d.is_empty());

    let mut ingredients = Vec::new();
    for mut ing in parsed.ingredients {
        // Swap: the model sometimes puts the quantity into the item field
        // ("1/2 cups beef stock"). Re-parse and keep the split result.
        if starts_with_quantity(&ing.item) {
            if let Some(reparsed) = local::parse_ingredient_smart(&ing.item) {
                let prior_notes = ing.notes.take();
                ing = reparsed;
                if ing.notes.is_none() {
                    ing.notes = prior_notes.filter(|n| !n.trim().is_empty());
                }
            }
        }

        // Instruction sentences, headers and annotations do not survive.
        if local::is_rejected_ingredient(&ing.item) {
            continue;
        }

        ing.item = clean_text(&ing.item);
        ing.amount = clean_text(&ing.amount);
        ing.unit = ing.unit.map(|u| clean_text(&u)).filter(|u| !u.is_empty());
        ing.notes = ing.notes.map(|n| clean_text(&n)).filter(|n| !n.is_empty());
        if ing.item.len() < 2 {
            continue;
        }
        ingredients.push(ing);
    }
    parsed.ingredients = ingredients;

    parsed.instructions = parsed
        .instructions
        .iter()
        .map(|i| clean_text(i))
        .filter(|i| !i.is_empty())
        .collect();

    parsed.difficulty = parsed
        .difficulty
        .as_deref()
        .and_then(Difficulty::from_loose)
        .map(|d| d.as_str().to_string());
    parsed.meal_type = parsed
        .meal_type
        .as_deref()
        .and_then(MealType::from_loose)
        .map(|m| m.as_str().to_string());
    parsed.cuisine_type = parsed
        .cuisine_type
        .map(|c| clean_text(&c))
        .filter(|c| !c.is_empty());

    parsed.dietary_tags.dedup();

    parsed
}

/// Repair a parsed recipe and coerce it into the canonical record.
///
/// Numeric fields take the first integer in the value (ranges coerce to the
/// low end); the identifier is derived from the repaired title plus the feed
/// post id when one is known.
pub fn into_recipe(parsed: ParsedRecipe, source: SourceMeta) -> Recipe {
    let repaired = repair(parsed);

    let identifier = match source.post_id.as_deref() {
        Some(post_id) => identity::feed_identifier(&repaired.title, post_id),
        None => identity::recipe_identifier(&repaired.title, source.url.as_deref()),
    };

    let prep_minutes = repaired.prep_time.first_integer();
    let cook_minutes = repaired.cook_time.first_integer();
    let total_minutes = repaired.total_time.first_integer().or(match (prep_minutes, cook_minutes) {
        (Some(p), Some(c)) => Some(p + c),
        _ => None,
    });

    let ingredients = repaired
        .ingredients
        .into_iter()
        .enumerate()
        .map(|(idx, ing)| RecipeIngredient {
            item: ing.item,
            amount: ing.amount,
            unit: ing.unit,
            notes: ing.notes,
            order_index: idx as i64 + 1,
        })
        .collect();

    Recipe {
        identifier,
        title: repaired.title,
        description: repaired.description,
        ingredients,
        instructions: repaired.instructions,
        prep_minutes,
        cook_minutes,
        total_minutes,
        servings: repaired.servings.as_f64(),
        difficulty: repaired.difficulty.as_deref().and_then(Difficulty::parse),
        cuisine_type: repaired.cuisine_type,
        meal_type: repaired.meal_type.as_deref().and_then(MealType::parse),
        dietary_tags: repaired.dietary_tags,
        source_url: source.url,
        source_post_id: source.post_id,
        source_author: source.author,
        source_score: source.score,
        source_comments_count: source.comments_count,
        embedding: None,
        created_at: None,
        updated_at: None,
    }
}

fn starts_with_quantity(item: &str) -> bool {
    item.trim_start().starts_with(|c: char| c.is_ascii_digit())
}

/// Strip markdown artifacts and collapse stray whitespace in one field.
fn clean_text(s: &str) -> String {
    s.replace("**", "")
        .replace("&amp;", "&")
        .replace("&#x200B;", "")
        .replace("[x200b]", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
