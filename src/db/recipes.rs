//! Recipe row queries
//!
//! Pure row-level access: fetch, insert, page, search, stats. Dedup policy
//! and the validation gate live in the store adapter on top of this module.

use crate::db::catalog;
use crate::error::Result;
use crate::extractors::units;
use crate::models::{Difficulty, MealType, Recipe, RecipeFilters, RecipeIngredient, RecipeStats};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

const RECIPE_COLUMNS: &str = "id, identifier, title, description, instructions, prep_minutes, \
    cook_minutes, total_minutes, servings, difficulty, cuisine_type, meal_type, dietary_tags, \
    source_url, source_post_id, source_author, source_score, source_comments_count, embedding, \
    created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct RecipeRow {
    id: i64,
    identifier: String,
    title: String,
    description: Option<String>,
    instructions: String,
    prep_minutes: Option<i64>,
    cook_minutes: Option<i64>,
    total_minutes: Option<i64>,
    servings: Option<f64>,
    difficulty: Option<String>,
    cuisine_type: Option<String>,
    meal_type: Option<String>,
    dietary_tags: Option<String>,
    source_url: Option<String>,
    source_post_id: Option<String>,
    source_author: Option<String>,
    source_score: Option<i64>,
    source_comments_count: Option<i64>,
    embedding: Option<String>,
    created_at: Option<NaiveDateTime>,
    updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
struct IngredientRow {
    item: String,
    amount: Option<f64>,
    amount_text: Option<String>,
    unit: Option<String>,
    notes: Option<String>,
    order_index: i64,
}

fn to_utc(t: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    t.map(|n| DateTime::from_naive_utc_and_offset(n, Utc))
}

fn row_to_recipe(row: RecipeRow, ingredients: Vec<RecipeIngredient>) -> Recipe {
    Recipe {
        identifier: Uuid::parse_str(&row.identifier).unwrap_or_default(),
        title: row.title,
        description: row.description,
        ingredients,
        instructions: serde_json::from_str(&row.instructions).unwrap_or_default(),
        prep_minutes: row.prep_minutes,
        cook_minutes: row.cook_minutes,
        total_minutes: row.total_minutes,
        servings: row.servings,
        difficulty: row.difficulty.as_deref().and_then(Difficulty::parse),
        cuisine_type: row.cuisine_type,
        meal_type: row.meal_type.as_deref().and_then(MealType::parse),
        dietary_tags: row
            .dietary_tags
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default(),
        source_url: row.source_url,
        source_post_id: row.source_post_id,
        source_author: row.source_author,
        source_score: row.source_score,
        source_comments_count: row.source_comments_count,
        embedding: row
            .embedding
            .as_deref()
            .and_then(|e| serde_json::from_str(e).ok()),
        created_at: to_utc(row.created_at),
        updated_at: to_utc(row.updated_at),
    }
}

async fn fetch_ingredients(pool: &SqlitePool, recipe_id: i64) -> Result<Vec<RecipeIngredient>> {
    let rows: Vec<IngredientRow> = sqlx::query_as(
        "SELECT i.name AS item, ri.amount, ri.amount_text, m.name AS unit, ri.notes, ri.order_index
         FROM recipe_ingredients ri
         JOIN ingredients i ON ri.ingredient_id = i.id
         LEFT JOIN measurements m ON ri.measurement_id = m.id
         WHERE ri.recipe_id = ?
         ORDER BY ri.order_index ASC",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| RecipeIngredient {
            item: r.item,
            amount: r
                .amount_text
                .or_else(|| r.amount.map(|a| a.to_string()))
                .unwrap_or_default(),
            unit: r.unit,
            notes: r.notes,
            order_index: r.order_index,
        })
        .collect())
}

/// Insert a recipe with its catalog rows and junction rows in one
/// transaction. A unique-index collision on `identifier` surfaces as a
/// database error for the store adapter to absorb.
pub async fn insert_recipe(pool: &SqlitePool, recipe: &Recipe) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let recipe_id: i64 = sqlx::query_scalar(
        "INSERT INTO recipes (identifier, title, title_normalized, description, instructions,
            prep_minutes, cook_minutes, total_minutes, servings, difficulty, cuisine_type,
            meal_type, dietary_tags, source_url, source_post_id, source_author, source_score,
            source_comments_count, embedding)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(recipe.identifier.to_string())
    .bind(&recipe.title)
    .bind(recipe.normalized_title())
    .bind(&recipe.description)
    .bind(serde_json::to_string(&recipe.instructions)?)
    .bind(recipe.prep_minutes)
    .bind(recipe.cook_minutes)
    .bind(recipe.total_minutes)
    .bind(recipe.servings)
    .bind(recipe.difficulty.map(|d| d.as_str()))
    .bind(&recipe.cuisine_type)
    .bind(recipe.meal_type.map(|m| m.as_str()))
    .bind(serde_json::to_string(&recipe.dietary_tags)?)
    .bind(&recipe.source_url)
    .bind(&recipe.source_post_id)
    .bind(&recipe.source_author)
    .bind(recipe.source_score)
    .bind(recipe.source_comments_count)
    .bind(
        recipe
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .fetch_one(&mut *tx)
    .await?;

    for ingredient in &recipe.ingredients {
        if ingredient.item.trim().is_empty() {
            continue;
        }
        let ingredient_id = catalog::get_or_create_ingredient(&mut tx, &ingredient.item).await?;

        let (numeric_amount, unit) =
            units::parse_amount(&ingredient.amount, ingredient.unit.as_deref());
        let measurement_id = match unit {
            Some(unit) => Some(catalog::get_or_create_measurement(&mut tx, unit).await?),
            None => None,
        };

        sqlx::query(
            "INSERT INTO recipe_ingredients
                (recipe_id, ingredient_id, measurement_id, amount, amount_text, notes, order_index)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(recipe_id)
        .bind(ingredient_id)
        .bind(measurement_id)
        .bind(numeric_amount)
        .bind(&ingredient.amount)
        .bind(&ingredient.notes)
        .bind(ingredient.order_index)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(recipe_id)
}

pub async fn get_id_by_identifier(pool: &SqlitePool, identifier: &Uuid) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM recipes WHERE identifier = ?")
        .bind(identifier.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn get_id_by_normalized_title(pool: &SqlitePool, title: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM recipes WHERE title_normalized = ? LIMIT 1")
        .bind(title)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Recipe>> {
    let row: Option<RecipeRow> =
        sqlx::query_as(&format!("SELECT {} FROM recipes WHERE id = ?", RECIPE_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    match row {
        Some(row) => {
            let ingredients = fetch_ingredients(pool, row.id).await?;
            Ok(Some(row_to_recipe(row, ingredients)))
        }
        None => Ok(None),
    }
}

/// One page of recipes in insertion order, with ingredients attached.
pub async fn fetch_page(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<(i64, Recipe)>> {
    let rows: Vec<RecipeRow> = sqlx::query_as(&format!(
        "SELECT {} FROM recipes ORDER BY id ASC LIMIT ? OFFSET ?",
        RECIPE_COLUMNS
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        let ingredients = fetch_ingredients(pool, id).await?;
        out.push((id, row_to_recipe(row, ingredients)));
    }
    Ok(out)
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let n = sqlx::query_scalar("SELECT COUNT(*) FROM recipes")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Replace an existing row with a newer snapshot carrying the same
/// identifier. Junction rows are rebuilt.
pub async fn update_recipe(pool: &SqlitePool, id: i64, recipe: &Recipe) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE recipes SET title = ?, title_normalized = ?, description = ?, instructions = ?,
            prep_minutes = ?, cook_minutes = ?, total_minutes = ?, servings = ?, difficulty = ?,
            cuisine_type = ?, meal_type = ?, dietary_tags = ?, source_url = ?, source_post_id = ?,
            source_author = ?, source_score = ?, source_comments_count = ?,
            updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&recipe.title)
    .bind(recipe.normalized_title())
    .bind(&recipe.description)
    .bind(serde_json::to_string(&recipe.instructions)?)
    .bind(recipe.prep_minutes)
    .bind(recipe.cook_minutes)
    .bind(recipe.total_minutes)
    .bind(recipe.servings)
    .bind(recipe.difficulty.map(|d| d.as_str()))
    .bind(&recipe.cuisine_type)
    .bind(recipe.meal_type.map(|m| m.as_str()))
    .bind(serde_json::to_string(&recipe.dietary_tags)?)
    .bind(&recipe.source_url)
    .bind(&recipe.source_post_id)
    .bind(&recipe.source_author)
    .bind(recipe.source_score)
    .bind(recipe.source_comments_count)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for ingredient in &recipe.ingredients {
        if ingredient.item.trim().is_empty() {
            continue;
        }
        let ingredient_id = catalog::get_or_create_ingredient(&mut tx, &ingredient.item).await?;
        let (numeric_amount, unit) =
            units::parse_amount(&ingredient.amount, ingredient.unit.as_deref());
        let measurement_id = match unit {
            Some(unit) => Some(catalog::get_or_create_measurement(&mut tx, unit).await?),
            None => None,
        };
        sqlx::query(
            "INSERT INTO recipe_ingredients
                (recipe_id, ingredient_id, measurement_id, amount, amount_text, notes, order_index)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(ingredient_id)
        .bind(measurement_id)
        .bind(numeric_amount)
        .bind(&ingredient.amount)
        .bind(&ingredient.notes)
        .bind(ingredient.order_index)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Text search over title and description with optional facet filters.
pub async fn search_text(
    pool: &SqlitePool,
    query: &str,
    filters: &RecipeFilters,
    limit: i64,
    offset: i64,
) -> Result<Vec<(i64, Recipe)>> {
    let mut sql = format!(
        "SELECT {} FROM recipes WHERE (title LIKE ? OR description LIKE ?)",
        RECIPE_COLUMNS
    );
    let pattern = format!("%{}%", query);

    if filters.cuisine_type.is_some() {
        sql.push_str(" AND cuisine_type = ?");
    }
    if filters.meal_type.is_some() {
        sql.push_str(" AND meal_type = ?");
    }
    if filters.difficulty.is_some() {
        sql.push_str(" AND difficulty = ?");
    }
    if filters.max_prep_minutes.is_some() {
        sql.push_str(" AND prep_minutes <= ?");
    }
    if filters.max_cook_minutes.is_some() {
        sql.push_str(" AND cook_minutes <= ?");
    }
    if filters.min_servings.is_some() {
        sql.push_str(" AND servings >= ?");
    }
    for _ in &filters.dietary_tags {
        sql.push_str(" AND dietary_tags LIKE ?");
    }
    sql.push_str(" ORDER BY (title LIKE ?) DESC, created_at DESC LIMIT ? OFFSET ?");

    let mut q = sqlx::query_as::<_, RecipeRow>(&sql)
        .bind(&pattern)
        .bind(&pattern);
    if let Some(c) = &filters.cuisine_type {
        q = q.bind(c);
    }
    if let Some(m) = filters.meal_type {
        q = q.bind(m.as_str());
    }
    if let Some(d) = filters.difficulty {
        q = q.bind(d.as_str());
    }
    if let Some(p) = filters.max_prep_minutes {
        q = q.bind(p);
    }
    if let Some(c) = filters.max_cook_minutes {
        q = q.bind(c);
    }
    if let Some(s) = filters.min_servings {
        q = q.bind(s);
    }
    for tag in &filters.dietary_tags {
        q = q.bind(format!("%\"{}\"%", tag));
    }
    let rows = q.bind(&pattern).bind(limit).bind(offset).fetch_all(pool).await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        let ingredients = fetch_ingredients(pool, id).await?;
        out.push((id, row_to_recipe(row, ingredients)));
    }
    Ok(out)
}

pub async fn stats(pool: &SqlitePool) -> Result<RecipeStats> {
    let (total, cuisines, meal_types, avg_prep, avg_cook, avg_score): (
        i64,
        i64,
        i64,
        Option<f64>,
        Option<f64>,
        Option<f64>,
    ) = sqlx::query_as(
        "SELECT COUNT(*),
                COUNT(DISTINCT cuisine_type),
                COUNT(DISTINCT meal_type),
                AVG(prep_minutes),
                AVG(cook_minutes),
                AVG(source_score)
         FROM recipes",
    )
    .fetch_one(pool)
    .await?;

    Ok(RecipeStats {
        total_recipes: total,
        unique_cuisines: cuisines,
        unique_meal_types: meal_types,
        avg_prep_minutes: avg_prep,
        avg_cook_minutes: avg_cook,
        avg_source_score: avg_score,
    })
}

/// Cached embedding and the input text it was generated from.
pub async fn get_embedding(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<(Vec<f32>, Option<String>)>> {
    let row: Option<(Option<String>, Option<String>)> =
        sqlx::query_as("SELECT embedding, embedding_input FROM recipes WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row.and_then(|(embedding, input)| {
        let vector: Vec<f32> = serde_json::from_str(embedding.as_deref()?).ok()?;
        Some((vector, input))
    }))
}

pub async fn set_embedding(
    pool: &SqlitePool,
    id: i64,
    embedding: &[f32],
    input: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE recipes SET embedding = ?, embedding_input = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(serde_json::to_string(embedding)?)
    .bind(input)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
