//! Database schema definitions for the recipe store
//!
//! Creates the recipe table, the normalized ingredient and measurement
//! catalogs, the recipe↔ingredient junction, schedule state for the schedule
//! controller, and a key/value settings table.

use crate::error::Result;
use sqlx::SqlitePool;

/// Initialize database schema. Idempotent; runs inside one transaction.
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            title_normalized TEXT NOT NULL,
            description TEXT,
            instructions TEXT NOT NULL,
            prep_minutes INTEGER,
            cook_minutes INTEGER,
            total_minutes INTEGER,
            servings REAL,
            difficulty TEXT CHECK (difficulty IN ('easy', 'medium', 'hard')),
            cuisine_type TEXT,
            meal_type TEXT CHECK (meal_type IN ('breakfast', 'lunch', 'dinner', 'snack', 'dessert')),
            dietary_tags TEXT,
            source_url TEXT,
            source_post_id TEXT,
            source_author TEXT,
            source_score INTEGER,
            source_comments_count INTEGER,
            embedding TEXT,
            embedding_input TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (prep_minutes IS NULL OR prep_minutes >= 0),
            CHECK (cook_minutes IS NULL OR cook_minutes >= 0),
            CHECK (total_minutes IS NULL OR total_minutes >= 0),
            CHECK (servings IS NULL OR servings >= 0)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_recipes_identifier ON recipes(identifier)")
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recipes_title_normalized ON recipes(title_normalized)",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recipes_cuisine ON recipes(cuisine_type)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recipes_meal_type ON recipes(meal_type)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recipes_difficulty ON recipes(difficulty)")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            category TEXT,
            description TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            abbreviation TEXT,
            unit_type TEXT CHECK (unit_type IN ('volume', 'weight', 'count')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
            measurement_id INTEGER REFERENCES measurements(id),
            amount REAL,
            amount_text TEXT,
            notes TEXT,
            order_index INTEGER NOT NULL,
            UNIQUE (recipe_id, ingredient_id, order_index),
            CHECK (order_index >= 0)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id)",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            workflow TEXT NOT NULL,
            input TEXT NOT NULL,
            interval_seconds INTEGER NOT NULL,
            paused INTEGER NOT NULL DEFAULT 0,
            running INTEGER NOT NULL DEFAULT 0,
            last_run_at TIMESTAMP,
            next_run_at TIMESTAMP,
            missed_runs INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (interval_seconds > 0)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_initializes_and_is_idempotent() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn difficulty_check_constraint_enforced() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO recipes (identifier, title, title_normalized, instructions, difficulty)
             VALUES ('x', 'T', 't', '[]', 'impossible')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
