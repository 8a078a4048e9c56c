//! Ingredient and measurement catalogs
//!
//! Names are upserted so concurrent loads of recipes sharing an ingredient
//! converge on one catalog row.

use crate::error::Result;
use crate::extractors::units::UnitInfo;
use sqlx::SqliteConnection;

/// Longest ingredient name the catalog keeps; longer names are truncated.
const MAX_NAME_LEN: usize = 200;

/// Get or create an ingredient row, returning its id.
pub async fn get_or_create_ingredient(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let name = truncate(name.trim(), MAX_NAME_LEN);

    if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT id FROM ingredients WHERE name = ?")
        .bind(&name)
        .fetch_optional(&mut *conn)
        .await?
    {
        return Ok(id);
    }

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO ingredients (name) VALUES (?)
         ON CONFLICT(name) DO UPDATE SET name = excluded.name
         RETURNING id",
    )
    .bind(&name)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Get or create a measurement row for a canonical unit, returning its id.
pub async fn get_or_create_measurement(conn: &mut SqliteConnection, unit: UnitInfo) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT id FROM measurements WHERE name = ?")
        .bind(unit.canonical)
        .fetch_optional(&mut *conn)
        .await?
    {
        return Ok(id);
    }

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO measurements (name, abbreviation, unit_type) VALUES (?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET name = excluded.name
         RETURNING id",
    )
    .bind(unit.canonical)
    .bind(unit.abbreviation)
    .bind(unit.unit_type)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::units::lookup_unit;

    #[tokio::test]
    async fn ingredient_upsert_converges_on_one_row() {
        let pool = crate::db::init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let a = get_or_create_ingredient(&mut conn, "flour").await.unwrap();
        let b = get_or_create_ingredient(&mut conn, "flour").await.unwrap();
        assert_eq!(a, b);

        let c = get_or_create_ingredient(&mut conn, "sugar").await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn measurement_upsert_keeps_metadata() {
        let pool = crate::db::init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let cup = lookup_unit("cups").unwrap();
        let a = get_or_create_measurement(&mut conn, cup).await.unwrap();
        let b = get_or_create_measurement(&mut conn, cup).await.unwrap();
        assert_eq!(a, b);

        let (abbr, unit_type): (String, String) =
            sqlx::query_as("SELECT abbreviation, unit_type FROM measurements WHERE id = ?")
                .bind(a)
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(abbr, "c");
        assert_eq!(unit_type, "volume");
    }
}
