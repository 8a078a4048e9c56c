//! Store adapter: idempotent recipe loads with deduplication
//!
//! All dedup funnels through here. Message-bus exactly-once is not assumed,
//! scrapers revisit posts, and parsers get re-run; the unique index on
//! `identifier` plus a normalized-title safety net collapse every one of
//! those into a single rule.

use crate::db;
use crate::error::{is_constraint_violation, Error, Result};
use crate::models::{Recipe, RecipeFilters, RecipeStats};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of an idempotent create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// New row inserted
    Inserted(i64),
    /// A row with this identifier or title already existed; no write happened
    AlreadyExists(i64),
}

impl CreateOutcome {
    pub fn id(&self) -> i64 {
        match self {
            CreateOutcome::Inserted(id) | CreateOutcome::AlreadyExists(id) => *id,
        }
    }

    pub fn already_existed(&self) -> bool {
        matches!(self, CreateOutcome::AlreadyExists(_))
    }
}

/// Relational store adapter
#[derive(Clone)]
pub struct RecipeStore {
    db: SqlitePool,
}

impl RecipeStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Idempotent insert.
    ///
    /// Dedup policy, in order: identifier match wins, then normalized-title
    /// match (safety net against identifier drift during repair), then
    /// insert. Losing a concurrent insert race is converted into
    /// `AlreadyExists` on the winner's row.
    pub async fn create(&self, recipe: &Recipe) -> Result<CreateOutcome> {
        recipe.validate()?;

        if let Some(id) = db::recipes::get_id_by_identifier(&self.db, &recipe.identifier).await? {
            debug!(identifier = %recipe.identifier, id, "Recipe already stored (identifier match)");
            return Ok(CreateOutcome::AlreadyExists(id));
        }

        let normalized = recipe.normalized_title();
        if let Some(id) = db::recipes::get_id_by_normalized_title(&self.db, &normalized).await? {
            debug!(title = %recipe.title, id, "Recipe already stored (title match)");
            return Ok(CreateOutcome::AlreadyExists(id));
        }

        // Placeholder rows never reach the junction table.
        let mut clean = recipe.clone();
        clean.ingredients.retain(|i| !i.is_placeholder());

        match db::recipes::insert_recipe(&self.db, &clean).await {
            Ok(id) => {
                info!(
                    identifier = %recipe.identifier,
                    title = %recipe.title,
                    id,
                    ingredients = clean.ingredients.len(),
                    "Recipe inserted"
                );
                Ok(CreateOutcome::Inserted(id))
            }
            Err(Error::Database(db_err)) if is_constraint_violation(&db_err) => {
                // Lost a concurrent insert race; the winner's row is
                // authoritative.
                if let Some(id) =
                    db::recipes::get_id_by_identifier(&self.db, &recipe.identifier).await?
                {
                    return Ok(CreateOutcome::AlreadyExists(id));
                }
                if let Some(id) =
                    db::recipes::get_id_by_normalized_title(&self.db, &normalized).await?
                {
                    return Ok(CreateOutcome::AlreadyExists(id));
                }
                Err(Error::Duplicate(format!(
                    "constraint violation inserting '{}' but no existing row found",
                    recipe.title
                )))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_by_identifier(&self, identifier: &Uuid) -> Result<Option<Recipe>> {
        match db::recipes::get_id_by_identifier(&self.db, identifier).await? {
            Some(id) => db::recipes::get_by_id(&self.db, id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by_title(&self, title: &str) -> Result<Option<Recipe>> {
        let normalized = crate::identity::normalize(title);
        match db::recipes::get_id_by_normalized_title(&self.db, &normalized).await? {
            Some(id) => db::recipes::get_by_id(&self.db, id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Recipe>> {
        db::recipes::get_by_id(&self.db, id).await
    }

    pub async fn id_for_identifier(&self, identifier: &Uuid) -> Result<Option<i64>> {
        db::recipes::get_id_by_identifier(&self.db, identifier).await
    }

    /// Replace a stored row with a newer snapshot carrying the same
    /// identifier.
    pub async fn update(&self, id: i64, recipe: &Recipe) -> Result<()> {
        recipe.validate()?;
        db::recipes::update_recipe(&self.db, id, recipe).await
    }

    pub async fn search_text(
        &self,
        query: &str,
        filters: &RecipeFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<(i64, Recipe)>> {
        db::recipes::search_text(&self.db, query, filters, limit, offset).await
    }

    pub async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<(i64, Recipe)>> {
        db::recipes::fetch_page(&self.db, limit, offset).await
    }

    pub async fn count(&self) -> Result<i64> {
        db::recipes::count(&self.db).await
    }

    pub async fn stats(&self) -> Result<RecipeStats> {
        db::recipes::stats(&self.db).await
    }

    /// Cached embedding for a row, but only when it was generated from the
    /// given input text; a changed title or ingredient list invalidates it.
    pub async fn cached_embedding(&self, id: i64, input: &str) -> Result<Option<Vec<f32>>> {
        Ok(db::recipes::get_embedding(&self.db, id)
            .await?
            .filter(|(_, stored_input)| stored_input.as_deref() == Some(input))
            .map(|(vector, _)| vector))
    }

    pub async fn store_embedding(&self, id: i64, embedding: &[f32], input: &str) -> Result<()> {
        db::recipes::set_embedding(&self.db, id, embedding, input).await
    }
}
