//! Staged recipe files
//!
//! One JSON document per recipe, named by identifier, is the durable handoff
//! between parse and load. Staged files are written once and treated as
//! immutable by readers; a re-run that produces the same identifier is a
//! no-op, which is what makes extraction safe to retry.

use crate::error::{Error, Result};
use crate::models::Recipe;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Write a recipe to its staged file. Returns the path and whether the file
/// already existed (same identifier ⇒ nothing rewritten).
pub async fn write_staged(dir: &Path, recipe: &Recipe) -> Result<(PathBuf, bool)> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.json", recipe.identifier));

    if tokio::fs::try_exists(&path).await? {
        debug!(path = %path.display(), "Staged file already present");
        return Ok((path, true));
    }

    let json = serde_json::to_string_pretty(recipe)?;
    tokio::fs::write(&path, json).await?;
    debug!(
        identifier = %recipe.identifier,
        path = %path.display(),
        "Staged recipe"
    );
    Ok((path, false))
}

/// Read a staged recipe back. The filename is advisory; the identifier
/// inside the document is authoritative.
pub async fn read_staged(path: &Path) -> Result<Recipe> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::NotFound(format!("staged file {}: {}", path.display(), e))
    })?;
    let mut recipe: Recipe = serde_json::from_str(&content)?;
    if recipe.identifier == Uuid::nil() {
        return Err(Error::Validation(format!(
            "staged file {} has no identifier",
            path.display()
        )));
    }
    // Ordering lives in the array; rebuild the explicit index.
    for (idx, ingredient) in recipe.ingredients.iter_mut().enumerate() {
        ingredient.order_index = idx as i64 + 1;
    }
    Ok(recipe)
}

/// All staged files in a directory, sorted by name for stable ordering.
pub async fn list_staged(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecipeIngredient;

    fn recipe(title: &str) -> Recipe {
        Recipe {
            identifier: crate::identity::recipe_identifier(title, None),
            title: title.to_string(),
            description: None,
            ingredients: vec![
                RecipeIngredient {
                    item: "flour".to_string(),
                    amount: "2".to_string(),
                    unit: Some("cups".to_string()),
                    notes: None,
                    order_index: 1,
                },
                RecipeIngredient {
                    item: "sugar".to_string(),
                    amount: "1".to_string(),
                    unit: Some("cup".to_string()),
                    notes: None,
                    order_index: 2,
                },
            ],
            instructions: vec!["Mix.".to_string()],
            prep_minutes: Some(15),
            cook_minutes: Some(12),
            total_minutes: Some(27),
            servings: Some(24.0),
            difficulty: None,
            cuisine_type: None,
            meal_type: None,
            dietary_tags: vec![],
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

    #[tokio::test]
    async fn write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let r = recipe("Chocolate Chip Cookies");

        let (path, existed) = write_staged(dir.path(), &r).await.unwrap();
        assert!(!existed);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("{}.json", r.identifier)
        );

        let back = read_staged(&path).await.unwrap();
        assert_eq!(back.identifier, r.identifier);
        assert_eq!(back.title, r.title);
        assert_eq!(back.ingredients.len(), 2);
        // order_index is rebuilt from array order, not serialized
        assert_eq!(back.ingredients[0].order_index, 1);
        assert_eq!(back.ingredients[1].order_index, 2);
    }

    #[tokio::test]
    async fn second_write_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let r = recipe("Chocolate Chip Cookies");

        let (first_path, _) = write_staged(dir.path(), &r).await.unwrap();
        let mtime = std::fs::metadata(&first_path).unwrap().modified().unwrap();

        let (second_path, existed) = write_staged(dir.path(), &r).await.unwrap();
        assert!(existed);
        assert_eq!(first_path, second_path);
        assert_eq!(
            std::fs::metadata(&second_path).unwrap().modified().unwrap(),
            mtime
        );
    }

    #[tokio::test]
    async fn listing_returns_sorted_json_files() {
        let dir = tempfile::tempdir().unwrap();
        write_staged(dir.path(), &recipe("B Recipe")).await.unwrap();
        write_staged(dir.path(), &recipe("A Recipe")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let staged = list_staged(dir.path()).await.unwrap();
        assert_eq!(staged.len(), 2);
        assert!(staged.windows(2).all(|w| w[0] <= w[1]));
    }
}
