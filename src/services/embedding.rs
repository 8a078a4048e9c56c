//! Recipe embedding generation
//!
//! One sentence-encoder sidecar produces fixed-length vectors from a
//! recipe's title and ingredient names. Generation is best-effort: a record
//! without an embedding is valid, semantic search simply skips it.

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::models::{RecipeIngredient, EMBEDDING_DIM};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal embedding interface the sync path depends on.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text into a vector of exactly [`EMBEDDING_DIM`] floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the embedding input for a recipe: title followed by ingredient
/// names in order, amounts excluded.
pub fn embedding_text(title: &str, ingredients: &[RecipeIngredient]) -> String {
    let items: Vec<&str> = ingredients
        .iter()
        .filter(|i| !i.is_placeholder() && !i.item.trim().is_empty())
        .map(|i| i.item.as_str())
        .collect();
    if items.is_empty() {
        title.to_string()
    } else {
        format!("{}. {}", title, items.join(", "))
    }
}

/// Reject vectors of the wrong shape or with non-finite values.
pub fn validate_embedding(vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIM {
        return Err(Error::Validation(format!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            EMBEDDING_DIM
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// HTTP client for the sentence-encoder sidecar
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .map_err(Error::Http)?,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.model, text_len = text.len(), "Requesting embedding");

        let response = self
            .http
            .post(format!("{}/embed", self.base_url))
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("embedding sidecar returned 429".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Unavailable(format!(
                "embedding sidecar returned {}",
                status
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let vector: Vec<f32> = serde_json::from_value(body["embedding"].clone())
            .map_err(|e| Error::Internal(format!("malformed embedding response: {}", e)))?;
        validate_embedding(&vector)?;
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ing(item: &str) -> RecipeIngredient {
        RecipeIngredient {
            item: item.to_string(),
            amount: "1 cup".to_string(),
            unit: None,
            notes: Some("chopped".to_string()),
            order_index: 0,
        }
    }

    #[test]
    fn text_is_title_then_items_only() {
        let text = embedding_text("Beef Stew", &[ing("beef chuck"), ing("carrots")]);
        assert_eq!(text, "Beef Stew. beef chuck, carrots");
    }

    #[test]
    fn placeholder_rows_are_excluded() {
        let placeholder = RecipeIngredient {
            item: crate::models::recipe::PLACEHOLDER_INGREDIENT.to_string(),
            amount: String::new(),
            unit: None,
            notes: None,
            order_index: 0,
        };
        let text = embedding_text("Mystery Dish", &[placeholder]);
        assert_eq!(text, "Mystery Dish");
    }

    #[test]
    fn validation_enforces_shape_and_finiteness() {
        assert!(validate_embedding(&vec![0.0; EMBEDDING_DIM]).is_ok());
        assert!(validate_embedding(&vec![0.0; 10]).is_err());

        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[7] = f32::NAN;
        assert!(validate_embedding(&v).is_err());
    }
}
