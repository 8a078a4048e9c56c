//! Configuration resolution for the recipe pipeline
//!
//! All configuration comes from the environment with sensible local-dev
//! defaults. Credentials that a command actually needs are validated when the
//! owning client is constructed, not at startup, so local-parser runs work
//! without a model key.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Relational store configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// sqlx connection string, e.g. `sqlite://recipes.db`
    pub url: String,
}

/// Search index configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Completion-model provider configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Embedding sidecar configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub url: String,
    pub model: String,
}

/// Message-bus REST gateway configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub gateway_url: String,
    pub topic: String,
    pub consumer_group: String,
}

/// Feed source configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    pub user_agent: String,
}

/// Application configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub bus: BusConfig,
    pub feed: FeedConfig,
    /// Directory for staged recipe JSON files
    pub stage_dir: PathBuf,
    /// Upper bound on concurrently running activities in one worker
    pub max_concurrent_activities: usize,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Resolve configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig {
                url: env_or("RECIPES_DATABASE_URL", "sqlite://recipes.db"),
            },
            search: SearchConfig {
                url: env_or("RECIPES_SEARCH_URL", "http://localhost:9200"),
                index: env_or("RECIPES_SEARCH_INDEX", "recipes"),
                username: std::env::var("RECIPES_SEARCH_USERNAME").ok(),
                password: std::env::var("RECIPES_SEARCH_PASSWORD").ok(),
            },
            model: ModelConfig {
                api_key: std::env::var("RECIPES_MODEL_API_KEY").ok(),
                base_url: env_or("RECIPES_MODEL_BASE_URL", "https://api.anthropic.com"),
                model: env_or("RECIPES_MODEL_NAME", "claude-3-haiku-20240307"),
            },
            embedding: EmbeddingConfig {
                url: env_or("RECIPES_EMBEDDING_URL", "http://localhost:8088"),
                model: env_or("RECIPES_EMBEDDING_MODEL", "all-MiniLM-L6-v2"),
            },
            bus: BusConfig {
                gateway_url: env_or("RECIPES_BUS_GATEWAY", "http://localhost:8082"),
                topic: env_or("RECIPES_BUS_TOPIC", "feed-recipes"),
                consumer_group: env_or("RECIPES_BUS_GROUP", "recipe-processors"),
            },
            feed: FeedConfig {
                base_url: env_or("RECIPES_FEED_URL", "https://www.reddit.com"),
                user_agent: env_or("RECIPES_FEED_USER_AGENT", "recipe-etl/0.3"),
            },
            stage_dir: PathBuf::from(env_or("RECIPES_STAGE_DIR", "data/stage")),
            max_concurrent_activities: env_or("RECIPES_MAX_CONCURRENT", "20")
                .parse()
                .unwrap_or(20),
        }
    }
}

impl ModelConfig {
    /// API key, or a configuration error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::Config(
                "model API key not configured; set RECIPES_MODEL_API_KEY".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_without_environment() {
        let config = AppConfig::from_env();
        assert_eq!(config.search.index, "recipes");
        assert_eq!(config.max_concurrent_activities, 20);
        assert!(config.stage_dir.ends_with("stage"));
    }

    #[test]
    fn missing_model_key_is_a_config_error() {
        let config = ModelConfig {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
        };
        assert!(matches!(
            config.require_api_key(),
            Err(Error::Config(_))
        ));
    }
}
