//! Feed poller
//!
//! Reads the newest submissions from a feed source's JSON listing, picks out
//! the recipe-bearing text (the author's self-post, or the author's first
//! comment that reads like a recipe), and emits normalized feed events for
//! the bus producer. Posts already seen in this poller's lifetime are
//! skipped; cross-run dedup belongs to the store.

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Keywords that mark a block of text as recipe-bearing.
const RECIPE_KEYWORDS: &[&str] = &[
    "ingredients",
    "instructions",
    "preparation",
    "prep time",
    "cook time",
    "total time",
    "servings",
];

/// Normalized feed event published to the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedEvent {
    pub date: String,
    pub title: String,
    pub author: String,
    pub num_comments: i64,
    pub text: String,
    pub char_count: i64,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Poller over a feed source's JSON listing endpoint
pub struct FeedPoller {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
    seen: Mutex<HashSet<String>>,
}

impl FeedPoller {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .map_err(Error::Http)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            seen: Mutex::new(HashSet::new()),
        })
    }

    /// Pull up to `limit` recent submissions and return the ones carrying a
    /// recipe. Items without recipe text are skipped, not errors.
    pub async fn poll(&self, source: &str, limit: u32) -> Result<Vec<FeedEvent>> {
        let listing = self
            .get_json(&format!(
                "{}/r/{}/new.json?limit={}",
                self.base_url, source, limit
            ))
            .await?;

        let posts = extract_posts(&listing);
        debug!(source, posts = posts.len(), "Fetched feed listing");

        let mut events = Vec::new();
        for post in posts {
            let key = format!("{}_{}", post.title, post.author);
            {
                let mut seen = self.seen.lock().unwrap();
                if !seen.insert(key) {
                    continue;
                }
            }

            let text = match self.resolve_recipe_text(source, &post).await {
                Some(text) => text,
                None => {
                    debug!(post_id = %post.id, "No recipe text found in post");
                    continue;
                }
            };

            events.push(FeedEvent {
                date: post.created.clone(),
                title: post.title.clone(),
                author: post.author.clone(),
                num_comments: post.num_comments,
                char_count: text.chars().count() as i64,
                text,
                post_id: Some(post.id.clone()),
                score: Some(post.score),
                url: post.url.clone(),
            });
        }

        info!(source, events = events.len(), "Feed poll complete");
        Ok(events)
    }

    /// Recipe text for a post: the self-post body when it reads like a
    /// recipe, otherwise the author's first recipe-looking comment.
    async fn resolve_recipe_text(&self, source: &str, post: &FeedPost) -> Option<String> {
        if post.is_self && has_recipe_keywords(&post.selftext) {
            return Some(post.selftext.clone());
        }

        let comments = match self
            .get_json(&format!(
                "{}/r/{}/comments/{}.json",
                self.base_url, source, post.id
            ))
            .await
        {
            Ok(doc) => doc,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Comment fetch failed");
                return None;
            }
        };

        author_recipe_comment(&comments, &post.author)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header("user-agent", &self.user_agent)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!("feed source returned 429 for {}", url)));
        }
        if !status.is_success() {
            return Err(Error::Unavailable(format!(
                "feed source returned {} for {}",
                status, url
            )));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FeedPost {
    pub id: String,
    pub title: String,
    pub author: String,
    pub num_comments: i64,
    pub score: i64,
    pub is_self: bool,
    pub selftext: String,
    pub url: Option<String>,
    pub created: String,
}

pub(crate) fn has_recipe_keywords(text: &str) -> bool {
    let lower = text.to_lowercase();
    RECIPE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Pull submissions out of a feed listing document.
pub(crate) fn extract_posts(listing: &Value) -> Vec<FeedPost> {
    let children = match listing["data"]["children"].as_array() {
        Some(children) => children,
        None => return Vec::new(),
    };

    children
        .iter()
        .filter_map(|child| {
            let data = &child["data"];
            let author = data["author"].as_str()?;
            if author.is_empty() {
                return None;
            }
            Some(FeedPost {
                id: data["id"].as_str()?.to_string(),
                title: data["title"].as_str()?.to_string(),
                author: author.to_string(),
                num_comments: data["num_comments"].as_i64().unwrap_or(0),
                score: data["score"].as_i64().unwrap_or(0),
                is_self: data["is_self"].as_bool().unwrap_or(false),
                selftext: data["selftext"].as_str().unwrap_or("").to_string(),
                url: data["url"].as_str().map(str::to_string),
                created: data["created_utc"]
                    .as_f64()
                    .map(|t| format!("{}", t as i64))
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// The originating author's first comment that reads like a recipe, from a
/// comments document (`[post listing, comment listing]`).
pub(crate) fn author_recipe_comment(comments_doc: &Value, author: &str) -> Option<String> {
    let comment_listing = comments_doc.as_array()?.get(1)?;
    let children = comment_listing["data"]["children"].as_array()?;

    for child in children {
        let data = &child["data"];
        if data["author"].as_str() != Some(author) {
            continue;
        }
        let body = data["body"].as_str().unwrap_or("");
        if has_recipe_keywords(body) {
            return Some(body.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing() -> Value {
        json!({
            "data": {
                "children": [
                    {"data": {
                        "id": "abc1",
                        "title": "Grandma's Goulash",
                        "author": "cook_a",
                        "num_comments": 12,
                        "score": 250,
                        "is_self": true,
                        "selftext": "Ingredients:\n- 1 lb beef\n\nInstructions:\n1. Brown the beef in a pot.",
                        "url": "https://example.com/abc1",
                        "created_utc": 1700000000.0
                    }},
                    {"data": {
                        "id": "abc2",
                        "title": "Look at this plating!",
                        "author": "photographer",
                        "num_comments": 3,
                        "score": 90,
                        "is_self": false,
                        "selftext": "",
                        "url": "https://img.example.com/x.jpg",
                        "created_utc": 1700000100.0
                    }}
                ]
            }
        })
    }

    #[test]
    fn listing_parses_into_posts() {
        let posts = extract_posts(&listing());
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "abc1");
        assert_eq!(posts[0].author, "cook_a");
        assert!(posts[0].is_self);
        assert_eq!(posts[1].num_comments, 3);
    }

    #[test]
    fn recipe_keywords_gate_selftext() {
        assert!(has_recipe_keywords("INGREDIENTS: flour"));
        assert!(has_recipe_keywords("prep time: 10 min"));
        assert!(!has_recipe_keywords("look at my dinner"));
    }

    #[test]
    fn author_comment_is_selected_over_others() {
        let comments = json!([
            {"data": {"children": []}},
            {"data": {"children": [
                {"data": {"author": "random", "body": "Ingredients look great"}},
                {"data": {"author": "cook_a", "body": "Thanks!"}},
                {"data": {"author": "cook_a", "body": "Ingredients:\n- 1 lb beef\nInstructions: brown it."}}
            ]}}
        ]);
        let text = author_recipe_comment(&comments, "cook_a").unwrap();
        assert!(text.starts_with("Ingredients:"));
    }

    #[test]
    fn missing_author_comment_yields_none() {
        let comments = json!([
            {"data": {"children": []}},
            {"data": {"children": [
                {"data": {"author": "random", "body": "nice"}}
            ]}}
        ]);
        assert!(author_recipe_comment(&comments, "cook_a").is_none());
    }

    #[test]
    fn feed_event_serializes_with_flat_fields() {
        let event = FeedEvent {
            date: "1700000000".to_string(),
            title: "Grandma's Goulash".to_string(),
            author: "cook_a".to_string(),
            num_comments: 12,
            text: "Ingredients: beef".to_string(),
            char_count: 17,
            post_id: Some("abc1".to_string()),
            score: Some(250),
            url: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["author"], "cook_a");
        assert_eq!(json["char_count"], 17);
        let back: FeedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
