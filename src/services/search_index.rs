//! Search index client
//!
//! Owns the index mapping, bulk indexing, the database→index sync path, and
//! assembly of text / semantic / hybrid queries. Document ids are recipe
//! identifiers, so re-indexing is idempotent. Sync never deletes.

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::models::{Recipe, RecipeFilters, EMBEDDING_DIM};
use crate::services::embedding::{embedding_text, Embedder};
use crate::services::recipe_store::RecipeStore;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const KNN_MIN_CANDIDATES: i64 = 100;
const HYBRID_KNN_BOOST: f64 = 0.7;

/// Search execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Text,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(SearchMode::Text),
            "semantic" => Some(SearchMode::Semantic),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }
}

/// Result of a bulk sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
}

/// One search hit: document id (the recipe identifier) plus source
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub source: Value,
}

/// Query parameters for [`SearchIndex::query`]
#[derive(Debug, Clone)]
pub struct QueryParams<'a> {
    pub text: Option<&'a str>,
    pub vector: Option<&'a [f32]>,
    pub mode: SearchMode,
    pub filters: &'a RecipeFilters,
    pub from: i64,
    pub size: i64,
}

/// HTTP client for the search cluster
pub struct SearchIndex {
    http: reqwest::Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl SearchIndex {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .map_err(Error::Http)?,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .request(self.http.get(format!("{}/_cluster/health", self.base_url)))
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: Value = response.json().await?;
        Ok(matches!(body["status"].as_str(), Some("yellow") | Some("green")))
    }

    pub async fn index_exists(&self) -> Result<bool> {
        let response = self
            .request(self.http.head(format!("{}/{}", self.base_url, self.index)))
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }

    /// Create the index with its mapping when absent. Existing indexes are
    /// never mutated in place; destructive refresh goes through
    /// [`Self::recreate_index`].
    pub async fn ensure_index(&self) -> Result<()> {
        if self.index_exists().await? {
            debug!(index = %self.index, "Search index already exists");
            return Ok(());
        }
        let response = self
            .request(self.http.put(format!("{}/{}", self.base_url, self.index)))
            .json(&index_mapping())
            .send()
            .await?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!(
                "failed to create search index: {}",
                detail
            )));
        }
        info!(index = %self.index, "Created search index");
        Ok(())
    }

    /// Delete and recreate the index.
    pub async fn recreate_index(&self) -> Result<()> {
        let response = self
            .request(self.http.delete(format!("{}/{}", self.base_url, self.index)))
            .send()
            .await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(Error::Unavailable(format!(
                "failed to delete search index: {}",
                response.status()
            )));
        }
        info!(index = %self.index, "Deleted search index");
        self.ensure_index().await
    }

    /// Bulk-upsert documents; `docs` pairs the document id with its source.
    /// Returns `(success, failed)` per-item counts.
    pub async fn bulk_upsert(&self, docs: &[(String, Value)]) -> Result<(i64, i64)> {
        if docs.is_empty() {
            return Ok((0, 0));
        }

        let body = bulk_body(&self.index, docs);
        let response = self
            .request(self.http.post(format!("{}/_bulk", self.base_url)))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("bulk request rejected with 429".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Unavailable(format!("bulk request failed: {}", status)));
        }

        let reply: Value = response.json().await?;
        let mut success = 0;
        let mut failed = 0;
        if let Some(items) = reply["items"].as_array() {
            for item in items {
                let error = item
                    .get("index")
                    .and_then(|op| op.get("error"))
                    .filter(|e| !e.is_null());
                if error.is_some() {
                    failed += 1;
                } else {
                    success += 1;
                }
            }
        } else {
            success = docs.len() as i64;
        }
        Ok((success, failed))
    }

    /// Stream the store into the index in batches, attaching cached or
    /// freshly generated embeddings.
    pub async fn sync_all(
        &self,
        store: &RecipeStore,
        embedder: Option<&dyn Embedder>,
        batch_size: i64,
    ) -> Result<SyncReport> {
        let mut report = SyncReport {
            total: store.count().await?,
            ..Default::default()
        };
        info!(total = report.total, batch_size, "Starting search sync");

        let mut offset = 0i64;
        loop {
            let page = store.list_page(batch_size, offset).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;

            let mut docs = Vec::with_capacity(page.len());
            for (id, recipe) in &page {
                if is_malformed(recipe) {
                    report.skipped += 1;
                    continue;
                }
                let embedding = self
                    .resolve_embedding(store, embedder, *id, recipe)
                    .await;
                docs.push((
                    recipe.identifier.to_string(),
                    recipe_to_document(*id, recipe, embedding.as_deref()),
                ));
            }

            let (ok, failed) = self.bulk_upsert(&docs).await?;
            report.success += ok;
            report.failed += failed;
            debug!(offset, ok, failed, "Synced batch");
        }

        info!(
            success = report.success,
            skipped = report.skipped,
            failed = report.failed,
            "Search sync complete"
        );
        Ok(report)
    }

    /// Embedding for a row: the store cache wins when its input text still
    /// matches; otherwise generate, cache, and use. Failure means the
    /// document simply goes out without a vector.
    async fn resolve_embedding(
        &self,
        store: &RecipeStore,
        embedder: Option<&dyn Embedder>,
        id: i64,
        recipe: &Recipe,
    ) -> Option<Vec<f32>> {
        let input = embedding_text(&recipe.title, &recipe.ingredients);

        match store.cached_embedding(id, &input).await {
            Ok(Some(vector)) => return Some(vector),
            Ok(None) => {}
            Err(e) => warn!(id, error = %e, "Embedding cache lookup failed"),
        }

        let embedder = embedder?;
        match embedder.embed(&input).await {
            Ok(vector) => {
                if let Err(e) = store.store_embedding(id, &vector, &input).await {
                    warn!(id, error = %e, "Failed to cache embedding");
                }
                Some(vector)
            }
            Err(e) => {
                warn!(id, error = %e, "Embedding generation failed; indexing without vector");
                None
            }
        }
    }

    /// Run a query in the requested mode.
    pub async fn query(&self, params: QueryParams<'_>) -> Result<Vec<SearchHit>> {
        let body = build_query(&params)?;
        let response = self
            .request(
                self.http
                    .post(format!("{}/{}/_search", self.base_url, self.index)),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Unavailable(format!("search failed: {}", status)));
        }

        let reply: Value = response.json().await?;
        let hits = reply["hits"]["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .map(|h| SearchHit {
                        id: h["_id"].as_str().unwrap_or_default().to_string(),
                        score: h["_score"].as_f64().unwrap_or(0.0),
                        source: h["_source"].clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }
}

/// Index settings and mapping: analyzed text fields with keyword subfields,
/// nested ingredients, keyword facets, numeric timings, and a dense vector
/// sized to the embedding dimension.
fn index_mapping() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "analysis": {
                "analyzer": {
                    "recipe_analyzer": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "stop", "snowball"]
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "id": {"type": "integer"},
                "identifier": {"type": "keyword"},
                "title": {
                    "type": "text",
                    "analyzer": "recipe_analyzer",
                    "fields": {"keyword": {"type": "keyword"}}
                },
                "description": {"type": "text", "analyzer": "recipe_analyzer"},
                "instructions": {"type": "text", "analyzer": "recipe_analyzer"},
                "ingredients": {
                    "type": "nested",
                    "properties": {
                        "name": {
                            "type": "text",
                            "analyzer": "recipe_analyzer",
                            "fields": {"keyword": {"type": "keyword"}}
                        },
                        "quantity": {"type": "float"},
                        "unit": {"type": "keyword"},
                        "notes": {"type": "text"}
                    }
                },
                "prep_minutes": {"type": "integer"},
                "cook_minutes": {"type": "integer"},
                "total_minutes": {"type": "integer"},
                "servings": {"type": "float"},
                "difficulty": {"type": "keyword"},
                "cuisine_type": {"type": "keyword"},
                "meal_type": {"type": "keyword"},
                "dietary_tags": {"type": "keyword"},
                "source_url": {"type": "keyword"},
                "source_author": {"type": "keyword"},
                "source_post_id": {"type": "keyword"},
                "source_score": {"type": "integer"},
                "created_at": {"type": "date"},
                "embedding": {
                    "type": "dense_vector",
                    "dims": EMBEDDING_DIM,
                    "index": true,
                    "similarity": "cosine"
                }
            }
        }
    })
}

/// Rows that never made it past the parsers in usable shape are not worth
/// indexing: placeholder instructions, a single over-long ingredient, or no
/// ingredients at all.
pub fn is_malformed(recipe: &Recipe) -> bool {
    if recipe
        .instructions
        .iter()
        .any(|i| i.contains("See full recipe text for instructions"))
    {
        return true;
    }
    if recipe.ingredients.is_empty() {
        return true;
    }
    if recipe.ingredients.len() == 1 && recipe.ingredients[0].item.len() > 100 {
        return true;
    }
    false
}

/// Convert a stored recipe into its search document.
pub fn recipe_to_document(id: i64, recipe: &Recipe, embedding: Option<&[f32]>) -> Value {
    let ingredients: Vec<Value> = recipe
        .ingredients
        .iter()
        .filter(|i| !i.item.is_empty() && i.item.len() <= 100 && !i.is_placeholder())
        .map(|i| {
            let (quantity, _) = crate::extractors::units::parse_amount(&i.amount, i.unit.as_deref());
            json!({
                "name": i.item,
                "quantity": quantity,
                "unit": i.unit,
                "notes": i.notes,
            })
        })
        .collect();

    let mut doc = json!({
        "id": id,
        "identifier": recipe.identifier.to_string(),
        "title": recipe.title,
        "description": recipe.description,
        "instructions": recipe.instructions,
        "ingredients": ingredients,
        "prep_minutes": recipe.prep_minutes,
        "cook_minutes": recipe.cook_minutes,
        "total_minutes": recipe.total_minutes,
        "servings": recipe.servings,
        "difficulty": recipe.difficulty.map(|d| d.as_str()),
        "cuisine_type": recipe.cuisine_type,
        "meal_type": recipe.meal_type.map(|m| m.as_str()),
        "dietary_tags": recipe.dietary_tags,
        "source_url": recipe.source_url,
        "source_author": recipe.source_author,
        "source_post_id": recipe.source_post_id,
        "source_score": recipe.source_score,
        "created_at": recipe.created_at.map(|t| t.to_rfc3339()),
    });
    if let Some(embedding) = embedding {
        doc["embedding"] = json!(embedding);
    }
    doc
}

/// NDJSON body for a bulk index request.
fn bulk_body(index: &str, docs: &[(String, Value)]) -> String {
    let mut body = String::new();
    for (id, source) in docs {
        body.push_str(&json!({"index": {"_index": index, "_id": id}}).to_string());
        body.push('\n');
        body.push_str(&source.to_string());
        body.push('\n');
    }
    body
}

/// Assemble the request body for a query in the given mode.
pub fn build_query(params: &QueryParams<'_>) -> Result<Value> {
    let filters = filter_clauses(params.filters);

    match params.mode {
        SearchMode::Text => {
            let text = params
                .text
                .ok_or_else(|| Error::Validation("text mode requires query text".to_string()))?;
            let mut query = json!({
                "bool": {
                    "must": [multi_match(text)],
                }
            });
            if !filters.is_empty() {
                query["bool"]["filter"] = json!(filters);
            }
            Ok(json!({
                "query": query,
                "from": params.from,
                "size": params.size,
            }))
        }
        SearchMode::Semantic => {
            let vector = params.vector.ok_or_else(|| {
                Error::Validation("semantic mode requires a query vector".to_string())
            })?;
            let mut knn = json!({
                "field": "embedding",
                "query_vector": vector,
                "k": params.size,
                "num_candidates": KNN_MIN_CANDIDATES.max(params.size * 10),
            });
            if !filters.is_empty() {
                knn["filter"] = json!(filters);
            }
            Ok(json!({
                "knn": knn,
                "from": params.from,
                "size": params.size,
            }))
        }
        SearchMode::Hybrid => {
            let text = params
                .text
                .ok_or_else(|| Error::Validation("hybrid mode requires query text".to_string()))?;
            let vector = params.vector.ok_or_else(|| {
                Error::Validation("hybrid mode requires a query vector".to_string())
            })?;
            let mut query = json!({
                "bool": {
                    "should": [multi_match(text)],
                }
            });
            if !filters.is_empty() {
                query["bool"]["filter"] = json!(filters);
            }
            Ok(json!({
                "query": query,
                "knn": {
                    "field": "embedding",
                    "query_vector": vector,
                    "k": params.size,
                    "num_candidates": KNN_MIN_CANDIDATES.max(params.size * 10),
                    "boost": HYBRID_KNN_BOOST,
                },
                "from": params.from,
                "size": params.size,
            }))
        }
    }
}

fn multi_match(text: &str) -> Value {
    json!({
        "multi_match": {
            "query": text,
            "fields": ["title^2", "description", "ingredients.name"],
            "type": "best_fields",
            "fuzziness": "AUTO",
        }
    })
}

fn filter_clauses(filters: &RecipeFilters) -> Vec<Value> {
    let mut clauses = Vec::new();
    if let Some(cuisine) = &filters.cuisine_type {
        clauses.push(json!({"term": {"cuisine_type": cuisine}}));
    }
    if let Some(meal) = filters.meal_type {
        clauses.push(json!({"term": {"meal_type": meal.as_str()}}));
    }
    if let Some(difficulty) = filters.difficulty {
        clauses.push(json!({"term": {"difficulty": difficulty.as_str()}}));
    }
    if !filters.dietary_tags.is_empty() {
        clauses.push(json!({"terms": {"dietary_tags": filters.dietary_tags}}));
    }
    if let Some(max) = filters.max_prep_minutes {
        clauses.push(json!({"range": {"prep_minutes": {"lte": max}}}));
    }
    if let Some(max) = filters.max_cook_minutes {
        clauses.push(json!({"range": {"cook_minutes": {"lte": max}}}));
    }
    if let Some(min) = filters.min_servings {
        clauses.push(json!({"range": {"servings": {"gte": min}}}));
    }
    clauses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MealType, RecipeIngredient};

    fn recipe() -> Recipe {
        Recipe {
            identifier: crate::identity::recipe_identifier("Comfort Soup", None),
            title: "Comfort Soup".to_string(),
            description: Some("Warming".to_string()),
            ingredients: vec![
                RecipeIngredient {
                    item: "chicken broth".to_string(),
                    amount: "4".to_string(),
                    unit: Some("cups".to_string()),
                    notes: None,
                    order_index: 1,
                },
                RecipeIngredient {
                    item: "noodles".to_string(),
                    amount: "8".to_string(),
                    unit: Some("oz".to_string()),
                    notes: None,
                    order_index: 2,
                },
            ],
            instructions: vec!["Simmer the broth and add the noodles.".to_string()],
            prep_minutes: Some(10),
            cook_minutes: Some(20),
            total_minutes: Some(30),
            servings: Some(4.0),
            difficulty: None,
            cuisine_type: Some("American".to_string()),
            meal_type: Some(MealType::Dinner),
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

    #[test]
    fn document_shape() {
        let r = recipe();
        let doc = recipe_to_document(7, &r, Some(&vec![0.1f32; EMBEDDING_DIM]));
        assert_eq!(doc["id"], 7);
        assert_eq!(doc["identifier"], r.identifier.to_string());
        assert_eq!(doc["ingredients"][0]["name"], "chicken broth");
        assert_eq!(doc["ingredients"][0]["quantity"], 4.0);
        assert_eq!(doc["meal_type"], "dinner");
        assert_eq!(doc["embedding"].as_array().unwrap().len(), EMBEDDING_DIM);
    }

    #[test]
    fn malformed_rows_are_flagged() {
        let mut r = recipe();
        assert!(!is_malformed(&r));

        r.instructions = vec!["See full recipe text for instructions".to_string()];
        assert!(is_malformed(&r));

        let mut r = recipe();
        r.ingredients.clear();
        assert!(is_malformed(&r));

        let mut r = recipe();
        r.ingredients.truncate(1);
        r.ingredients[0].item = "x".repeat(150);
        assert!(is_malformed(&r));
    }

    #[test]
    fn bulk_body_is_ndjson_keyed_by_identifier() {
        let r = recipe();
        let doc = recipe_to_document(1, &r, None);
        let body = bulk_body("recipes", &[(r.identifier.to_string(), doc)]);
        let lines: Vec<&str> = body.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "recipes");
        assert_eq!(action["index"]["_id"], r.identifier.to_string());
        let source: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(source["title"], "Comfort Soup");
    }

    #[test]
    fn text_query_has_boosted_fields_and_filters() {
        let filters = RecipeFilters {
            meal_type: Some(MealType::Dinner),
            max_prep_minutes: Some(30),
            ..Default::default()
        };
        let body = build_query(&QueryParams {
            text: Some("comfort food"),
            vector: None,
            mode: SearchMode::Text,
            filters: &filters,
            from: 0,
            size: 10,
        })
        .unwrap();

        let fields = &body["query"]["bool"]["must"][0]["multi_match"]["fields"];
        assert_eq!(fields[0], "title^2");
        assert_eq!(body["query"]["bool"]["filter"][0]["term"]["meal_type"], "dinner");
        assert_eq!(
            body["query"]["bool"]["filter"][1]["range"]["prep_minutes"]["lte"],
            30
        );
        assert_eq!(body["size"], 10);
    }

    #[test]
    fn semantic_query_is_knn_with_candidate_floor() {
        let vector = vec![0.2f32; EMBEDDING_DIM];
        let body = build_query(&QueryParams {
            text: None,
            vector: Some(&vector),
            mode: SearchMode::Semantic,
            filters: &RecipeFilters::default(),
            from: 0,
            size: 5,
        })
        .unwrap();

        assert_eq!(body["knn"]["field"], "embedding");
        assert_eq!(body["knn"]["k"], 5);
        assert_eq!(body["knn"]["num_candidates"], 100);
        assert!(body.get("query").is_none());
    }

    #[test]
    fn hybrid_query_has_both_clauses() {
        let vector = vec![0.2f32; EMBEDDING_DIM];
        let body = build_query(&QueryParams {
            text: Some("comfort food"),
            vector: Some(&vector),
            mode: SearchMode::Hybrid,
            filters: &RecipeFilters::default(),
            from: 0,
            size: 10,
        })
        .unwrap();

        assert!(body["query"]["bool"]["should"][0]["multi_match"].is_object());
        assert_eq!(body["knn"]["boost"], HYBRID_KNN_BOOST);
    }

    #[test]
    fn mode_without_required_input_is_a_validation_error() {
        let err = build_query(&QueryParams {
            text: None,
            vector: None,
            mode: SearchMode::Semantic,
            filters: &RecipeFilters::default(),
            from: 0,
            size: 10,
        })
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn mapping_declares_the_vector_dimension() {
        let mapping = index_mapping();
        assert_eq!(
            mapping["mappings"]["properties"]["embedding"]["dims"],
            EMBEDDING_DIM
        );
        assert_eq!(mapping["mappings"]["properties"]["ingredients"]["type"], "nested");
    }
}
