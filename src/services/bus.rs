//! Message-bus producer and consumer
//!
//! Talks to the broker through its REST gateway: JSON records on a single
//! topic, keyed by author so one author's posts stay in partition order.
//! Delivery is at-least-once on both sides; offsets commit only after the
//! store call returns, and duplicates are absorbed by the store's dedup.

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::services::feed_poller::FeedEvent;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const JSON_MEDIA_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// One consumed record
#[derive(Debug, Clone)]
pub struct BusRecord {
    pub key: Option<String>,
    pub value: Value,
}

/// Producer over the bus REST gateway
pub struct BusProducer {
    http: reqwest::Client,
    gateway: String,
    topic: String,
}

impl BusProducer {
    pub fn new(config: &BusConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .map_err(Error::Http)?,
            gateway: config.gateway_url.trim_end_matches('/').to_string(),
            topic: config.topic.clone(),
        })
    }

    /// Publish feed events, keyed by author. Returns the number accepted.
    pub async fn publish(&self, events: &[FeedEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let body = records_body(events);
        let response = self
            .http
            .post(format!("{}/topics/{}", self.gateway, self.topic))
            .header("content-type", JSON_MEDIA_TYPE)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("bus gateway returned 429".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Unavailable(format!(
                "bus publish failed with {}",
                status
            )));
        }

        let reply: Value = response.json().await?;
        let published = count_accepted_offsets(&reply, events.len());
        info!(topic = %self.topic, published, "Published feed events");
        Ok(published)
    }
}

/// Record envelope for a publish request.
pub(crate) fn records_body(events: &[FeedEvent]) -> Value {
    let records: Vec<Value> = events
        .iter()
        .map(|e| json!({"key": e.author, "value": e}))
        .collect();
    json!({ "records": records })
}

/// Count records the gateway accepted; entries carrying an error code are
/// rejected.
pub(crate) fn count_accepted_offsets(reply: &Value, sent: usize) -> usize {
    match reply["offsets"].as_array() {
        Some(offsets) => offsets
            .iter()
            .filter(|o| o.get("error_code").map(Value::is_null).unwrap_or(true))
            .count(),
        None => sent,
    }
}

/// Consumer-group client over the bus REST gateway.
///
/// Each consumer owns one gateway instance for its lifetime; activities
/// create one per batch so no consumer state leaks across workflow runs.
pub struct BusConsumer {
    http: reqwest::Client,
    gateway: String,
    topic: String,
    group: String,
    instance_uri: Option<String>,
}

impl BusConsumer {
    pub fn new(config: &BusConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .map_err(Error::Http)?,
            gateway: config.gateway_url.trim_end_matches('/').to_string(),
            topic: config.topic.clone(),
            group: config.consumer_group.clone(),
            instance_uri: None,
        })
    }

    /// Register a consumer instance in the group and subscribe to the topic.
    async fn ensure_instance(&mut self) -> Result<String> {
        if let Some(uri) = &self.instance_uri {
            return Ok(uri.clone());
        }

        let name = format!("recipe-etl-{}", Uuid::new_v4());
        let response = self
            .http
            .post(format!("{}/consumers/{}", self.gateway, self.group))
            .header("content-type", JSON_MEDIA_TYPE)
            .json(&json!({
                "name": name,
                "format": "json",
                "auto.offset.reset": "earliest",
                "enable.auto.commit": "false",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Unavailable(format!(
                "consumer registration failed with {}",
                response.status()
            )));
        }

        let reply: Value = response.json().await?;
        let uri = reply["base_uri"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Internal("gateway reply had no base_uri".to_string()))?;

        let subscribe = self
            .http
            .post(format!("{}/subscription", uri))
            .header("content-type", JSON_MEDIA_TYPE)
            .json(&json!({ "topics": [self.topic] }))
            .send()
            .await?;
        if !subscribe.status().is_success() {
            return Err(Error::Unavailable(format!(
                "topic subscription failed with {}",
                subscribe.status()
            )));
        }

        debug!(group = %self.group, uri = %uri, "Consumer instance registered");
        self.instance_uri = Some(uri.clone());
        Ok(uri)
    }

    /// Poll one batch of records.
    pub async fn poll(&mut self, timeout_ms: u64) -> Result<Vec<BusRecord>> {
        let uri = self.ensure_instance().await?;
        let response = self
            .http
            .get(format!("{}/records?timeout={}", uri, timeout_ms))
            .header("accept", JSON_MEDIA_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Unavailable(format!(
                "record poll failed with {}",
                response.status()
            )));
        }

        let reply: Value = response.json().await?;
        Ok(parse_records(&reply))
    }

    /// Commit the offsets of everything consumed so far. Called only after
    /// the store has acknowledged the batch.
    pub async fn commit(&mut self) -> Result<()> {
        let uri = self.ensure_instance().await?;
        let response = self
            .http
            .post(format!("{}/offsets", uri))
            .header("content-type", JSON_MEDIA_TYPE)
            .json(&json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Unavailable(format!(
                "offset commit failed with {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Deregister the consumer instance.
    pub async fn close(&mut self) {
        if let Some(uri) = self.instance_uri.take() {
            if let Err(e) = self.http.delete(&uri).send().await {
                warn!(error = %e, "Consumer deregistration failed");
            }
        }
    }
}

/// Parse a gateway records reply into bus records.
pub(crate) fn parse_records(reply: &Value) -> Vec<BusRecord> {
    reply
        .as_array()
        .map(|records| {
            records
                .iter()
                .map(|r| BusRecord {
                    key: r["key"].as_str().map(str::to_string),
                    value: r["value"].clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(author: &str) -> FeedEvent {
        FeedEvent {
            date: "1700000000".to_string(),
            title: "Goulash".to_string(),
            author: author.to_string(),
            num_comments: 2,
            text: "Ingredients: beef".to_string(),
            char_count: 17,
            post_id: Some("p1".to_string()),
            score: Some(10),
            url: None,
        }
    }

    #[test]
    fn records_are_keyed_by_author() {
        let body = records_body(&[event("cook_a"), event("cook_b")]);
        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["key"], "cook_a");
        assert_eq!(records[1]["key"], "cook_b");
        assert_eq!(records[0]["value"]["title"], "Goulash");
    }

    #[test]
    fn accepted_offsets_exclude_errors() {
        let reply = serde_json::json!({
            "offsets": [
                {"partition": 0, "offset": 10},
                {"partition": 0, "offset": -1, "error_code": 1, "error": "rejected"},
                {"partition": 1, "offset": 4, "error_code": null}
            ]
        });
        assert_eq!(count_accepted_offsets(&reply, 3), 2);
    }

    #[test]
    fn record_parse_extracts_key_and_value() {
        let reply = serde_json::json!([
            {"key": "cook_a", "value": {"title": "Goulash"}, "partition": 0, "offset": 3},
            {"key": null, "value": {"title": "Soup"}, "partition": 1, "offset": 9}
        ]);
        let records = parse_records(&reply);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key.as_deref(), Some("cook_a"));
        assert!(records[1].key.is_none());
        assert_eq!(records[1].value["title"], "Soup");
    }
}
