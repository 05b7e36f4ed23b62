//! Client of the off-chain metadata backend.
//!
//! The chain stays the source of truth; callers treat every failure here as
//! non-fatal.

use crate::error::PollError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Stored after a successful on-chain creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollMetadata {
    pub blockchain_poll_id: u64,
    pub transaction_hash: String,
    #[serde(default)]
    pub ai_data: Option<Value>,
    pub poll_data: Value,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedPoll {
    pub blockchain_poll_id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionResult {
    pub option_index: u32,
    pub votes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollResults {
    pub poll_id: u64,
    pub total_votes: u64,
    pub results: Vec<OptionResult>,
}

#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PollError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(MetadataClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/database/polls{}", self.base_url, path)
    }

    /// Bodies come either bare or wrapped as `{"success": .., "data": ..}`.
    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PollError> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PollError::Backend(format!("{}: {}", status, text)));
        }
        let mut body: Value =
            serde_json::from_str(&text).map_err(|e| PollError::Backend(e.to_string()))?;
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request refused")
                .to_string();
            return Err(PollError::Backend(reason));
        }
        if let Some(data) = body.get_mut("data") {
            body = data.take();
        }
        serde_json::from_value(body).map_err(|e| PollError::Backend(e.to_string()))
    }

    pub async fn store_metadata(&self, metadata: &PollMetadata) -> Result<(), PollError> {
        let response = self
            .http
            .post(self.url("/store-metadata"))
            .json(metadata)
            .send()
            .await?;
        Self::read::<Value>(response).await?;
        tracing::debug!(poll_id = metadata.blockchain_poll_id, "metadata stored");
        Ok(())
    }

    pub async fn featured_polls(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<FeaturedPoll>, PollError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(category) = category {
            query.push(("category", category.to_string()));
        }
        let response = self
            .http
            .get(self.url("/featured"))
            .query(&query)
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn poll_metadata(&self, poll_id: u64) -> Result<PollMetadata, PollError> {
        let response = self
            .http
            .get(self.url(&format!("/{}/metadata", poll_id)))
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn poll_results(&self, poll_id: u64) -> Result<PollResults, PollError> {
        let response = self
            .http
            .get(self.url(&format!("/{}/results", poll_id)))
            .send()
            .await?;
        Self::read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn metadata_is_posted_in_camel_case() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/database/polls/store-metadata")
                    .json_body_partial(r#"{"blockchainPollId": 4, "transactionHash": "abc"}"#);
                then.status(200).json_body(json!({"success": true}));
            })
            .await;
        let client = MetadataClient::new(server.base_url()).unwrap();
        client
            .store_metadata(&PollMetadata {
                blockchain_poll_id: 4,
                transaction_hash: "abc".to_string(),
                ai_data: None,
                poll_data: json!({"subject": "Best color?"}),
                created_by: None,
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn featured_polls_with_category() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/database/polls/featured")
                    .query_param("limit", "5")
                    .query_param("category", "tech");
                then.status(200).json_body(json!({
                    "success": true,
                    "data": [{"blockchainPollId": 2, "title": "Rust?", "views": 10}]
                }));
            })
            .await;
        let client = MetadataClient::new(server.base_url()).unwrap();
        let polls = client.featured_polls(5, Some("tech")).await.unwrap();
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].blockchain_poll_id, 2);
        assert_eq!(polls[0].extra.get("views"), Some(&json!(10)));
    }

    #[tokio::test]
    async fn results_and_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/database/polls/3/results");
                then.status(200).json_body(json!({
                    "pollId": 3, "totalVotes": 5,
                    "results": [{"optionIndex": 0, "votes": 3}, {"optionIndex": 1, "votes": 2}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/database/polls/8/metadata");
                then.status(404).body("no such poll");
            })
            .await;
        let client = MetadataClient::new(server.base_url()).unwrap();
        let results = client.poll_results(3).await.unwrap();
        assert_eq!(results.total_votes, 5);
        assert_eq!(results.results[1].votes, 2);
        assert!(matches!(
            client.poll_metadata(8).await,
            Err(PollError::Backend(_))
        ));
    }
}
