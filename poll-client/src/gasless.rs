//! Gasless voting through a relayer.
//!
//! The voter signs a readable vote message off chain and the relayer
//! submits the vote and pays its fees.

use crate::error::PollError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaslessVote {
    pub poll_id: u64,
    pub option_index: u32,
    pub voter_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaslessReceipt {
    pub tx_ref: String,
    pub status: Option<String>,
}

/// Produces the signature sent along with a vote message.
#[async_trait]
pub trait VoteSigner: Send + Sync {
    async fn sign(&self, message: &str, voter_address: &str) -> Result<String, PollError>;
}

/// Digest of the message plus a timestamp. This is not a signature: a
/// relayer cannot tell who produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSigner;

impl PlaceholderSigner {
    pub fn sign_at(message: &str, timestamp_ms: u128) -> String {
        format!(
            "{}.{}",
            base64::encode(Sha256::digest(message.as_bytes())),
            timestamp_ms
        )
    }
}

#[async_trait]
impl VoteSigner for PlaceholderSigner {
    async fn sign(&self, message: &str, voter_address: &str) -> Result<String, PollError> {
        tracing::warn!(
            voter = voter_address,
            "gasless vote carries a placeholder signature, not a wallet signature"
        );
        Ok(Self::sign_at(message, now_ms()))
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// The text the voter signs.
pub fn vote_message(vote: &GaslessVote, timestamp_ms: u128, nonce: &str) -> String {
    format!(
        "Vote for poll #{}\nOption: {}\nVoter: {}\nTimestamp: {}\nNonce: {}",
        vote.poll_id, vote.option_index, vote.voter_address, timestamp_ms, nonce
    )
}

fn nonce() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    vote_message: &'a str,
    signature: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RelayResponse {
    success: bool,
    vote_id: Option<String>,
    status: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Clone)]
pub struct GaslessDelegate {
    http: reqwest::Client,
    relayer_url: String,
    signer: Arc<dyn VoteSigner>,
}

impl GaslessDelegate {
    pub fn new(relayer_url: impl Into<String>, signer: Arc<dyn VoteSigner>) -> Result<Self, PollError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(GaslessDelegate {
            http,
            relayer_url: relayer_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn relayer_url(&self) -> &str {
        &self.relayer_url
    }

    /// `true` only when the relayer answers with a `healthy` or `warning`
    /// status. Never fails.
    pub async fn is_available(&self) -> bool {
        let response = match self
            .http
            .get(format!("{}/health", self.relayer_url))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(status = %r.status(), "relayer health check failed");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "relayer unreachable");
                return false;
            }
        };
        match response.json::<HealthResponse>().await {
            Ok(health) => matches!(health.status.as_str(), "healthy" | "warning"),
            Err(e) => {
                tracing::debug!(error = %e, "unreadable relayer health");
                false
            }
        }
    }

    pub async fn submit_gasless_vote(&self, vote: &GaslessVote) -> Result<GaslessReceipt, PollError> {
        let nonce = nonce();
        let message = vote_message(vote, now_ms(), &nonce);
        let signature = self.signer.sign(&message, &vote.voter_address).await?;

        let response = self
            .http
            .post(format!("{}/relay", self.relayer_url))
            .json(&RelayRequest {
                vote_message: &message,
                signature: &signature,
            })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        let relay: RelayResponse = serde_json::from_str(&body).unwrap_or_default();
        if !status.is_success() || !relay.success {
            let reason = relay
                .error
                .or(relay.message)
                .unwrap_or_else(|| format!("relayer answered {}", status));
            return Err(PollError::Relay(reason));
        }
        tracing::info!(poll_id = vote.poll_id, vote_id = ?relay.vote_id, "gasless vote relayed");
        Ok(GaslessReceipt {
            tx_ref: relay.vote_id.unwrap_or_else(|| format!("gasless-{}", nonce)),
            status: relay.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use serde_json::json;

    fn delegate(url: String) -> GaslessDelegate {
        GaslessDelegate::new(url, Arc::new(PlaceholderSigner)).unwrap()
    }

    fn vote() -> GaslessVote {
        GaslessVote {
            poll_id: 5,
            option_index: 0,
            voter_address: "EQVoter".to_string(),
        }
    }

    #[tokio::test]
    async fn healthy_and_warning_are_available() {
        for (status, expected) in [("healthy", true), ("warning", true), ("degraded", false)] {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/health");
                    then.status(200).json_body(json!({ "status": status }));
                })
                .await;
            assert_eq!(delegate(server.base_url()).is_available().await, expected, "{}", status);
        }
    }

    #[tokio::test]
    async fn failures_mean_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(503).body("down");
            })
            .await;
        assert!(!delegate(server.base_url()).is_available().await);
        // nothing listens there
        assert!(!delegate("http://127.0.0.1:9".to_string()).is_available().await);
    }

    #[tokio::test]
    async fn vote_is_relayed() {
        let server = MockServer::start_async().await;
        let relay = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/relay")
                    .body_contains("Vote for poll #5")
                    .body_contains("signature");
                then.status(200)
                    .json_body(json!({"success": true, "voteId": "v-1", "status": "queued"}));
            })
            .await;
        let receipt = delegate(server.base_url())
            .submit_gasless_vote(&vote())
            .await
            .unwrap();
        relay.assert_async().await;
        assert_eq!(receipt.tx_ref, "v-1");
        assert_eq!(receipt.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn refused_vote_is_a_relay_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/relay");
                then.status(400)
                    .json_body(json!({"success": false, "error": "already voted"}));
            })
            .await;
        let err = delegate(server.base_url())
            .submit_gasless_vote(&vote())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Relay(ref m) if m == "already voted"));
    }

    #[tokio::test]
    async fn unreachable_relayer_is_a_network_error() {
        let err = delegate("http://127.0.0.1:9".to_string())
            .submit_gasless_vote(&vote())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Network(_)));
    }

    #[test]
    fn message_embeds_every_field() {
        let m = vote_message(&vote(), 1_700_000_000_000, "abcd");
        for part in ["#5", "Option: 0", "EQVoter", "1700000000000", "abcd"] {
            assert!(m.contains(part), "{}", part);
        }
        let sig = PlaceholderSigner::sign_at(&m, 42);
        assert!(sig.ends_with(".42"));
    }
}
