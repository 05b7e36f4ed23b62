//! The object consumers hold.
//!
//! `PollService` speaks in normalized `Poll` values and forms, delegates to
//! the selected gateway, and keeps the metadata backend informed without
//! ever depending on it.

use crate::config::ClientConfig;
use crate::error::PollError;
use crate::gateway::PollGateway;
use crate::metadata::{FeaturedPoll, MetadataClient, PollMetadata};
use crate::model::{
    ContractType, CreatePollOutcome, FeatureFlags, Poll, PollForm, VoteOptions, VoteReceipt,
};
use crate::selector::ContractSelector;
use crate::transform::{denormalize_create_request, denormalize_vote_request, normalize_poll};
use crate::wallet::WalletSigner;
use std::sync::Arc;

pub struct PollService {
    selector: ContractSelector,
    gateway: Arc<dyn PollGateway>,
    metadata: Option<MetadataClient>,
}

impl PollService {
    pub fn new(selector: ContractSelector, metadata: Option<MetadataClient>) -> Self {
        let gateway = selector.active();
        PollService {
            selector,
            gateway,
            metadata,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, PollError> {
        let selector = ContractSelector::from_config(config)?;
        let metadata = config
            .backend_url
            .as_ref()
            .map(|url| MetadataClient::new(url.as_str()))
            .transpose()?;
        Ok(Self::new(selector, metadata))
    }

    pub fn selector(&self) -> &ContractSelector {
        &self.selector
    }

    pub fn contract_type(&self) -> ContractType {
        self.gateway.contract_type()
    }

    pub fn features(&self) -> FeatureFlags {
        self.selector.active_features()
    }

    pub async fn init(&self, signer: Arc<dyn WalletSigner>) -> Result<(), PollError> {
        self.gateway.init(signer).await
    }

    pub fn teardown(&self) {
        self.gateway.teardown()
    }

    /// Create a poll from a form. Metadata is stored afterwards when a
    /// backend is configured; its failure does not fail the creation.
    pub async fn create_poll(&self, form: &PollForm) -> Result<CreatePollOutcome, PollError> {
        let request = denormalize_create_request(form, self.contract_type());
        let outcome = self.gateway.create_poll(&request).await?;
        self.store_metadata(form, &outcome).await;
        Ok(outcome)
    }

    async fn store_metadata(&self, form: &PollForm, outcome: &CreatePollOutcome) {
        let client = match &self.metadata {
            Some(client) => client,
            None => return,
        };
        let poll_data = match serde_json::to_value(form) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "poll form is not serializable");
                return;
            }
        };
        let metadata = PollMetadata {
            blockchain_poll_id: outcome.poll_id(),
            transaction_hash: outcome.tx_ref().to_string(),
            ai_data: None,
            poll_data,
            created_by: form.created_by.clone(),
        };
        if let Err(e) = client.store_metadata(&metadata).await {
            tracing::warn!(poll_id = outcome.poll_id(), error = %e, "metadata not stored");
        }
    }

    pub async fn vote(
        &self,
        poll_id: u64,
        option_index: u32,
        options: &VoteOptions,
    ) -> Result<VoteReceipt, PollError> {
        let request = denormalize_vote_request(poll_id, option_index, options, self.contract_type());
        self.gateway.vote(&request).await
    }

    pub async fn poll(&self, poll_id: u64) -> Result<Poll, PollError> {
        let record = self.gateway.get_poll(poll_id).await?;
        Ok(normalize_poll(&record, self.contract_type()))
    }

    pub async fn active_polls(&self, limit: usize) -> Result<Vec<Poll>, PollError> {
        let contract_type = self.contract_type();
        Ok(self
            .gateway
            .get_active_polls(limit)
            .await?
            .iter()
            .map(|record| normalize_poll(record, contract_type))
            .collect())
    }

    /// Curated polls from the backend; empty when none is configured.
    pub async fn featured_polls(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<FeaturedPoll>, PollError> {
        match &self.metadata {
            Some(client) => client.featured_polls(limit, category).await,
            None => Ok(Vec::new()),
        }
    }
}
