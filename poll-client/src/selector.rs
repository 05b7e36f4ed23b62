//! Load-time choice of the contract variant.

use crate::chain::{ChainReader, TonCenterClient};
use crate::config::ClientConfig;
use crate::error::PollError;
use crate::gasless::{GaslessDelegate, PlaceholderSigner};
use crate::gateway::{ComplexGateway, PollGateway, SimpleGateway};
use crate::model::{ContractType, FeatureFlags};
use crate::store::PreferenceStore;
use std::sync::Arc;

/// Both gateways are always constructed; the variant only decides which
/// one `active` hands out. The choice never changes after construction.
pub struct ContractSelector {
    variant: ContractType,
    simple: Arc<SimpleGateway>,
    complex: Arc<ComplexGateway>,
}

impl ContractSelector {
    pub fn new(variant: ContractType, simple: SimpleGateway, complex: ComplexGateway) -> Self {
        ContractSelector {
            variant,
            simple: Arc::new(simple),
            complex: Arc::new(complex),
        }
    }

    /// Gateways reading through toncenter at the configured endpoint.
    pub fn from_config(config: &ClientConfig) -> Result<Self, PollError> {
        let chain = TonCenterClient::new(config.rpc_endpoint(), config.api_key.clone())?;
        Self::with_chain(config, Arc::new(chain))
    }

    pub fn with_chain(config: &ClientConfig, chain: Arc<dyn ChainReader>) -> Result<Self, PollError> {
        let simple = SimpleGateway::new(config.simple_contract_address, chain.clone())
            .with_confirm_policy(config.confirm_policy())
            .testnet(config.testnet());
        let mut complex = ComplexGateway::new(config.complex_contract_address, chain)
            .with_confirm_policy(config.confirm_policy())
            .testnet(config.testnet());
        if let Some(url) = &config.relayer_url {
            complex = complex.with_gasless(GaslessDelegate::new(url.clone(), Arc::new(PlaceholderSigner))?);
        }
        tracing::info!(
            variant = %config.contract_variant,
            network = %config.network,
            gasless_relayer = config.relayer_url.is_some(),
            "contract selected"
        );
        Ok(Self::new(config.contract_variant, simple, complex))
    }

    pub fn variant(&self) -> ContractType {
        self.variant
    }

    pub fn active(&self) -> Arc<dyn PollGateway> {
        match self.variant {
            ContractType::Simple => self.simple.clone(),
            ContractType::Complex => self.complex.clone(),
        }
    }

    pub fn simple(&self) -> &Arc<SimpleGateway> {
        &self.simple
    }

    /// Complex-only operations such as `initialize_contract` and `poll_funds`.
    pub fn complex(&self) -> &Arc<ComplexGateway> {
        &self.complex
    }

    /// Per-poll preferences cached by the complex gateway.
    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        self.complex.preferences()
    }

    pub fn features(&self, contract_type: ContractType) -> FeatureFlags {
        FeatureFlags::for_contract(contract_type)
    }

    pub fn active_features(&self) -> FeatureFlags {
        self.features(self.variant)
    }
}
