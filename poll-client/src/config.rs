//! Process configuration.
//!
//! Every value can be given on the command line or through the environment
//! and is fixed once loaded. Switching the contract variant means
//! restarting with a different `POLL_CONTRACT_VARIANT`.

use crate::confirm::ConfirmPolicy;
use crate::model::ContractType;
use clap::{Parser, ValueEnum};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use ton_ser::Address;

const MAINNET_ENDPOINT: &str = "https://toncenter.com/api/v2";
const TESTNET_ENDPOINT: &str = "https://testnet.toncenter.com/api/v2";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Parse(#[from] clap::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

fn parse_variant(s: &str) -> Result<ContractType, String> {
    s.parse().map_err(|e: crate::error::PollError| e.to_string())
}

fn parse_address(s: &str) -> Result<Address, String> {
    s.parse().map_err(|e: ton_ser::AddressError| e.to_string())
}

#[derive(Clone, Debug, Parser)]
#[command(name = "poll-client", author, version, about)]
pub struct ClientConfig {
    /// Contract family the client talks to: simple or complex
    #[arg(long = "contract-variant", env = "POLL_CONTRACT_VARIANT", default_value = "simple", value_parser = parse_variant)]
    pub contract_variant: ContractType,

    /// Address of the simple poll contract, raw or user-friendly
    #[arg(long = "simple-contract-address", env = "POLL_SIMPLE_CONTRACT_ADDRESS", value_parser = parse_address)]
    pub simple_contract_address: Address,

    /// Address of the complex main contract
    #[arg(long = "complex-contract-address", env = "POLL_COMPLEX_CONTRACT_ADDRESS", value_parser = parse_address)]
    pub complex_contract_address: Address,

    #[arg(long, env = "TON_NETWORK", value_enum, default_value_t = Network::Testnet)]
    pub network: Network,

    /// toncenter v2 endpoint; defaults to the public one of the network
    #[arg(long = "rpc-endpoint", env = "TON_RPC_ENDPOINT")]
    pub rpc_endpoint: Option<String>,

    #[arg(long = "api-key", env = "TON_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the gasless voting relayer
    #[arg(long = "relayer-url", env = "GASLESS_RELAYER_URL")]
    pub relayer_url: Option<String>,

    /// Base URL of the poll metadata backend
    #[arg(long = "backend-url", env = "POLL_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Checks made for a submitted poll before giving up
    #[arg(long = "confirm-attempts", env = "POLL_CONFIRM_ATTEMPTS", default_value = "8")]
    pub confirm_attempts: u32,

    /// First delay between checks, doubled after each miss
    #[arg(long = "confirm-delay-ms", env = "POLL_CONFIRM_DELAY_MS", default_value = "1500")]
    pub confirm_delay_ms: u64,

    /// Highest poll id listed
    #[arg(long = "scan-limit", env = "POLL_SCAN_LIMIT", default_value = "20")]
    pub scan_limit: usize,

    /// Log level (RUST_LOG overrides), e.g. info,debug,trace
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Pretty (human) logs instead of JSON
    #[arg(long = "log-pretty", env = "LOG_PRETTY")]
    pub log_pretty: bool,
}

impl ClientConfig {
    /// Load from the environment alone.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::try_parse_from(["poll-client"])?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirm_attempts == 0 {
            return Err(ConfigError::Invalid(
                "at least one confirmation attempt is needed".to_string(),
            ));
        }
        if self.scan_limit == 0 {
            return Err(ConfigError::Invalid("scan limit must be positive".to_string()));
        }
        for url in [&self.rpc_endpoint, &self.relayer_url, &self.backend_url]
            .into_iter()
            .flatten()
        {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("'{}' is not an http(s) URL", url)));
            }
        }
        Ok(())
    }

    pub fn testnet(&self) -> bool {
        self.network == Network::Testnet
    }

    pub fn rpc_endpoint(&self) -> &str {
        match (&self.rpc_endpoint, self.network) {
            (Some(endpoint), _) => endpoint,
            (None, Network::Mainnet) => MAINNET_ENDPOINT,
            (None, Network::Testnet) => TESTNET_ENDPOINT,
        }
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        let initial_delay = Duration::from_millis(self.confirm_delay_ms);
        ConfirmPolicy {
            max_attempts: self.confirm_attempts,
            initial_delay,
            max_delay: ConfirmPolicy::default().max_delay.max(initial_delay),
        }
    }
}
