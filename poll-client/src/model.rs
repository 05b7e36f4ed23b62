use crate::error::PollError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ton_ser::Address;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;

pub const NO_SUBJECT: &str = "No subject";
pub const NO_DESCRIPTION: &str = "No description provided";
pub const UNKNOWN_CREATOR: &str = "Unknown";

/// Which of the two deployed contract families a record or gateway belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Simple,
    Complex,
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractType::Simple => f.write_str("simple"),
            ContractType::Complex => f.write_str("complex"),
        }
    }
}

impl FromStr for ContractType {
    type Err = PollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(ContractType::Simple),
            "complex" => Ok(ContractType::Complex),
            other => Err(PollError::Validation(format!(
                "unknown contract variant '{}'",
                other
            ))),
        }
    }
}

/// A poll as read from a gateway, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRecord {
    pub id: u64,
    pub subject: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub creator: Option<Address>,
    pub total_votes: Option<u64>,
    /// unix seconds
    pub start_time: Option<u64>,
    /// unix seconds
    pub end_time: Option<u64>,
    /// nanotons
    pub reward_per_vote: Option<u128>,
    /// nanotons
    pub total_reward_fund: Option<u128>,
    pub gasless_enabled: bool,
    pub contract_type: ContractType,
}

impl PollRecord {
    /// Record filled with the documented placeholders.
    pub fn placeholder(id: u64, contract_type: ContractType) -> Self {
        PollRecord {
            id,
            subject: NO_SUBJECT.to_string(),
            description: None,
            options: Vec::new(),
            creator: None,
            total_votes: None,
            start_time: None,
            end_time: None,
            reward_per_vote: None,
            total_reward_fund: None,
            gasless_enabled: false,
            contract_type,
        }
    }
}

/// The normalized shape handed to consumers, whatever the contract variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub creator_address: String,
    pub total_votes: u64,
    pub is_active: bool,
    pub reward_per_vote: String,
    pub total_reward_fund: String,
    pub gasless_enabled: bool,
    pub contract_type: ContractType,
    pub days_remaining: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub poll_id: u64,
    pub option_index: u32,
    pub voter_address: String,
}

/// Sub-contracts owned by the complex main contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerAddressSet {
    pub poll_manager: Option<Address>,
    pub response_manager: Option<Address>,
    pub fund_manager: Option<Address>,
    pub options_storage: Option<Address>,
}

impl ManagerAddressSet {
    pub fn is_complete(&self) -> bool {
        self.poll_manager.is_some()
            && self.response_manager.is_some()
            && self.fund_manager.is_some()
            && self.options_storage.is_some()
    }
}

/// Affordances a consumer may render for a contract variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub has_gasless_voting: bool,
    pub has_funding_options: bool,
    pub has_complex_rewards: bool,
    pub has_minimal_data: bool,
}

impl FeatureFlags {
    pub fn for_contract(contract_type: ContractType) -> Self {
        match contract_type {
            ContractType::Simple => FeatureFlags {
                has_gasless_voting: false,
                has_funding_options: false,
                has_complex_rewards: false,
                has_minimal_data: true,
            },
            ContractType::Complex => FeatureFlags {
                has_gasless_voting: true,
                has_funding_options: true,
                has_complex_rewards: true,
                has_minimal_data: false,
            },
        }
    }
}

/// Poll creation form as filled by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollForm {
    pub subject: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub created_by: Option<String>,
    /// TON amount, e.g. `"0.1"`
    pub reward_per_vote: Option<String>,
    /// TON amount
    pub total_reward_fund: Option<String>,
    /// key into the jetton table, e.g. `"USDT"`
    pub reward_token: Option<String>,
    pub jetton_reward_per_vote: Option<String>,
    pub duration_days: Option<u32>,
    pub gasless_enabled: bool,
}

/// Creation request reduced to what the simple contract path needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleCreateRequest {
    pub subject: String,
    pub options: Vec<String>,
    pub created_by: Option<String>,
    pub reward_per_vote: Option<String>,
    pub jetton_reward_wallet: Option<String>,
    pub jetton_reward_per_vote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePollRequest {
    Simple(SimpleCreateRequest),
    Complex(PollForm),
}

impl CreatePollRequest {
    pub fn subject(&self) -> &str {
        match self {
            CreatePollRequest::Simple(r) => &r.subject,
            CreatePollRequest::Complex(f) => &f.subject,
        }
    }

    pub fn options(&self) -> &[String] {
        match self {
            CreatePollRequest::Simple(r) => &r.options,
            CreatePollRequest::Complex(f) => &f.options,
        }
    }
}

/// Extra voting preferences coming from a consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoteOptions {
    pub use_gasless_voting: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteRequest {
    pub poll_id: u64,
    pub option_index: u32,
    /// `None` lets the gateway pick gasless voting when it is available
    pub use_gasless_voting: Option<bool>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl VoteRequest {
    pub fn new(poll_id: u64, option_index: u32) -> Self {
        VoteRequest {
            poll_id,
            option_index,
            use_gasless_voting: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Result of a poll creation. The complex path writes options with separate
/// transactions and reports when some of them did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePollOutcome {
    Created {
        poll_id: u64,
        tx_ref: String,
    },
    CreatedOptionsIncomplete {
        poll_id: u64,
        tx_ref: String,
        stored: usize,
        expected: usize,
    },
}

impl CreatePollOutcome {
    pub fn poll_id(&self) -> u64 {
        match self {
            CreatePollOutcome::Created { poll_id, .. }
            | CreatePollOutcome::CreatedOptionsIncomplete { poll_id, .. } => *poll_id,
        }
    }

    pub fn tx_ref(&self) -> &str {
        match self {
            CreatePollOutcome::Created { tx_ref, .. }
            | CreatePollOutcome::CreatedOptionsIncomplete { tx_ref, .. } => tx_ref,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CreatePollOutcome::Created { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub tx_ref: String,
    pub gasless: bool,
}

/// Trim the options and check the 2..=10 non-empty rule.
pub fn validate_options(options: &[String]) -> Result<Vec<String>, PollError> {
    let trimmed: Vec<String> = options.iter().map(|o| o.trim().to_string()).collect();
    if trimmed.iter().any(|o| o.is_empty()) {
        return Err(PollError::Validation(
            "poll options must not be empty".to_string(),
        ));
    }
    if trimmed.len() < MIN_OPTIONS || trimmed.len() > MAX_OPTIONS {
        return Err(PollError::Validation(format!(
            "a poll needs between {} and {} options, got {}",
            MIN_OPTIONS,
            MAX_OPTIONS,
            trimmed.len()
        )));
    }
    Ok(trimmed)
}

pub fn validate_subject(subject: &str) -> Result<String, PollError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(PollError::Validation(
            "poll subject must not be empty".to_string(),
        ));
    }
    Ok(subject.to_string())
}

#[cfg(any(test, feature = "property-test-api"))]
mod arbitrary {
    use super::*;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for ContractType {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            if bool::arbitrary(g) {
                ContractType::Simple
            } else {
                ContractType::Complex
            }
        }
    }

    impl Arbitrary for PollRecord {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            PollRecord {
                id: u64::arbitrary(g),
                subject: String::arbitrary(g),
                description: Arbitrary::arbitrary(g),
                options: Arbitrary::arbitrary(g),
                creator: Arbitrary::arbitrary(g),
                total_votes: Arbitrary::arbitrary(g),
                start_time: Arbitrary::arbitrary(g),
                end_time: Arbitrary::arbitrary(g),
                reward_per_vote: Arbitrary::arbitrary(g),
                total_reward_fund: Arbitrary::arbitrary(g),
                gasless_enabled: bool::arbitrary(g),
                contract_type: ContractType::arbitrary(g),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn options_are_trimmed() {
        assert_eq!(
            validate_options(&opts(&[" Red ", "Blue"])).unwrap(),
            opts(&["Red", "Blue"])
        );
    }

    #[test]
    fn option_count_bounds() {
        assert!(validate_options(&opts(&["a"])).is_err());
        assert!(validate_options(&opts(&[])).is_err());
        let eleven: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        assert!(matches!(
            validate_options(&eleven),
            Err(PollError::Validation(_))
        ));
        assert!(validate_options(&eleven[..10]).is_ok());
    }

    #[test]
    fn blank_option_is_rejected() {
        assert!(validate_options(&opts(&["a", "  ", "b"])).is_err());
    }

    #[test]
    fn contract_type_parsing() {
        assert_eq!("Complex".parse::<ContractType>().unwrap(), ContractType::Complex);
        assert_eq!(" simple".parse::<ContractType>().unwrap(), ContractType::Simple);
        assert!("legacy".parse::<ContractType>().is_err());
    }

    #[test]
    fn poll_serializes_in_camel_case() {
        let poll = Poll {
            id: 1,
            title: "t".to_string(),
            description: "d".to_string(),
            options: opts(&["a", "b"]),
            creator_address: UNKNOWN_CREATOR.to_string(),
            total_votes: 0,
            is_active: true,
            reward_per_vote: "0 TON".to_string(),
            total_reward_fund: "0 TON".to_string(),
            gasless_enabled: false,
            contract_type: ContractType::Simple,
            days_remaining: None,
        };
        let json = serde_json::to_value(&poll).unwrap();
        assert_eq!(json["creatorAddress"], "Unknown");
        assert_eq!(json["contractType"], "simple");
        assert_eq!(json["totalRewardFund"], "0 TON");
    }
}
