use super::{
    ensure_active, int_arg, read_count, read_fields, read_int, submit, PollGateway, SignerSlot,
};
use crate::chain::{ChainReader, StackArg};
use crate::codec::{
    decode_complex_poll_tuple, encode_create_poll_with_funds, encode_initialize_contract,
    encode_set_option_count, encode_store_option, encode_vote, FundedPoll,
};
use crate::confirm::ConfirmPolicy;
use crate::error::PollError;
use crate::gasless::{GaslessDelegate, GaslessVote};
use crate::model::{
    validate_options, validate_subject, ContractType, CreatePollOutcome, CreatePollRequest,
    ManagerAddressSet, PollForm, PollRecord, VoteReceipt, VoteRequest,
};
use crate::store::PreferenceStore;
use crate::transform::{jetton_wallet, parse_ton};
use crate::wallet::WalletSigner;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use ton_ser::{Address, FriendlyFlags};

/// Fee on top of the reward fund for a poll creation, nanotons
pub const CREATE_POLL_FEE: u128 = 100_000_000;
/// Value attached to each options storage message, nanotons
pub const OPTION_MESSAGE_AMOUNT: u128 = 20_000_000;
pub const VOTE_AMOUNT: u128 = 20_000_000;
/// Value funding the manager deployment, nanotons
pub const INITIALIZE_AMOUNT: u128 = 500_000_000;

const SECONDS_PER_DAY: u32 = 86_400;

/// Gateway to the complex poll contract.
///
/// The main contract owns four manager contracts whose addresses are
/// discovered by `init`. Poll creation is two-phase: the funded poll goes to
/// the main contract, then the option count and every option are written
/// to the options storage with separate transactions.
pub struct ComplexGateway {
    address: Address,
    chain: Arc<dyn ChainReader>,
    signer: SignerSlot,
    managers: RwLock<ManagerAddressSet>,
    gasless: Option<GaslessDelegate>,
    preferences: Arc<PreferenceStore>,
    confirm: ConfirmPolicy,
    testnet: bool,
}

impl ComplexGateway {
    pub fn new(address: Address, chain: Arc<dyn ChainReader>) -> Self {
        ComplexGateway {
            address,
            chain,
            signer: SignerSlot::default(),
            managers: RwLock::new(ManagerAddressSet::default()),
            gasless: None,
            preferences: Arc::new(PreferenceStore::new()),
            confirm: ConfirmPolicy::default(),
            testnet: false,
        }
    }

    pub fn with_gasless(mut self, delegate: GaslessDelegate) -> Self {
        self.gasless = Some(delegate);
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<PreferenceStore>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    /// Snapshot of the discovered manager contracts.
    pub fn managers(&self) -> ManagerAddressSet {
        match self.managers.read() {
            Ok(managers) => managers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_managers(&self, set: ManagerAddressSet) {
        match self.managers.write() {
            Ok(mut managers) => *managers = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
    }

    fn require_managers(&self) -> Result<ManagerAddressSet, PollError> {
        let managers = self.managers();
        if managers.is_complete() {
            Ok(managers)
        } else {
            Err(PollError::ManagersUnavailable(format!(
                "contract {} is not initialized or init was not called",
                self.address
            )))
        }
    }

    async fn is_initialized(&self) -> Result<bool, PollError> {
        Ok(read_int(&*self.chain, &self.address, "isInitialized", &[]).await? != 0)
    }

    async fn read_manager(&self, method: &str) -> Result<Option<Address>, PollError> {
        let fields = read_fields(&*self.chain, &self.address, method, &[]).await?;
        match fields.first() {
            Some(entry) => Ok(entry.to_address()?),
            None => Ok(None),
        }
    }

    /// Rebuild the manager set from chain. It stays empty unless the main
    /// contract is active and initialized.
    async fn discover_managers(&self) -> Result<ManagerAddressSet, PollError> {
        let state = self.chain.contract_state(&self.address).await?;
        if !state.is_active() {
            tracing::warn!(address = %self.address, status = ?state.status, "main contract is not active");
            return Ok(ManagerAddressSet::default());
        }
        if !self.is_initialized().await? {
            tracing::warn!(address = %self.address, "main contract is not initialized");
            return Ok(ManagerAddressSet::default());
        }
        Ok(ManagerAddressSet {
            poll_manager: self.read_manager("getPollManager").await?,
            response_manager: self.read_manager("getResponseManager").await?,
            fund_manager: self.read_manager("getFundManager").await?,
            options_storage: self.read_manager("getOptionsStorage").await?,
        })
    }

    async fn refresh_managers(&self) -> Result<ManagerAddressSet, PollError> {
        let discovered = self.discover_managers().await;
        let set = discovered.as_ref().cloned().unwrap_or_default();
        self.set_managers(set);
        discovered
    }

    /// Deploy the manager contracts. Returns `false` without sending
    /// anything when the contract is already initialized.
    pub async fn initialize_contract(&self) -> Result<bool, PollError> {
        if self.is_initialized().await? {
            tracing::debug!("contract already initialized");
            self.refresh_managers().await?;
            return Ok(false);
        }
        let signer = self.signer.get()?;
        let query_id = rand::random::<u64>();
        let payload = encode_initialize_contract(query_id)?;
        let tx_ref = submit(&*signer, &self.address, self.testnet, INITIALIZE_AMOUNT, &payload).await?;

        let confirmed = self
            .confirm
            .wait_for(|| async {
                Ok(if self.is_initialized().await? {
                    Some(())
                } else {
                    None
                })
            })
            .await;
        if let Err(reason) = confirmed {
            return Err(PollError::Confirmation { tx_ref, reason });
        }
        let managers = self.refresh_managers().await?;
        if !managers.is_complete() {
            return Err(PollError::Confirmation {
                tx_ref,
                reason: "initialized but manager addresses are incomplete".to_string(),
            });
        }
        tracing::info!(%tx_ref, "contract initialized");
        Ok(true)
    }

    async fn read_poll_details(&self, poll_manager: &Address, poll_id: u64) -> Result<PollRecord, PollError> {
        let fields = read_fields(&*self.chain, poll_manager, "getPoll", &[int_arg(poll_id)]).await?;
        Ok(decode_complex_poll_tuple(&fields, poll_id))
    }

    async fn read_options(&self, options_storage: &Address, poll_id: u64) -> Result<Vec<String>, PollError> {
        let count = read_int(&*self.chain, options_storage, "getOptionCount", &[int_arg(poll_id)]).await?;
        let count = u32::try_from(count).unwrap_or(0);
        let mut options = Vec::with_capacity(count as usize);
        for index in 0..count {
            let args = [int_arg(poll_id), StackArg::Int(index as i128)];
            let text = match read_fields(&*self.chain, options_storage, "getOption", &args).await {
                Ok(fields) => fields.first().map(|e| e.to_string_tail()),
                Err(e) => {
                    tracing::debug!(poll_id, index, error = %e, "option unavailable");
                    continue;
                }
            };
            match text {
                Some(Ok(text)) => options.push(text),
                Some(Err(e)) => tracing::debug!(poll_id, index, error = %e, "unreadable option"),
                None => tracing::debug!(poll_id, index, "option not stored"),
            }
        }
        Ok(options)
    }

    /// Id of the poll created after `before` with this subject by `creator`.
    async fn find_created(
        &self,
        poll_manager: &Address,
        before: u64,
        subject: &str,
        creator: Option<&Address>,
    ) -> Result<Option<u64>, PollError> {
        let count = match read_count(&*self.chain, &self.address, "getPollCount").await? {
            Some(count) if count > before => count,
            _ => return Ok(None),
        };
        for id in (before + 1..=count).rev() {
            let record = self.read_poll_details(poll_manager, id).await?;
            let same_creator = match (creator, record.creator.as_ref()) {
                (Some(expected), Some(found)) => expected == found,
                _ => true,
            };
            if record.subject == subject && same_creator {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn funded_poll(
        form: &PollForm,
        reward_jetton: Option<&str>,
        subject: String,
        option_count: usize,
    ) -> Result<FundedPoll, PollError> {
        let amount = |v: &Option<String>| match v.as_deref() {
            Some(s) if !s.trim().is_empty() => parse_ton(s),
            _ => Ok(0),
        };
        let reward_jetton = match reward_jetton {
            Some(address) => Some(address.parse::<Address>().map_err(|e| {
                PollError::Validation(format!("invalid jetton address: {}", e))
            })?),
            None => None,
        };
        let reward_per_vote = if reward_jetton.is_some() {
            amount(&form.jetton_reward_per_vote)?
        } else {
            amount(&form.reward_per_vote)?
        };
        Ok(FundedPoll {
            subject,
            description: form.description.clone().unwrap_or_default(),
            option_count: option_count as u8,
            reward_per_vote,
            total_reward_fund: amount(&form.total_reward_fund)?,
            duration: form.duration_days.unwrap_or(0).saturating_mul(SECONDS_PER_DAY),
            gasless_enabled: form.gasless_enabled,
            reward_jetton,
        })
    }

    /// Phase two of a creation: option count then every option. Each
    /// message is its own transaction; returns how many options went out.
    async fn store_options(
        &self,
        signer: &dyn WalletSigner,
        options_storage: &Address,
        poll_id: u64,
        options: &[String],
    ) -> Result<(bool, usize), PollError> {
        let count_payload = encode_set_option_count(poll_id, options.len() as u32)?;
        let count_sent = match submit(signer, options_storage, self.testnet, OPTION_MESSAGE_AMOUNT, &count_payload).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(poll_id, error = %e, "option count not sent");
                false
            }
        };
        let mut stored = 0;
        for (index, text) in options.iter().enumerate() {
            let payload = encode_store_option(poll_id, index as u32, text)?;
            match submit(signer, options_storage, self.testnet, OPTION_MESSAGE_AMOUNT, &payload).await {
                Ok(_) => stored += 1,
                Err(e) => tracing::warn!(poll_id, index, error = %e, "option not sent"),
            }
        }
        Ok((count_sent, stored))
    }

    /// Gasless flag of a poll, from the preference cache or the poll manager.
    async fn poll_allows_gasless(&self, poll_id: u64) -> bool {
        if let Some(enabled) = self.preferences.gasless_enabled(poll_id) {
            return enabled;
        }
        let managers = match self.require_managers() {
            Ok(managers) => managers,
            Err(_) => return false,
        };
        let poll_manager = match managers.poll_manager {
            Some(address) => address,
            None => return false,
        };
        match self.read_poll_details(&poll_manager, poll_id).await {
            Ok(record) => {
                let enabled = record.gasless_enabled;
                if let Err(e) = self.preferences.modify(poll_id, |p| p.gasless_enabled = Some(enabled)) {
                    tracing::debug!(poll_id, error = %e, "gasless flag not cached");
                }
                enabled
            }
            Err(e) => {
                tracing::debug!(poll_id, error = %e, "gasless flag unavailable");
                false
            }
        }
    }

    async fn try_gasless(&self, request: &VoteRequest) -> Option<VoteReceipt> {
        let delegate = self.gasless.as_ref()?;
        if !request.use_gasless_voting.unwrap_or(true) {
            return None;
        }
        let voter = self.signer.account_address()?;
        if !self.poll_allows_gasless(request.poll_id).await {
            return None;
        }
        if !delegate.is_available().await {
            tracing::warn!(poll_id = request.poll_id, "relayer unavailable, voting with a signed transaction");
            return None;
        }
        let vote = GaslessVote {
            poll_id: request.poll_id,
            option_index: request.option_index,
            voter_address: voter.to_friendly(FriendlyFlags {
                bounceable: false,
                testnet: self.testnet,
            }),
        };
        match delegate.submit_gasless_vote(&vote).await {
            Ok(receipt) => Some(VoteReceipt {
                tx_ref: receipt.tx_ref,
                gasless: true,
            }),
            Err(e) => {
                tracing::warn!(poll_id = request.poll_id, error = %e, "gasless vote failed, falling back");
                None
            }
        }
    }

    /// Balance of the poll's reward pool, nanotons.
    pub async fn poll_funds(&self, poll_id: u64) -> Result<u128, PollError> {
        let fund_manager = self
            .require_managers()?
            .fund_manager
            .ok_or_else(|| PollError::ManagersUnavailable("no fund manager".to_string()))?;
        let funds = read_int(&*self.chain, &fund_manager, "getPollFunds", &[int_arg(poll_id)]).await?;
        Ok(u128::try_from(funds).unwrap_or(0))
    }
}

/// The form to fund and the jetton contract its rewards are paid in.
fn form_of(request: &CreatePollRequest) -> (PollForm, Option<String>) {
    match request {
        CreatePollRequest::Complex(form) => {
            let jetton = form
                .reward_token
                .as_deref()
                .and_then(jetton_wallet)
                .map(str::to_string);
            (form.clone(), jetton)
        }
        CreatePollRequest::Simple(r) => {
            let form = PollForm {
                subject: r.subject.clone(),
                options: r.options.clone(),
                created_by: r.created_by.clone(),
                reward_per_vote: r.reward_per_vote.clone(),
                jetton_reward_per_vote: r.jetton_reward_per_vote.clone(),
                ..PollForm::default()
            };
            (form, r.jetton_reward_wallet.clone())
        }
    }
}

#[async_trait]
impl PollGateway for ComplexGateway {
    fn contract_type(&self) -> ContractType {
        ContractType::Complex
    }

    async fn init(&self, signer: Arc<dyn WalletSigner>) -> Result<(), PollError> {
        self.signer.set(Some(signer));
        let managers = self.refresh_managers().await?;
        tracing::debug!(complete = managers.is_complete(), "manager contracts discovered");
        Ok(())
    }

    fn teardown(&self) {
        self.signer.set(None);
        self.set_managers(ManagerAddressSet::default());
    }

    async fn create_poll(
        &self,
        request: &CreatePollRequest,
    ) -> Result<CreatePollOutcome, PollError> {
        let (form, jetton) = form_of(request);
        let options = validate_options(&form.options)?;
        let subject = validate_subject(&form.subject)?;
        let funded = Self::funded_poll(&form, jetton.as_deref(), subject.clone(), options.len())?;
        let payload = encode_create_poll_with_funds(&funded)?;
        let managers = self.require_managers()?;
        let (poll_manager, options_storage) = match (managers.poll_manager, managers.options_storage) {
            (Some(p), Some(o)) => (p, o),
            _ => return Err(PollError::ManagersUnavailable("incomplete manager set".to_string())),
        };
        let signer = self.signer.get()?;
        let creator = signer.account().map(|a| a.address);

        let before = self.poll_count().await?.unwrap_or(0);
        let amount = funded.total_reward_fund.saturating_add(CREATE_POLL_FEE);
        let tx_ref = submit(&*signer, &self.address, self.testnet, amount, &payload).await?;

        let poll_id = match self
            .confirm
            .wait_for(|| self.find_created(&poll_manager, before, &subject, creator.as_ref()))
            .await
        {
            Ok(id) => id,
            Err(reason) => return Err(PollError::Confirmation { tx_ref, reason }),
        };
        tracing::info!(poll_id, %tx_ref, "funded poll created");

        let (count_sent, stored) = self
            .store_options(&*signer, &options_storage, poll_id, &options)
            .await?;
        let cached = options.clone();
        if let Err(e) = self.preferences.modify(poll_id, |p| {
            p.options = Some(cached.clone());
            p.gasless_enabled = Some(funded.gasless_enabled);
        }) {
            tracing::debug!(poll_id, error = %e, "poll preferences not cached");
        }

        if count_sent && stored == options.len() {
            Ok(CreatePollOutcome::Created { poll_id, tx_ref })
        } else {
            tracing::warn!(poll_id, stored, expected = options.len(), "poll options incomplete");
            Ok(CreatePollOutcome::CreatedOptionsIncomplete {
                poll_id,
                tx_ref,
                stored,
                expected: options.len(),
            })
        }
    }

    async fn vote(&self, request: &VoteRequest) -> Result<VoteReceipt, PollError> {
        let payload = encode_vote(request.poll_id, request.option_index)?;
        if let Some(receipt) = self.try_gasless(request).await {
            return Ok(receipt);
        }
        let signer = self.signer.get()?;
        let tx_ref = submit(&*signer, &self.address, self.testnet, VOTE_AMOUNT, &payload).await?;
        Ok(VoteReceipt {
            tx_ref,
            gasless: false,
        })
    }

    async fn get_poll(&self, poll_id: u64) -> Result<PollRecord, PollError> {
        let managers = self.require_managers()?;
        let (poll_manager, options_storage) = match (managers.poll_manager, managers.options_storage) {
            (Some(p), Some(o)) => (p, o),
            _ => return Err(PollError::ManagersUnavailable("incomplete manager set".to_string())),
        };
        let options = match self.read_options(&options_storage, poll_id).await {
            Ok(options) => options,
            Err(e) => match self.preferences.cached_options(poll_id) {
                Some(cached) => {
                    tracing::debug!(poll_id, error = %e, "using cached options");
                    cached
                }
                None => return Err(e),
            },
        };
        if options.is_empty() {
            return Err(PollError::NotFound(poll_id));
        }
        let mut record = match self.read_poll_details(&poll_manager, poll_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(poll_id, error = %e, "poll details unavailable");
                PollRecord::placeholder(poll_id, ContractType::Complex)
            }
        };
        record.id = poll_id;
        record.options = options;
        Ok(record)
    }

    async fn poll_count(&self) -> Result<Option<u64>, PollError> {
        ensure_active(&*self.chain, &self.address).await?;
        read_count(&*self.chain, &self.address, "getPollCount").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gasless::PlaceholderSigner;
    use crate::testing::{MockChain, MockWallet};
    use httpmock::{Method::GET, Method::POST, MockServer};
    use serde_json::json;

    fn opts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn form(subject: &str, options: &[&str]) -> CreatePollRequest {
        CreatePollRequest::Complex(PollForm {
            subject: subject.to_string(),
            description: Some("Pick one".to_string()),
            options: opts(options),
            reward_per_vote: Some("0.1".to_string()),
            total_reward_fund: Some("5".to_string()),
            duration_days: Some(7),
            gasless_enabled: true,
            ..PollForm::default()
        })
    }

    async fn setup(chain: Arc<MockChain>, relayer: Option<String>) -> (ComplexGateway, Arc<MockWallet>) {
        let mut gateway = ComplexGateway::new(chain.complex_address(), chain.clone())
            .with_confirm_policy(ConfirmPolicy::immediate(3));
        if let Some(url) = relayer {
            gateway = gateway.with_gasless(GaslessDelegate::new(url, Arc::new(PlaceholderSigner)).unwrap());
        }
        let wallet = Arc::new(MockWallet::connected(chain));
        gateway.init(wallet.clone()).await.unwrap();
        (gateway, wallet)
    }

    fn seed_polls(chain: &MockChain, gasless_id: u64) {
        for id in 1..=gasless_id {
            chain.seed_complex_poll(&format!("poll {}", id), &["yes", "no"], id == gasless_id);
        }
    }

    async fn relayer(healthy: bool) -> MockServer {
        let server = MockServer::start_async().await;
        let status = if healthy { "healthy" } else { "down" };
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({ "status": status }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/relay");
                then.status(200).json_body(json!({"success": true, "voteId": "relayed-1"}));
            })
            .await;
        server
    }

    #[tokio::test]
    async fn managers_are_discovered_on_init() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        let (gateway, _) = setup(chain.clone(), None).await;
        assert_eq!(gateway.managers(), chain.complex_managers());
        gateway.teardown();
        assert_eq!(gateway.managers(), ManagerAddressSet::default());
    }

    #[tokio::test]
    async fn uninitialized_contract_has_no_managers() {
        let chain = Arc::new(MockChain::new());
        let (gateway, _) = setup(chain, None).await;
        assert!(!gateway.managers().is_complete());
        assert!(matches!(
            gateway.get_poll(1).await,
            Err(PollError::ManagersUnavailable(_))
        ));
        assert!(matches!(
            gateway.create_poll(&form("s", &["a", "b"])).await,
            Err(PollError::ManagersUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn initialization_is_a_one_time_operation() {
        let chain = Arc::new(MockChain::new());
        let (gateway, wallet) = setup(chain.clone(), None).await;
        assert!(gateway.initialize_contract().await.unwrap());
        assert!(gateway.managers().is_complete());
        assert!(!gateway.initialize_contract().await.unwrap());
        assert_eq!(wallet.sent().len(), 1);
    }

    #[tokio::test]
    async fn two_phase_creation() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        let (gateway, wallet) = setup(chain.clone(), None).await;
        let outcome = gateway
            .create_poll(&form("Lunch", &["Pizza", "Sushi", "Salad"]))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CreatePollOutcome::Created {
                poll_id: 1,
                tx_ref: outcome.tx_ref().to_string()
            }
        );
        // main message, option count, three options
        assert_eq!(wallet.sent().len(), 5);
        let poll = gateway.get_poll(1).await.unwrap();
        assert_eq!(poll.options, opts(&["Pizza", "Sushi", "Salad"]));
        assert_eq!(poll.subject, "Lunch");
        assert_eq!(poll.reward_per_vote, Some(100_000_000));
        assert_eq!(poll.total_reward_fund, Some(5_000_000_000));
        assert!(poll.gasless_enabled);
        assert_eq!(gateway.poll_funds(1).await.unwrap(), 5_000_000_000);
    }

    #[tokio::test]
    async fn dropped_option_messages_are_reported() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        let (gateway, wallet) = setup(chain.clone(), None).await;
        // 0: main message, 1: option count, 2..: options
        wallet.fail_transaction(3);
        let outcome = gateway
            .create_poll(&form("Lunch", &["Pizza", "Sushi", "Salad"]))
            .await
            .unwrap();
        assert!(!outcome.is_complete());
        assert!(matches!(
            outcome,
            CreatePollOutcome::CreatedOptionsIncomplete {
                poll_id: 1,
                stored: 2,
                expected: 3,
                ..
            }
        ));
        assert_eq!(chain.complex_option_count(1), 3);
    }

    #[tokio::test]
    async fn gasless_vote_when_relayer_is_healthy() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        seed_polls(&chain, 5);
        let server = relayer(true).await;
        let (gateway, wallet) = setup(chain.clone(), Some(server.base_url())).await;
        let receipt = gateway.vote(&VoteRequest::new(5, 0)).await.unwrap();
        assert!(receipt.gasless);
        assert_eq!(receipt.tx_ref, "relayed-1");
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn signed_vote_when_relayer_is_down() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        seed_polls(&chain, 5);
        let server = relayer(false).await;
        let (gateway, wallet) = setup(chain.clone(), Some(server.base_url())).await;
        let receipt = gateway.vote(&VoteRequest::new(5, 0)).await.unwrap();
        assert!(!receipt.gasless);
        assert_eq!(wallet.sent().len(), 1);
        assert_eq!(chain.complex_votes(5), 1);
    }

    #[tokio::test]
    async fn failed_relay_falls_back() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        seed_polls(&chain, 5);
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({"status": "warning"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/relay");
                then.status(502).body("bad gateway");
            })
            .await;
        let (gateway, wallet) = setup(chain, Some(server.base_url())).await;
        let receipt = gateway.vote(&VoteRequest::new(5, 1)).await.unwrap();
        assert!(!receipt.gasless);
        assert_eq!(wallet.sent().len(), 1);
    }

    #[tokio::test]
    async fn gasless_needs_the_creator_opt_in() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        seed_polls(&chain, 5);
        let server = relayer(true).await;
        let (gateway, _) = setup(chain, Some(server.base_url())).await;
        // poll 4 did not opt in
        assert!(!gateway.vote(&VoteRequest::new(4, 0)).await.unwrap().gasless);
        let mut declined = VoteRequest::new(5, 0);
        declined.use_gasless_voting = Some(false);
        assert!(!gateway.vote(&declined).await.unwrap().gasless);
    }

    #[tokio::test]
    async fn listing_reads_every_poll() {
        let chain = Arc::new(MockChain::new());
        chain.initialize_complex();
        seed_polls(&chain, 3);
        let (gateway, _) = setup(chain, None).await;
        let polls = gateway.get_active_polls(10).await.unwrap();
        assert_eq!(polls.len(), 3);
        assert!(polls.iter().all(|p| p.contract_type == ContractType::Complex));
        assert_eq!(polls[2].options, opts(&["yes", "no"]));
    }

    #[test]
    fn simple_shaped_request_keeps_its_jetton() {
        let jetton = format!("0:{}", "ab".repeat(32));
        let request = CreatePollRequest::Simple(crate::model::SimpleCreateRequest {
            subject: "Lunch".to_string(),
            options: opts(&["Pizza", "Sushi"]),
            created_by: None,
            reward_per_vote: Some("0.1".to_string()),
            jetton_reward_wallet: Some(jetton.clone()),
            jetton_reward_per_vote: Some("2".to_string()),
        });
        let (simple, wallet) = form_of(&request);
        let funded = ComplexGateway::funded_poll(&simple, wallet.as_deref(), simple.subject.clone(), 2).unwrap();
        assert_eq!(funded.reward_jetton, Some(jetton.parse::<Address>().unwrap()));
        assert_eq!(funded.reward_per_vote, 2_000_000_000);

        let (complex, wallet) = form_of(&form("Lunch", &["Pizza", "Sushi"]));
        assert_eq!(wallet, None);
        let funded = ComplexGateway::funded_poll(&complex, None, complex.subject.clone(), 2).unwrap();
        assert_eq!(funded.reward_jetton, None);
        assert_eq!(funded.reward_per_vote, 100_000_000);
    }
}
