use super::{ensure_active, int_arg, read_count, read_fields, submit, PollGateway, SignerSlot};
use crate::chain::ChainReader;
use crate::codec::{decode_options_dictionary, decode_poll_tuple, encode_create_poll, encode_vote};
use crate::confirm::ConfirmPolicy;
use crate::error::PollError;
use crate::model::{
    validate_options, ContractType, CreatePollOutcome, CreatePollRequest, PollRecord,
    VoteReceipt, VoteRequest,
};
use crate::wallet::WalletSigner;
use async_trait::async_trait;
use std::sync::Arc;
use ton_ser::Address;

/// Value attached to a poll creation, nanotons
pub const CREATE_POLL_AMOUNT: u128 = 50_000_000;
/// Value attached to a vote, nanotons
pub const VOTE_AMOUNT: u128 = 20_000_000;

const GET_POLL_COUNT: &str = "getPollCount";
const GET_POLL_OPTIONS: &str = "getPollOptions";
const GET_POLL: &str = "getPoll";

/// Gateway to the simple poll contract: one message creates a poll with
/// its options inline, votes are plain messages.
pub struct SimpleGateway {
    address: Address,
    chain: Arc<dyn ChainReader>,
    signer: SignerSlot,
    confirm: ConfirmPolicy,
    testnet: bool,
}

impl SimpleGateway {
    pub fn new(address: Address, chain: Arc<dyn ChainReader>) -> Self {
        SimpleGateway {
            address,
            chain,
            signer: SignerSlot::default(),
            confirm: ConfirmPolicy::default(),
            testnet: false,
        }
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

    async fn read_options(&self, poll_id: u64) -> Result<Vec<String>, PollError> {
        let fields = read_fields(&*self.chain, &self.address, GET_POLL_OPTIONS, &[int_arg(poll_id)])
            .await?;
        match fields.first() {
            None => Ok(Vec::new()),
            Some(entry) => Ok(decode_options_dictionary(entry.to_maybe_cell()?)?),
        }
    }

    /// Find the id of a poll created after `before` carrying `options`.
    async fn find_created(&self, before: u64, options: &[String]) -> Result<Option<u64>, PollError> {
        let count = match read_count(&*self.chain, &self.address, GET_POLL_COUNT).await? {
            Some(count) if count > before => count,
            _ => return Ok(None),
        };
        // newest first: ours is most likely the last one
        for id in (before + 1..=count).rev() {
            if self.read_options(id).await? == options {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl PollGateway for SimpleGateway {
    fn contract_type(&self) -> ContractType {
        ContractType::Simple
    }

    async fn init(&self, signer: Arc<dyn WalletSigner>) -> Result<(), PollError> {
        if !signer.connected() {
            tracing::debug!("signer bound before the wallet connected");
        }
        self.signer.set(Some(signer));
        Ok(())
    }

    fn teardown(&self) {
        self.signer.set(None);
    }

    async fn create_poll(
        &self,
        request: &CreatePollRequest,
    ) -> Result<CreatePollOutcome, PollError> {
        let options = validate_options(request.options())?;
        let payload = encode_create_poll(request.subject(), &options)?;
        let signer = self.signer.get()?;

        let before = self.poll_count().await?.unwrap_or(0);
        let tx_ref = submit(&*signer, &self.address, self.testnet, CREATE_POLL_AMOUNT, &payload).await?;

        let found = self
            .confirm
            .wait_for(|| self.find_created(before, &options))
            .await;
        match found {
            Ok(poll_id) => {
                tracing::info!(poll_id, %tx_ref, "poll created");
                Ok(CreatePollOutcome::Created { poll_id, tx_ref })
            }
            Err(reason) => Err(PollError::Confirmation { tx_ref, reason }),
        }
    }

    async fn vote(&self, request: &VoteRequest) -> Result<VoteReceipt, PollError> {
        let payload = encode_vote(request.poll_id, request.option_index)?;
        let signer = self.signer.get()?;
        let tx_ref = submit(&*signer, &self.address, self.testnet, VOTE_AMOUNT, &payload).await?;
        Ok(VoteReceipt {
            tx_ref,
            gasless: false,
        })
    }

    async fn get_poll(&self, poll_id: u64) -> Result<PollRecord, PollError> {
        let options = self.read_options(poll_id).await?;
        if options.is_empty() {
            return Err(PollError::NotFound(poll_id));
        }
        let mut record =
            match read_fields(&*self.chain, &self.address, GET_POLL, &[int_arg(poll_id)]).await {
                Ok(fields) => decode_poll_tuple(&fields, poll_id),
                Err(e) => {
                    tracing::debug!(poll_id, error = %e, "poll details unavailable");
                    PollRecord::placeholder(poll_id, ContractType::Simple)
                }
            };
        record.id = poll_id;
        record.options = options;
        Ok(record)
    }

    async fn poll_count(&self) -> Result<Option<u64>, PollError> {
        ensure_active(&*self.chain, &self.address).await?;
        read_count(&*self.chain, &self.address, GET_POLL_COUNT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SimpleCreateRequest, NO_SUBJECT};
    use crate::testing::{MockChain, MockWallet, StackDialect};
    use crate::wallet::WalletError;

    fn opts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn create(subject: &str, options: &[&str]) -> CreatePollRequest {
        CreatePollRequest::Simple(SimpleCreateRequest {
            subject: subject.to_string(),
            options: opts(options),
            created_by: None,
            reward_per_vote: None,
            jetton_reward_wallet: None,
            jetton_reward_per_vote: None,
        })
    }

    async fn setup(chain: Arc<MockChain>) -> (SimpleGateway, Arc<MockWallet>) {
        let gateway = SimpleGateway::new(chain.simple_address(), chain.clone())
            .with_confirm_policy(ConfirmPolicy::immediate(3));
        let wallet = Arc::new(MockWallet::connected(chain));
        gateway.init(wallet.clone()).await.unwrap();
        (gateway, wallet)
    }

    #[tokio::test]
    async fn created_poll_reads_back() {
        let chain = Arc::new(MockChain::new());
        chain.seed_simple_poll("Older", &["a", "b"], None);
        let (gateway, _) = setup(chain.clone()).await;
        let before = gateway.poll_count().await.unwrap().unwrap();

        let outcome = gateway
            .create_poll(&create("Best color?", &["Red", "Blue"]))
            .await
            .unwrap();
        assert!(outcome.is_complete());
        assert!(outcome.poll_id() >= before);

        let poll = gateway.get_poll(outcome.poll_id()).await.unwrap();
        assert_eq!(poll.options, opts(&["Red", "Blue"]));
        assert_eq!(poll.subject, "Best color?");
        assert_eq!(poll.creator, Some(MockWallet::default_address()));
    }

    #[tokio::test]
    async fn invalid_options_touch_nothing() {
        let chain = Arc::new(MockChain::new());
        let (gateway, wallet) = setup(chain.clone()).await;
        for options in [&[][..], &["only"][..], &["a", " "][..]] {
            assert!(matches!(
                gateway.create_poll(&create("s", options)).await,
                Err(PollError::Validation(_))
            ));
        }
        let eleven: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let eleven: Vec<&str> = eleven.iter().map(String::as_str).collect();
        assert!(matches!(
            gateway.create_poll(&create("s", &eleven)).await,
            Err(PollError::Validation(_))
        ));
        assert!(chain.calls().is_empty());
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn rejected_signature_is_a_submission_error() {
        let chain = Arc::new(MockChain::new());
        let (gateway, wallet) = setup(chain.clone()).await;
        wallet.fail_transaction(0);
        let err = gateway
            .create_poll(&create("Best color?", &["Red", "Blue"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Submission(WalletError::Rejected(_))));
        assert_eq!(chain.simple_poll_count(), 0);
    }

    #[tokio::test]
    async fn unconfirmed_creation_keeps_the_transaction() {
        let chain = Arc::new(MockChain::new());
        let (gateway, _) = setup(chain.clone()).await;
        chain.freeze();
        let err = gateway
            .create_poll(&create("Best color?", &["Red", "Blue"]))
            .await
            .unwrap_err();
        assert!(err.pending_tx_ref().is_some());
    }

    #[tokio::test]
    async fn missing_options_mean_not_found() {
        let chain = Arc::new(MockChain::new());
        chain.seed_simple_poll("Empty", &[], None);
        let (gateway, _) = setup(chain).await;
        assert!(matches!(gateway.get_poll(1).await, Err(PollError::NotFound(1))));
        assert!(matches!(gateway.get_poll(9).await, Err(PollError::NotFound(9))));
    }

    #[tokio::test]
    async fn details_failure_degrades_to_placeholders() {
        let chain = Arc::new(MockChain::new());
        chain.seed_simple_poll("Hidden", &["x", "y"], None);
        chain.fail_method("getPoll");
        let (gateway, _) = setup(chain).await;
        let poll = gateway.get_poll(1).await.unwrap();
        assert_eq!(poll.subject, NO_SUBJECT);
        assert_eq!(poll.options, opts(&["x", "y"]));
    }

    #[tokio::test]
    async fn listing_skips_unreadable_polls() {
        for dialect in [StackDialect::TonCenterV2, StackDialect::V3] {
            let chain = Arc::new(MockChain::new().with_dialect(dialect));
            for i in 0..4 {
                chain.seed_simple_poll(&format!("poll {}", i), &["a", "b"], None);
            }
            chain.fail_poll(2);
            let (gateway, _) = setup(chain).await;
            let ids: Vec<u64> = gateway
                .get_active_polls(10)
                .await
                .unwrap()
                .iter()
                .map(|p| p.id)
                .collect();
            assert_eq!(ids, vec![1, 3, 4], "{:?}", dialect);
        }
    }

    #[tokio::test]
    async fn listing_is_capped_by_limit() {
        let chain = Arc::new(MockChain::new());
        for i in 0..5 {
            chain.seed_simple_poll(&format!("poll {}", i), &["a", "b"], None);
        }
        let (gateway, _) = setup(chain).await;
        assert_eq!(gateway.get_active_polls(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_contract_lists_without_per_poll_reads() {
        let chain = Arc::new(MockChain::new());
        let (gateway, _) = setup(chain.clone()).await;
        assert!(gateway.get_active_polls(10).await.unwrap().is_empty());
        assert_eq!(chain.calls(), vec!["getPollCount".to_string()]);
    }

    #[tokio::test]
    async fn missing_count_getter_scans_the_fallback_range() {
        let chain = Arc::new(MockChain::new());
        chain.seed_simple_poll("only", &["a", "b"], None);
        chain.fail_method("getPollCount");
        let (gateway, _) = setup(chain.clone()).await;
        let polls = gateway.get_active_polls(100).await.unwrap();
        assert_eq!(polls.len(), 1);
        let probes = chain
            .calls()
            .iter()
            .filter(|c| c.as_str() == "getPollOptions")
            .count();
        assert_eq!(probes as u64, crate::gateway::FALLBACK_POLL_COUNT);
    }

    #[tokio::test]
    async fn vote_is_fire_and_forget() {
        let chain = Arc::new(MockChain::new());
        chain.seed_simple_poll("Best color?", &["Red", "Blue"], None);
        let (gateway, wallet) = setup(chain.clone()).await;
        let receipt = gateway.vote(&VoteRequest::new(1, 1)).await.unwrap();
        assert!(!receipt.gasless);
        assert_eq!(wallet.sent().len(), 1);
        assert_eq!(chain.simple_votes(1), vec![0, 1]);
        assert!(matches!(
            gateway.vote(&VoteRequest::new(0, 0)).await,
            Err(PollError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn teardown_releases_the_signer() {
        let chain = Arc::new(MockChain::new());
        let (gateway, _) = setup(chain).await;
        gateway.teardown();
        assert!(matches!(
            gateway.vote(&VoteRequest::new(1, 0)).await,
            Err(PollError::Submission(WalletError::NotConnected))
        ));
    }
}
