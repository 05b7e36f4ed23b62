//! Access to a deployed poll contract.
//!
//! `PollGateway` is implemented once per contract variant. Consumers hold an
//! `Arc<dyn PollGateway>` obtained from the selector and never branch on the
//! variant themselves.

mod complex;
mod simple;

pub use self::complex::ComplexGateway;
pub use self::simple::SimpleGateway;

use crate::chain::{run_checked, ChainError, ChainReader, StackArg};
use crate::error::PollError;
use crate::model::{
    ContractType, CreatePollOutcome, FeatureFlags, PollRecord, VoteReceipt, VoteRequest,
    CreatePollRequest,
};
use crate::stack::{struct_fields, StackEntry};
use crate::wallet::{OutboundMessage, TransactionRequest, WalletError, WalletSigner};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use ton_ser::{Address, FriendlyFlags};

/// Ids scanned when the contract has no count getter.
pub const FALLBACK_POLL_COUNT: u64 = 20;

/// Poll reads in flight during a listing.
const CONCURRENT_READS: usize = 4;

/// How long a signed transaction stays valid.
const VALID_FOR_SECS: u64 = 300;

#[async_trait]
pub trait PollGateway: Send + Sync {
    fn contract_type(&self) -> ContractType;

    fn features(&self) -> FeatureFlags {
        FeatureFlags::for_contract(self.contract_type())
    }

    /// Bind the signer. The signer does not need to be connected yet; read
    /// operations work without it.
    async fn init(&self, signer: Arc<dyn WalletSigner>) -> Result<(), PollError>;

    /// Release the signer and any discovered state.
    fn teardown(&self);

    async fn create_poll(&self, request: &CreatePollRequest)
        -> Result<CreatePollOutcome, PollError>;

    /// Submit a vote. Returns as soon as the transaction is sent.
    async fn vote(&self, request: &VoteRequest) -> Result<VoteReceipt, PollError>;

    /// `PollError::NotFound` when the poll has no options.
    async fn get_poll(&self, poll_id: u64) -> Result<PollRecord, PollError>;

    /// Number of polls, `None` when the contract has no count getter.
    async fn poll_count(&self) -> Result<Option<u64>, PollError>;

    /// Polls `1..=min(count, limit)`. Unreadable and missing ids are
    /// skipped, they never fail the listing.
    async fn get_active_polls(&self, limit: usize) -> Result<Vec<PollRecord>, PollError> {
        let count = match self.poll_count().await? {
            Some(count) => count,
            None => {
                tracing::debug!(
                    fallback = FALLBACK_POLL_COUNT,
                    "no poll count getter, scanning a fixed range"
                );
                FALLBACK_POLL_COUNT
            }
        };
        let last = count.min(limit as u64);
        let results: Vec<(u64, Result<PollRecord, PollError>)> = stream::iter(1..=last)
            .map(|id| async move { (id, self.get_poll(id).await) })
            .buffered(CONCURRENT_READS)
            .collect()
            .await;

        let mut polls = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(record) => polls.push(record),
                Err(PollError::NotFound(_)) => tracing::debug!(poll_id = id, "no such poll"),
                Err(e) => tracing::warn!(poll_id = id, error = %e, "skipping unreadable poll"),
            }
        }
        Ok(polls)
    }
}

/// The signer bound by `init`.
#[derive(Default)]
pub(crate) struct SignerSlot(RwLock<Option<Arc<dyn WalletSigner>>>);

impl SignerSlot {
    pub(crate) fn set(&self, signer: Option<Arc<dyn WalletSigner>>) {
        match self.0.write() {
            Ok(mut slot) => *slot = signer,
            Err(poisoned) => *poisoned.into_inner() = signer,
        }
    }

    pub(crate) fn get(&self) -> Result<Arc<dyn WalletSigner>, PollError> {
        let slot = match self.0.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        slot.ok_or(PollError::Submission(WalletError::NotConnected))
    }

    /// Address of the connected account, if any.
    pub(crate) fn account_address(&self) -> Option<Address> {
        self.get()
            .ok()
            .and_then(|signer| signer.account())
            .map(|account| account.address)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Send one message with a bag-of-cells body. Returns the transaction reference.
pub(crate) async fn submit(
    signer: &dyn WalletSigner,
    destination: &Address,
    testnet: bool,
    amount: u128,
    payload: &[u8],
) -> Result<String, PollError> {
    if !signer.connected() {
        return Err(PollError::Submission(WalletError::NotConnected));
    }
    let request = TransactionRequest {
        valid_until: now_secs() + VALID_FOR_SECS,
        messages: vec![OutboundMessage {
            address: destination.to_friendly(FriendlyFlags {
                bounceable: true,
                testnet,
            }),
            amount,
            payload: Some(crate::codec::payload_base64(payload)),
        }],
    };
    let sent = signer.send_transaction(request).await?;
    let tx_ref = sent.tx_ref();
    tracing::info!(%destination, %tx_ref, "transaction sent");
    Ok(tx_ref)
}

/// Run a getter and classify its result. A single tuple result is
/// flattened into its fields.
pub(crate) async fn read_fields(
    chain: &dyn ChainReader,
    address: &Address,
    method: &str,
    args: &[StackArg],
) -> Result<Vec<StackEntry>, PollError> {
    let stack = run_checked(chain, address, method, args).await?;
    Ok(struct_fields(StackEntry::classify_all(&stack)))
}

/// First integer of a getter result.
pub(crate) async fn read_int(
    chain: &dyn ChainReader,
    address: &Address,
    method: &str,
    args: &[StackArg],
) -> Result<i128, PollError> {
    let fields = read_fields(chain, address, method, args).await?;
    let first = fields
        .first()
        .ok_or_else(|| ChainError::Malformed(format!("{} returned an empty stack", method)))?;
    Ok(first.to_int()?)
}

/// `getPollCount`-like getter. A failing exit code means the getter is
/// missing.
pub(crate) async fn read_count(
    chain: &dyn ChainReader,
    address: &Address,
    method: &str,
) -> Result<Option<u64>, PollError> {
    match read_int(chain, address, method, &[]).await {
        Ok(count) => Ok(Some(u64::try_from(count).unwrap_or(0))),
        Err(PollError::Chain(ChainError::ExitCode { exit_code, .. })) => {
            tracing::debug!(method, exit_code, "count getter unavailable");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Fail with `NotDeployed` unless the account is active.
pub(crate) async fn ensure_active(chain: &dyn ChainReader, address: &Address) -> Result<(), PollError> {
    let state = chain.contract_state(address).await?;
    if state.is_active() {
        Ok(())
    } else {
        Err(ChainError::NotDeployed(address.to_string()).into())
    }
}

pub(crate) fn int_arg(v: u64) -> StackArg {
    StackArg::Int(v as i128)
}
