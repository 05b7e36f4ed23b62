//! Errors surfaced by the poll gateways and their collaborators.
use crate::chain::ChainError;
use crate::wallet::WalletError;
use thiserror::Error;
use ton_ser::{ReadError, WriteError};

#[derive(Debug, Error)]
pub enum PollError {
    /// Malformed input caught before any network call
    #[error("invalid input: {0}")]
    Validation(String),

    /// The poll id has no options on chain
    #[error("poll {0} not found")]
    NotFound(u64),

    /// The wallet rejected or failed to send the transaction
    #[error("transaction was not sent: {0}")]
    Submission(#[from] WalletError),

    /// The transaction was sent but its effect could not be observed. It
    /// may still land on chain.
    #[error("transaction {tx_ref} was sent but is not confirmed: {reason}")]
    Confirmation { tx_ref: String, reason: String },

    /// The relayer answered but refused the vote
    #[error("relayer rejected the vote: {0}")]
    Relay(String),

    /// An HTTP collaborator could not be reached
    #[error("network failure: {0}")]
    Network(String),

    /// The complex contract has no usable manager set
    #[error("manager contracts are not available: {0}")]
    ManagersUnavailable(String),

    #[error("chain read failed: {0}")]
    Chain(#[from] ChainError),

    /// The metadata backend answered with an error
    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("message encoding failed: {0}")]
    Encode(#[from] WriteError),

    #[error("message decoding failed: {0}")]
    Decode(#[from] ReadError),
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        PollError::Network(e.to_string())
    }
}

impl PollError {
    /// A transaction reference is attached when the chain may already hold the change.
    pub fn pending_tx_ref(&self) -> Option<&str> {
        match self {
            PollError::Confirmation { tx_ref, .. } => Some(tx_ref),
            _ => None,
        }
    }
}
