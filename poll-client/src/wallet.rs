//! Wallet signing capability.
//!
//! Every contract-submitting operation goes through
//! `WalletSigner::send_transaction`; message payloads are base64 encoded
//! bags of cells produced by `codec`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use ton_ser::{deserialize_boc_base64, Address};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("no wallet is connected")]
    NotConnected,
    /// The user declined to sign
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction could not be sent: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// destination, user-friendly form
    pub address: String,
    /// nanotons, sent as a decimal string
    #[serde(with = "amount_string")]
    pub amount: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// unix seconds
    pub valid_until: u64,
    pub messages: Vec<OutboundMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentTransaction {
    /// base64 bag of cells of the external message
    pub boc: String,
}

impl SentTransaction {
    /// Hex hash of the signed message, or the raw bag of cells when the
    /// wallet returned something we cannot parse.
    pub fn tx_ref(&self) -> String {
        match deserialize_boc_base64(&self.boc) {
            Ok(cell) => hex::encode(cell.hash()),
            Err(_) => self.boc.clone(),
        }
    }
}

pub type StatusCallback = Box<dyn Fn(Option<Account>) + Send + Sync>;

/// Handle returned by `on_status_change`; calling `unsubscribe` removes
/// the callback.
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Unsubscribe(Some(Box::new(f)))
    }

    pub fn noop() -> Self {
        Unsubscribe(None)
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.0.take() {
            f()
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unsubscribe").field(&self.0.is_some()).finish()
    }
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn account(&self) -> Option<Account>;

    fn connected(&self) -> bool {
        self.account().is_some()
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<SentTransaction, WalletError>;

    fn on_status_change(&self, callback: StatusCallback) -> Unsubscribe;
}

mod amount_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use ton_ser::{serialize_boc_base64, Cell};

    #[test]
    fn request_uses_wallet_field_names() {
        let request = TransactionRequest {
            valid_until: 1_700_000_000,
            messages: vec![OutboundMessage {
                address: "EQAAA".to_string(),
                amount: 50_000_000,
                payload: None,
            }],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"validUntil": 1_700_000_000u64, "messages": [{"address": "EQAAA", "amount": "50000000"}]})
        );
    }

    #[test]
    fn tx_ref_is_the_message_hash() {
        let sent = SentTransaction {
            boc: serialize_boc_base64(&Cell::empty()),
        };
        assert_eq!(
            sent.tx_ref(),
            "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7"
        );
        let opaque = SentTransaction {
            boc: "opaque".to_string(),
        };
        assert_eq!(opaque.tx_ref(), "opaque");
    }

    #[test]
    fn unsubscribe_runs_once() {
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        Unsubscribe::new(move || f.store(true, Ordering::SeqCst)).unsubscribe();
        assert!(flag.load(Ordering::SeqCst));
        Unsubscribe::noop().unsubscribe();
    }
}
