use super::chain::MockChain;
use crate::wallet::{
    Account, SentTransaction, StatusCallback, TransactionRequest, Unsubscribe, WalletError,
    WalletSigner,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use ton_ser::{serialize_boc_base64, Address, CellBuilder};

type Listeners = Arc<Mutex<BTreeMap<u64, StatusCallback>>>;

#[derive(Default)]
struct WalletState {
    account: Option<Account>,
    attempts: usize,
    failing: HashSet<usize>,
    sent: Vec<TransactionRequest>,
    next_listener: u64,
}

/// Wallet that signs everything it is asked to and delivers the messages
/// to a `MockChain`.
pub struct MockWallet {
    chain: Arc<MockChain>,
    state: Mutex<WalletState>,
    listeners: Listeners,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockWallet {
    pub fn new(chain: Arc<MockChain>) -> Self {
        MockWallet {
            chain,
            state: Mutex::new(WalletState::default()),
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// A wallet already connected with `default_address`.
    pub fn connected(chain: Arc<MockChain>) -> Self {
        let wallet = Self::new(chain);
        lock(&wallet.state).account = Some(Account {
            address: Self::default_address(),
        });
        wallet
    }

    pub fn default_address() -> Address {
        Address::new(0, [0xaa; 32])
    }

    pub fn connect(&self, address: Address) {
        let account = Some(Account { address });
        lock(&self.state).account = account.clone();
        self.notify(account);
    }

    pub fn disconnect(&self) {
        lock(&self.state).account = None;
        self.notify(None);
    }

    fn notify(&self, account: Option<Account>) {
        for callback in lock(&self.listeners).values() {
            callback(account.clone());
        }
    }

    /// Reject the `index`-th call to `send_transaction`, counting from zero.
    pub fn fail_transaction(&self, index: usize) {
        lock(&self.state).failing.insert(index);
    }

    /// Requests that were signed and sent.
    pub fn sent(&self) -> Vec<TransactionRequest> {
        lock(&self.state).sent.clone()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn account(&self) -> Option<Account> {
        lock(&self.state).account.clone()
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<SentTransaction, WalletError> {
        let (sender, attempt) = {
            let mut state = lock(&self.state);
            let attempt = state.attempts;
            state.attempts += 1;
            let sender = state
                .account
                .as_ref()
                .map(|a| a.address)
                .ok_or(WalletError::NotConnected)?;
            if state.failing.contains(&attempt) {
                return Err(WalletError::Rejected("user declined".to_string()));
            }
            state.sent.push(request.clone());
            (sender, attempt)
        };

        for message in &request.messages {
            let destination: Address = message
                .address
                .parse()
                .map_err(|e: ton_ser::AddressError| WalletError::Failed(e.to_string()))?;
            let body = match &message.payload {
                Some(payload) => {
                    base64::decode(payload).map_err(|e| WalletError::Failed(e.to_string()))?
                }
                None => continue,
            };
            if let Err(reason) = self.chain.apply(&sender, &destination, &body) {
                tracing::debug!(%destination, %reason, "message bounced");
            }
        }

        let mut b = CellBuilder::new();
        b.store_uint(attempt as u128, 64)
            .and_then(|b| b.store_address(Some(&sender)))
            .map_err(|e| WalletError::Failed(e.to_string()))?;
        let cell = b.build().map_err(|e| WalletError::Failed(e.to_string()))?;
        Ok(SentTransaction {
            boc: serialize_boc_base64(&cell),
        })
    }

    fn on_status_change(&self, callback: StatusCallback) -> Unsubscribe {
        let id = {
            let mut state = lock(&self.state);
            state.next_listener += 1;
            state.next_listener
        };
        lock(&self.listeners).insert(id, callback);
        let listeners = self.listeners.clone();
        Unsubscribe::new(move || {
            lock(&listeners).remove(&id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::OutboundMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ton_ser::FriendlyFlags;

    fn request(chain: &MockChain, payload: Vec<u8>) -> TransactionRequest {
        TransactionRequest {
            valid_until: 0,
            messages: vec![OutboundMessage {
                address: chain.simple_address().to_friendly(FriendlyFlags {
                    bounceable: true,
                    testnet: false,
                }),
                amount: 1,
                payload: Some(base64::encode(payload)),
            }],
        }
    }

    #[tokio::test]
    async fn messages_reach_the_chain() {
        let chain = Arc::new(MockChain::new());
        let wallet = MockWallet::connected(chain.clone());
        let body = crate::codec::encode_create_poll("Best color?", &["Red".into(), "Blue".into()]).unwrap();
        let first = wallet.send_transaction(request(&chain, body.clone())).await.unwrap();
        let second = wallet.send_transaction(request(&chain, body)).await.unwrap();
        assert_ne!(first.tx_ref(), second.tx_ref());
        assert_eq!(chain.simple_poll_count(), 2);
        assert_eq!(wallet.sent().len(), 2);
    }

    #[tokio::test]
    async fn disconnected_wallet_cannot_send() {
        let chain = Arc::new(MockChain::new());
        let wallet = MockWallet::new(chain.clone());
        assert!(!wallet.connected());
        assert_eq!(
            wallet.send_transaction(request(&chain, Vec::new())).await,
            Err(WalletError::NotConnected)
        );
    }

    #[test]
    fn status_listeners_follow_the_connection() {
        let wallet = MockWallet::new(Arc::new(MockChain::new()));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handle = wallet.on_status_change(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        wallet.connect(MockWallet::default_address());
        wallet.disconnect();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        handle.unsubscribe();
        assert_eq!(wallet.listener_count(), 0);
        wallet.connect(MockWallet::default_address());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
