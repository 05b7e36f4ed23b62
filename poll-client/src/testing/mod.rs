//! In-memory chain and wallet for exercising the gateways without a node.

mod chain;
mod wallet;

pub use self::chain::{MockChain, StackDialect, EXIT_METHOD_NOT_FOUND};
pub use self::wallet::MockWallet;
