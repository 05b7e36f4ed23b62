//! Client of the TON poll contracts.
//!
//! Encodes poll messages, submits them through a wallet, reads polls back
//! from get methods and normalizes both contract variants into one shape.

pub mod chain;
pub mod codec;
pub mod config;
pub mod confirm;
pub mod error;
pub mod gasless;
pub mod gateway;
pub mod metadata;
pub mod model;
pub mod selector;
pub mod service;
pub mod stack;
pub mod store;
pub mod transform;
pub mod wallet;

#[cfg(any(test, feature = "test-api"))]
pub mod testing;

pub use crate::{
    config::ClientConfig,
    error::PollError,
    gateway::PollGateway,
    model::{ContractType, FeatureFlags, Poll, PollForm, VoteOptions},
    selector::ContractSelector,
    service::PollService,
};
