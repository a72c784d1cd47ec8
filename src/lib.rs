//! Atomic Settlement Queue Library
//!
//! This crate provides an embeddable request/solve settlement queue.
//! Requesters register standing, limit-priced requests to exchange a fixed
//! amount of one fungible asset for another; a permissioned solver settles
//! batches of them atomically, sourcing the want asset from its own balance
//! or by redeeming the pulled offer through a vault route.
//!
//! The queue is a library, not a service: the host supplies the asset ledger,
//! price feed, authorization, and clock, and calls [`AtomicQueue`] from its
//! own execution context. A batch either settles every committed request in
//! full or leaves the ledger and the request store exactly as they were.

pub mod admin;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod ledger;
pub mod math;
pub mod oracle;
pub mod queue;
pub mod solve;
pub mod store;
pub mod strategy;

// Re-export the embedding surface
pub use admin::{Action, Authorizer, PendingRescue, StaticAuthorizer};
pub use config::{OracleConfig, QueueConfig, RequestConfig, RescueConfig};
pub use context::{Address, AssetId, CallContext};
pub use error::QueueError;
pub use events::{EventSink, QueueEvent};
pub use ledger::{InMemoryLedger, TokenLedger};
pub use oracle::{PriceFeed, PriceQuote, RateOracle, StaticPriceFeed, RATE_DECIMALS};
pub use queue::AtomicQueue;
pub use solve::{RequestOutcome, RequesterOutcome, SolveMode, SolveReport};
pub use store::{AtomicRequest, RequestKey, RequestStore};
pub use strategy::{
    InMemoryVault, InMemoryWrapper, LiquidWrapper, RedemptionVault, SettlementEngine,
    SettlementStrategy,
};
