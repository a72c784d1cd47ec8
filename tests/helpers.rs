//! Shared test harness for queue integration tests.
//!
//! Builds a self-contained world: an in-memory ledger with a handful of
//! registered assets, a static price feed quoting all of them at par, a
//! static authorizer with a solver and an admin, and a queue wired over the
//! lot. Tests mutate the world through the same surface a host would.

#![allow(dead_code)]

use std::sync::Arc;

use atomic_queue::{
    Action, Address, AssetId, AtomicQueue, AtomicRequest, CallContext, InMemoryLedger,
    InMemoryVault, InMemoryWrapper, QueueConfig, QueueError, SettlementStrategy, SolveMode,
    SolveReport, StaticAuthorizer, StaticPriceFeed, TokenLedger,
};

// ============================================================================
// FIXED IDENTITIES AND ASSETS
// ============================================================================

/// The reference instant all tests run at.
pub const NOW: u64 = 1_700_000_000;

/// A deadline comfortably past `NOW`.
pub const LATER: u64 = NOW + 3_600;

/// 6-decimal stable offer asset.
pub const USDC: &str = "usdc";
/// 18-decimal want asset.
pub const DAI: &str = "dai";
/// 6-decimal vault share redeeming into DAI.
pub const VUSD: &str = "vusd";
/// 6-decimal vault share redeeming into the staked asset.
pub const VSTK: &str = "vstk";
/// 18-decimal wrapped staked asset unwrapping into DAI.
pub const STKDAI: &str = "stkdai";

pub const ONE_USDC: u128 = 1_000_000;
pub const ONE_DAI: u128 = 1_000_000_000_000_000_000;

/// 1:1 limit price for a 6-decimal offer against an 18-decimal want:
/// 10^18 want base units per whole offer unit.
pub const PRICE_1_TO_1: u128 = ONE_DAI;

/// Par quote in the oracle's 8-decimal reference base.
pub const PAR_RATE: u128 = 100_000_000;

pub fn addr(name: &str) -> Address {
    Address::from(name)
}

pub fn asset(name: &str) -> AssetId {
    AssetId::from(name)
}

pub fn ctx(caller: &str) -> CallContext {
    CallContext::new(addr(caller), NOW)
}

pub fn ctx_at(caller: &str, now: u64) -> CallContext {
    CallContext::new(addr(caller), now)
}

/// A request offering `whole_usdc` USDC for DAI at 1:1, expiring at `LATER`.
pub fn usdc_request(whole_usdc: u128) -> AtomicRequest {
    AtomicRequest::new(LATER, PRICE_1_TO_1, whole_usdc * ONE_USDC)
}

// ============================================================================
// STRATEGY PAYLOADS
// ============================================================================

pub fn p2p() -> Vec<u8> {
    SettlementStrategy::P2p { max_want_out: None }.encode().unwrap()
}

pub fn p2p_capped(max_want_out: u128) -> Vec<u8> {
    SettlementStrategy::P2p {
        max_want_out: Some(max_want_out),
    }
    .encode()
    .unwrap()
}

pub fn redeem(min_assets_out: Option<u128>) -> Vec<u8> {
    SettlementStrategy::Redeem { min_assets_out }.encode().unwrap()
}

pub fn redeem_liquid(min_assets_out: Option<u128>) -> Vec<u8> {
    SettlementStrategy::RedeemLiquid { min_assets_out }
        .encode()
        .unwrap()
}

// ============================================================================
// TEST WORLD
// ============================================================================

/// Everything a test needs, pre-wired.
///
/// Identities: the queue lives at `queue`, `solver` holds `Action::Solve`,
/// `admin` holds `Action::Pause` and `Action::Rescue`. Requesters are plain
/// unprivileged addresses.
pub struct TestWorld {
    pub ledger: Arc<InMemoryLedger>,
    pub feed: Arc<StaticPriceFeed>,
    pub authorizer: Arc<StaticAuthorizer>,
    pub queue: AtomicQueue,
}

impl TestWorld {
    pub async fn new() -> Self {
        Self::with_config(QueueConfig::default()).await
    }

    pub async fn with_config(config: QueueConfig) -> Self {
        let _ = tracing_subscriber::fmt::try_init();

        let ledger = Arc::new(InMemoryLedger::new());
        ledger.register_asset(asset(USDC), 6).await;
        ledger.register_asset(asset(DAI), 18).await;
        ledger.register_asset(asset(VUSD), 6).await;
        ledger.register_asset(asset(VSTK), 6).await;
        ledger.register_asset(asset(STKDAI), 18).await;

        let feed = Arc::new(StaticPriceFeed::new());
        for name in [USDC, DAI, VUSD, VSTK, STKDAI] {
            feed.set(asset(name), PAR_RATE, NOW).await;
        }

        let authorizer = Arc::new(StaticAuthorizer::new());
        authorizer.grant(addr("solver"), Action::Solve).await;
        authorizer.grant(addr("admin"), Action::Pause).await;
        authorizer.grant(addr("admin"), Action::Rescue).await;

        let queue = AtomicQueue::new(
            addr("queue"),
            config,
            ledger.clone(),
            feed.clone(),
            authorizer.clone(),
        );

        Self {
            ledger,
            feed,
            authorizer,
            queue,
        }
    }

    /// Mints `amount` of `asset_name` to `who` and approves the queue for
    /// unlimited spending on their behalf.
    pub async fn fund(&self, who: &str, asset_name: &str, amount: u128) {
        self.ledger
            .mint(&asset(asset_name), &addr(who), amount)
            .await
            .unwrap();
        self.approve_queue(who, asset_name, u128::MAX).await;
    }

    /// Sets the allowance `who` grants the queue for `asset_name`.
    pub async fn approve_queue(&self, who: &str, asset_name: &str, amount: u128) {
        self.ledger
            .approve(&asset(asset_name), &addr(who), &addr("queue"), amount)
            .await;
    }

    pub async fn balance(&self, who: &str, asset_name: &str) -> u128 {
        self.ledger.balance_of(&asset(asset_name), &addr(who)).await
    }

    /// Stores a USDC -> DAI request for `requester` via the plain update.
    pub async fn submit(&self, requester: &str, request: AtomicRequest) {
        self.queue
            .update_request(&ctx(requester), asset(USDC), asset(DAI), request)
            .await
            .unwrap();
    }

    /// Runs a USDC -> DAI solve as the authorized solver.
    pub async fn solve_usdc_dai(
        &self,
        requesters: &[&str],
        strategy_data: &[u8],
        mode: SolveMode,
    ) -> Result<SolveReport, QueueError> {
        let requesters: Vec<Address> = requesters.iter().map(|name| addr(name)).collect();
        self.queue
            .solve(
                &ctx("solver"),
                &asset(USDC),
                &asset(DAI),
                &requesters,
                &addr("solver"),
                strategy_data,
                mode,
            )
            .await
    }

    /// Registers a DAI-paying vault for the VUSD share at the given rate
    /// (DAI base units per whole VUSD share).
    pub async fn register_dai_vault(&self, rate: u128) -> Arc<InMemoryVault> {
        let vault = Arc::new(InMemoryVault::new(
            self.ledger.clone(),
            asset(VUSD),
            asset(DAI),
            6,
            rate,
        ));
        self.queue.register_vault(vault.clone()).await;
        vault
    }

    /// Registers the VSTK -> STKDAI vault plus the STKDAI -> DAI wrapper
    /// used by the liquid redemption path.
    pub async fn register_liquid_route(
        &self,
        vault_rate: u128,
        wrapper_rate: u128,
    ) -> (Arc<InMemoryVault>, Arc<InMemoryWrapper>) {
        let vault = Arc::new(InMemoryVault::new(
            self.ledger.clone(),
            asset(VSTK),
            asset(STKDAI),
            6,
            vault_rate,
        ));
        self.queue.register_vault(vault.clone()).await;

        let wrapper = Arc::new(InMemoryWrapper::new(
            self.ledger.clone(),
            asset(STKDAI),
            asset(DAI),
            18,
            wrapper_rate,
        ));
        self.queue.register_wrapper(wrapper.clone()).await;

        (vault, wrapper)
    }
}
