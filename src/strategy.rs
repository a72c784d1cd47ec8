//! Settlement strategies.
//!
//! A solve call carries an opaque byte payload naming the strategy the
//! solver wants and its parameters. The payload is borsh-encoded and decoded
//! into [`SettlementStrategy`]; the [`SettlementEngine`] executes the chosen
//! variant and fails the whole batch if the strategy cannot source the want
//! total it was asked for.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::context::{Address, AssetId, CallContext};
use crate::error::QueueError;
use crate::ledger::{InMemoryLedger, TokenLedger};
use crate::math;
use crate::oracle::RateOracle;

// ============================================================================
// WIRE FORMAT
// ============================================================================

/// How a solve sources the want asset.
///
/// Serialized with borsh as the solve call's strategy payload. Unknown tags
/// and trailing bytes fail decoding, so hosts can extend the set only by
/// upgrading the queue itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum SettlementStrategy {
    /// Pay requesters from the solver's own want balance.
    P2p {
        /// Abort if the batch demands more want than this
        max_want_out: Option<u128>,
    },
    /// Redeem the pulled offer shares through the registered vault.
    Redeem {
        /// Floor for the redeemed amount; defaults to the oracle quote
        min_assets_out: Option<u128>,
    },
    /// Redeem, then unwrap the redeemed wrapped asset into the want asset.
    RedeemLiquid {
        /// Floor for the unwrapped amount; defaults to the oracle quote
        min_assets_out: Option<u128>,
    },
}

impl SettlementStrategy {
    pub fn encode(&self) -> Result<Vec<u8>, QueueError> {
        self.try_to_vec()
            .map_err(|_| QueueError::InvalidStrategyData)
    }

    pub fn decode(data: &[u8]) -> Result<Self, QueueError> {
        Self::try_from_slice(data).map_err(|_| QueueError::InvalidStrategyData)
    }
}

// ============================================================================
// SETTLEMENT BACKENDS
// ============================================================================

/// A vault that redeems its share asset for an underlying asset.
#[async_trait]
pub trait RedemptionVault: Send + Sync {
    /// The share asset this vault redeems.
    fn share_asset(&self) -> AssetId;

    /// The asset redemption pays out.
    fn underlying_asset(&self) -> AssetId;

    /// Burns `shares` from `owner` and credits the underlying to
    /// `recipient`. Returns the underlying amount credited.
    async fn redeem(&self, shares: u128, owner: &Address, recipient: &Address) -> Result<u128, QueueError>;
}

/// Unwraps a wrapped (staked) asset into its liquid underlying form.
#[async_trait]
pub trait LiquidWrapper: Send + Sync {
    /// The wrapped asset this wrapper accepts.
    fn wrapped_asset(&self) -> AssetId;

    /// The liquid asset unwrapping pays out.
    fn underlying_asset(&self) -> AssetId;

    /// Burns `amount` of the wrapped asset from `owner` and credits the
    /// converted underlying back to `owner`. Returns the amount credited.
    async fn unwrap(&self, amount: u128, owner: &Address) -> Result<u128, QueueError>;
}

/// Reference vault over the in-memory ledger.
///
/// Redeems at a configurable rate of underlying base units per whole share
/// unit, flooring. Tests move the rate to simulate vaults that pay out more
/// or less than the oracle expects.
pub struct InMemoryVault {
    ledger: Arc<InMemoryLedger>,
    share: AssetId,
    underlying: AssetId,
    share_decimals: u8,
    rate: RwLock<u128>,
}

impl InMemoryVault {
    pub fn new(
        ledger: Arc<InMemoryLedger>,
        share: AssetId,
        underlying: AssetId,
        share_decimals: u8,
        rate: u128,
    ) -> Self {
        Self {
            ledger,
            share,
            underlying,
            share_decimals,
            rate: RwLock::new(rate),
        }
    }

    pub async fn set_rate(&self, rate: u128) {
        *self.rate.write().await = rate;
    }
}

#[async_trait]
impl RedemptionVault for InMemoryVault {
    fn share_asset(&self) -> AssetId {
        self.share.clone()
    }

    fn underlying_asset(&self) -> AssetId {
        self.underlying.clone()
    }

    async fn redeem(&self, shares: u128, owner: &Address, recipient: &Address) -> Result<u128, QueueError> {
        let rate = *self.rate.read().await;
        let out = math::mul_div(shares, rate, math::pow10(self.share_decimals)?)?;
        self.ledger.burn(&self.share, owner, shares).await?;
        self.ledger.mint(&self.underlying, recipient, out).await?;
        debug!("Vault redeemed {} {} into {} {}", shares, self.share, out, self.underlying);
        Ok(out)
    }
}

/// Reference wrapper over the in-memory ledger, converting at a configurable
/// rate of underlying base units per whole wrapped unit.
pub struct InMemoryWrapper {
    ledger: Arc<InMemoryLedger>,
    wrapped: AssetId,
    underlying: AssetId,
    wrapped_decimals: u8,
    rate: RwLock<u128>,
}

impl InMemoryWrapper {
    pub fn new(
        ledger: Arc<InMemoryLedger>,
        wrapped: AssetId,
        underlying: AssetId,
        wrapped_decimals: u8,
        rate: u128,
    ) -> Self {
        Self {
            ledger,
            wrapped,
            underlying,
            wrapped_decimals,
            rate: RwLock::new(rate),
        }
    }

    pub async fn set_rate(&self, rate: u128) {
        *self.rate.write().await = rate;
    }
}

#[async_trait]
impl LiquidWrapper for InMemoryWrapper {
    fn wrapped_asset(&self) -> AssetId {
        self.wrapped.clone()
    }

    fn underlying_asset(&self) -> AssetId {
        self.underlying.clone()
    }

    async fn unwrap(&self, amount: u128, owner: &Address) -> Result<u128, QueueError> {
        let rate = *self.rate.read().await;
        let out = math::mul_div(amount, rate, math::pow10(self.wrapped_decimals)?)?;
        self.ledger.burn(&self.wrapped, owner, amount).await?;
        self.ledger.mint(&self.underlying, owner, out).await?;
        debug!("Unwrapped {} {} into {} {}", amount, self.wrapped, out, self.underlying);
        Ok(out)
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Executes the strategy phase of a solve.
///
/// Vaults are registered under their share asset and wrappers under their
/// wrapped asset; a strategy that needs a backend no route is registered for
/// fails with `UnsupportedAsset`.
pub struct SettlementEngine {
    ledger: Arc<dyn TokenLedger>,
    oracle: Arc<RateOracle>,
    queue_address: Address,
    vaults: RwLock<HashMap<AssetId, Arc<dyn RedemptionVault>>>,
    wrappers: RwLock<HashMap<AssetId, Arc<dyn LiquidWrapper>>>,
}

impl SettlementEngine {
    pub fn new(ledger: Arc<dyn TokenLedger>, oracle: Arc<RateOracle>, queue_address: Address) -> Self {
        Self {
            ledger,
            oracle,
            queue_address,
            vaults: RwLock::new(HashMap::new()),
            wrappers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_vault(&self, vault: Arc<dyn RedemptionVault>) {
        self.vaults.write().await.insert(vault.share_asset(), vault);
    }

    pub async fn register_wrapper(&self, wrapper: Arc<dyn LiquidWrapper>) {
        self.wrappers
            .write()
            .await
            .insert(wrapper.wrapped_asset(), wrapper);
    }

    /// Runs the decoded strategy for a committed batch.
    ///
    /// On return the solver either holds (and has approved) enough of the
    /// want asset to pay every commitment, or the batch must abort. The
    /// redeem variants move assets through the ledger, so the caller runs
    /// this inside the batch's ledger transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish_solve(
        &self,
        ctx: &CallContext,
        strategy_data: &[u8],
        solver: &Address,
        offer: &AssetId,
        want: &AssetId,
        total_offer: u128,
        total_want: u128,
    ) -> Result<(), QueueError> {
        let strategy = SettlementStrategy::decode(strategy_data)?;
        debug!(
            "Running settlement strategy {:?} for {} -> {} (total_offer={}, total_want={})",
            strategy, offer, want, total_offer, total_want
        );

        match strategy {
            SettlementStrategy::P2p { max_want_out } => {
                if let Some(cap) = max_want_out {
                    if total_want > cap {
                        warn!("Batch demands {} want, solver capped at {}", total_want, cap);
                        return Err(QueueError::SlippageNotMet);
                    }
                }
                let balance = self.ledger.balance_of(want, solver).await;
                let allowance = self.ledger.allowance(want, solver, &self.queue_address).await;
                if balance < total_want || allowance < total_want {
                    return Err(QueueError::InsufficientSolverBalance);
                }
                Ok(())
            }
            SettlementStrategy::Redeem { min_assets_out } => {
                let vault = self.vault_for(offer).await?;
                if vault.underlying_asset() != *want {
                    return Err(QueueError::UnsupportedAsset);
                }
                let floor = self
                    .resolve_floor(min_assets_out, offer, want, total_offer, ctx.now)
                    .await?;

                let redeemed = vault.redeem(total_offer, solver, solver).await?;
                if redeemed == 0 || redeemed < floor || redeemed < total_want {
                    warn!(
                        "Redemption under-delivered: redeemed={}, floor={}, total_want={}",
                        redeemed, floor, total_want
                    );
                    return Err(QueueError::SlippageNotMet);
                }
                Ok(())
            }
            SettlementStrategy::RedeemLiquid { min_assets_out } => {
                let vault = self.vault_for(offer).await?;
                let wrapper = self.wrapper_for(&vault.underlying_asset()).await?;
                if wrapper.underlying_asset() != *want {
                    return Err(QueueError::UnsupportedAsset);
                }
                let floor = self
                    .resolve_floor(min_assets_out, offer, want, total_offer, ctx.now)
                    .await?;

                let redeemed = vault.redeem(total_offer, solver, solver).await?;
                if redeemed == 0 {
                    return Err(QueueError::SlippageNotMet);
                }
                let out = wrapper.unwrap(redeemed, solver).await?;
                // Two flooring conversions run back to back here, so the
                // result may sit one base unit under the single-conversion
                // floor. Anything further below is a real shortfall.
                if out.saturating_add(1) < floor {
                    warn!(
                        "Liquid redemption under-delivered: out={}, floor={}",
                        out, floor
                    );
                    return Err(QueueError::SlippageNotMet);
                }
                Ok(())
            }
        }
    }

    async fn vault_for(&self, share: &AssetId) -> Result<Arc<dyn RedemptionVault>, QueueError> {
        self.vaults
            .read()
            .await
            .get(share)
            .cloned()
            .ok_or(QueueError::UnsupportedAsset)
    }

    async fn wrapper_for(&self, wrapped: &AssetId) -> Result<Arc<dyn LiquidWrapper>, QueueError> {
        self.wrappers
            .read()
            .await
            .get(wrapped)
            .cloned()
            .ok_or(QueueError::UnsupportedAsset)
    }

    /// The minimum a redeem strategy must deliver: the solver's explicit
    /// floor if given, otherwise the oracle's value of the pulled offer.
    async fn resolve_floor(
        &self,
        explicit: Option<u128>,
        offer: &AssetId,
        want: &AssetId,
        total_offer: u128,
        now: u64,
    ) -> Result<u128, QueueError> {
        match explicit {
            Some(floor) => Ok(floor),
            None => {
                let offer_decimals = self.ledger.decimals(offer).await?;
                let want_decimals = self.ledger.decimals(want).await?;
                let pair_rate = self.oracle.pair_rate(offer, want, want_decimals, now).await?;
                math::apply_price(total_offer, pair_rate, offer_decimals)
            }
        }
    }
}
