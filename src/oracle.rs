//! Price feed abstraction and the guarded rate oracle.
//!
//! Raw quotes from a [`PriceFeed`] are never used directly. [`RateOracle`]
//! wraps the feed and rejects quotes that are stale, outside the configured
//! band, or too far from the previously accepted rate. Consumers only ever
//! see rates that passed all three checks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::OracleConfig;
use crate::context::AssetId;
use crate::error::QueueError;
use crate::math;

/// Fixed-point precision of feed quotes.
///
/// A rate of `10^8` means one whole unit of the asset is worth exactly one
/// whole unit of the reference currency.
pub const RATE_DECIMALS: u8 = 8;

/// A raw feed observation: the value of one whole asset unit in the
/// reference currency, and the time it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub rate: u128,
    pub as_of: u64,
}

/// Source of raw price quotes.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Returns the latest quote for `asset`, or `RateUnavailable` if the
    /// feed does not cover it.
    async fn quote(&self, asset: &AssetId) -> Result<PriceQuote, QueueError>;
}

/// Feed backed by a map of manually set quotes.
#[derive(Default)]
pub struct StaticPriceFeed {
    quotes: RwLock<HashMap<AssetId, PriceQuote>>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, asset: AssetId, rate: u128, as_of: u64) {
        self.quotes
            .write()
            .await
            .insert(asset, PriceQuote { rate, as_of });
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn quote(&self, asset: &AssetId) -> Result<PriceQuote, QueueError> {
        self.quotes
            .read()
            .await
            .get(asset)
            .copied()
            .ok_or(QueueError::RateUnavailable)
    }
}

/// Applies staleness, band, and jump bounds on top of a raw feed.
///
/// The jump bound compares each quote against the last rate this oracle
/// accepted for the asset. The first quote for an asset has no baseline and
/// only passes the staleness and band checks.
pub struct RateOracle {
    feed: Arc<dyn PriceFeed>,
    config: OracleConfig,
    last_accepted: RwLock<HashMap<AssetId, u128>>,
}

impl RateOracle {
    pub fn new(feed: Arc<dyn PriceFeed>, config: OracleConfig) -> Self {
        Self {
            feed,
            config,
            last_accepted: RwLock::new(HashMap::new()),
        }
    }

    /// Returns an accepted rate for `asset`, in the 8-decimal reference base.
    ///
    /// Fails with `RateUnavailable` when the feed has no quote, the quote is
    /// older than `max_age_secs` (quotes dated in the future count as fresh),
    /// the rate is zero or outside `[min_rate, max_rate]`, or the move from
    /// the previously accepted rate exceeds `max_jump_bps`.
    pub async fn rate(&self, asset: &AssetId, now: u64) -> Result<u128, QueueError> {
        let quote = self.feed.quote(asset).await?;

        let age = now.saturating_sub(quote.as_of);
        if age > self.config.max_age_secs {
            warn!(
                "Rejecting stale quote for {}: age={}s, max={}s",
                asset, age, self.config.max_age_secs
            );
            return Err(QueueError::RateUnavailable);
        }

        if quote.rate == 0 || quote.rate < self.config.min_rate || quote.rate > self.config.max_rate {
            warn!(
                "Rejecting out-of-band quote for {}: rate={}, band=[{}, {}]",
                asset, quote.rate, self.config.min_rate, self.config.max_rate
            );
            return Err(QueueError::RateUnavailable);
        }

        let mut last_accepted = self.last_accepted.write().await;
        if let Some(&previous) = last_accepted.get(asset) {
            let allowed = math::bps_of(previous, u128::from(self.config.max_jump_bps))?;
            if quote.rate.abs_diff(previous) > allowed {
                warn!(
                    "Rejecting jump for {}: rate={}, previous={}, max_jump_bps={}",
                    asset, quote.rate, previous, self.config.max_jump_bps
                );
                return Err(QueueError::RateUnavailable);
            }
        }
        last_accepted.insert(asset.clone(), quote.rate);

        Ok(quote.rate)
    }

    /// Returns the want amount one whole offer unit is worth, in want base
    /// units:
    ///
    /// `pair_rate = floor(rate(offer) * 10^want_decimals / rate(want))`
    ///
    /// This has the same shape as a limit price, so callers can compare the
    /// two directly.
    pub async fn pair_rate(
        &self,
        offer: &AssetId,
        want: &AssetId,
        want_decimals: u8,
        now: u64,
    ) -> Result<u128, QueueError> {
        let offer_rate = self.rate(offer, now).await?;
        let want_rate = self.rate(want, now).await?;
        math::mul_div(offer_rate, math::pow10(want_decimals)?, want_rate)
    }
}
