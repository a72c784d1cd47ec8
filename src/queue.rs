//! Queue Facade
//!
//! This module wires the store, ledger, oracle, settlement engine, and admin
//! controls into the single entry point hosts embed: [`AtomicQueue`]. All
//! request lifecycle operations key off the calling requester, so a caller
//! can only ever create, replace, or cancel its own requests.
//!
//! Pause semantics: `update_request`, `update_request_safe`, and `solve` are
//! blocked while paused. Cancellation stays allowed so requesters can always
//! withdraw standing requests during an incident.

use std::sync::Arc;

use tracing::debug;

use crate::admin::{AdminControls, Authorizer, PendingRescue};
use crate::config::QueueConfig;
use crate::context::{Address, AssetId, CallContext};
use crate::error::QueueError;
use crate::events::{EventSink, QueueEvent};
use crate::ledger::TokenLedger;
use crate::math::{self, BPS_DENOMINATOR};
use crate::oracle::{PriceFeed, RateOracle};
use crate::solve::{SolveCoordinator, SolveMode, SolveReport};
use crate::store::{AtomicRequest, RequestKey, RequestStore};
use crate::strategy::{LiquidWrapper, RedemptionVault, SettlementEngine};

/// The embedded settlement queue.
///
/// One instance owns one request store and one settlement engine over the
/// host's ledger. The queue itself holds no assets during normal operation;
/// its address only appears as the allowance spender and as the account
/// rescues sweep from.
pub struct AtomicQueue {
    address: Address,
    config: QueueConfig,
    store: Arc<RequestStore>,
    ledger: Arc<dyn TokenLedger>,
    oracle: Arc<RateOracle>,
    engine: Arc<SettlementEngine>,
    admin: AdminControls,
    events: Arc<EventSink>,
    coordinator: SolveCoordinator,
}

impl AtomicQueue {
    /// Assembles a queue over the host's ledger, price feed, and authorizer.
    pub fn new(
        address: Address,
        config: QueueConfig,
        ledger: Arc<dyn TokenLedger>,
        feed: Arc<dyn PriceFeed>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let events = Arc::new(EventSink::new());
        let store = Arc::new(RequestStore::new());
        let oracle = Arc::new(RateOracle::new(feed, config.oracle.clone()));
        let engine = Arc::new(SettlementEngine::new(
            ledger.clone(),
            oracle.clone(),
            address.clone(),
        ));
        let admin = AdminControls::new(
            authorizer.clone(),
            ledger.clone(),
            events.clone(),
            config.rescue.clone(),
            address.clone(),
        );
        let coordinator = SolveCoordinator::new(
            store.clone(),
            ledger.clone(),
            engine.clone(),
            authorizer,
            events.clone(),
            address.clone(),
        );

        Self {
            address,
            config,
            store,
            ledger,
            oracle,
            engine,
            admin,
            events,
            coordinator,
        }
    }

    /// The queue's own account: allowance spender and rescue source.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The event sink recording every state transition.
    pub fn events(&self) -> Arc<EventSink> {
        self.events.clone()
    }

    /// Registers a redemption vault route for its share asset.
    pub async fn register_vault(&self, vault: Arc<dyn RedemptionVault>) {
        self.engine.register_vault(vault).await;
    }

    /// Registers a liquid wrapper route for its wrapped asset.
    pub async fn register_wrapper(&self, wrapper: Arc<dyn LiquidWrapper>) {
        self.engine.register_wrapper(wrapper).await;
    }

    // ========================================================================
    // REQUEST LIFECYCLE
    // ========================================================================

    /// Creates or replaces the caller's request for a pair.
    ///
    /// This path performs no economic validation: zero amounts, zero prices,
    /// and past deadlines are stored as-is and simply never settle. Use
    /// [`Self::update_request_safe`] to have the queue validate terms against
    /// the oracle before storing.
    ///
    /// # Returns
    ///
    /// * `Err(Paused)` while the queue is paused
    /// * `Err(RequestInSolve)` if an in-flight solve holds the current record
    pub async fn update_request(
        &self,
        ctx: &CallContext,
        offer: AssetId,
        want: AssetId,
        request: AtomicRequest,
    ) -> Result<(), QueueError> {
        self.admin.ensure_active().await?;
        self.store_request(ctx, offer, want, request).await
    }

    /// Creates or replaces the caller's request, validating the terms first.
    ///
    /// On top of the plain update this rejects zero amounts and prices,
    /// deadlines in the past or beyond the configured horizon, and limit
    /// prices further than `max_discount_bps` from the oracle's pair rate.
    /// The discount bound is clamped to the configured maximum.
    ///
    /// # Returns
    ///
    /// * `Err(ZeroOfferAmount | ZeroPrice)` for empty terms
    /// * `Err(DeadlineInPast | DeadlineTooDistant)` for a bad deadline
    /// * `Err(RateUnavailable)` when the oracle has no acceptable rate
    /// * `Err(PriceOutOfBounds)` when the price sits outside the band
    pub async fn update_request_safe(
        &self,
        ctx: &CallContext,
        offer: AssetId,
        want: AssetId,
        request: AtomicRequest,
        max_discount_bps: u64,
    ) -> Result<(), QueueError> {
        self.admin.ensure_active().await?;

        if request.offer_amount == 0 {
            return Err(QueueError::ZeroOfferAmount);
        }
        if request.limit_price == 0 {
            return Err(QueueError::ZeroPrice);
        }
        if request.deadline < ctx.now {
            return Err(QueueError::DeadlineInPast);
        }
        let horizon = ctx
            .now
            .saturating_add(self.config.requests.max_deadline_horizon_secs);
        if request.deadline > horizon {
            return Err(QueueError::DeadlineTooDistant);
        }

        let discount = u128::from(max_discount_bps.min(self.config.requests.max_discount_bps))
            .min(BPS_DENOMINATOR);
        let want_decimals = self.ledger.decimals(&want).await?;
        let pair_rate = self
            .oracle
            .pair_rate(&offer, &want, want_decimals, ctx.now)
            .await?;
        let low = math::mul_div(pair_rate, BPS_DENOMINATOR - discount, BPS_DENOMINATOR)?;
        let high = math::mul_div(pair_rate, BPS_DENOMINATOR + discount, BPS_DENOMINATOR)?;
        if request.limit_price < low || request.limit_price > high {
            debug!(
                "Rejecting price {} outside [{}, {}] (pair rate {})",
                request.limit_price, low, high, pair_rate
            );
            return Err(QueueError::PriceOutOfBounds);
        }

        self.store_request(ctx, offer, want, request).await
    }

    /// Cancels the caller's request for a pair.
    ///
    /// Allowed while paused. Fails with `RequestInSolve` while an in-flight
    /// solve holds the record and `RequestNotFound` if no record exists.
    pub async fn cancel_request(
        &self,
        ctx: &CallContext,
        offer: AssetId,
        want: AssetId,
    ) -> Result<(), QueueError> {
        let key = RequestKey::new(ctx.caller.clone(), offer.clone(), want.clone());
        self.store.cancel(&key).await?;
        self.events
            .record(QueueEvent::RequestCancelled {
                requester: ctx.caller.clone(),
                offer,
                want,
            })
            .await;
        Ok(())
    }

    /// Returns the stored request, if any.
    pub async fn get_request(
        &self,
        requester: &Address,
        offer: &AssetId,
        want: &AssetId,
    ) -> Option<AtomicRequest> {
        let key = RequestKey::new(requester.clone(), offer.clone(), want.clone());
        self.store.get(&key).await
    }

    /// Previews whether a solve at `now` would commit this request.
    ///
    /// Checks the record (existence, nonzero terms, deadline, solve lock)
    /// and the requester's ledger cover. `Ok(())` means a solve running now
    /// would commit it; the error otherwise is the reason a lenient solve
    /// would report for the skip.
    pub async fn is_request_solvable(
        &self,
        requester: &Address,
        offer: &AssetId,
        want: &AssetId,
        now: u64,
    ) -> Result<(), QueueError> {
        let key = RequestKey::new(requester.clone(), offer.clone(), want.clone());
        let request = self.store.get(&key).await.ok_or(QueueError::RequestNotFound)?;
        request.ensure_solvable(now)?;

        if self.ledger.balance_of(offer, requester).await < request.offer_amount {
            return Err(QueueError::InsufficientBalance);
        }
        if self.ledger.allowance(offer, requester, &self.address).await < request.offer_amount {
            return Err(QueueError::InsufficientAllowance);
        }
        Ok(())
    }

    // ========================================================================
    // SETTLEMENT
    // ========================================================================

    /// Settles a batch of requests for one pair against `solver`.
    ///
    /// See [`SolveCoordinator::solve`] for the batch semantics. The caller
    /// must hold `Action::Solve`; the queue must not be paused.
    #[allow(clippy::too_many_arguments)]
    pub async fn solve(
        &self,
        ctx: &CallContext,
        offer: &AssetId,
        want: &AssetId,
        requesters: &[Address],
        solver: &Address,
        strategy_data: &[u8],
        mode: SolveMode,
    ) -> Result<SolveReport, QueueError> {
        self.admin.ensure_active().await?;
        self.coordinator
            .solve(ctx, offer, want, requesters, solver, strategy_data, mode)
            .await
    }

    // ========================================================================
    // ADMINISTRATION
    // ========================================================================

    pub async fn is_paused(&self) -> bool {
        self.admin.is_paused().await
    }

    /// Pauses updates and solves. Requires `Action::Pause`.
    pub async fn pause(&self, ctx: &CallContext) -> Result<(), QueueError> {
        self.admin.pause(ctx).await
    }

    /// Lifts the pause. Requires `Action::Pause`.
    pub async fn unpause(&self, ctx: &CallContext) -> Result<(), QueueError> {
        self.admin.unpause(ctx).await
    }

    /// Schedules a rescue of assets stranded at the queue address.
    /// Requires `Action::Rescue`. Returns when it becomes executable.
    pub async fn schedule_rescue(
        &self,
        ctx: &CallContext,
        asset: AssetId,
        amount: u128,
        recipient: Address,
    ) -> Result<u64, QueueError> {
        self.admin.schedule_rescue(ctx, asset, amount, recipient).await
    }

    /// Executes the scheduled rescue once its time lock has elapsed.
    /// Requires `Action::Rescue`.
    pub async fn execute_rescue(&self, ctx: &CallContext) -> Result<(), QueueError> {
        self.admin.execute_rescue(ctx).await
    }

    /// The rescue currently waiting out its time lock, if any.
    pub async fn pending_rescue(&self) -> Option<PendingRescue> {
        self.admin.pending_rescue().await
    }

    async fn store_request(
        &self,
        ctx: &CallContext,
        offer: AssetId,
        want: AssetId,
        request: AtomicRequest,
    ) -> Result<(), QueueError> {
        let key = RequestKey::new(ctx.caller.clone(), offer.clone(), want.clone());
        self.store.update(key, request).await?;
        self.events
            .record(QueueEvent::RequestUpdated {
                requester: ctx.caller.clone(),
                offer,
                want,
                offer_amount: request.offer_amount,
                limit_price: request.limit_price,
                deadline: request.deadline,
            })
            .await;
        Ok(())
    }
}
