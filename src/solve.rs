//! Batch Solve Coordination
//!
//! This module drives the settlement of a batch of requests against one
//! solver. The ordering is strict checks-effects-interactions: every request
//! is validated and locked (`in_solve`) before the first asset moves, all
//! asset movement happens inside a single ledger transaction, and store
//! records are only cleared after the solver has paid every commitment.
//! Any failure after the first transfer rolls the ledger back and releases
//! the locks, so a batch either settles completely or leaves no trace.
//!
//! One solve per (offer, want) pair runs at a time; a second call for the
//! same pair fails fast with `SolveInProgress` instead of queuing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::admin::{Action, Authorizer};
use crate::context::{Address, AssetId, CallContext};
use crate::error::QueueError;
use crate::events::{EventSink, QueueEvent};
use crate::ledger::TokenLedger;
use crate::math;
use crate::store::{RequestKey, RequestStore};
use crate::strategy::SettlementEngine;

// ============================================================================
// REPORT TYPES
// ============================================================================

/// How a solve treats requests that fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolveMode {
    /// Skip failing requests and settle the rest.
    #[default]
    Lenient,
    /// Abort the whole batch on the first failing request.
    Strict,
}

/// Result for a single requester inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome {
    /// The request settled; amounts are in base units of each asset.
    Settled { offer_amount: u128, want_amount: u128 },
    /// The request was skipped with the given reason (lenient mode only).
    Skipped { reason: QueueError },
}

/// A requester paired with its outcome, in batch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterOutcome {
    pub requester: Address,
    pub outcome: RequestOutcome,
}

/// Per-batch settlement report returned to the solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveReport {
    pub offer: AssetId,
    pub want: AssetId,
    pub solver: Address,
    /// One entry per requested address, in call order
    pub outcomes: Vec<RequesterOutcome>,
    /// Offer base units pulled from requesters
    pub total_offer: u128,
    /// Want base units paid out to requesters
    pub total_want: u128,
}

impl SolveReport {
    pub fn settled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| matches!(entry.outcome, RequestOutcome::Settled { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.settled_count()
    }

    /// Returns the outcome for a requester, if it was part of the batch.
    pub fn outcome_for(&self, requester: &Address) -> Option<&RequestOutcome> {
        self.outcomes
            .iter()
            .find(|entry| entry.requester == *requester)
            .map(|entry| &entry.outcome)
    }
}

// ============================================================================
// PAIR LOCK
// ============================================================================

/// Tracks which pairs have a solve in flight.
pub(crate) struct PairLocks {
    held: Mutex<HashSet<(AssetId, AssetId)>>,
}

impl PairLocks {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            held: Mutex::new(HashSet::new()),
        })
    }

    /// Takes the lock for a pair, failing fast if it is already held.
    fn acquire(self: &Arc<Self>, offer: &AssetId, want: &AssetId) -> Result<PairLockGuard, QueueError> {
        let pair = (offer.clone(), want.clone());
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(pair.clone()) {
            return Err(QueueError::SolveInProgress);
        }
        Ok(PairLockGuard {
            locks: Arc::clone(self),
            pair,
        })
    }
}

/// Releases the pair on drop, also when the solve path errors out.
struct PairLockGuard {
    locks: Arc<PairLocks>,
    pair: (AssetId, AssetId),
}

impl Drop for PairLockGuard {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.pair);
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// A request the batch has committed to settle.
struct Commitment {
    key: RequestKey,
    offer_amount: u128,
    want_amount: u128,
}

/// Executes batch solves.
///
/// Constructed by the queue facade; hosts call it through
/// [`crate::queue::AtomicQueue::solve`].
pub struct SolveCoordinator {
    store: Arc<RequestStore>,
    ledger: Arc<dyn TokenLedger>,
    engine: Arc<SettlementEngine>,
    authorizer: Arc<dyn Authorizer>,
    events: Arc<EventSink>,
    queue_address: Address,
    locks: Arc<PairLocks>,
}

impl SolveCoordinator {
    pub(crate) fn new(
        store: Arc<RequestStore>,
        ledger: Arc<dyn TokenLedger>,
        engine: Arc<SettlementEngine>,
        authorizer: Arc<dyn Authorizer>,
        events: Arc<EventSink>,
        queue_address: Address,
    ) -> Self {
        Self {
            store,
            ledger,
            engine,
            authorizer,
            events,
            queue_address,
            locks: PairLocks::new(),
        }
    }

    /// Settles a batch of requests for one (offer, want) pair.
    ///
    /// Runs in two stages. Classification validates each listed requester's
    /// record and ledger cover, locking the passing ones; in lenient mode a
    /// failing request becomes a skip entry, in strict mode it aborts the
    /// call. Settlement then pulls every committed offer to the solver, runs
    /// the strategy, verifies the solver covers the want total, and pays each
    /// requester exactly `floor(offer_amount * limit_price / 10^offer_decimals)`.
    ///
    /// Arithmetic overflow is never skippable; it aborts the batch in either
    /// mode. Any failure after the first transfer rolls back every transfer
    /// the batch made.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Caller identity (must hold `Action::Solve`) and clock
    /// * `offer` / `want` - The pair being settled
    /// * `requesters` - Batch members, at most one request each for this pair
    /// * `solver` - Account that receives offers and pays want
    /// * `strategy_data` - Borsh-encoded [`crate::strategy::SettlementStrategy`]
    /// * `mode` - Lenient (skip failures) or strict (abort on first failure)
    ///
    /// # Returns
    ///
    /// A [`SolveReport`] with per-requester outcomes and batch totals.
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
        if !self.authorizer.is_authorized(&ctx.caller, Action::Solve).await {
            warn!("{} attempted a solve without authorization", ctx.caller);
            return Err(QueueError::Unauthorized);
        }

        let _pair_guard = self.locks.acquire(offer, want)?;
        let offer_decimals = self.ledger.decimals(offer).await?;

        info!(
            "Solve started: pair {} -> {}, solver={}, batch={}, mode={:?}",
            offer,
            want,
            solver,
            requesters.len(),
            mode
        );

        // ------------------------------------------------------------------
        // Stage 1: classify and lock. No assets move in this stage.
        // ------------------------------------------------------------------
        let mut outcomes = Vec::with_capacity(requesters.len());
        let mut commitments: Vec<Commitment> = Vec::new();
        let mut total_offer: u128 = 0;
        let mut total_want: u128 = 0;

        for requester in requesters {
            let key = RequestKey::new(requester.clone(), offer.clone(), want.clone());

            let request = match self.store.mark_in_solve(&key, ctx.now).await {
                Ok(request) => request,
                Err(reason) => {
                    if mode == SolveMode::Strict {
                        self.release_marks(&commitments).await;
                        return Err(reason);
                    }
                    debug!("Skipping {}: {}", requester, reason);
                    outcomes.push(RequesterOutcome {
                        requester: requester.clone(),
                        outcome: RequestOutcome::Skipped { reason },
                    });
                    continue;
                }
            };

            // The request is locked from here on; release it on any skip.
            let balance = self.ledger.balance_of(offer, requester).await;
            let allowance = self.ledger.allowance(offer, requester, &self.queue_address).await;
            let shortfall = if balance < request.offer_amount {
                Some(QueueError::InsufficientBalance)
            } else if allowance < request.offer_amount {
                Some(QueueError::InsufficientAllowance)
            } else {
                None
            };
            if let Some(reason) = shortfall {
                self.store.unmark(&key).await;
                if mode == SolveMode::Strict {
                    self.release_marks(&commitments).await;
                    return Err(reason);
                }
                debug!("Skipping {}: {}", requester, reason);
                outcomes.push(RequesterOutcome {
                    requester: requester.clone(),
                    outcome: RequestOutcome::Skipped { reason },
                });
                continue;
            }

            // Overflow aborts the batch in both modes.
            let want_amount =
                match math::apply_price(request.offer_amount, request.limit_price, offer_decimals) {
                    Ok(amount) => amount,
                    Err(err) => {
                        self.store.unmark(&key).await;
                        self.release_marks(&commitments).await;
                        return Err(err);
                    }
                };
            let (next_offer, next_want) = match (
                total_offer.checked_add(request.offer_amount),
                total_want.checked_add(want_amount),
            ) {
                (Some(next_offer), Some(next_want)) => (next_offer, next_want),
                _ => {
                    self.store.unmark(&key).await;
                    self.release_marks(&commitments).await;
                    return Err(QueueError::Overflow);
                }
            };
            total_offer = next_offer;
            total_want = next_want;

            outcomes.push(RequesterOutcome {
                requester: requester.clone(),
                outcome: RequestOutcome::Settled {
                    offer_amount: request.offer_amount,
                    want_amount,
                },
            });
            commitments.push(Commitment {
                key,
                offer_amount: request.offer_amount,
                want_amount,
            });
        }

        if commitments.is_empty() {
            info!(
                "Solve for {} -> {} committed nothing ({} skipped)",
                offer,
                want,
                outcomes.len()
            );
            let report = SolveReport {
                offer: offer.clone(),
                want: want.clone(),
                solver: solver.clone(),
                outcomes,
                total_offer: 0,
                total_want: 0,
            };
            self.emit_solve_executed(&report).await;
            return Ok(report);
        }

        // ------------------------------------------------------------------
        // Stage 2: settle. Everything below runs inside the ledger
        // transaction opened here.
        // ------------------------------------------------------------------
        let snapshot = self.ledger.snapshot().await;

        for commitment in &commitments {
            if let Err(err) = self
                .ledger
                .transfer_from(
                    offer,
                    &commitment.key.requester,
                    solver,
                    &self.queue_address,
                    commitment.offer_amount,
                )
                .await
            {
                error!("Offer pull from {} failed: {}", commitment.key.requester, err);
                self.abort(snapshot, &commitments).await;
                return Err(err);
            }
        }

        if let Err(err) = self
            .engine
            .finish_solve(ctx, strategy_data, solver, offer, want, total_offer, total_want)
            .await
        {
            error!("Settlement strategy failed: {}", err);
            self.abort(snapshot, &commitments).await;
            return Err(err);
        }

        // The strategy reported success; verify the solver actually covers
        // the want total before paying anyone.
        let solver_balance = self.ledger.balance_of(want, solver).await;
        let solver_allowance = self.ledger.allowance(want, solver, &self.queue_address).await;
        if solver_balance < total_want || solver_allowance < total_want {
            error!(
                "Solver cover check failed: balance={}, allowance={}, required={}",
                solver_balance, solver_allowance, total_want
            );
            self.abort(snapshot, &commitments).await;
            return Err(QueueError::SlippageNotMet);
        }

        for commitment in &commitments {
            if let Err(err) = self
                .ledger
                .transfer_from(
                    want,
                    solver,
                    &commitment.key.requester,
                    &self.queue_address,
                    commitment.want_amount,
                )
                .await
            {
                error!("Want push to {} failed: {}", commitment.key.requester, err);
                self.abort(snapshot, &commitments).await;
                return Err(err);
            }
        }

        let settled_keys: Vec<RequestKey> = commitments
            .iter()
            .map(|commitment| commitment.key.clone())
            .collect();
        self.store.clear_all(&settled_keys).await;
        self.ledger.commit(snapshot).await;

        for commitment in &commitments {
            self.events
                .record(QueueEvent::Settled {
                    requester: commitment.key.requester.clone(),
                    offer: offer.clone(),
                    want: want.clone(),
                    offer_amount: commitment.offer_amount,
                    want_amount: commitment.want_amount,
                })
                .await;
        }

        let report = SolveReport {
            offer: offer.clone(),
            want: want.clone(),
            solver: solver.clone(),
            outcomes,
            total_offer,
            total_want,
        };
        self.emit_solve_executed(&report).await;

        info!(
            "Solve finished: {} settled, {} skipped, total_offer={}, total_want={}",
            report.settled_count(),
            report.skipped_count(),
            total_offer,
            total_want
        );
        Ok(report)
    }

    /// Unwinds a batch that already moved assets: ledger first, then locks.
    async fn abort(&self, snapshot: u64, commitments: &[Commitment]) {
        self.ledger.rollback(snapshot).await;
        self.release_marks(commitments).await;
    }

    async fn release_marks(&self, commitments: &[Commitment]) {
        let keys: Vec<RequestKey> = commitments
            .iter()
            .map(|commitment| commitment.key.clone())
            .collect();
        self.store.unmark_all(&keys).await;
    }

    async fn emit_solve_executed(&self, report: &SolveReport) {
        self.events
            .record(QueueEvent::SolveExecuted {
                offer: report.offer.clone(),
                want: report.want.clone(),
                solver: report.solver.clone(),
                total_offer: report.total_offer,
                total_want: report.total_want,
                settled: report.settled_count() as u32,
                skipped: report.skipped_count() as u32,
            })
            .await;
    }
}
