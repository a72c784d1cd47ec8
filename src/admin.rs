//! Authorization and administrative controls.
//!
//! The queue does not manage roles itself; it asks an external [`Authorizer`]
//! whether a caller may solve, pause, or rescue. [`AdminControls`] implements
//! the pause switch and a two-step, amount-capped rescue path for assets
//! stranded at the queue's own address.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::RescueConfig;
use crate::context::{Address, AssetId, CallContext};
use crate::error::QueueError;
use crate::events::{EventSink, QueueEvent};
use crate::ledger::TokenLedger;

/// Privileged actions a caller can be granted.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Solve,
    Pause,
    Rescue,
}

/// Answers whether a caller may perform a privileged action.
///
/// Hosts back this with their own role registry, multisig, or governance
/// layer. The queue treats the answer as final and does no caching.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(&self, who: &Address, action: Action) -> bool;
}

/// Authorizer backed by an explicit grant set.
#[derive(Default)]
pub struct StaticAuthorizer {
    grants: RwLock<HashSet<(Address, Action)>>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, who: Address, action: Action) {
        self.grants.write().await.insert((who, action));
    }

    /// Grants every action to `who`.
    pub async fn grant_all(&self, who: Address) {
        let mut grants = self.grants.write().await;
        for action in [Action::Solve, Action::Pause, Action::Rescue] {
            grants.insert((who.clone(), action));
        }
    }

    pub async fn revoke(&self, who: &Address, action: Action) {
        self.grants.write().await.remove(&(who.clone(), action));
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn is_authorized(&self, who: &Address, action: Action) -> bool {
        self.grants.read().await.contains(&(who.clone(), action))
    }
}

/// A scheduled rescue waiting out its time lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRescue {
    pub asset: AssetId,
    pub amount: u128,
    pub recipient: Address,
    /// First second (inclusive) at which execution is allowed
    pub available_at: u64,
}

/// Pause switch and rescue execution.
pub struct AdminControls {
    authorizer: Arc<dyn Authorizer>,
    ledger: Arc<dyn TokenLedger>,
    events: Arc<EventSink>,
    config: RescueConfig,
    queue_address: Address,
    paused: RwLock<bool>,
    pending_rescue: RwLock<Option<PendingRescue>>,
}

impl AdminControls {
    pub(crate) fn new(
        authorizer: Arc<dyn Authorizer>,
        ledger: Arc<dyn TokenLedger>,
        events: Arc<EventSink>,
        config: RescueConfig,
        queue_address: Address,
    ) -> Self {
        Self {
            authorizer,
            ledger,
            events,
            config,
            queue_address,
            paused: RwLock::new(false),
            pending_rescue: RwLock::new(None),
        }
    }

    pub async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    /// Fails with `Paused` while the pause switch is on.
    pub(crate) async fn ensure_active(&self) -> Result<(), QueueError> {
        if self.is_paused().await {
            return Err(QueueError::Paused);
        }
        Ok(())
    }

    /// Turns the pause switch on. Idempotent; only a transition emits an
    /// event.
    pub async fn pause(&self, ctx: &CallContext) -> Result<(), QueueError> {
        self.authorize(ctx, Action::Pause).await?;
        let mut paused = self.paused.write().await;
        if !*paused {
            *paused = true;
            self.events
                .record(QueueEvent::Paused {
                    by: ctx.caller.clone(),
                })
                .await;
        }
        Ok(())
    }

    /// Turns the pause switch off. Idempotent.
    pub async fn unpause(&self, ctx: &CallContext) -> Result<(), QueueError> {
        self.authorize(ctx, Action::Pause).await?;
        let mut paused = self.paused.write().await;
        if *paused {
            *paused = false;
            self.events
                .record(QueueEvent::Unpaused {
                    by: ctx.caller.clone(),
                })
                .await;
        }
        Ok(())
    }

    /// Schedules a rescue of assets held at the queue's own address.
    ///
    /// Replaces any previously scheduled rescue. Execution becomes possible
    /// once the configured time lock has elapsed.
    ///
    /// # Returns
    ///
    /// The timestamp at which the rescue becomes executable.
    pub async fn schedule_rescue(
        &self,
        ctx: &CallContext,
        asset: AssetId,
        amount: u128,
        recipient: Address,
    ) -> Result<u64, QueueError> {
        self.authorize(ctx, Action::Rescue).await?;
        if amount > self.config.max_rescue_amount {
            warn!(
                "Rescue of {} {} rejected: cap is {}",
                amount, asset, self.config.max_rescue_amount
            );
            return Err(QueueError::RescueLimitExceeded);
        }

        let available_at = ctx.now.saturating_add(self.config.timelock_secs);
        let rescue = PendingRescue {
            asset: asset.clone(),
            amount,
            recipient: recipient.clone(),
            available_at,
        };
        *self.pending_rescue.write().await = Some(rescue);

        self.events
            .record(QueueEvent::RescueScheduled {
                asset,
                amount,
                recipient,
                available_at,
            })
            .await;
        Ok(available_at)
    }

    /// Executes the scheduled rescue once its time lock has elapsed.
    ///
    /// A failed transfer leaves the rescue scheduled so it can be retried
    /// (for example after topping up the queue's balance).
    pub async fn execute_rescue(&self, ctx: &CallContext) -> Result<(), QueueError> {
        self.authorize(ctx, Action::Rescue).await?;

        let mut pending = self.pending_rescue.write().await;
        let rescue = match pending.as_ref() {
            Some(rescue) if ctx.now >= rescue.available_at => rescue.clone(),
            _ => return Err(QueueError::RescueNotReady),
        };

        self.ledger
            .transfer_from(
                &rescue.asset,
                &self.queue_address,
                &rescue.recipient,
                &self.queue_address,
                rescue.amount,
            )
            .await?;
        *pending = None;
        drop(pending);

        info!(
            "Rescued {} {} to {}",
            rescue.amount, rescue.asset, rescue.recipient
        );
        self.events
            .record(QueueEvent::RescueExecuted {
                asset: rescue.asset,
                amount: rescue.amount,
                recipient: rescue.recipient,
            })
            .await;
        Ok(())
    }

    pub async fn pending_rescue(&self) -> Option<PendingRescue> {
        self.pending_rescue.read().await.clone()
    }

    async fn authorize(&self, ctx: &CallContext, action: Action) -> Result<(), QueueError> {
        if self.authorizer.is_authorized(&ctx.caller, action).await {
            Ok(())
        } else {
            warn!("{} is not authorized for {:?}", ctx.caller, action);
            Err(QueueError::Unauthorized)
        }
    }
}
