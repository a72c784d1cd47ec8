//! Event definitions for the queue.
//!
//! Events are emitted through `tracing` and recorded in an in-memory sink so
//! that embedding hosts (and the tests) can inspect or drain them.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::context::{Address, AssetId};

/// Observable state transitions of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// A request was created or overwritten.
    RequestUpdated {
        requester: Address,
        offer: AssetId,
        want: AssetId,
        offer_amount: u128,
        limit_price: u128,
        deadline: u64,
    },
    /// A request was cancelled by its requester.
    RequestCancelled {
        requester: Address,
        offer: AssetId,
        want: AssetId,
    },
    /// One request was settled inside a solve.
    Settled {
        requester: Address,
        offer: AssetId,
        want: AssetId,
        offer_amount: u128,
        want_amount: u128,
    },
    /// A batch solve completed.
    SolveExecuted {
        offer: AssetId,
        want: AssetId,
        solver: Address,
        total_offer: u128,
        total_want: u128,
        settled: u32,
        skipped: u32,
    },
    /// The queue was paused.
    Paused { by: Address },
    /// The queue was unpaused.
    Unpaused { by: Address },
    /// An asset rescue was scheduled.
    RescueScheduled {
        asset: AssetId,
        amount: u128,
        recipient: Address,
        available_at: u64,
    },
    /// A scheduled rescue was executed.
    RescueExecuted {
        asset: AssetId,
        amount: u128,
        recipient: Address,
    },
}

impl QueueEvent {
    /// Writes the event to the log in `Name: key=value` form.
    fn log(&self) {
        match self {
            QueueEvent::RequestUpdated {
                requester,
                offer,
                want,
                offer_amount,
                limit_price,
                deadline,
            } => info!(
                "RequestUpdated: requester={}, offer={}, want={}, offer_amount={}, limit_price={}, deadline={}",
                requester, offer, want, offer_amount, limit_price, deadline
            ),
            QueueEvent::RequestCancelled {
                requester,
                offer,
                want,
            } => info!(
                "RequestCancelled: requester={}, offer={}, want={}",
                requester, offer, want
            ),
            QueueEvent::Settled {
                requester,
                offer,
                want,
                offer_amount,
                want_amount,
            } => info!(
                "Settled: requester={}, offer={}, want={}, offer_amount={}, want_amount={}",
                requester, offer, want, offer_amount, want_amount
            ),
            QueueEvent::SolveExecuted {
                offer,
                want,
                solver,
                total_offer,
                total_want,
                settled,
                skipped,
            } => info!(
                "SolveExecuted: offer={}, want={}, solver={}, total_offer={}, total_want={}, settled={}, skipped={}",
                offer, want, solver, total_offer, total_want, settled, skipped
            ),
            QueueEvent::Paused { by } => info!("Paused: by={}", by),
            QueueEvent::Unpaused { by } => info!("Unpaused: by={}", by),
            QueueEvent::RescueScheduled {
                asset,
                amount,
                recipient,
                available_at,
            } => info!(
                "RescueScheduled: asset={}, amount={}, recipient={}, available_at={}",
                asset, amount, recipient, available_at
            ),
            QueueEvent::RescueExecuted {
                asset,
                amount,
                recipient,
            } => info!(
                "RescueExecuted: asset={}, amount={}, recipient={}",
                asset, amount, recipient
            ),
        }
    }
}

/// Buffers emitted events for host inspection.
///
/// Recording is append-only; hosts that forward events elsewhere call
/// `drain` after each batch of work to keep the buffer bounded.
#[derive(Default)]
pub struct EventSink {
    events: RwLock<Vec<QueueEvent>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs the event and appends it to the buffer.
    pub async fn record(&self, event: QueueEvent) {
        event.log();
        self.events.write().await.push(event);
    }

    /// Returns a copy of all buffered events in emission order.
    pub async fn snapshot(&self) -> Vec<QueueEvent> {
        self.events.read().await.clone()
    }

    /// Removes and returns all buffered events.
    pub async fn drain(&self) -> Vec<QueueEvent> {
        std::mem::take(&mut *self.events.write().await)
    }
}
