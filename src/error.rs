//! Error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong inside the queue.
///
/// Variants are deliberately fine grained so that solve reports and logs can
/// name the exact reason a request was skipped or a batch was aborted.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueError {
    #[error("Request offer amount is zero")]
    ZeroOfferAmount,

    #[error("Request limit price is zero")]
    ZeroPrice,

    #[error("Request deadline has passed")]
    DeadlineExceeded,

    #[error("Deadline is already in the past")]
    DeadlineInPast,

    #[error("Deadline is beyond the maximum horizon")]
    DeadlineTooDistant,

    #[error("Request is already part of an active solve")]
    AlreadyInSolve,

    #[error("Request is locked by an in-flight solve")]
    RequestInSolve,

    #[error("Request does not exist")]
    RequestNotFound,

    #[error("Requester balance does not cover the offer amount")]
    InsufficientBalance,

    #[error("Requester allowance does not cover the offer amount")]
    InsufficientAllowance,

    #[error("No acceptable oracle rate is available")]
    RateUnavailable,

    #[error("Limit price is outside the allowed band around the oracle rate")]
    PriceOutOfBounds,

    #[error("Settlement delivered less than the required want amount")]
    SlippageNotMet,

    #[error("Solver balance does not cover the want total")]
    InsufficientSolverBalance,

    #[error("Another solve is already running for this pair")]
    SolveInProgress,

    #[error("Queue is paused")]
    Paused,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Caller is not authorized for this action")]
    Unauthorized,

    #[error("No settlement route is registered for this asset")]
    UnsupportedAsset,

    #[error("Asset is not registered with the ledger")]
    UnknownAsset,

    #[error("Strategy data could not be decoded")]
    InvalidStrategyData,

    #[error("Rescue amount exceeds the configured maximum")]
    RescueLimitExceeded,

    #[error("No rescue is ready to execute")]
    RescueNotReady,
}
