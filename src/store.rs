//! Request Storage Module
//!
//! This module provides in-memory storage for standing exchange requests.
//! Each requester holds at most one request per (offer, want) pair; writing
//! again replaces the record in full. A request that has been committed to
//! an in-flight solve is locked against replacement and cancellation until
//! the solve settles or aborts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::context::{Address, AssetId};
use crate::error::QueueError;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A standing limit-priced exchange request.
///
/// The requester offers a fixed `offer_amount` of the pair's offer asset and
/// demands at least `limit_price` want base units per whole offer unit. The
/// record stays in the store until it is settled, cancelled, or replaced;
/// expiry makes it unsolvable but does not remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicRequest {
    /// Last second (inclusive) at which the request may settle
    pub deadline: u64,
    /// Minimum acceptable want base units per whole offer unit
    pub limit_price: u128,
    /// Offer base units to swap, in full
    pub offer_amount: u128,
    /// Set while an in-flight solve has committed to this request
    pub in_solve: bool,
}

impl AtomicRequest {
    pub fn new(deadline: u64, limit_price: u128, offer_amount: u128) -> Self {
        Self {
            deadline,
            limit_price,
            offer_amount,
            in_solve: false,
        }
    }

    /// Checks the record-level conditions a solve requires.
    ///
    /// A request is solvable while `deadline >= now`, both amount and price
    /// are nonzero, and no other solve holds it. Balance and allowance are
    /// checked separately against the ledger.
    pub fn ensure_solvable(&self, now: u64) -> Result<(), QueueError> {
        if self.offer_amount == 0 {
            return Err(QueueError::ZeroOfferAmount);
        }
        if self.limit_price == 0 {
            return Err(QueueError::ZeroPrice);
        }
        if self.deadline < now {
            return Err(QueueError::DeadlineExceeded);
        }
        if self.in_solve {
            return Err(QueueError::AlreadyInSolve);
        }
        Ok(())
    }
}

/// Identifies a request: one requester, one direction of one asset pair.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestKey {
    pub requester: Address,
    pub offer: AssetId,
    pub want: AssetId,
}

impl RequestKey {
    pub fn new(requester: Address, offer: AssetId, want: AssetId) -> Self {
        Self {
            requester,
            offer,
            want,
        }
    }
}

// ============================================================================
// STORAGE IMPLEMENTATION
// ============================================================================

/// In-memory storage for standing requests.
///
/// Uses HashMap for O(1) lookup by key. Thread-safe via RwLock. The
/// `mark_in_solve` path validates and locks a request under a single write
/// lock, so two concurrent solves can never commit to the same request.
pub struct RequestStore {
    /// Map of key -> request
    requests: RwLock<HashMap<RequestKey, AtomicRequest>>,
}

impl RequestStore {
    /// Create a new request store.
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Create or replace a request.
    ///
    /// The stored record is replaced in full; there is no partial update.
    /// The transient `in_solve` flag is always reset on write, callers
    /// cannot smuggle a locked record into the store.
    ///
    /// # Arguments
    ///
    /// * `key` - Requester and pair the record belongs to
    /// * `request` - The new record
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the record was written
    /// * `Err(RequestInSolve)` if an in-flight solve holds the current record
    pub async fn update(&self, key: RequestKey, mut request: AtomicRequest) -> Result<(), QueueError> {
        let mut requests = self.requests.write().await;
        if let Some(existing) = requests.get(&key) {
            if existing.in_solve {
                return Err(QueueError::RequestInSolve);
            }
        }
        request.in_solve = false;
        requests.insert(key, request);
        Ok(())
    }

    /// Remove a request.
    ///
    /// # Returns
    ///
    /// * `Ok(AtomicRequest)` - The removed record
    /// * `Err(RequestNotFound)` if no record exists under the key
    /// * `Err(RequestInSolve)` if an in-flight solve holds the record
    pub async fn cancel(&self, key: &RequestKey) -> Result<AtomicRequest, QueueError> {
        let mut requests = self.requests.write().await;
        let existing = *requests.get(key).ok_or(QueueError::RequestNotFound)?;
        if existing.in_solve {
            return Err(QueueError::RequestInSolve);
        }
        requests.remove(key);
        Ok(existing)
    }

    /// Get a request by key.
    pub async fn get(&self, key: &RequestKey) -> Option<AtomicRequest> {
        self.requests.read().await.get(key).copied()
    }

    /// Validate a request and commit it to a solve in one step.
    ///
    /// Runs `ensure_solvable` and sets `in_solve` under the same write lock,
    /// so the commit is atomic: between two racing solves, exactly one sees
    /// the request as free.
    ///
    /// # Arguments
    ///
    /// * `key` - The request to commit
    /// * `now` - Current time for the deadline check
    ///
    /// # Returns
    ///
    /// * `Ok(AtomicRequest)` - Copy of the committed record
    /// * `Err(...)` - The exact reason the request cannot join the solve
    pub async fn mark_in_solve(&self, key: &RequestKey, now: u64) -> Result<AtomicRequest, QueueError> {
        let mut requests = self.requests.write().await;
        let request = requests.get_mut(key).ok_or(QueueError::RequestNotFound)?;
        request.ensure_solvable(now)?;
        request.in_solve = true;
        Ok(*request)
    }

    /// Release the solve lock on a request, if it still exists.
    pub async fn unmark(&self, key: &RequestKey) {
        if let Some(request) = self.requests.write().await.get_mut(key) {
            request.in_solve = false;
        }
    }

    /// Release the solve lock on a set of requests under one write lock.
    pub async fn unmark_all(&self, keys: &[RequestKey]) {
        let mut requests = self.requests.write().await;
        for key in keys {
            if let Some(request) = requests.get_mut(key) {
                request.in_solve = false;
            }
        }
    }

    /// Remove settled requests under one write lock.
    ///
    /// Settlement consumes the record; the requester must submit a new
    /// request for any further exchange.
    pub async fn clear_all(&self, keys: &[RequestKey]) {
        let mut requests = self.requests.write().await;
        for key in keys {
            requests.remove(key);
        }
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}
