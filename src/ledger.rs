//! Fungible asset ledger abstraction.
//!
//! The queue never touches balances directly; every movement of value goes
//! through [`TokenLedger`]. Hosts back this trait with their real asset
//! layer. [`InMemoryLedger`] is the reference implementation used by the
//! test suite and by embedded deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::context::{Address, AssetId};
use crate::error::QueueError;

/// Asset operations the queue needs from its host.
///
/// `snapshot`, `commit`, and `rollback` delimit a ledger transaction. The
/// queue opens one around each batch settlement so that a failure after the
/// first transfer can undo every transfer made since. Hosts that already run
/// the whole call inside a transaction can implement these as no-ops.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Returns the decimal precision of an asset.
    async fn decimals(&self, asset: &AssetId) -> Result<u8, QueueError>;

    /// Returns the balance of `owner`, zero for unknown accounts.
    async fn balance_of(&self, asset: &AssetId, owner: &Address) -> u128;

    /// Returns the amount `spender` may move on behalf of `owner`.
    async fn allowance(&self, asset: &AssetId, owner: &Address, spender: &Address) -> u128;

    /// Moves `amount` from `from` to `to`.
    ///
    /// When `spender` differs from `from`, the transfer consumes allowance
    /// that `from` granted to `spender`. An allowance of `u128::MAX` is
    /// treated as unlimited and is not decremented. Zero-amount transfers
    /// always succeed.
    async fn transfer_from(
        &self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        spender: &Address,
        amount: u128,
    ) -> Result<(), QueueError>;

    /// Opens a ledger transaction and returns its handle.
    async fn snapshot(&self) -> u64;

    /// Closes the transaction, keeping all effects.
    async fn commit(&self, snapshot: u64);

    /// Closes the transaction, restoring the state captured by `snapshot`.
    async fn rollback(&self, snapshot: u64);
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    decimals: HashMap<AssetId, u8>,
    balances: HashMap<(AssetId, Address), u128>,
    allowances: HashMap<(AssetId, Address, Address), u128>,
}

struct OpenTransaction {
    id: u64,
    saved: LedgerState,
    /// Held for the lifetime of the transaction so that a second `snapshot`
    /// waits until this one commits or rolls back.
    _serial: OwnedMutexGuard<()>,
}

/// In-memory ledger with single-writer transactions.
///
/// Only one transaction is open at a time; `snapshot` callers queue behind
/// the current one. This mirrors the serial execution the queue gets from a
/// transactional host.
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    serial: Arc<Mutex<()>>,
    open: Mutex<Option<OpenTransaction>>,
    next_id: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            serial: Arc::new(Mutex::new(())),
            open: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers an asset with its decimal precision. Re-registering an
    /// asset overwrites the precision and keeps balances.
    pub async fn register_asset(&self, asset: AssetId, decimals: u8) {
        self.state.write().await.decimals.insert(asset, decimals);
    }

    /// Credits `amount` to `to`. The asset must be registered.
    pub async fn mint(&self, asset: &AssetId, to: &Address, amount: u128) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        if !state.decimals.contains_key(asset) {
            return Err(QueueError::UnknownAsset);
        }
        let balance = state
            .balances
            .entry((asset.clone(), to.clone()))
            .or_insert(0);
        *balance = balance.checked_add(amount).ok_or(QueueError::Overflow)?;
        Ok(())
    }

    /// Debits `amount` from `from`.
    pub async fn burn(&self, asset: &AssetId, from: &Address, amount: u128) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        let balance = state
            .balances
            .entry((asset.clone(), from.clone()))
            .or_insert(0);
        if *balance < amount {
            return Err(QueueError::InsufficientBalance);
        }
        *balance -= amount;
        Ok(())
    }

    /// Sets the allowance `owner` grants to `spender`, replacing any
    /// previous value. `u128::MAX` means unlimited.
    pub async fn approve(&self, asset: &AssetId, owner: &Address, spender: &Address, amount: u128) {
        self.state
            .write()
            .await
            .allowances
            .insert((asset.clone(), owner.clone(), spender.clone()), amount);
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenLedger for InMemoryLedger {
    async fn decimals(&self, asset: &AssetId) -> Result<u8, QueueError> {
        self.state
            .read()
            .await
            .decimals
            .get(asset)
            .copied()
            .ok_or(QueueError::UnknownAsset)
    }

    async fn balance_of(&self, asset: &AssetId, owner: &Address) -> u128 {
        self.state
            .read()
            .await
            .balances
            .get(&(asset.clone(), owner.clone()))
            .copied()
            .unwrap_or(0)
    }

    async fn allowance(&self, asset: &AssetId, owner: &Address, spender: &Address) -> u128 {
        self.state
            .read()
            .await
            .allowances
            .get(&(asset.clone(), owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    async fn transfer_from(
        &self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        spender: &Address,
        amount: u128,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        if !state.decimals.contains_key(asset) {
            return Err(QueueError::UnknownAsset);
        }

        let from_key = (asset.clone(), from.clone());
        let from_balance = state.balances.get(&from_key).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(QueueError::InsufficientBalance);
        }

        // Work out both sides before mutating anything, so a failed check
        // leaves the ledger untouched. A self-transfer nets to zero.
        let to_key = (asset.clone(), to.clone());
        let credited = if to == from {
            from_balance
        } else {
            state
                .balances
                .get(&to_key)
                .copied()
                .unwrap_or(0)
                .checked_add(amount)
                .ok_or(QueueError::Overflow)?
        };

        if spender != from {
            let allowance_key = (asset.clone(), from.clone(), spender.clone());
            let allowance = state.allowances.get(&allowance_key).copied().unwrap_or(0);
            if allowance < amount {
                return Err(QueueError::InsufficientAllowance);
            }
            if allowance != u128::MAX {
                state.allowances.insert(allowance_key, allowance - amount);
            }
        }

        state.balances.insert(from_key, from_balance - amount);
        state.balances.insert(to_key, credited);
        Ok(())
    }

    async fn snapshot(&self) -> u64 {
        let serial = self.serial.clone().lock_owned().await;
        let saved = self.state.read().await.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *self.open.lock().await = Some(OpenTransaction {
            id,
            saved,
            _serial: serial,
        });
        id
    }

    async fn commit(&self, snapshot: u64) {
        let mut open = self.open.lock().await;
        if let Some(tx) = open.take() {
            if tx.id != snapshot {
                *open = Some(tx);
            }
        }
    }

    async fn rollback(&self, snapshot: u64) {
        let mut open = self.open.lock().await;
        if let Some(tx) = open.take() {
            if tx.id == snapshot {
                *self.state.write().await = tx.saved;
            } else {
                *open = Some(tx);
            }
        }
    }
}
