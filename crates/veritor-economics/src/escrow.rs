use crate::balance::BalanceManager;
use crate::types::{AccountAddress, TransferReason, VeriAmount};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Unique identifier for an escrow lock
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(pub String);

impl LockId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Escrow locks used by the oracle flows
#[derive(Debug, Clone)]
pub enum EscrowKind {
    /// A prover's registered bond, not yet committed to any request
    ProverBond { prover: AccountAddress },

    /// The stake a requester attached to an inference request
    RequestStake {
        request_id: u64,
        requester: AccountAddress,
    },

    /// The portion of a prover's bond committed to a posted result
    ProverStake {
        request_id: u64,
        prover: AccountAddress,
    },
}

impl EscrowKind {
    pub fn to_lock_id(&self) -> LockId {
        match self {
            EscrowKind::ProverBond { prover } => LockId::new(format!(
                "prover_bond_{}",
                hex::encode(&prover.as_bytes()[..8])
            )),
            EscrowKind::RequestStake {
                request_id,
                requester,
            } => LockId::new(format!(
                "request_stake_{}_{}",
                request_id,
                hex::encode(&requester.as_bytes()[..8])
            )),
            EscrowKind::ProverStake { request_id, prover } => LockId::new(format!(
                "prover_stake_{}_{}",
                request_id,
                hex::encode(&prover.as_bytes()[..8])
            )),
        }
    }

    pub fn owner(&self) -> AccountAddress {
        match self {
            EscrowKind::ProverBond { prover } => *prover,
            EscrowKind::RequestStake { requester, .. } => *requester,
            EscrowKind::ProverStake { prover, .. } => *prover,
        }
    }
}

/// Lock metadata for tracking
#[derive(Debug, Clone)]
pub struct LockMetadata {
    pub kind: EscrowKind,
    pub amount: VeriAmount,
    pub owner: AccountAddress,
}

/// Named escrow locks layered over `BalanceManager`.
///
/// The balance layer tracks one aggregate locked amount per account; this
/// manager splits it into named locks so each request and each prover bond
/// can be settled independently.
pub struct EscrowManager {
    balances: Arc<BalanceManager>,
    locks: Arc<RwLock<HashMap<LockId, LockMetadata>>>,
}

impl EscrowManager {
    pub fn new(balances: Arc<BalanceManager>) -> Self {
        Self {
            balances,
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Lock funds from the owner's unlocked balance under a named lock.
    pub async fn lock(&self, kind: EscrowKind, amount: VeriAmount) -> Result<LockId> {
        let start = std::time::Instant::now();
        let lock_id = kind.to_lock_id();
        let owner = kind.owner();

        {
            let locks = self.locks.read().await;
            if locks.contains_key(&lock_id) {
                bail!("Lock already exists: {}", lock_id);
            }
        }

        self.balances.lock(owner, amount).await?;

        let mut locks = self.locks.write().await;
        locks.insert(
            lock_id.clone(),
            LockMetadata {
                kind: kind.clone(),
                amount,
                owner,
            },
        );

        info!(
            lock_id = %lock_id,
            owner = %owner,
            amount = amount.to_veri(),
            kind = ?kind,
            duration_ms = start.elapsed().as_millis() as u64,
            "💰 Escrow locked"
        );
        Ok(lock_id)
    }

    /// Grow an existing lock by locking more of the owner's funds.
    pub async fn lock_additional(&self, lock_id: &LockId, amount: VeriAmount) -> Result<()> {
        let mut locks = self.locks.write().await;
        let metadata = locks
            .get_mut(lock_id)
            .ok_or_else(|| anyhow::anyhow!("Lock not found: {}", lock_id))?;

        self.balances.lock(metadata.owner, amount).await?;
        metadata.amount = metadata.amount.saturating_add(amount);

        info!(
            lock_id = %lock_id,
            owner = %metadata.owner,
            added = amount.to_veri(),
            total = metadata.amount.to_veri(),
            "💰 Escrow lock increased"
        );
        Ok(())
    }

    /// Re-tag part of a lock under a new name, same owner. The balance-layer
    /// locked total is unchanged; only the named split moves.
    pub async fn transfer_locked(
        &self,
        from: &LockId,
        to_kind: EscrowKind,
        amount: VeriAmount,
    ) -> Result<LockId> {
        let mut locks = self.locks.write().await;

        let to_id = to_kind.to_lock_id();
        if locks.contains_key(&to_id) {
            bail!("Lock already exists: {}", to_id);
        }

        let source = locks
            .get_mut(from)
            .ok_or_else(|| anyhow::anyhow!("Lock not found: {}", from))?;

        if source.owner != to_kind.owner() {
            bail!(
                "Cannot move locked funds across owners: {} -> {}",
                source.owner,
                to_kind.owner()
            );
        }
        if source.amount < amount {
            bail!(
                "Lock {} holds {}, cannot re-tag {}",
                from,
                source.amount,
                amount
            );
        }

        source.amount = source.amount.saturating_sub(amount);
        let owner = source.owner;

        locks.insert(
            to_id.clone(),
            LockMetadata {
                kind: to_kind,
                amount,
                owner,
            },
        );

        info!(
            from_lock = %from,
            to_lock = %to_id,
            owner = %owner,
            amount = amount.to_veri(),
            "🔁 Escrow re-tagged"
        );
        Ok(to_id)
    }

    /// Close a lock and send its funds to `to`. When `to` is the owner the
    /// funds simply unlock in place.
    pub async fn release(
        &self,
        lock_id: &LockId,
        to: AccountAddress,
        reason: TransferReason,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        let metadata = {
            let mut locks = self.locks.write().await;
            locks
                .remove(lock_id)
                .ok_or_else(|| anyhow::anyhow!("Lock not found: {}", lock_id))?
        };

        self.balances.unlock(metadata.owner, metadata.amount).await?;
        if to != metadata.owner {
            self.balances
                .transfer(metadata.owner, to, metadata.amount, reason)
                .await?;
        }

        info!(
            lock_id = %lock_id,
            from = %metadata.owner,
            to = %to,
            amount = metadata.amount.to_veri(),
            reason = %reason,
            duration_ms = start.elapsed().as_millis() as u64,
            "💸 Escrow released"
        );
        Ok(())
    }

    /// Close a lock, returning the funds to the owner's unlocked balance.
    pub async fn refund(&self, lock_id: &LockId, reason: TransferReason) -> Result<()> {
        let start = std::time::Instant::now();
        let metadata = {
            let mut locks = self.locks.write().await;
            locks
                .remove(lock_id)
                .ok_or_else(|| anyhow::anyhow!("Lock not found: {}", lock_id))?
        };

        self.balances.unlock(metadata.owner, metadata.amount).await?;

        info!(
            lock_id = %lock_id,
            owner = %metadata.owner,
            amount = metadata.amount.to_veri(),
            reason = %reason,
            duration_ms = start.elapsed().as_millis() as u64,
            "🔄 Escrow refunded"
        );
        Ok(())
    }

    pub async fn get_lock(&self, lock_id: &LockId) -> Option<LockMetadata> {
        let locks = self.locks.read().await;
        locks.get(lock_id).cloned()
    }

    pub async fn lock_exists(&self, lock_id: &LockId) -> bool {
        let locks = self.locks.read().await;
        locks.contains_key(lock_id)
    }
}
