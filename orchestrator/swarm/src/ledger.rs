// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Ledger
//!
//! Per-swarm `allocated / available / reserved` accounting across credits,
//! tokens and wall-clock duration.
//!
//! Every mutation computes the next allocation from the current one and only
//! stores it when the whole triple is valid, so a rejected operation leaves the
//! account exactly as it was. Accounts are locked individually; operations on
//! different swarms never contend.
//!
//! The ledger only accounts. Low-resource signalling belongs to whoever watches
//! the snapshots.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use hive_core::domain::resources::{ResourceAllocation, ResourceAmount, ResourceDimension};
use hive_core::domain::swarm::SwarmId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Insufficient {dimension}: requested {requested}, available {available}")]
    InsufficientResources {
        dimension: ResourceDimension,
        requested: u64,
        available: u64,
    },

    #[error("Insufficient reserved {dimension}: requested {requested}, reserved {reserved}")]
    InsufficientReserved {
        dimension: ResourceDimension,
        requested: u64,
        reserved: u64,
    },

    #[error("Crediting {dimension} would exceed the allocation")]
    ExcessCredit { dimension: ResourceDimension },

    #[error("No ledger account for swarm {0}")]
    UnknownAccount(SwarmId),

    #[error("Ledger account already open for swarm {0}")]
    AccountExists(SwarmId),
}

impl LedgerError {
    /// True for the resource-exhaustion family of failures.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::InsufficientResources { .. })
    }
}

#[derive(Debug, Default)]
pub struct ResourceLedger {
    accounts: DashMap<SwarmId, Arc<Mutex<ResourceAllocation>>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(
        &self,
        swarm_id: SwarmId,
        allocated: ResourceAmount,
    ) -> Result<ResourceAllocation, LedgerError> {
        use dashmap::mapref::entry::Entry;

        match self.accounts.entry(swarm_id) {
            Entry::Occupied(_) => Err(LedgerError::AccountExists(swarm_id)),
            Entry::Vacant(slot) => {
                let allocation = ResourceAllocation::new(allocated);
                slot.insert(Arc::new(Mutex::new(allocation)));
                debug!(swarm_id = %swarm_id, ?allocated, "Opened ledger account");
                Ok(allocation)
            }
        }
    }

    /// Remove an account, returning its final state. Closing twice is a no-op.
    pub fn close_account(&self, swarm_id: SwarmId) -> Option<ResourceAllocation> {
        self.accounts
            .remove(&swarm_id)
            .map(|(_, account)| *account.lock())
    }

    pub fn snapshot(&self, swarm_id: SwarmId) -> Option<ResourceAllocation> {
        self.account(swarm_id).ok().map(|account| *account.lock())
    }

    /// Consume `amount` from the available pool.
    pub fn debit(
        &self,
        swarm_id: SwarmId,
        amount: ResourceAmount,
    ) -> Result<ResourceAllocation, LedgerError> {
        self.apply(swarm_id, |current| {
            let available = take(&current.available, &amount, |dimension, requested, available| {
                LedgerError::InsufficientResources {
                    dimension,
                    requested,
                    available,
                }
            })?;
            Ok(ResourceAllocation {
                available,
                ..*current
            })
        })
    }

    /// Return `amount` to the available pool (refunds, corrections).
    pub fn credit(
        &self,
        swarm_id: SwarmId,
        amount: ResourceAmount,
    ) -> Result<ResourceAllocation, LedgerError> {
        self.apply(swarm_id, |current| {
            let next = current
                .available
                .checked_add(&amount)
                .map(|available| ResourceAllocation {
                    available,
                    ..*current
                });
            match next {
                Some(next) if next.is_consistent() => Ok(next),
                _ => Err(LedgerError::ExcessCredit {
                    dimension: excess_dimension(current, &amount),
                }),
            }
        })
    }

    /// Move `amount` from available to reserved.
    pub fn reserve(
        &self,
        swarm_id: SwarmId,
        amount: ResourceAmount,
    ) -> Result<ResourceAllocation, LedgerError> {
        self.apply(swarm_id, |current| {
            let available = take(&current.available, &amount, |dimension, requested, available| {
                LedgerError::InsufficientResources {
                    dimension,
                    requested,
                    available,
                }
            })?;
            Ok(ResourceAllocation {
                available,
                reserved: current.reserved.saturating_add(&amount),
                ..*current
            })
        })
    }

    /// Move `amount` from reserved back to available.
    pub fn release(
        &self,
        swarm_id: SwarmId,
        amount: ResourceAmount,
    ) -> Result<ResourceAllocation, LedgerError> {
        self.apply(swarm_id, |current| {
            let reserved = take_reserved(current, &amount)?;
            Ok(ResourceAllocation {
                available: current.available.saturating_add(&amount),
                reserved,
                ..*current
            })
        })
    }

    /// Consume `amount` out of the reserved pool.
    pub fn commit_reserved(
        &self,
        swarm_id: SwarmId,
        amount: ResourceAmount,
    ) -> Result<ResourceAllocation, LedgerError> {
        self.apply(swarm_id, |current| {
            let reserved = take_reserved(current, &amount)?;
            Ok(ResourceAllocation {
                reserved,
                ..*current
            })
        })
    }

    pub fn consumed(&self, swarm_id: SwarmId) -> Option<ResourceAmount> {
        self.snapshot(swarm_id).map(|allocation| allocation.consumed())
    }

    fn account(&self, swarm_id: SwarmId) -> Result<Arc<Mutex<ResourceAllocation>>, LedgerError> {
        self.accounts
            .get(&swarm_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::UnknownAccount(swarm_id))
    }

    fn apply<F>(&self, swarm_id: SwarmId, op: F) -> Result<ResourceAllocation, LedgerError>
    where
        F: FnOnce(&ResourceAllocation) -> Result<ResourceAllocation, LedgerError>,
    {
        let account = self.account(swarm_id)?;
        let mut current = account.lock();
        let next = op(&current)?;
        debug_assert!(next.is_consistent());
        *current = next;
        Ok(next)
    }
}

fn take<E>(held: &ResourceAmount, amount: &ResourceAmount, err: E) -> Result<ResourceAmount, LedgerError>
where
    E: FnOnce(ResourceDimension, u64, u64) -> LedgerError,
{
    match held.first_shortfall(amount) {
        Some((dimension, requested, available)) => Err(err(dimension, requested, available)),
        None => Ok(held.saturating_sub(amount)),
    }
}

fn take_reserved(
    current: &ResourceAllocation,
    amount: &ResourceAmount,
) -> Result<ResourceAmount, LedgerError> {
    take(&current.reserved, amount, |dimension, requested, reserved| {
        LedgerError::InsufficientReserved {
            dimension,
            requested,
            reserved,
        }
    })
}

fn excess_dimension(current: &ResourceAllocation, amount: &ResourceAmount) -> ResourceDimension {
    [
        ResourceDimension::Credits,
        ResourceDimension::Tokens,
        ResourceDimension::Duration,
    ]
    .into_iter()
    .find(|d| {
        let held = current.available.get(*d) as u128
            + current.reserved.get(*d) as u128
            + amount.get(*d) as u128;
        held > current.allocated.get(*d) as u128
    })
    .unwrap_or(ResourceDimension::Credits)
}
