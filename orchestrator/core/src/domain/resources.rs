// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Value Objects
//!
//! Three independently tracked dimensions (credits, tokens, wall-clock
//! duration) and the per-swarm allocation triple built on them.
//!
//! ## Invariant
//!
//! For every dimension: `available + reserved <= allocated`. `available` is
//! unsigned, so an over-debit can never be represented; callers must check with
//! [`ResourceAmount::first_shortfall`] before subtracting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three tracked resource dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceDimension {
    Credits,
    Tokens,
    Duration,
}

impl fmt::Display for ResourceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credits => write!(f, "credits"),
            Self::Tokens => write!(f, "tokens"),
            Self::Duration => write!(f, "duration_ms"),
        }
    }
}

/// A quantity across all three dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAmount {
    pub credits: u64,
    pub tokens: u64,
    pub duration_ms: u64,
}

impl ResourceAmount {
    pub const ZERO: Self = Self {
        credits: 0,
        tokens: 0,
        duration_ms: 0,
    };

    pub const fn new(credits: u64, tokens: u64, duration_ms: u64) -> Self {
        Self {
            credits,
            tokens,
            duration_ms,
        }
    }

    pub const fn credits(credits: u64) -> Self {
        Self::new(credits, 0, 0)
    }

    pub const fn tokens(tokens: u64) -> Self {
        Self::new(0, tokens, 0)
    }

    pub const fn duration_ms(duration_ms: u64) -> Self {
        Self::new(0, 0, duration_ms)
    }

    pub fn get(&self, dimension: ResourceDimension) -> u64 {
        match dimension {
            ResourceDimension::Credits => self.credits,
            ResourceDimension::Tokens => self.tokens,
            ResourceDimension::Duration => self.duration_ms,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// True when any dimension is zero.
    pub fn any_zero(&self) -> bool {
        self.credits == 0 || self.tokens == 0 || self.duration_ms == 0
    }

    /// First dimension (in credits, tokens, duration order) where `self`
    /// cannot cover `requested`, with the requested and held quantities.
    pub fn first_shortfall(&self, requested: &Self) -> Option<(ResourceDimension, u64, u64)> {
        [
            ResourceDimension::Credits,
            ResourceDimension::Tokens,
            ResourceDimension::Duration,
        ]
        .into_iter()
        .find(|d| requested.get(*d) > self.get(*d))
        .map(|d| (d, requested.get(d), self.get(d)))
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Self {
            credits: self.credits.checked_add(other.credits)?,
            tokens: self.tokens.checked_add(other.tokens)?,
            duration_ms: self.duration_ms.checked_add(other.duration_ms)?,
        })
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        Some(Self {
            credits: self.credits.checked_sub(other.credits)?,
            tokens: self.tokens.checked_sub(other.tokens)?,
            duration_ms: self.duration_ms.checked_sub(other.duration_ms)?,
        })
    }

    pub fn saturating_add(&self, other: &Self) -> Self {
        Self {
            credits: self.credits.saturating_add(other.credits),
            tokens: self.tokens.saturating_add(other.tokens),
            duration_ms: self.duration_ms.saturating_add(other.duration_ms),
        }
    }

    pub fn saturating_sub(&self, other: &Self) -> Self {
        Self {
            credits: self.credits.saturating_sub(other.credits),
            tokens: self.tokens.saturating_sub(other.tokens),
            duration_ms: self.duration_ms.saturating_sub(other.duration_ms),
        }
    }

    /// Component-wise `self <= other`.
    pub fn fits_within(&self, other: &Self) -> bool {
        self.credits <= other.credits
            && self.tokens <= other.tokens
            && self.duration_ms <= other.duration_ms
    }
}

/// Allocation triple held by the resource ledger for a single swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAllocation {
    pub allocated: ResourceAmount,
    pub available: ResourceAmount,
    pub reserved: ResourceAmount,
}

impl ResourceAllocation {
    /// Fresh allocation: everything available, nothing reserved.
    pub fn new(allocated: ResourceAmount) -> Self {
        Self {
            allocated,
            available: allocated,
            reserved: ResourceAmount::ZERO,
        }
    }

    /// `available + reserved <= allocated` on every dimension.
    pub fn is_consistent(&self) -> bool {
        self.available
            .checked_add(&self.reserved)
            .map(|held| held.fits_within(&self.allocated))
            .unwrap_or(false)
    }

    /// Quantity spent so far (`allocated - available - reserved`).
    pub fn consumed(&self) -> ResourceAmount {
        self.allocated
            .saturating_sub(&self.available)
            .saturating_sub(&self.reserved)
    }

    /// Fraction of `dimension` consumed, in `[0, 1]`. Zero allocations report 0.
    pub fn consumed_ratio(&self, dimension: ResourceDimension) -> f64 {
        let allocated = self.allocated.get(dimension);
        if allocated == 0 {
            return 0.0;
        }
        (self.consumed().get(dimension) as f64 / allocated as f64).clamp(0.0, 1.0)
    }

    /// Externally reported progress, `min(max(credits, time), 1) * 100`.
    pub fn progress_percent(&self) -> f64 {
        let credits = self.consumed_ratio(ResourceDimension::Credits);
        let time = self.consumed_ratio(ResourceDimension::Duration);
        credits.max(time).min(1.0) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_shortfall_reports_dimension() {
        let held = ResourceAmount::new(10, 100, 1_000);
        assert_eq!(held.first_shortfall(&ResourceAmount::new(5, 50, 500)), None);
        assert_eq!(
            held.first_shortfall(&ResourceAmount::tokens(101)),
            Some((ResourceDimension::Tokens, 101, 100))
        );
    }

    #[test]
    fn test_progress_uses_larger_ratio() {
        let mut allocation = ResourceAllocation::new(ResourceAmount::new(100, 10_000, 300_000));
        allocation.available = ResourceAmount::new(70, 10_000, 150_000);
        assert!(allocation.is_consistent());
        assert!((allocation.progress_percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_inconsistent_when_reserved_overflows() {
        let mut allocation = ResourceAllocation::new(ResourceAmount::credits(10));
        allocation.reserved = ResourceAmount::credits(1);
        assert!(!allocation.is_consistent());
    }
}
