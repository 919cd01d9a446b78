//! Pari-mutuel wagering pools and the odds formula.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{BetCategory, HorseId};

/// House cut taken from every pool before payout.
pub const TAKEOUT: Decimal = dec!(0.25);
pub const MIN_ODDS: Decimal = dec!(1.1);
pub const MAX_ODDS: Decimal = dec!(200.0);
/// Returned for horses the market has never quoted.
pub const NO_QUOTE: Decimal = Decimal::ZERO;

/// Number of paying place positions for a field of `entrants`.
pub fn payable_slots(entrants: usize) -> usize {
    if entrants >= 8 {
        3
    } else if entrants >= 5 {
        2
    } else {
        1
    }
}

/// Odds for one horse given the pool's payable amount.
///
/// Zero stake quotes the maximum; a non-positive payable amount is treated
/// as one unit so odds never divide by zero.
pub fn compute_odds(payable: Decimal, stake: Decimal) -> Decimal {
    if stake <= Decimal::ZERO {
        return MAX_ODDS;
    }
    let payable = if payable <= Decimal::ZERO {
        Decimal::ONE
    } else {
        payable
    };
    (payable / stake).clamp(MIN_ODDS, MAX_ODDS).round_dp(1)
}

// ---------------------------------------------------------------------------
// Live pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WageringPool {
    category: BetCategory,
    /// Place pools split their payable amount across this many slots.
    slots: usize,
    stakes: BTreeMap<HorseId, Decimal>,
    total: Decimal,
    odds: BTreeMap<HorseId, Decimal>,
    locked: bool,
}

impl WageringPool {
    pub fn new(category: BetCategory, horses: &[HorseId], field_size: usize) -> Self {
        let slots = match category {
            BetCategory::Win => 1,
            BetCategory::Place => payable_slots(field_size),
        };
        let stakes: BTreeMap<HorseId, Decimal> =
            horses.iter().map(|id| (*id, Decimal::ZERO)).collect();
        let mut pool = Self {
            category,
            slots,
            stakes,
            total: Decimal::ZERO,
            odds: BTreeMap::new(),
            locked: false,
        };
        pool.recompute();
        pool
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn contains(&self, horse_id: HorseId) -> bool {
        self.stakes.contains_key(&horse_id)
    }

    pub fn odds(&self, horse_id: HorseId) -> Decimal {
        self.odds.get(&horse_id).copied().unwrap_or(NO_QUOTE)
    }

    /// Add stake without recomputing. Returns false for unknown horses or a
    /// locked pool.
    pub fn add_stake(&mut self, horse_id: HorseId, amount: Decimal) -> bool {
        if self.locked {
            return false;
        }
        match self.stakes.get_mut(&horse_id) {
            Some(stake) => {
                *stake += amount;
                self.total += amount;
                true
            }
            None => false,
        }
    }

    pub fn recompute(&mut self) {
        let payable = self.total * (Decimal::ONE - TAKEOUT) / Decimal::from(self.slots.max(1));
        self.odds = self
            .stakes
            .iter()
            .map(|(id, stake)| (*id, compute_odds(payable, *stake)))
            .collect();
    }

    /// Freeze the pool. Only the first call yields a snapshot.
    pub fn lock(&mut self) -> Option<LockedPool> {
        if self.locked {
            return None;
        }
        self.locked = true;
        Some(LockedPool {
            category: self.category,
            total: self.total,
            stakes: self.stakes.clone(),
            odds: self.odds.clone(),
        })
    }

    pub fn quotes(&self) -> Vec<RunnerQuote> {
        self.stakes
            .iter()
            .map(|(id, stake)| RunnerQuote {
                horse_id: *id,
                stake: *stake,
                odds: self.odds(*id),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Locked snapshot
// ---------------------------------------------------------------------------

/// Pool state frozen at the off. Settlement reads only this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockedPool {
    pub category: BetCategory,
    pub total: Decimal,
    pub stakes: BTreeMap<HorseId, Decimal>,
    pub odds: BTreeMap<HorseId, Decimal>,
}

impl LockedPool {
    pub fn odds(&self, horse_id: HorseId) -> Decimal {
        self.odds.get(&horse_id).copied().unwrap_or(NO_QUOTE)
    }

    pub fn stake(&self, horse_id: HorseId) -> Decimal {
        self.stakes.get(&horse_id).copied().unwrap_or(Decimal::ZERO)
    }

    /// What the pool owes backers of `horse_id` if it pays.
    pub fn liability(&self, horse_id: HorseId) -> Decimal {
        self.stake(horse_id) * self.odds(horse_id)
    }

    pub fn quotes(&self) -> Vec<RunnerQuote> {
        self.stakes
            .iter()
            .map(|(id, stake)| RunnerQuote {
                horse_id: *id,
                stake: *stake,
                odds: self.odds(*id),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerQuote {
    pub horse_id: HorseId,
    pub stake: Decimal,
    pub odds: Decimal,
}
