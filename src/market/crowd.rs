//! The simulated betting public: how big a race's market is and what the
//! crowd wagers each tick.

use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::{BetCategory, ClassTier, Grade, Horse, HorseId};

/// Share of synthetic wagers that go into the win pool.
const WIN_SHARE: f64 = 0.7;
const PICK_NOISE: f64 = 20.0;
const MIN_STAKE: Decimal = dec!(100);
const STAKE_STEP: Decimal = dec!(100);

/// Expected size of the betting public for a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarketScale {
    pub bettors: u32,
    pub bets_per_tick: u32,
    pub avg_stake: Decimal,
}

impl MarketScale {
    const fn new(bettors: u32, bets_per_tick: u32, avg_stake: Decimal) -> Self {
        Self {
            bettors,
            bets_per_tick,
            avg_stake,
        }
    }

    /// Graded races are sized by grade, everything else by class.
    pub fn for_race(class: ClassTier, grade: Grade) -> Self {
        match grade {
            Grade::G1 => Self::new(100_000, 500, dec!(2000)),
            Grade::G2 => Self::new(60_000, 300, dec!(1500)),
            Grade::G3 => Self::new(40_000, 200, dec!(1200)),
            Grade::General => match class {
                ClassTier::Open => Self::new(20_000, 120, dec!(1000)),
                ClassTier::ThreeWin => Self::new(10_000, 80, dec!(800)),
                ClassTier::TwoWin => Self::new(5_000, 40, dec!(600)),
                ClassTier::OneWin => Self::new(2_000, 20, dec!(400)),
                ClassTier::Maiden => Self::new(500, 6, dec!(300)),
                ClassTier::Debut => Self::new(200, 3, dec!(300)),
            },
        }
    }

    /// Money already in the pools when the market opens.
    pub fn opening_pool(&self, fraction: Decimal) -> Decimal {
        Decimal::from(self.bettors) * self.avg_stake * fraction
    }

    /// Wagers placed this tick: uniform in [max(1, rate/2), rate + rate/2].
    pub fn draw_wager_count<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.bets_per_tick == 0 {
            return 0;
        }
        let low = (self.bets_per_tick / 2).max(1);
        let high = self.bets_per_tick + self.bets_per_tick / 2;
        rng.gen_range(low..=high)
    }

    /// Stake for one synthetic wager, rounded to the nearest hundred.
    pub fn draw_stake<R: Rng + ?Sized>(&self, rng: &mut R) -> Decimal {
        let min = (self.avg_stake * dec!(0.4)).max(MIN_STAKE);
        let max = self.avg_stake * dec!(2.5);
        let u = Decimal::from_f64(rng.gen::<f64>()).unwrap_or(Decimal::ZERO);
        let amount = u * (max - min) + min;
        (amount / STAKE_STEP).round() * STAKE_STEP
    }
}

pub fn draw_category<R: Rng + ?Sized>(rng: &mut R) -> BetCategory {
    if rng.gen::<f64>() < WIN_SHARE {
        BetCategory::Win
    } else {
        BetCategory::Place
    }
}

/// Weighted pick: strength plus a little noise, so favourites draw most of
/// the money without monopolising it.
pub fn pick_horse<R: Rng + ?Sized>(horses: &[Horse], rng: &mut R) -> Option<HorseId> {
    let last = horses.last()?;
    let weights: Vec<Decimal> = horses
        .iter()
        .map(|h| {
            let noise = Decimal::from_f64(rng.gen::<f64>() * PICK_NOISE).unwrap_or(Decimal::ZERO);
            h.strength_score() + noise
        })
        .collect();
    let total: Decimal = weights.iter().copied().sum();
    let draw = Decimal::from_f64(rng.gen::<f64>()).unwrap_or(Decimal::ZERO) * total;

    let mut cumulative = Decimal::ZERO;
    for (horse, weight) in horses.iter().zip(weights) {
        cumulative += weight;
        if draw <= cumulative {
            return Some(horse.id);
        }
    }
    Some(last.id)
}

/// Each horse's share of an opening pool, proportional to strength. Every
/// horse gets at least one unit when there is money to split.
pub fn opening_shares(horses: &[Horse], pool: Decimal) -> Vec<(HorseId, Decimal)> {
    if pool <= Decimal::ZERO {
        return horses.iter().map(|h| (h.id, Decimal::ZERO)).collect();
    }
    let weights: Vec<Decimal> = horses.iter().map(|h| h.strength_score()).collect();
    let mut total: Decimal = weights.iter().copied().sum();
    if total <= Decimal::ZERO {
        total = Decimal::ONE;
    }
    horses
        .iter()
        .zip(weights)
        .map(|(h, w)| (h.id, (pool * w / total).max(Decimal::ONE)))
        .collect()
}
