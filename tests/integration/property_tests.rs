//! Property-based tests for the odds math and race invariants.
//!
//! These tests verify invariants hold under random inputs.

use paddock::engine::{EngineConfig, RaceEngine};
use paddock::clock::ManualClock;
use paddock::events::EventBus;
use paddock::market::pool::WageringPool;
use paddock::market::{compute_odds, payable_slots, MAX_ODDS, MIN_ODDS};
use paddock::types::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::mock_population::MockPopulation;

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.00 to $1,000,000
}

fn stakes_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..5_000_000i64, 1..14)
}

proptest! {
    /// Odds never leave [1.1, 200.0].
    #[test]
    fn odds_within_bounds(payable in amount_strategy(), stake in amount_strategy()) {
        let odds = compute_odds(payable, stake);
        prop_assert!(odds >= MIN_ODDS && odds <= MAX_ODDS, "odds {} out of range", odds);
        prop_assert_eq!(odds, odds.round_dp(1));
    }

    /// More money on a horse never lengthens its odds.
    #[test]
    fn odds_shorten_with_stake(payable in amount_strategy(), stake in 1i64..1_000_000i64, extra in 0i64..1_000_000i64) {
        let a = compute_odds(payable, Decimal::from(stake));
        let b = compute_odds(payable, Decimal::from(stake + extra));
        prop_assert!(b <= a);
    }

    /// Every quote of a live pool respects the bounds, whatever the stakes.
    #[test]
    fn pool_quotes_within_bounds(stakes in stakes_strategy(), place in any::<bool>()) {
        let ids: Vec<HorseId> = (1..=stakes.len() as u32).map(HorseId).collect();
        let category = if place { BetCategory::Place } else { BetCategory::Win };
        let mut pool = WageringPool::new(category, &ids, ids.len());
        for (id, stake) in ids.iter().zip(&stakes) {
            prop_assert!(pool.add_stake(*id, Decimal::from(*stake)));
        }
        pool.recompute();

        let total: Decimal = stakes.iter().map(|s| Decimal::from(*s)).sum();
        prop_assert_eq!(pool.total(), total);
        for quote in pool.quotes() {
            prop_assert!(quote.odds >= MIN_ODDS && quote.odds <= MAX_ODDS);
            if quote.stake.is_zero() {
                prop_assert_eq!(quote.odds, MAX_ODDS);
            }
        }
    }

    /// Payable place slots never exceed the field and never drop below one.
    #[test]
    fn payable_slots_bounded(entrants in 0usize..40) {
        let slots = payable_slots(entrants);
        prop_assert!((1..=3).contains(&slots));
        if entrants > 0 {
            prop_assert!(slots <= entrants);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Progress is monotone and bounded, and every runner finishes exactly
    /// once, for any seed and field size.
    #[test]
    fn race_progress_invariants(seed in any::<u64>(), field in 1u32..=10) {
        let engine = RaceEngine::new(
            EngineConfig { seed: Some(seed), voting_secs: 1, ..Default::default() },
            Arc::new(MockPopulation::new(field)),
            Arc::new(ManualClock::default()),
            Arc::new(EventBus::new()),
        );

        let mut last = vec![0.0f64; field.min(8) as usize];
        let mut finished = false;
        for _ in 0..5_000 {
            engine.tick();
            let race = engine.current_race();
            for (slot, e) in race.entrants.iter().enumerate() {
                prop_assert!(e.progress >= last[slot]);
                prop_assert!((0.0..=1.0).contains(&e.progress));
                prop_assert!((0.0..=1.0).contains(&e.stamina));
                last[slot] = e.progress;
            }
            if race.state == RaceState::Finished {
                let mut ids = race.finish_order.clone();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), race.entrants.len());
                prop_assert_eq!(race.finish_order.len(), race.entrants.len());
                finished = true;
                break;
            }
        }
        prop_assert!(finished);
    }
}
