//! End-to-end race scenarios.
//!
//! Drives a full `Paddock` (engine, market and wallet on one bus) tick by
//! tick with a manual clock, and checks the lifecycle, market and payout
//! contracts from the outside.

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    use crate::mock_population::{make_horse, MockPopulation};
    use paddock::app::Paddock;
    use paddock::clock::{Clock, ManualClock};
    use paddock::engine::EngineConfig;
    use paddock::events::EventCollector;
    use paddock::ledger::WalletConfig;
    use paddock::market::{MarketConfig, MAX_ODDS, MIN_ODDS};
    use paddock::population::{Herd, HerdConfig, PopulationProvider};
    use paddock::types::*;

    fn engine_config(voting_secs: u32) -> EngineConfig {
        EngineConfig {
            seed: Some(7),
            voting_secs,
            ..Default::default()
        }
    }

    fn market_config() -> MarketConfig {
        MarketConfig {
            seed: Some(7),
            ..Default::default()
        }
    }

    fn make_paddock(
        population: Arc<dyn PopulationProvider>,
        engine: EngineConfig,
        market: MarketConfig,
    ) -> (Paddock, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let paddock = Paddock::with_configs(
            engine,
            market,
            WalletConfig::default(),
            population,
            clock.clone(),
        );
        (paddock, clock)
    }

    /// Tick until the current race reaches `state`. Returns ticks taken.
    fn run_until(paddock: &Paddock, state: RaceState) -> u32 {
        for i in 1..=10_000 {
            paddock.engine_tick();
            if paddock.current_race().state == state {
                return i;
            }
        }
        panic!("race never reached {state}");
    }

    // -- Lifecycle ---------------------------------------------------------

    #[test]
    fn test_single_entrant_race_off_at_tick_200() {
        let pop = Arc::new(MockPopulation::new(1));
        let (paddock, clock) = make_paddock(pop.clone(), engine_config(20), market_config());
        paddock.start();

        for _ in 0..199 {
            paddock.engine_tick();
        }
        assert_eq!(paddock.current_race().state, RaceState::AcceptingBets);
        paddock.engine_tick();
        assert_eq!(paddock.current_race().state, RaceState::Running);
        assert_eq!(pop.recoveries(), 2);

        run_until(&paddock, RaceState::Finished);
        let race = paddock.current_race();
        assert_eq!(race.finish_order, vec![HorseId(1)]);
        assert_eq!(pop.last_run_of(HorseId(1)), Some(clock.now()));

        let runs = pop.runs();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].won);
    }

    #[test]
    fn test_event_sequence_for_one_race() {
        let pop = Arc::new(MockPopulation::new(4));
        let (mut paddock, _) = make_paddock(pop, engine_config(1), market_config());
        let collector = Arc::new(EventCollector::new());
        paddock.subscribe(collector.clone());
        paddock.start();

        run_until(&paddock, RaceState::Finished);
        let kinds: Vec<&str> = collector
            .kinds()
            .into_iter()
            .filter(|k| *k != "voting_countdown")
            .collect();
        // The market announces the lock while the state change is being
        // delivered, so the collector (subscribed last) sees it first.
        assert_eq!(
            kinds,
            vec![
                "race_switched",
                "betting_locked",
                "state_changed",
                "state_changed",
                "race_finished"
            ]
        );
    }

    #[test]
    fn test_rotation_reseeds_market() {
        let pop = Arc::new(MockPopulation::new(24));
        let (paddock, _) = make_paddock(pop, engine_config(1), market_config());
        paddock.start();

        let first = paddock.current_race();
        run_until(&paddock, RaceState::Finished);
        run_until(&paddock, RaceState::AcceptingBets);

        let current = paddock.current_race();
        assert_ne!(current.id, first.id);
        assert!(current.horse_ids().iter().all(|id| !first.horse_ids().contains(id)));
        let market = paddock.market_snapshot();
        assert_eq!(market.race_id, Some(current.id));
        assert!(!market.locked);
        assert_eq!(market.win.runners.len(), 8);
        assert_eq!(paddock.market().settlements()[0].race_id, first.id);
    }

    #[test]
    fn test_registered_horse_runs_in_next_race() {
        let pop = Arc::new(MockPopulation::new(3));
        let (paddock, _) = make_paddock(pop, engine_config(1), market_config());
        paddock.start();

        let next = paddock.upcoming_races().remove(0);
        let horse = make_horse(50, RunningStyle::PacePresser, next.conditions.class);
        let reg = assert_ok!(paddock.register_entrant(horse.clone()));
        assert_eq!(reg.race_id, next.id);
        assert_eq!(reg.displaced, None);
        assert_err!(paddock.register_entrant(horse));

        run_until(&paddock, RaceState::Finished);
        run_until(&paddock, RaceState::AcceptingBets);
        assert_eq!(paddock.current_race().id, next.id);
        assert!(paddock
            .market_snapshot()
            .win
            .runners
            .iter()
            .any(|q| q.horse_id == HorseId(50)));
    }

    // -- Market ------------------------------------------------------------

    #[test]
    fn test_unbacked_horse_locks_at_max_odds() {
        let pop = Arc::new(MockPopulation::new(4));
        let market = MarketConfig {
            opening_pool_fraction: Decimal::ZERO,
            ..market_config()
        };
        let (paddock, _) = make_paddock(pop, engine_config(20), market);
        paddock.start();
        let race_id = paddock.current_race().id;

        assert_ok!(paddock.purchase_ticket(race_id, HorseId(1), BetCategory::Win, dec!(1000)));
        let err = paddock
            .purchase_ticket(race_id, HorseId(2), BetCategory::Win, Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err, PurchaseRejected::InvalidStake(Decimal::ZERO));

        run_until(&paddock, RaceState::Running);
        let market = paddock.market();
        assert_eq!(market.locked_odds(race_id, HorseId(2), BetCategory::Win), dec!(200.0));
        assert_eq!(market.locked_odds(race_id, HorseId(1), BetCategory::Win), MIN_ODDS);
        assert_eq!(market.locked_odds(race_id, HorseId(3), BetCategory::Place), MAX_ODDS);
    }

    #[test]
    fn test_wager_after_lock_is_market_closed() {
        let pop = Arc::new(MockPopulation::new(8));
        let (paddock, _) = make_paddock(pop, engine_config(1), market_config());
        paddock.start();
        let race_id = paddock.current_race().id;
        paddock.market_tick();

        run_until(&paddock, RaceState::Running);
        let before = paddock.market_snapshot();
        let balance = paddock.wallet().balance();

        let err = paddock
            .purchase_ticket(race_id, HorseId(3), BetCategory::Place, dec!(500))
            .unwrap_err();
        assert_eq!(err, PurchaseRejected::MarketClosed(race_id));
        assert_eq!(paddock.market_tick(), 0);

        let after = paddock.market_snapshot();
        assert_eq!(before.win.runners, after.win.runners);
        assert_eq!(before.place.runners, after.place.runners);
        assert_eq!(paddock.wallet().balance(), balance);
        assert!(paddock.wallet().tickets().is_empty());
    }

    #[test]
    fn test_second_lock_is_noop() {
        let pop = Arc::new(MockPopulation::new(6));
        let (mut paddock, _) = make_paddock(pop, engine_config(1), market_config());
        let collector = Arc::new(EventCollector::new());
        paddock.subscribe(collector.clone());
        paddock.start();
        let race_id = paddock.current_race().id;

        run_until(&paddock, RaceState::Running);
        let locked = paddock.market_snapshot();
        assert!(!paddock.market().close_betting(race_id));
        assert_eq!(collector.count("betting_locked"), 1);
        assert_eq!(paddock.market_snapshot().win.runners, locked.win.runners);

        run_until(&paddock, RaceState::Finished);
        let settlement = paddock.market().settlements()[0].clone();
        assert_eq!(settlement.win_sales, locked.win.total);
        assert_eq!(settlement.place_sales, locked.place.total);
    }

    // -- Payouts -----------------------------------------------------------

    #[test]
    fn test_win_ticket_pays_stake_times_locked_odds() {
        let pop = Arc::new(MockPopulation::new(8));
        let (paddock, _) = make_paddock(pop, engine_config(3), market_config());
        paddock.start();
        let race_id = paddock.current_race().id;

        let mut purchase_odds = HashMap::new();
        for id in 1..=8 {
            let ticket = assert_ok!(paddock.purchase_ticket(
                race_id,
                HorseId(id),
                BetCategory::Win,
                dec!(1000)
            ));
            purchase_odds.insert(ticket.horse_id, ticket.odds);
            // Crowd money between purchases keeps the odds moving.
            paddock.market_tick();
        }
        assert_eq!(paddock.wallet().balance(), dec!(992000));

        run_until(&paddock, RaceState::Running);
        let market = paddock.market();
        for ticket in paddock.wallet().tickets() {
            let locked = market.locked_odds(race_id, ticket.horse_id, BetCategory::Win);
            assert_eq!(ticket.odds, locked);
        }

        run_until(&paddock, RaceState::Finished);
        let race = paddock.current_race();
        let winner = race.winner().unwrap();
        let locked = market.locked_odds(race_id, winner, BetCategory::Win);

        let tickets = paddock.wallet().tickets();
        assert!(tickets.iter().all(|t| t.settled));
        let winners: Vec<&Ticket> = tickets.iter().filter(|t| t.is_winner()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].horse_id, winner);
        assert_eq!(winners[0].payout, dec!(1000) * locked);
        assert_eq!(paddock.wallet().balance(), dec!(992000) + dec!(1000) * locked);
    }

    #[test]
    fn test_place_tickets_pay_within_slots() {
        let pop = Arc::new(MockPopulation::new(8));
        let (paddock, _) = make_paddock(pop, engine_config(1), market_config());
        paddock.start();
        let race_id = paddock.current_race().id;
        for id in 1..=8 {
            assert_ok!(paddock.purchase_ticket(
                race_id,
                HorseId(id),
                BetCategory::Place,
                dec!(100)
            ));
        }

        run_until(&paddock, RaceState::Finished);
        let race = paddock.current_race();
        let paid: Vec<HorseId> = paddock
            .wallet()
            .tickets()
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.horse_id)
            .collect();
        assert_eq!(paid.len(), 3);
        for id in paid {
            assert!(race.finishing_position(id).unwrap() < 3);
        }

        let settlement = &paddock.market().settlements()[0];
        let expected: Decimal = race.finish_order[..3]
            .iter()
            .map(|id| {
                let stake = paddock
                    .market_snapshot()
                    .place
                    .runners
                    .iter()
                    .find(|q| q.horse_id == *id)
                    .map(|q| q.stake)
                    .unwrap();
                stake * paddock.market().locked_odds(race_id, *id, BetCategory::Place)
            })
            .sum();
        assert_eq!(settlement.place_payout, expected);
    }

    // -- Determinism ---------------------------------------------------------

    fn replay(seed: u64) -> (Vec<HorseId>, Vec<f64>, Decimal) {
        let pop = Arc::new(MockPopulation::new(8));
        let engine = EngineConfig {
            seed: Some(seed),
            voting_secs: 2,
            ..Default::default()
        };
        let market = MarketConfig {
            seed: Some(seed),
            ..Default::default()
        };
        let (paddock, _) = make_paddock(pop, engine, market);
        paddock.start();
        for i in 0..20 {
            paddock.engine_tick();
            if i % 10 == 0 {
                paddock.market_tick();
            }
        }
        run_until(&paddock, RaceState::Finished);
        let race = paddock.current_race();
        let lanes = race.entrants.iter().map(|e| e.lateral).collect();
        (race.finish_order, lanes, paddock.market().settlements()[0].total_sales())
    }

    #[test]
    fn test_same_seed_replays_identically() {
        let a = replay(99);
        let b = replay(99);
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 8);
    }

    // -- Multi-race run ------------------------------------------------------

    #[test]
    fn test_herd_card_runs_several_races() {
        let clock = Arc::new(ManualClock::default());
        let herd = Arc::new(Herd::generate(
            HerdConfig {
                size: 400,
                seed: Some(21),
                ..Default::default()
            },
            clock.clone(),
        ));
        let paddock = Paddock::with_configs(
            EngineConfig {
                seed: Some(21),
                voting_secs: 2,
                ..Default::default()
            },
            market_config(),
            WalletConfig::default(),
            herd.clone(),
            clock.clone(),
        );
        paddock.start();

        let mut last: HashMap<HorseId, f64> = HashMap::new();
        let mut race_id = paddock.current_race().id;
        for tick in 0..3_000u32 {
            clock.advance(Duration::milliseconds(100));
            paddock.engine_tick();
            if tick % 10 == 0 {
                paddock.market_tick();
            }

            let race = paddock.current_race();
            if race.id != race_id {
                race_id = race.id;
                last.clear();
            }
            for e in &race.entrants {
                let prev = last.insert(e.horse.id, e.progress).unwrap_or(0.0);
                assert!(e.progress >= prev, "progress went backwards");
                assert!((0.0..=1.0).contains(&e.progress));
            }
            let mut seen = race.finish_order.clone();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), race.finish_order.len());
        }

        let settlements = paddock.market().settlements();
        assert!(settlements.len() >= 2);
        assert!(settlements.windows(2).all(|w| w[0].race_id > w[1].race_id));
        assert!(herd.horses().iter().any(|h| h.runs > 0));
    }

    // -- Concurrency ---------------------------------------------------------

    #[test]
    fn test_concurrent_purchases_race_the_lock() {
        let pop = Arc::new(MockPopulation::new(8));
        let clock = Arc::new(ManualClock::default());
        let paddock = Paddock::with_configs(
            engine_config(1),
            market_config(),
            WalletConfig {
                starting_balance: dec!(1000000000),
            },
            pop,
            clock,
        );
        paddock.start();
        let race_id = paddock.current_race().id;
        let opening = paddock.market_snapshot().win.total;

        let outcomes: Vec<(usize, Vec<PurchaseRejected>)> = std::thread::scope(|s| {
            let buyers: Vec<_> = (0..4u32)
                .map(|n| {
                    let paddock = &paddock;
                    s.spawn(move || {
                        let mut accepted = 0;
                        let mut errors = Vec::new();
                        loop {
                            let horse = HorseId(n * 2 + 1);
                            match paddock.purchase_ticket(race_id, horse, BetCategory::Win, dec!(100))
                            {
                                Ok(_) => accepted += 1,
                                Err(e) => {
                                    errors.push(e);
                                    break;
                                }
                            }
                        }
                        (accepted, errors)
                    })
                })
                .collect();

            for _ in 0..10 {
                std::thread::sleep(std::time::Duration::from_millis(2));
                paddock.engine_tick();
            }
            buyers.into_iter().map(|b| b.join().unwrap()).collect()
        });

        assert_eq!(paddock.current_race().state, RaceState::Running);
        let accepted: usize = outcomes.iter().map(|(n, _)| n).sum();
        for (_, errors) in &outcomes {
            assert_eq!(errors, &vec![PurchaseRejected::MarketClosed(race_id)]);
        }

        // Every accepted stake is in the locked pool, nothing else is.
        let locked = paddock.market_snapshot();
        assert!(locked.locked);
        assert_eq!(locked.win.total, opening + Decimal::from(accepted as u64) * dec!(100));
        assert_eq!(paddock.wallet().tickets().len(), accepted);
        assert_eq!(
            paddock.wallet().balance(),
            dec!(1000000000) - Decimal::from(accepted as u64) * dec!(100)
        );
    }
}
