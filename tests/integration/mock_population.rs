//! Mock population for integration testing.
//!
//! Provides a deterministic `PopulationProvider` that offers a fixed
//! stable of horses regardless of class, and records everything the
//! engine tells it. A `mockall` mock covers call-count contracts.

use chrono::{DateTime, Utc};
use mockall::mock;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use paddock::population::PopulationProvider;
use paddock::types::*;

/// Build a horse with sensible mid-range attributes.
pub fn make_horse(id: u32, style: RunningStyle, class: ClassTier) -> Horse {
    Horse {
        id: HorseId(id),
        name: format!("Mock {id}"),
        speed: 55 + (id % 5) as u8 * 5,
        stamina: 70,
        acceleration: 60,
        style,
        gate: 80,
        condition: 90,
        fatigue: 0,
        class,
        status: HorseStatus::Active,
        runs: 0,
        wins: 0,
        earnings: Decimal::ZERO,
        last_run: None,
    }
}

/// A deterministic in-memory population.
///
/// Every race gets the same stable (relabelled to the race's class), minus
/// any excluded ids, up to the requested count.
pub struct MockPopulation {
    horses: Mutex<Vec<Horse>>,
    recoveries: AtomicUsize,
    runs: Mutex<Vec<RunRecord>>,
}

impl MockPopulation {
    /// `n` horses cycling through every running style.
    pub fn new(n: u32) -> Self {
        let styles = RunningStyle::ALL;
        Self::with_horses(
            (1..=n)
                .map(|i| make_horse(i, styles[i as usize % styles.len()], ClassTier::Maiden))
                .collect(),
        )
    }

    pub fn with_horses(horses: Vec<Horse>) -> Self {
        Self {
            horses: Mutex::new(horses),
            recoveries: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn recoveries(&self) -> usize {
        self.recoveries.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().clone()
    }

    pub fn last_run_of(&self, id: HorseId) -> Option<DateTime<Utc>> {
        self.horses
            .lock()
            .iter()
            .find(|h| h.id == id)
            .and_then(|h| h.last_run)
    }
}

impl PopulationProvider for MockPopulation {
    fn select_entrants(
        &self,
        class: ClassTier,
        _grade: Grade,
        count: usize,
        exclude: &HashSet<HorseId>,
    ) -> Vec<Horse> {
        self.horses
            .lock()
            .iter()
            .filter(|h| !exclude.contains(&h.id))
            .take(count)
            .cloned()
            .map(|mut h| {
                h.class = class;
                h
            })
            .collect()
    }

    fn recover_all(&self) {
        self.recoveries.fetch_add(1, Ordering::SeqCst);
    }

    fn record_runs(&self, records: &[RunRecord]) {
        let mut horses = self.horses.lock();
        for record in records {
            if let Some(horse) = horses.iter_mut().find(|h| h.id == record.horse_id) {
                horse.apply_run(record);
            }
        }
        self.runs.lock().extend_from_slice(records);
    }
}

mock! {
    pub Provider {}

    impl PopulationProvider for Provider {
        fn select_entrants(
            &self,
            class: ClassTier,
            grade: Grade,
            count: usize,
            exclude: &HashSet<HorseId>,
        ) -> Vec<Horse>;
        fn recover_all(&self);
        fn record_runs(&self, records: &[RunRecord]);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use paddock::clock::ManualClock;
    use paddock::engine::{EngineConfig, RaceEngine};
    use paddock::events::EventBus;
    use std::sync::Arc;

    fn make_engine(provider: Arc<dyn PopulationProvider>) -> RaceEngine {
        RaceEngine::new(
            EngineConfig {
                seed: Some(11),
                ..Default::default()
            },
            provider,
            Arc::new(ManualClock::default()),
            Arc::new(EventBus::new()),
        )
    }

    #[test]
    fn test_mock_population_relabels_class() {
        let pop = MockPopulation::new(3);
        let horses = pop.select_entrants(ClassTier::Open, Grade::G1, 8, &HashSet::new());
        assert_eq!(horses.len(), 3);
        assert!(horses.iter().all(|h| h.class == ClassTier::Open));
    }

    #[test]
    fn test_engine_fills_card_and_recovers_on_schedule() {
        let mut provider = MockProvider::new();
        provider
            .expect_select_entrants()
            .withf(|_, _, count, _| *count == 8)
            .times(4)
            .returning(|class, _, _, _| vec![make_horse(1, RunningStyle::Closer, class)]);
        provider.expect_recover_all().times(1).return_const(());
        provider.expect_record_runs().never();

        let engine = make_engine(Arc::new(provider));
        // 100 ticks at 10 Hz: one recovery, still inside the voting window.
        for _ in 0..100 {
            engine.tick();
        }
    }

    #[test]
    fn test_engine_reports_one_winner_per_race() {
        let mut provider = MockProvider::new();
        provider
            .expect_select_entrants()
            .returning(|class, _, _, _| {
                vec![
                    make_horse(1, RunningStyle::FrontRunner, class),
                    make_horse(2, RunningStyle::DeepCloser, class),
                ]
            });
        provider.expect_recover_all().return_const(());
        provider
            .expect_record_runs()
            .withf(|records| {
                records.len() == 2 && records.iter().filter(|r| r.won).count() == 1
            })
            .times(1)
            .return_const(());

        let engine = make_engine(Arc::new(provider));
        for _ in 0..5_000 {
            engine.tick();
            if engine.current_race().state == RaceState::Finished {
                break;
            }
        }
        assert_eq!(engine.current_race().state, RaceState::Finished);
    }
}
