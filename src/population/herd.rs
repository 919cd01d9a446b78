//! In-memory herd of generated horses.

use chrono::Duration;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::PopulationProvider;
use crate::clock::Clock;
use crate::types::{ClassTier, Grade, Horse, HorseId, HorseStatus, RunRecord, RunningStyle};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HerdConfig {
    /// Number of horses generated at startup.
    pub size: usize,
    /// Horses at or above this fatigue are rested.
    pub fatigue_ceiling: u8,
    /// Minimum seconds between two runs of the same horse.
    pub min_rest_secs: i64,
    /// Fatigue removed per recovery step.
    pub recovery_step: u8,
    pub seed: Option<u64>,
}

impl Default for HerdConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            fatigue_ceiling: 80,
            min_rest_secs: 20,
            recovery_step: 5,
            seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

const NAME_PREFIXES: &[&str] = &[
    "Silver", "Midnight", "Storm", "Golden", "Lucky", "Royal", "Thunder", "Crimson", "Swift",
    "Iron", "Northern", "Desert", "Velvet", "Wild", "Shadow", "Morning",
];

const NAME_SUFFIXES: &[&str] = &[
    "Arrow", "Dancer", "Comet", "Spirit", "Legend", "Echo", "Breeze", "Crown", "Flame", "Runner",
    "Star", "Whisper", "Bolt", "Harbor", "Verse", "Glory",
];

fn generate_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefix = NAME_PREFIXES.choose(rng).copied().unwrap_or("Nameless");
    let suffix = NAME_SUFFIXES.choose(rng).copied().unwrap_or("Horse");
    format!("{prefix} {suffix}")
}

/// Class distribution: maiden 50%, 1-win 20%, 2-win 15%, 3-win 10%,
/// open 5%. Higher classes carry a speed bonus.
fn draw_class<R: Rng + ?Sized>(rng: &mut R) -> (ClassTier, u8) {
    let r: f64 = rng.gen();
    if r < 0.5 {
        (ClassTier::Maiden, 0)
    } else if r < 0.7 {
        (ClassTier::OneWin, 10)
    } else if r < 0.85 {
        (ClassTier::TwoWin, 20)
    } else if r < 0.95 {
        (ClassTier::ThreeWin, 30)
    } else {
        (ClassTier::Open, 40)
    }
}

fn generate_horse<R: Rng + ?Sized>(id: u32, rng: &mut R) -> Horse {
    let (class, speed_bonus) = draw_class(rng);
    let style = RunningStyle::ALL[rng.gen_range(0..RunningStyle::ALL.len())];
    Horse {
        id: HorseId(id),
        name: generate_name(rng),
        speed: (rng.gen_range(40..60) + speed_bonus).clamp(1, 100),
        stamina: rng.gen_range(40..100),
        acceleration: rng.gen_range(30..100),
        style,
        gate: rng.gen_range(20..100),
        condition: rng.gen_range(80..100),
        fatigue: 0,
        class,
        status: HorseStatus::Active,
        runs: 0,
        wins: 0,
        earnings: Decimal::ZERO,
        last_run: None,
    }
}

// ---------------------------------------------------------------------------
// Herd
// ---------------------------------------------------------------------------

pub struct Herd {
    config: HerdConfig,
    clock: Arc<dyn Clock>,
    horses: Mutex<Vec<Horse>>,
    rng: Mutex<StdRng>,
}

impl Herd {
    /// Generate `config.size` random horses.
    pub fn generate(config: HerdConfig, clock: Arc<dyn Clock>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let horses: Vec<Horse> = (1..=config.size as u32)
            .map(|id| generate_horse(id, &mut rng))
            .collect();
        info!(size = horses.len(), "Herd generated");
        Self {
            config,
            clock,
            horses: Mutex::new(horses),
            rng: Mutex::new(rng),
        }
    }

    /// Wrap an existing set of horses.
    pub fn from_horses(config: HerdConfig, clock: Arc<dyn Clock>, horses: Vec<Horse>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            clock,
            horses: Mutex::new(horses),
            rng: Mutex::new(rng),
        }
    }

    pub fn len(&self) -> usize {
        self.horses.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.horses.lock().is_empty()
    }

    pub fn get(&self, id: HorseId) -> Option<Horse> {
        self.horses.lock().iter().find(|h| h.id == id).cloned()
    }

    /// Copy of every horse.
    pub fn horses(&self) -> Vec<Horse> {
        self.horses.lock().clone()
    }

    /// Horse count per class tier.
    pub fn class_census(&self) -> Vec<(ClassTier, usize)> {
        let horses = self.horses.lock();
        [
            ClassTier::Debut,
            ClassTier::Maiden,
            ClassTier::OneWin,
            ClassTier::TwoWin,
            ClassTier::ThreeWin,
            ClassTier::Open,
        ]
        .into_iter()
        .map(|tier| (tier, horses.iter().filter(|h| h.class == tier).count()))
        .collect()
    }

    fn is_available(&self, horse: &Horse, class: ClassTier, grade: Grade) -> bool {
        let rested = match horse.last_run {
            Some(at) => self.clock.now() - at > Duration::seconds(self.config.min_rest_secs),
            None => true,
        };
        horse.is_active()
            && horse.fatigue < self.config.fatigue_ceiling
            && rested
            && horse.class.admits_into(class, grade)
    }
}

impl PopulationProvider for Herd {
    fn select_entrants(
        &self,
        class: ClassTier,
        grade: Grade,
        count: usize,
        exclude: &HashSet<HorseId>,
    ) -> Vec<Horse> {
        let mut eligible: Vec<Horse> = self
            .horses
            .lock()
            .iter()
            .filter(|h| !exclude.contains(&h.id) && self.is_available(h, class, grade))
            .cloned()
            .collect();

        eligible.shuffle(&mut *self.rng.lock());
        eligible.truncate(count);

        debug!(
            class = %class,
            grade = %grade,
            selected = eligible.len(),
            "Entrants selected"
        );
        eligible
    }

    fn recover_all(&self) {
        let step = self.config.recovery_step;
        let mut horses = self.horses.lock();
        let mut recovered = 0usize;
        for horse in horses.iter_mut().filter(|h| h.fatigue > 0) {
            horse.fatigue = horse.fatigue.saturating_sub(step);
            recovered += 1;
        }
        debug!(recovered, "Fatigue recovery step");
    }

    fn record_runs(&self, records: &[RunRecord]) {
        let mut horses = self.horses.lock();
        for record in records {
            if let Some(horse) = horses.iter_mut().find(|h| h.id == record.horse_id) {
                horse.apply_run(record);
                if record.won {
                    info!(
                        horse = %horse.name,
                        horse_id = %horse.id,
                        class = %horse.class,
                        wins = horse.wins,
                        "Winner promoted"
                    );
                }
            }
        }
    }
}
