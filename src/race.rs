//! Race model: conditions, entrants with their per-race simulation record,
//! and the read-only snapshots handed to observers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ClassTier, Grade, Horse, HorseId, RaceId, RaceState, RunRecord, Surface};

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Everything that describes a race before anyone runs in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceConditions {
    pub name: String,
    pub class: ClassTier,
    pub grade: Grade,
    pub surface: Surface,
    pub distance_m: u32,
}

impl fmt::Display for RaceConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}m, {})",
            self.name, self.surface, self.distance_m, self.class
        )
    }
}

// ---------------------------------------------------------------------------
// Simulation record
// ---------------------------------------------------------------------------

/// Per-entrant kinematic state, owned by the race for its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Fraction of the distance covered, in [0, 1].
    pub progress: f64,
    /// Lane position across the track, in [0.08, 0.92].
    pub lateral: f64,
    /// Current speed in game metres per second.
    pub speed: f64,
    /// Remaining stamina reserve, in [0, 1].
    pub stamina: f64,
    pub start_delay_ticks: u32,
    pub failed_kick: bool,
}

impl SimState {
    pub fn has_finished(&self) -> bool {
        self.progress >= 1.0
    }

    /// Metres covered given the race distance.
    pub fn distance_covered(&self, distance_m: f64) -> f64 {
        self.progress.clamp(0.0, 1.0) * distance_m
    }
}

/// One slot in the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entrant {
    pub horse: Horse,
    pub sim: SimState,
}

// ---------------------------------------------------------------------------
// Race
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Race {
    pub id: RaceId,
    pub conditions: RaceConditions,
    pub state: RaceState,
    pub entrants: Vec<Entrant>,
    pub finish_order: Vec<HorseId>,
}

impl Race {
    pub fn new(id: RaceId, conditions: RaceConditions) -> Self {
        Self {
            id,
            conditions,
            state: RaceState::AcceptingBets,
            entrants: Vec::new(),
            finish_order: Vec::new(),
        }
    }

    pub fn field_size(&self) -> usize {
        self.entrants.len()
    }

    pub fn contains(&self, horse_id: HorseId) -> bool {
        self.entrants.iter().any(|e| e.horse.id == horse_id)
    }

    /// True once every entrant has crossed the line. An empty field counts
    /// as finished.
    pub fn all_finished(&self) -> bool {
        self.entrants.iter().all(|e| e.sim.has_finished())
    }

    /// Append a finisher. Returns false if it was already recorded.
    pub fn record_finish(&mut self, horse_id: HorseId) -> bool {
        if self.finish_order.contains(&horse_id) {
            return false;
        }
        self.finish_order.push(horse_id);
        true
    }

    pub fn winner(&self) -> Option<HorseId> {
        self.finish_order.first().copied()
    }

    /// Apply post-race records to the race-scoped horse copies.
    pub fn apply_runs(&mut self, records: &[RunRecord]) {
        for record in records {
            if let Some(entrant) = self
                .entrants
                .iter_mut()
                .find(|e| e.horse.id == record.horse_id)
            {
                entrant.horse.apply_run(record);
            }
        }
    }

    pub fn snapshot(&self, voting_seconds_left: u32) -> RaceSnapshot {
        RaceSnapshot {
            id: self.id,
            conditions: self.conditions.clone(),
            state: self.state,
            voting_seconds_left,
            entrants: self
                .entrants
                .iter()
                .map(|e| EntrantSnapshot {
                    horse: e.horse.clone(),
                    progress: e.sim.progress,
                    lateral: e.sim.lateral,
                    speed: e.sim.speed,
                    stamina: e.sim.stamina,
                    start_delay_ticks: e.sim.start_delay_ticks,
                })
                .collect(),
            finish_order: self.finish_order.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Owned, read-only copy of a race for observers and event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub id: RaceId,
    pub conditions: RaceConditions,
    pub state: RaceState,
    pub voting_seconds_left: u32,
    pub entrants: Vec<EntrantSnapshot>,
    pub finish_order: Vec<HorseId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrantSnapshot {
    pub horse: Horse,
    pub progress: f64,
    pub lateral: f64,
    pub speed: f64,
    pub stamina: f64,
    pub start_delay_ticks: u32,
}

impl RaceSnapshot {
    pub fn horses(&self) -> impl Iterator<Item = &Horse> {
        self.entrants.iter().map(|e| &e.horse)
    }

    pub fn horse_ids(&self) -> Vec<HorseId> {
        self.entrants.iter().map(|e| e.horse.id).collect()
    }

    pub fn winner(&self) -> Option<HorseId> {
        self.finish_order.first().copied()
    }

    /// Position in the finish order (0 = winner), if the horse has finished.
    pub fn finishing_position(&self, horse_id: HorseId) -> Option<usize> {
        self.finish_order.iter().position(|id| *id == horse_id)
    }

    pub fn leader(&self) -> Option<&EntrantSnapshot> {
        self.entrants
            .iter()
            .max_by(|a, b| a.progress.total_cmp(&b.progress))
    }
}
