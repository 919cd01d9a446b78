//! Shared types for the PADDOCK simulation.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that engine, market, population
//! and ledger modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identity of a horse within the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HorseId(pub u32);

impl fmt::Display for HorseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{:04}", self.0)
    }
}

/// Sequential race identity, unique for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RaceId(pub u64);

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Tactical archetype: where a horse wants to sit and when it kicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunningStyle {
    FrontRunner,
    PacePresser,
    Closer,
    DeepCloser,
}

impl RunningStyle {
    pub const ALL: &'static [RunningStyle] = &[
        RunningStyle::FrontRunner,
        RunningStyle::PacePresser,
        RunningStyle::Closer,
        RunningStyle::DeepCloser,
    ];

    /// Preferred rank fraction of the field (0 = leading, 1 = last).
    pub fn target_rank_fraction(&self) -> f64 {
        match self {
            RunningStyle::FrontRunner => 0.10,
            RunningStyle::PacePresser => 0.30,
            RunningStyle::Closer => 0.65,
            RunningStyle::DeepCloser => 0.85,
        }
    }
}

impl fmt::Display for RunningStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunningStyle::FrontRunner => write!(f, "Front-runner"),
            RunningStyle::PacePresser => write!(f, "Pace-presser"),
            RunningStyle::Closer => write!(f, "Closer"),
            RunningStyle::DeepCloser => write!(f, "Deep-closer"),
        }
    }
}

/// Competitive class. Winners are promoted one tier at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassTier {
    Debut,
    Maiden,
    OneWin,
    TwoWin,
    ThreeWin,
    Open,
}

impl ClassTier {
    /// The tier a winner moves up to. Open is the ceiling.
    pub fn promoted(&self) -> Self {
        match self {
            ClassTier::Debut | ClassTier::Maiden => ClassTier::OneWin,
            ClassTier::OneWin => ClassTier::TwoWin,
            ClassTier::TwoWin => ClassTier::ThreeWin,
            ClassTier::ThreeWin | ClassTier::Open => ClassTier::Open,
        }
    }

    /// Whether a horse of this class may run in a race of `race_class`/`grade`.
    ///
    /// Exact match, debut horses into maiden races, open horses into G1.
    pub fn admits_into(&self, race_class: ClassTier, grade: Grade) -> bool {
        *self == race_class
            || (*self == ClassTier::Debut && race_class == ClassTier::Maiden)
            || (*self == ClassTier::Open && grade == Grade::G1)
    }
}

impl fmt::Display for ClassTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassTier::Debut => write!(f, "Debut"),
            ClassTier::Maiden => write!(f, "Maiden"),
            ClassTier::OneWin => write!(f, "1-Win"),
            ClassTier::TwoWin => write!(f, "2-Win"),
            ClassTier::ThreeWin => write!(f, "3-Win"),
            ClassTier::Open => write!(f, "Open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    General,
    G3,
    G2,
    G1,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::General => write!(f, "General"),
            Grade::G3 => write!(f, "G3"),
            Grade::G2 => write!(f, "G2"),
            Grade::G1 => write!(f, "G1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Surface {
    Turf,
    Dirt,
    Steeplechase,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Turf => write!(f, "Turf"),
            Surface::Dirt => write!(f, "Dirt"),
            Surface::Steeplechase => write!(f, "Steeplechase"),
        }
    }
}

/// Race lifecycle. Finished is terminal for a race id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceState {
    AcceptingBets,
    Running,
    Finished,
}

impl fmt::Display for RaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceState::AcceptingBets => write!(f, "🟢 ACCEPTING BETS"),
            RaceState::Running => write!(f, "🟡 RUNNING"),
            RaceState::Finished => write!(f, "🏁 FINISHED"),
        }
    }
}

/// Wagering pool category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetCategory {
    Win,
    Place,
}

impl fmt::Display for BetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetCategory::Win => write!(f, "WIN"),
            BetCategory::Place => write!(f, "PLACE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorseStatus {
    Active,
    Retired,
}

// ---------------------------------------------------------------------------
// Horse
// ---------------------------------------------------------------------------

/// Added to a horse's fatigue for every race it runs.
pub const FATIGUE_PER_RUN: u8 = 30;
pub const MAX_FATIGUE: u8 = 100;

/// A racehorse. Attributes are on a 0–100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Horse {
    pub id: HorseId,
    pub name: String,
    pub speed: u8,
    pub stamina: u8,
    pub acceleration: u8,
    pub style: RunningStyle,
    /// Gate aptitude: higher means fewer slow starts.
    pub gate: u8,
    pub condition: u8,
    /// 0–100, 100 is exhausted.
    pub fatigue: u8,
    pub class: ClassTier,
    pub status: HorseStatus,
    pub runs: u32,
    pub wins: u32,
    pub earnings: Decimal,
    pub last_run: Option<DateTime<Utc>>,
}

impl fmt::Display for Horse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, {}) SPD {} STA {} ACC {} | fatigue {} | {}-{}",
            self.id,
            self.name,
            self.class,
            self.style,
            self.speed,
            self.stamina,
            self.acceleration,
            self.fatigue,
            self.wins,
            self.runs,
        )
    }
}

impl Horse {
    /// Market strength: speed-led blend of attributes, floored above zero.
    pub fn strength_score(&self) -> Decimal {
        let score = Decimal::from(self.speed) * dec!(0.6)
            + Decimal::from(self.stamina) * dec!(0.2)
            + Decimal::from(self.condition) * dec!(0.25)
            - Decimal::from(self.fatigue) * dec!(0.25);
        score.max(Decimal::ONE)
    }

    /// Acceleration normalised to [0, 1].
    pub fn accel_norm(&self) -> f64 {
        (self.acceleration as f64 / 100.0).clamp(0.0, 1.0)
    }

    /// Gate aptitude normalised to [0, 1].
    pub fn gate_norm(&self) -> f64 {
        (self.gate as f64 / 100.0).clamp(0.0, 1.0)
    }

    pub fn is_active(&self) -> bool {
        self.status == HorseStatus::Active
    }

    /// Apply the post-race bookkeeping for one run.
    pub fn apply_run(&mut self, record: &RunRecord) {
        self.fatigue = self.fatigue.saturating_add(FATIGUE_PER_RUN).min(MAX_FATIGUE);
        self.last_run = Some(record.ran_at);
        self.runs += 1;
        if record.won {
            self.wins += 1;
            self.earnings += record.prize;
            self.class = self.class.promoted();
        }
    }

    /// Helper to build a test horse with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: u32, style: RunningStyle) -> Self {
        Horse {
            id: HorseId(id),
            name: format!("Sample {id}"),
            speed: 60,
            stamina: 70,
            acceleration: 60,
            style,
            gate: 70,
            condition: 90,
            fatigue: 0,
            class: ClassTier::Maiden,
            status: HorseStatus::Active,
            runs: 0,
            wins: 0,
            earnings: Decimal::ZERO,
            last_run: None,
        }
    }
}

/// Outcome of one run, applied to both the race-scoped copy of a horse and
/// the population's canonical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub horse_id: HorseId,
    pub race_id: RaceId,
    pub won: bool,
    pub prize: Decimal,
    pub ran_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// A purchased wager held by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub race_id: RaceId,
    pub horse_id: HorseId,
    pub category: BetCategory,
    pub stake: Decimal,
    /// Odds at purchase until the pool locks, locked odds afterwards.
    pub odds: Decimal,
    pub settled: bool,
    pub payout: Decimal,
    pub purchased_at: DateTime<Utc>,
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ${:.0} @ {:.1}",
            self.race_id, self.category, self.horse_id, self.stake, self.odds,
        )?;
        if self.settled {
            write!(f, " → ${:.0}", self.payout)?;
        }
        Ok(())
    }
}

impl Ticket {
    pub fn is_winner(&self) -> bool {
        self.settled && self.payout > Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a ticket purchase or wager was refused. Nothing is mutated on refusal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PurchaseRejected {
    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Market closed for race {0}")]
    MarketClosed(RaceId),

    #[error("Unknown horse {horse_id} for race {race_id}")]
    UnknownHorse { race_id: RaceId, horse_id: HorseId },

    #[error("Stake must be positive, got ${0:.2}")]
    InvalidStake(Decimal),
}

/// Why a horse could not be entered into the next race.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("No scheduled race is open for entries")]
    NoScheduledRace,

    #[error("Betting is closed for race {0}")]
    BettingClosed(RaceId),

    #[error("Horse {horse_id} is already entered in race {race_id}")]
    AlreadyEntered { race_id: RaceId, horse_id: HorseId },

    #[error("Horse class {horse_class} is not eligible for a {race_class} {grade} race")]
    ClassMismatch {
        horse_class: ClassTier,
        race_class: ClassTier,
        grade: Grade,
    },

    #[error("Horse {0} is not active")]
    Inactive(HorseId),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
