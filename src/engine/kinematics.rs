//! Per-horse motion model.
//!
//! Pure functions over a horse's attributes and its simulation record.
//! Field-dependent effects (lanes, blocking, drafting) live in
//! [`super::contention`].

use rand::Rng;

use crate::race::SimState;
use crate::types::{Horse, RunningStyle};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Real-world metres per second become game metres per second.
pub const GAME_SPEED: f64 = 5.5;
pub const START_SPEED_FRACTION: f64 = 0.6;

const ACCEL_COEFF_MIN: f64 = 0.6;
const ACCEL_COEFF_MAX: f64 = 1.4;
const SUSTAIN_ACCEL_MPS2: f64 = 4.0;
const CATCH_UP_ACCEL_MPS2: f64 = 6.0;
const START_BOOST: f64 = 1.3;
const START_BOOST_UNTIL: f64 = 0.08;

const STAMINA_DRAIN_PER_SEC: f64 = 0.012;
const KICK_DRAIN_PER_SEC: f64 = 0.06;

const FAILED_KICK_PROBABILITY: f64 = 0.35;

const DRAFT_RANGE_M: f64 = 7.0;
const DRAFT_BONUS: f64 = 0.03;
const COAST_LEAD_M: f64 = 8.0;
const COAST_UNTIL: f64 = 0.85;

// ---------------------------------------------------------------------------
// Speeds
// ---------------------------------------------------------------------------

/// Real-world cruise speed in m/s before multipliers.
pub fn real_cruise_speed(horse: &Horse, noise: f64) -> f64 {
    15.0 + horse.speed as f64 / 20.0 + noise
}

/// Noise-free cruise speed in game units, used for the start.
pub fn initial_cruise_speed(horse: &Horse) -> f64 {
    real_cruise_speed(horse, 0.0) * GAME_SPEED
}

/// Speed while still stuck in the gate. `remaining` is the delay counter
/// before this tick's decrement.
pub fn delayed_start_speed(horse: &Horse, remaining: u32) -> f64 {
    let slowdown = (1.0 - remaining as f64 * 0.03).clamp(0.5, 1.0);
    initial_cruise_speed(horse) * START_SPEED_FRACTION * slowdown
}

// ---------------------------------------------------------------------------
// Multipliers
// ---------------------------------------------------------------------------

/// Multiplier from the gap between preferred and current rank fraction,
/// bounded to ±4%.
pub fn position_factor(style: RunningStyle, rank_fraction: f64) -> f64 {
    1.0 + (style.target_rank_fraction() - rank_fraction).clamp(-0.5, 0.5) * 0.08
}

/// Result of evaluating a style's pace curve at one point in the race.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaceReading {
    pub multiplier: f64,
    /// Extra stamina cost from kicking before the natural kick point.
    pub kick_load: f64,
    pub kicking: bool,
}

/// Style-dependent pace multiplier at progress `p`.
///
/// Closers move their kick point earlier when they lack acceleration or
/// still have stamina in hand; doing so costs a kick load.
pub fn pace_curve(
    style: RunningStyle,
    p: f64,
    failed_kick: bool,
    accel: f64,
    stamina_left: f64,
) -> PaceReading {
    let p = p.clamp(0.0, 1.0);
    let mut kick_load = 0.0;
    let mut kicking = false;

    let multiplier = match style {
        RunningStyle::FrontRunner => {
            if p < 0.2 {
                1.08
            } else if p < 0.5 {
                1.02
            } else if p < 0.7 {
                0.98
            } else {
                0.92 - (p - 0.7) * 0.20
            }
        }
        RunningStyle::PacePresser => {
            if p < 0.2 {
                1.02
            } else if p < 0.7 {
                1.00
            } else {
                0.97 - (p - 0.7) * 0.10
            }
        }
        RunningStyle::Closer => {
            let base_kick = 0.60;
            let kick = (base_kick - (1.0 - accel) * 0.08 - (stamina_left - 0.5) * 0.08)
                .clamp(0.45, base_kick);
            if p >= kick && p < base_kick {
                kick_load = (base_kick - p) * (1.0 - accel);
            }
            kicking = p >= kick;
            if p < 0.35 {
                0.95
            } else if p < kick {
                1.00
            } else if p < 0.82 {
                1.08
            } else {
                1.03
            }
        }
        RunningStyle::DeepCloser => {
            let base_kick = 0.70;
            let kick = (base_kick - (1.0 - accel) * 0.10 - (stamina_left - 0.5) * 0.08)
                .clamp(0.55, base_kick);
            if failed_kick {
                if p < 0.6 {
                    0.90
                } else if p < 0.85 {
                    0.98
                } else {
                    0.94
                }
            } else {
                if p >= kick && p < base_kick {
                    kick_load = (base_kick - p) * (1.0 - accel);
                }
                kicking = p >= kick;
                if p < 0.5 {
                    0.88
                } else if p < kick {
                    0.98
                } else if p < 0.85 {
                    1.14
                } else {
                    1.06
                }
            }
        }
    };

    PaceReading {
        multiplier: multiplier.clamp(0.75, 1.20),
        kick_load,
        kicking,
    }
}

fn stamina_quality(stamina_attr: u8) -> f64 {
    (stamina_attr as f64 / 100.0).clamp(0.4, 1.2)
}

/// Late-race fade from limited stamina, worsened by an early kick and by
/// an emptying reserve.
pub fn stamina_factor(stamina_attr: u8, p: f64, kick_load: f64, stamina_left: f64) -> f64 {
    let quality = stamina_quality(stamina_attr);
    let fade = p.clamp(0.0, 1.0).powf(1.6);
    let early_cost = 1.0 + kick_load.clamp(0.0, 0.25);
    let base = 1.0 - (1.0 - quality) * fade * 0.35 * early_cost;
    let cap = 0.75 + stamina_left * 0.25;
    (base * cap).clamp(0.70, 1.05)
}

/// Slipstream bonus for sitting close behind another runner.
pub fn drafting_factor(gap_m: f64) -> f64 {
    if gap_m > 0.0 && gap_m < DRAFT_RANGE_M {
        1.0 + (DRAFT_RANGE_M - gap_m) / DRAFT_RANGE_M * DRAFT_BONUS
    } else {
        1.0
    }
}

/// A leader that gets clear early stops trying.
pub fn coasting_factor(lead_m: f64, p: f64) -> f64 {
    if lead_m > COAST_LEAD_M && p < COAST_UNTIL {
        0.97
    } else {
        1.0
    }
}

pub fn corner_factor(p: f64) -> f64 {
    if (p > 0.42 && p < 0.52) || (p > 0.72 && p < 0.82) {
        0.97
    } else {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// Move `current` toward `target` by at most one tick's worth of acceleration.
///
/// Below cruise the horse catches up hard; otherwise acceleration scales
/// with its attribute.
pub fn next_speed(current: f64, cruise: f64, target: f64, accel: f64, p: f64, dt: f64) -> f64 {
    let coeff = ACCEL_COEFF_MIN + (ACCEL_COEFF_MAX - ACCEL_COEFF_MIN) * accel;
    let boost = if p < START_BOOST_UNTIL { START_BOOST } else { 1.0 };
    let acceleration = if current < cruise - 0.5 {
        CATCH_UP_ACCEL_MPS2 * boost
    } else {
        SUSTAIN_ACCEL_MPS2 * coeff * boost
    };
    let max_step = acceleration * dt;
    (current + (target - current).clamp(-max_step, max_step)).max(0.0)
}

/// Stamina spent over `dt` seconds.
pub fn stamina_cost(stamina_attr: u8, kicking: bool, dt: f64) -> f64 {
    let per_sec = STAMINA_DRAIN_PER_SEC + if kicking { KICK_DRAIN_PER_SEC } else { 0.0 };
    let efficiency = (1.2 - stamina_quality(stamina_attr) * 0.6).clamp(0.6, 1.2);
    per_sec * efficiency * dt
}

// ---------------------------------------------------------------------------
// Entry draws
// ---------------------------------------------------------------------------

/// Ticks a horse loses at the gate. Poor gate aptitude risks a long delay.
pub fn draw_start_delay<R: Rng + ?Sized>(horse: &Horse, rng: &mut R) -> u32 {
    let slow_start_chance = 0.20 - horse.gate_norm() * 0.15;
    let base = rng.gen_range(0..=5);
    if rng.gen::<f64>() < slow_start_chance {
        base + rng.gen_range(6..=15)
    } else {
        base
    }
}

/// Only deep-closers can misfire their kick.
pub fn draw_failed_kick<R: Rng + ?Sized>(horse: &Horse, rng: &mut R) -> bool {
    horse.style == RunningStyle::DeepCloser && rng.gen::<f64>() < FAILED_KICK_PROBABILITY
}

/// Fresh simulation record for a horse joining a field.
pub fn initial_state<R: Rng + ?Sized>(horse: &Horse, rng: &mut R) -> SimState {
    let lateral_noise = (rng.gen::<f64>() - 0.5) * 0.12;
    let failed_kick = draw_failed_kick(horse, rng);
    let start_delay_ticks = draw_start_delay(horse, rng);
    SimState {
        progress: 0.0,
        lateral: super::contention::initial_lateral(horse.style, lateral_noise),
        speed: initial_cruise_speed(horse) * START_SPEED_FRACTION,
        stamina: 1.0,
        start_delay_ticks,
        failed_kick,
    }
}
