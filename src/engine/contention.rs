//! Lane contention: who is where across the track, who is boxed in, and
//! where a boxed-in horse can go.
//!
//! Every query reads a [`FieldView`] captured at the start of the tick, so
//! horses moved earlier in the same tick do not affect later ones.

use crate::race::Entrant;
use crate::types::RunningStyle;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const LATERAL_MIN: f64 = 0.08;
pub const LATERAL_MAX: f64 = 0.92;
pub const BODY_WIDTH: f64 = 0.08;
/// Maximum lane change per tick.
pub const LATERAL_STEP: f64 = 0.012;

const BLOCK_RANGE_M: f64 = 6.0;
const MIN_GAP_M: f64 = 3.0;
const CLEAR_BEHIND_M: f64 = 2.0;
const CLEAR_AHEAD_M: f64 = 5.0;
const EVASION_OFFSET: f64 = 0.10;
const DRAFT_LANE_BAND: f64 = 1.5;
const FOLLOW_LANE_BAND: f64 = 1.35;

/// Speed multiplier when a blocked horse finds a way out.
pub const EVASION_FACTOR: f64 = 0.97;
/// Speed multiplier when there is nowhere to go.
pub const HARD_BLOCK_FACTOR: f64 = 0.90;

// ---------------------------------------------------------------------------
// Lane targets
// ---------------------------------------------------------------------------

/// Starting lane: style base plus draw noise.
pub fn initial_lateral(style: RunningStyle, noise: f64) -> f64 {
    let base = match style {
        RunningStyle::FrontRunner => 0.22,
        RunningStyle::PacePresser => 0.30,
        RunningStyle::Closer => 0.52,
        RunningStyle::DeepCloser => 0.70,
    };
    (base + noise).clamp(LATERAL_MIN, LATERAL_MAX)
}

/// Lane a horse steers toward given its style, progress and rank.
pub fn target_lateral(style: RunningStyle, p: f64, rank_fraction: f64) -> f64 {
    let mut lane: f64 = match style {
        RunningStyle::FrontRunner => 0.20,
        RunningStyle::PacePresser => 0.28,
        RunningStyle::Closer => 0.50,
        RunningStyle::DeepCloser => 0.65,
    };

    if p > 0.7 {
        match style {
            RunningStyle::DeepCloser => lane += 0.08,
            RunningStyle::FrontRunner => lane -= 0.04,
            _ => {}
        }
    }

    // Backmarkers swing wide, the leaders hug the rail.
    if rank_fraction > 0.6 {
        lane += 0.05;
    }
    if rank_fraction < 0.2 {
        lane -= 0.03;
    }

    lane.clamp(LATERAL_MIN, LATERAL_MAX)
}

/// Move toward `target` by at most one lateral step.
pub fn step_lateral(current: f64, target: f64) -> f64 {
    let delta = (target - current).clamp(-LATERAL_STEP, LATERAL_STEP);
    (current + delta).clamp(LATERAL_MIN, LATERAL_MAX)
}

/// Distance lost by running wide.
pub fn outside_loss(lateral: f64) -> f64 {
    let width = (lateral - LATERAL_MIN) / (LATERAL_MAX - LATERAL_MIN);
    (1.0 - width * 0.05).clamp(0.92, 1.0)
}

// ---------------------------------------------------------------------------
// Field view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerView {
    pub distance_m: f64,
    pub lateral: f64,
    pub finished: bool,
}

/// Start-of-tick positions of every entrant, indexed by field slot.
#[derive(Debug, Clone)]
pub struct FieldView {
    runners: Vec<RunnerView>,
    /// Slots ordered leader first. Ties keep slot order.
    order: Vec<usize>,
    /// Inverse of `order`.
    rank: Vec<usize>,
}

impl FieldView {
    pub fn capture(entrants: &[Entrant], distance_m: f64) -> Self {
        let runners: Vec<RunnerView> = entrants
            .iter()
            .map(|e| RunnerView {
                distance_m: e.sim.distance_covered(distance_m),
                lateral: e.sim.lateral,
                finished: e.sim.has_finished(),
            })
            .collect();
        Self::from_runners(runners)
    }

    pub fn from_runners(runners: Vec<RunnerView>) -> Self {
        let mut order: Vec<usize> = (0..runners.len()).collect();
        order.sort_by(|&a, &b| runners[b].distance_m.total_cmp(&runners[a].distance_m));
        let mut rank = vec![0; runners.len()];
        for (r, &slot) in order.iter().enumerate() {
            rank[slot] = r;
        }
        Self {
            runners,
            order,
            rank,
        }
    }

    pub fn rank(&self, slot: usize) -> usize {
        self.rank[slot]
    }

    /// 0 for the leader, 1 for last.
    pub fn rank_fraction(&self, slot: usize) -> f64 {
        let denom = self.runners.len().saturating_sub(1).max(1);
        self.rank[slot] as f64 / denom as f64
    }

    /// Horses still racing, other than `slot`.
    fn rivals(&self, slot: usize) -> impl Iterator<Item = &RunnerView> {
        self.runners
            .iter()
            .enumerate()
            .filter(move |(i, r)| *i != slot && !r.finished)
            .map(|(_, r)| r)
    }

    /// Somebody directly in front within blocking range and the same lane.
    pub fn is_blocked(&self, slot: usize) -> bool {
        let me = self.runners[slot];
        self.rivals(slot).any(|r| {
            let ahead = r.distance_m - me.distance_m;
            ahead > 0.0 && ahead <= BLOCK_RANGE_M && (r.lateral - me.lateral).abs() < BODY_WIDTH
        })
    }

    /// Whether a candidate lane is free alongside `slot`.
    pub fn lane_clear(&self, slot: usize, lane: f64) -> bool {
        let me = self.runners[slot];
        !self.rivals(slot).any(|r| {
            let delta = r.distance_m - me.distance_m;
            delta >= -CLEAR_BEHIND_M
                && delta <= CLEAR_AHEAD_M
                && (r.lateral - lane).abs() < BODY_WIDTH
        })
    }

    /// A lane a blocked horse can switch to, if any.
    pub fn evasion_lane(&self, slot: usize) -> Option<f64> {
        let lateral = self.runners[slot].lateral;
        let inside = (lateral - EVASION_OFFSET).clamp(LATERAL_MIN, LATERAL_MAX);
        let outside = (lateral + EVASION_OFFSET).clamp(LATERAL_MIN, LATERAL_MAX);

        match (self.lane_clear(slot, inside), self.lane_clear(slot, outside)) {
            (true, true) => {
                if outside - LATERAL_MIN > LATERAL_MAX - inside {
                    Some(outside)
                } else {
                    Some(inside)
                }
            }
            (false, true) => Some(outside),
            (true, false) => Some(inside),
            (false, false) => None,
        }
    }

    /// Penalty for tailgating the nearest horse ahead in a close lane.
    pub fn following_factor(&self, slot: usize) -> f64 {
        let me = self.runners[slot];
        let nearest = self
            .rivals(slot)
            .filter(|r| (r.lateral - me.lateral).abs() < BODY_WIDTH * FOLLOW_LANE_BAND)
            .map(|r| r.distance_m - me.distance_m)
            .filter(|ahead| *ahead > 0.0 && *ahead <= BLOCK_RANGE_M)
            .min_by(|a, b| a.total_cmp(b));

        match nearest {
            None => 1.0,
            Some(gap) if gap <= 0.5 => 0.80,
            Some(gap) if gap < MIN_GAP_M => {
                let t = (MIN_GAP_M - gap) / MIN_GAP_M;
                (1.0 - 0.2 * t).clamp(0.8, 1.0)
            }
            Some(_) => 1.0,
        }
    }

    /// Gap to the horse directly ahead in rank, when it is still racing and
    /// in the same lane band.
    pub fn drafting_gap(&self, slot: usize) -> Option<f64> {
        let rank = self.rank[slot];
        if rank == 0 {
            return None;
        }
        let me = self.runners[slot];
        let ahead = self.runners[self.order[rank - 1]];
        if ahead.finished || (ahead.lateral - me.lateral).abs() >= BODY_WIDTH * DRAFT_LANE_BAND {
            return None;
        }
        Some(ahead.distance_m - me.distance_m)
    }

    /// How far the leader is clear of second, asked from `slot`'s point of
    /// view. None unless `slot` leads a field of two or more.
    pub fn lead_margin(&self, slot: usize) -> Option<f64> {
        if self.rank[slot] != 0 || self.order.len() < 2 {
            return None;
        }
        let second = self.runners[self.order[1]];
        Some(self.runners[slot].distance_m - second.distance_m)
    }
}
