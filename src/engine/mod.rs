//! Race engine: owns the active race and the upcoming card, and advances
//! them one tick at a time.
//!
//! Lifecycle per race: AcceptingBets → Running → Finished, then after a
//! short hold the next scheduled race rotates into the active slot.
//!
//! The engine never holds its own lock while it talks to the population
//! provider or publishes on the bus.

pub mod contention;
pub mod kinematics;
pub mod programme;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::events::{EventBus, LifecycleEvent};
use crate::population::PopulationProvider;
use crate::race::{Entrant, Race, RaceSnapshot};
use crate::types::{Horse, HorseId, RaceId, RaceState, RegistrationError, RunRecord};
use contention::FieldView;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tick_hz: u32,
    /// Length of the betting window before the off.
    pub voting_secs: u32,
    /// Pause on a finished race before rotating.
    pub finish_hold_secs: u32,
    pub recovery_interval_secs: u32,
    /// Races kept scheduled behind the active one.
    pub upcoming_depth: usize,
    pub field_size: usize,
    pub winner_prize: Decimal,
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_hz: 10,
            voting_secs: 20,
            finish_hold_secs: 5,
            recovery_interval_secs: 10,
            upcoming_depth: 3,
            field_size: 8,
            winner_prize: Decimal::from(1_000_000),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn hz(&self) -> u32 {
        self.tick_hz.max(1)
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f64 {
        1.0 / self.hz() as f64
    }

    pub fn voting_ticks(&self) -> u32 {
        self.voting_secs * self.hz()
    }

    pub fn hold_ticks(&self) -> u32 {
        self.finish_hold_secs * self.hz()
    }

    pub fn recovery_ticks(&self) -> u32 {
        (self.recovery_interval_secs * self.hz()).max(1)
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Result of a successful entry into the next scheduled race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub race_id: RaceId,
    /// Entrant removed to make room, when the field was full.
    pub displaced: Option<HorseId>,
}

/// Slot of the weakest entrant; the later slot wins ties.
fn weakest_slot(entrants: &[Entrant]) -> Option<usize> {
    entrants
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, Decimal)>, (slot, e)| {
            let score = e.horse.strength_score();
            match best {
                Some((_, weakest)) if score > weakest => best,
                _ => Some((slot, score)),
            }
        })
        .map(|(slot, _)| slot)
}

/// Seat a field of horses into a race with fresh simulation records.
fn seat_field<R: Rng + ?Sized>(mut race: Race, horses: Vec<Horse>, rng: &mut R) -> Race {
    for horse in horses {
        let sim = kinematics::initial_state(&horse, rng);
        race.entrants.push(Entrant { horse, sim });
    }
    race
}

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

struct EngineState {
    current: Race,
    upcoming: VecDeque<Race>,
    voting_ticks: u32,
    hold_ticks: u32,
    recovery_ticks: u32,
    next_race_id: u64,
    ticks: u64,
    rng: StdRng,
}

/// Work left for the engine to do after it releases its lock.
#[derive(Default)]
struct TickOutcome {
    events: Vec<LifecycleEvent>,
    recover: bool,
    runs: Vec<RunRecord>,
    replenish: usize,
}

impl EngineState {
    fn allocate_id(&mut self) -> RaceId {
        let id = RaceId(self.next_race_id);
        self.next_race_id += 1;
        id
    }

    /// Every horse seated on the active race or the upcoming card.
    fn carded_ids(&self) -> HashSet<HorseId> {
        std::iter::once(&self.current)
            .chain(self.upcoming.iter())
            .flat_map(|race| race.entrants.iter().map(|e| e.horse.id))
            .collect()
    }

    /// The race a horse is already seated in, checking `first` before the
    /// rest of the card.
    fn carded_in(&self, first: &Race, horse_id: HorseId) -> Option<RaceId> {
        std::iter::once(first)
            .chain(std::iter::once(&self.current))
            .chain(self.upcoming.iter())
            .find(|race| race.contains(horse_id))
            .map(|race| race.id)
    }

    fn voting_seconds_left(&self, cfg: &EngineConfig) -> u32 {
        if self.current.state != RaceState::AcceptingBets {
            return 0;
        }
        let remaining = cfg.voting_ticks().saturating_sub(self.voting_ticks);
        remaining.div_ceil(cfg.hz())
    }

    fn advance(&mut self, cfg: &EngineConfig, now: DateTime<Utc>) -> TickOutcome {
        let mut out = TickOutcome::default();
        self.ticks += 1;

        self.recovery_ticks += 1;
        if self.recovery_ticks >= cfg.recovery_ticks() {
            self.recovery_ticks = 0;
            out.recover = true;
        }

        match self.current.state {
            RaceState::AcceptingBets => {
                self.voting_ticks += 1;
                if self.voting_ticks >= cfg.voting_ticks() {
                    self.voting_ticks = 0;
                    self.current.state = RaceState::Running;
                    info!(
                        race_id = %self.current.id,
                        race = %self.current.conditions,
                        entrants = self.current.field_size(),
                        "And they're off"
                    );
                    out.events.push(LifecycleEvent::StateChanged {
                        race_id: self.current.id,
                        state: RaceState::Running,
                    });
                    if self.current.entrants.is_empty() {
                        self.finish(cfg, now, &mut out);
                    }
                } else if self.voting_ticks % cfg.hz() == 0 {
                    out.events.push(LifecycleEvent::VotingCountdown {
                        race_id: self.current.id,
                        seconds_left: self.voting_seconds_left(cfg),
                    });
                }
            }
            RaceState::Running => {
                self.step_race(cfg);
                if self.current.all_finished() {
                    self.finish(cfg, now, &mut out);
                }
            }
            RaceState::Finished => {
                self.hold_ticks += 1;
                if self.hold_ticks >= cfg.hold_ticks() {
                    self.rotate(cfg, &mut out);
                }
            }
        }

        out
    }

    fn step_race(&mut self, cfg: &EngineConfig) {
        let dt = cfg.dt();
        let distance = (self.current.conditions.distance_m as f64).max(1.0);
        let field = FieldView::capture(&self.current.entrants, distance);
        let rng = &mut self.rng;
        let race = &mut self.current;

        let mut crossed: Vec<(HorseId, f64)> = Vec::new();
        for (slot, entrant) in race.entrants.iter_mut().enumerate() {
            if entrant.sim.has_finished() {
                continue;
            }

            if entrant.sim.start_delay_ticks > 0 {
                let remaining = entrant.sim.start_delay_ticks;
                entrant.sim.start_delay_ticks -= 1;
                entrant.sim.speed = kinematics::delayed_start_speed(&entrant.horse, remaining);
            } else {
                let noise = rng.gen_range(-1.0..1.0);
                step_runner(entrant, slot, &field, noise, dt);
            }

            let reached = entrant.sim.progress + entrant.sim.speed * dt / distance;
            entrant.sim.progress = reached.min(1.0);
            if entrant.sim.has_finished() {
                crossed.push((entrant.horse.id, reached));
            }
        }

        // Same-tick finishers are ordered by how far past the line they got.
        crossed.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (horse_id, _) in crossed {
            race.record_finish(horse_id);
        }
    }

    fn finish(&mut self, cfg: &EngineConfig, now: DateTime<Utc>, out: &mut TickOutcome) {
        self.current.state = RaceState::Finished;
        self.hold_ticks = 0;

        let winner = self.current.winner();
        let race_id = self.current.id;
        let records: Vec<RunRecord> = self
            .current
            .entrants
            .iter()
            .map(|e| {
                let won = Some(e.horse.id) == winner;
                RunRecord {
                    horse_id: e.horse.id,
                    race_id,
                    won,
                    prize: if won { cfg.winner_prize } else { Decimal::ZERO },
                    ran_at: now,
                }
            })
            .collect();
        self.current.apply_runs(&records);

        match winner.and_then(|id| self.current.entrants.iter().find(|e| e.horse.id == id)) {
            Some(w) => info!(
                race_id = %race_id,
                winner = %w.horse.name,
                winner_id = %w.horse.id,
                style = %w.horse.style,
                prize = %cfg.winner_prize,
                "Race finished"
            ),
            None => info!(race_id = %race_id, "Race finished with no runners"),
        }

        out.events.push(LifecycleEvent::StateChanged {
            race_id,
            state: RaceState::Finished,
        });
        out.events
            .push(LifecycleEvent::RaceFinished(self.current.snapshot(0)));
        out.runs = records;
    }

    fn rotate(&mut self, cfg: &EngineConfig, out: &mut TickOutcome) {
        let next = match self.upcoming.pop_front() {
            Some(race) => race,
            None => {
                let id = self.allocate_id();
                let conditions = programme::draw_conditions(id, &mut self.rng);
                warn!(race_id = %id, "No scheduled race, running an empty card");
                Race::new(id, conditions)
            }
        };

        self.current = next;
        self.voting_ticks = 0;
        self.hold_ticks = 0;
        out.replenish = cfg.upcoming_depth.saturating_sub(self.upcoming.len());
        out.events.push(LifecycleEvent::RaceSwitched(
            self.current.snapshot(self.voting_seconds_left(cfg)),
        ));
    }
}

/// One tick of motion for a horse that is out of the gate.
fn step_runner(entrant: &mut Entrant, slot: usize, field: &FieldView, noise: f64, dt: f64) {
    let horse = &entrant.horse;
    let sim = &mut entrant.sim;
    let p = sim.progress;
    let rank_fraction = field.rank_fraction(slot);
    let accel = horse.accel_norm();

    let pace = kinematics::pace_curve(horse.style, p, sim.failed_kick, accel, sim.stamina);
    let stamina = kinematics::stamina_factor(horse.stamina, p, pace.kick_load, sim.stamina);
    let position = kinematics::position_factor(horse.style, rank_fraction);
    let drafting = field
        .drafting_gap(slot)
        .map_or(1.0, kinematics::drafting_factor);
    let coasting = field
        .lead_margin(slot)
        .map_or(1.0, |lead| kinematics::coasting_factor(lead, p));
    let corner = kinematics::corner_factor(p);

    let mut target_lane = contention::target_lateral(horse.style, p, rank_fraction);
    let following = field.following_factor(slot);
    let mut blocking = 1.0;
    if field.is_blocked(slot) {
        match field.evasion_lane(slot) {
            Some(lane) => {
                target_lane = lane;
                blocking = contention::EVASION_FACTOR;
            }
            None => blocking = contention::HARD_BLOCK_FACTOR,
        }
    }
    sim.lateral = contention::step_lateral(sim.lateral, target_lane);
    let outside = contention::outside_loss(sim.lateral);

    let cruise = kinematics::real_cruise_speed(horse, noise)
        * kinematics::GAME_SPEED
        * position
        * stamina
        * drafting
        * coasting
        * corner
        * blocking
        * following
        * outside;
    let target = cruise * pace.multiplier;

    sim.speed = kinematics::next_speed(sim.speed, cruise, target, accel, p, dt);
    sim.stamina = (sim.stamina - kinematics::stamina_cost(horse.stamina, pace.kicking, dt))
        .clamp(0.0, 1.0);
}

// ---------------------------------------------------------------------------
// Race engine
// ---------------------------------------------------------------------------

pub struct RaceEngine {
    config: EngineConfig,
    population: Arc<dyn PopulationProvider>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
}

impl RaceEngine {
    /// Build the engine with its first race and a full upcoming queue.
    /// Nothing is published until [`RaceEngine::start`].
    pub fn new(
        config: EngineConfig,
        population: Arc<dyn PopulationProvider>,
        clock: Arc<dyn Clock>,
        bus: Arc<EventBus>,
    ) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let id = RaceId(1);
        let conditions = programme::draw_conditions(id, &mut rng);
        let horses = population.select_entrants(
            conditions.class,
            conditions.grade,
            config.field_size,
            &HashSet::new(),
        );
        let current = seat_field(Race::new(id, conditions), horses, &mut rng);

        let engine = Self {
            state: Mutex::new(EngineState {
                current,
                upcoming: VecDeque::new(),
                voting_ticks: 0,
                hold_ticks: 0,
                recovery_ticks: 0,
                next_race_id: id.0 + 1,
                ticks: 0,
                rng,
            }),
            config,
            population,
            bus,
            clock,
        };
        engine.replenish(engine.config.upcoming_depth);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Announce the active race to subscribers.
    pub fn start(&self) {
        let snapshot = self.current_race();
        info!(
            race_id = %snapshot.id,
            race = %snapshot.conditions,
            entrants = snapshot.entrants.len(),
            "Race engine started"
        );
        self.bus.publish(&LifecycleEvent::RaceSwitched(snapshot));
    }

    /// Advance the simulation by one tick.
    pub fn tick(&self) {
        let now = self.clock.now();
        let outcome = self.state.lock().advance(&self.config, now);

        if outcome.recover {
            self.population.recover_all();
        }
        if !outcome.runs.is_empty() {
            self.population.record_runs(&outcome.runs);
        }
        if outcome.replenish > 0 {
            self.replenish(outcome.replenish);
        }
        for event in &outcome.events {
            self.bus.publish(event);
        }
    }

    /// Schedule `count` freshly drawn races behind the queue. Horses already
    /// on the card are not drafted again.
    fn replenish(&self, count: usize) {
        for _ in 0..count {
            let (id, conditions, carded) = {
                let mut st = self.state.lock();
                let id = st.allocate_id();
                let conditions = programme::draw_conditions(id, &mut st.rng);
                (id, conditions, st.carded_ids())
            };
            let horses = self.population.select_entrants(
                conditions.class,
                conditions.grade,
                self.config.field_size,
                &carded,
            );
            if horses.len() < self.config.field_size {
                debug!(
                    race_id = %id,
                    class = %conditions.class,
                    entrants = horses.len(),
                    "Short field"
                );
            }

            let mut st = self.state.lock();
            let race = seat_field(Race::new(id, conditions), horses, &mut st.rng);
            st.upcoming.push_back(race);
        }
    }

    pub fn current_race(&self) -> RaceSnapshot {
        let st = self.state.lock();
        st.current.snapshot(st.voting_seconds_left(&self.config))
    }

    pub fn upcoming_races(&self) -> Vec<RaceSnapshot> {
        self.state
            .lock()
            .upcoming
            .iter()
            .map(|race| race.snapshot(self.config.voting_secs))
            .collect()
    }

    pub fn voting_seconds_left(&self) -> u32 {
        self.state.lock().voting_seconds_left(&self.config)
    }

    /// Ticks processed since construction.
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Enter a horse into the next scheduled race. When the field is full
    /// the weakest entrant makes way.
    pub fn register_entrant(&self, horse: Horse) -> Result<Registration, RegistrationError> {
        let (registration, entrants) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let next = st
                .upcoming
                .front()
                .ok_or(RegistrationError::NoScheduledRace)?;
            let carded_in = st.carded_in(next, horse.id);
            let race = st
                .upcoming
                .front_mut()
                .ok_or(RegistrationError::NoScheduledRace)?;

            if race.state != RaceState::AcceptingBets {
                return Err(RegistrationError::BettingClosed(race.id));
            }
            if !horse.is_active() {
                return Err(RegistrationError::Inactive(horse.id));
            }
            if let Some(race_id) = carded_in {
                return Err(RegistrationError::AlreadyEntered {
                    race_id,
                    horse_id: horse.id,
                });
            }
            let (race_class, grade) = (race.conditions.class, race.conditions.grade);
            if !horse.class.admits_into(race_class, grade) {
                return Err(RegistrationError::ClassMismatch {
                    horse_class: horse.class,
                    race_class,
                    grade,
                });
            }

            let displaced = if race.field_size() >= self.config.field_size {
                weakest_slot(&race.entrants).map(|slot| race.entrants.remove(slot).horse.id)
            } else {
                None
            };

            let sim = kinematics::initial_state(&horse, &mut st.rng);
            info!(
                race_id = %race.id,
                horse = %horse.name,
                horse_id = %horse.id,
                displaced = ?displaced,
                "Entrant registered"
            );
            race.entrants.push(Entrant { horse, sim });

            (
                Registration {
                    race_id: race.id,
                    displaced,
                },
                race.field_size(),
            )
        };

        self.bus.publish(&LifecycleEvent::FieldChanged {
            race_id: registration.race_id,
            entrants,
        });
        Ok(registration)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
