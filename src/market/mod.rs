//! Odds market: win and place pools for the active race, a synthetic
//! betting crowd, the lock at the off, and settlement at the finish.
//!
//! All pool mutation, odds recomputation and the lock itself happen under
//! one mutex, so a wager either lands before the lock or is rejected.
//! Events are published only after that mutex is released.

pub mod crowd;
pub mod pool;
pub mod settlement;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::events::{EventBus, LifecycleEvent, LifecycleObserver};
use crate::race::RaceSnapshot;
use crate::types::{BetCategory, Horse, HorseId, PurchaseRejected, RaceId, RaceState};
use crowd::MarketScale;
use pool::{LockedPool, RunnerQuote, WageringPool};
use settlement::RaceSettlement;

pub use pool::{compute_odds, payable_slots, MAX_ODDS, MIN_ODDS, NO_QUOTE, TAKEOUT};

/// Share of the opening pool seeded into the win pool.
const OPENING_WIN_SHARE: Decimal = dec!(0.7);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    /// Seconds between synthetic betting rounds.
    pub interval_secs: u64,
    /// Fraction of expected turnover already in the pools at open.
    pub opening_pool_fraction: Decimal,
    pub seed: Option<u64>,
    /// Settlements kept, newest first.
    pub settlement_history: usize,
    /// Locked snapshots kept for recent races.
    pub locked_retention: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            opening_pool_fraction: dec!(0.2),
            seed: None,
            settlement_history: 50,
            locked_retention: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Books
// ---------------------------------------------------------------------------

struct LiveBook {
    race_id: RaceId,
    entrants: Vec<Horse>,
    scale: MarketScale,
    place_slots: usize,
    win: WageringPool,
    place: WageringPool,
}

impl LiveBook {
    fn is_locked(&self) -> bool {
        self.win.is_locked()
    }

    fn pool_mut(&mut self, category: BetCategory) -> &mut WageringPool {
        match category {
            BetCategory::Win => &mut self.win,
            BetCategory::Place => &mut self.place,
        }
    }

    fn pool(&self, category: BetCategory) -> &WageringPool {
        match category {
            BetCategory::Win => &self.win,
            BetCategory::Place => &self.place,
        }
    }

    fn recompute(&mut self) {
        self.win.recompute();
        self.place.recompute();
    }
}

struct LockedBook {
    race_id: RaceId,
    place_slots: usize,
    win: LockedPool,
    place: LockedPool,
}

impl LockedBook {
    fn pool(&self, category: BetCategory) -> &LockedPool {
        match category {
            BetCategory::Win => &self.win,
            BetCategory::Place => &self.place,
        }
    }
}

struct MarketState {
    live: Option<LiveBook>,
    locked: VecDeque<LockedBook>,
    settlements: VecDeque<RaceSettlement>,
    rng: StdRng,
}

impl MarketState {
    fn locked_book(&self, race_id: RaceId) -> Option<&LockedBook> {
        self.locked.iter().find(|b| b.race_id == race_id)
    }

    /// Freeze the live book if it belongs to `race_id` and is still open.
    fn lock_live(&mut self, race_id: RaceId, retention: usize) -> bool {
        let Some(live) = self.live.as_mut() else {
            return false;
        };
        if live.race_id != race_id {
            return false;
        }
        let (Some(win), Some(place)) = (live.win.lock(), live.place.lock()) else {
            return false;
        };

        info!(
            race_id = %race_id,
            win_pool = %win.total,
            place_pool = %place.total,
            "Pools locked"
        );
        self.locked.push_front(LockedBook {
            race_id,
            place_slots: live.place_slots,
            win,
            place,
        });
        self.locked.truncate(retention.max(1));
        true
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub category: BetCategory,
    pub total: Decimal,
    pub runners: Vec<RunnerQuote>,
}

impl PoolSnapshot {
    fn empty(category: BetCategory) -> Self {
        Self {
            category,
            total: Decimal::ZERO,
            runners: Vec::new(),
        }
    }

    pub fn odds(&self, horse_id: HorseId) -> Decimal {
        self.runners
            .iter()
            .find(|q| q.horse_id == horse_id)
            .map(|q| q.odds)
            .unwrap_or(NO_QUOTE)
    }
}

/// Read-only view of the active race's market.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub race_id: Option<RaceId>,
    pub locked: bool,
    pub place_slots: usize,
    pub scale: Option<MarketScale>,
    pub win: PoolSnapshot,
    pub place: PoolSnapshot,
}

// ---------------------------------------------------------------------------
// Odds market
// ---------------------------------------------------------------------------

pub struct OddsMarket {
    config: MarketConfig,
    clock: Arc<dyn Clock>,
    bus: Weak<EventBus>,
    state: Mutex<MarketState>,
}

impl OddsMarket {
    pub fn new(config: MarketConfig, clock: Arc<dyn Clock>, bus: &Arc<EventBus>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            clock,
            bus: Arc::downgrade(bus),
            state: Mutex::new(MarketState {
                live: None,
                locked: VecDeque::new(),
                settlements: VecDeque::new(),
                rng,
            }),
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Open fresh pools for a race, pre-loaded with opening money spread by
    /// strength.
    pub fn seed(&self, race: &RaceSnapshot) {
        let entrants: Vec<Horse> = race.horses().cloned().collect();
        let ids: Vec<HorseId> = entrants.iter().map(|h| h.id).collect();
        let field = entrants.len();
        let scale = MarketScale::for_race(race.conditions.class, race.conditions.grade);

        let opening = scale.opening_pool(self.config.opening_pool_fraction);
        let win_opening = opening * OPENING_WIN_SHARE;
        let place_opening = opening - win_opening;

        let mut win = WageringPool::new(BetCategory::Win, &ids, field);
        let mut place = WageringPool::new(BetCategory::Place, &ids, field);
        for (id, share) in crowd::opening_shares(&entrants, win_opening) {
            win.add_stake(id, share);
        }
        for (id, share) in crowd::opening_shares(&entrants, place_opening) {
            place.add_stake(id, share);
        }

        let mut book = LiveBook {
            race_id: race.id,
            entrants,
            scale,
            place_slots: payable_slots(field),
            win,
            place,
        };
        book.recompute();

        info!(
            race_id = %race.id,
            entrants = field,
            bettors = scale.bettors,
            opening_pool = %opening,
            place_slots = book.place_slots,
            "Market opened"
        );
        self.state.lock().live = Some(book);
    }

    /// One round of crowd betting. Returns the number of wagers placed.
    pub fn tick(&self) -> u32 {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let Some(book) = st.live.as_mut() else {
            return 0;
        };
        if book.is_locked() || book.entrants.is_empty() {
            return 0;
        }

        let count = book.scale.draw_wager_count(&mut st.rng);
        let mut placed = 0;
        for _ in 0..count {
            let Some(horse_id) = crowd::pick_horse(&book.entrants, &mut st.rng) else {
                continue;
            };
            let stake = book.scale.draw_stake(&mut st.rng);
            let category = crowd::draw_category(&mut st.rng);
            if book.pool_mut(category).add_stake(horse_id, stake) {
                placed += 1;
            }
        }
        if placed > 0 {
            book.recompute();
        }

        debug!(
            race_id = %book.race_id,
            wagers = placed,
            win_pool = %book.win.total(),
            place_pool = %book.place.total(),
            "Crowd betting round"
        );
        placed
    }

    /// Add a player's stake to a pool. Returns the horse's odds after the
    /// wager is included.
    pub fn place_wager(
        &self,
        race_id: RaceId,
        horse_id: HorseId,
        category: BetCategory,
        stake: Decimal,
    ) -> Result<Decimal, PurchaseRejected> {
        if stake <= Decimal::ZERO {
            return Err(PurchaseRejected::InvalidStake(stake));
        }

        let mut st = self.state.lock();
        let book = match st.live.as_mut() {
            Some(book) if book.race_id == race_id && !book.is_locked() => book,
            _ => return Err(PurchaseRejected::MarketClosed(race_id)),
        };
        if !book.win.contains(horse_id) {
            return Err(PurchaseRejected::UnknownHorse { race_id, horse_id });
        }

        book.pool_mut(category).add_stake(horse_id, stake);
        book.recompute();
        let odds = book.pool(category).odds(horse_id);

        debug!(
            race_id = %race_id,
            horse_id = %horse_id,
            category = %category,
            stake = %stake,
            odds = %odds,
            "Wager accepted"
        );
        Ok(odds)
    }

    /// Freeze the pools for `race_id`. True only on the first call.
    pub fn lock(&self, race_id: RaceId) -> bool {
        self.state
            .lock()
            .lock_live(race_id, self.config.locked_retention)
    }

    /// Lock and announce it on the bus.
    pub fn close_betting(&self, race_id: RaceId) -> bool {
        let locked = self.lock(race_id);
        if locked {
            self.publish(LifecycleEvent::BettingLocked(race_id));
        }
        locked
    }

    pub fn is_locked(&self, race_id: RaceId) -> bool {
        self.state.lock().locked_book(race_id).is_some()
    }

    /// Current odds on the active race: locked once the pools are frozen,
    /// live before that.
    pub fn odds(&self, horse_id: HorseId, category: BetCategory) -> Decimal {
        let st = self.state.lock();
        let Some(book) = st.live.as_ref() else {
            return NO_QUOTE;
        };
        if book.is_locked() {
            return st
                .locked_book(book.race_id)
                .map(|b| b.pool(category).odds(horse_id))
                .unwrap_or(NO_QUOTE);
        }
        book.pool(category).odds(horse_id)
    }

    /// Locked odds for a race, or `NO_QUOTE` if it never locked or has aged
    /// out of retention.
    pub fn locked_odds(&self, race_id: RaceId, horse_id: HorseId, category: BetCategory) -> Decimal {
        self.state
            .lock()
            .locked_book(race_id)
            .map(|b| b.pool(category).odds(horse_id))
            .unwrap_or(NO_QUOTE)
    }

    /// Settle a finished race from its locked pools. A race that somehow
    /// reached the finish unlocked is locked first.
    pub fn settle(&self, race: &RaceSnapshot) -> Option<RaceSettlement> {
        let settled_at = self.clock.now();
        let (settlement, locked_now) = {
            let mut st = self.state.lock();
            let mut locked_now = false;
            if st.locked_book(race.id).is_none() {
                warn!(race_id = %race.id, "Settling a race that was never locked");
                locked_now = st.lock_live(race.id, self.config.locked_retention);
            }
            let Some(book) = st.locked_book(race.id) else {
                warn!(race_id = %race.id, "No pools to settle");
                return None;
            };

            let settlement = RaceSettlement::compute(
                race.id,
                &race.conditions.name,
                settled_at,
                &book.win,
                &book.place,
                book.place_slots,
                &race.finish_order,
            );
            st.settlements.push_front(settlement.clone());
            st.settlements.truncate(self.config.settlement_history);
            (settlement, locked_now)
        };

        if locked_now {
            self.publish(LifecycleEvent::BettingLocked(race.id));
        }
        info!(
            race_id = %settlement.race_id,
            sales = %settlement.total_sales(),
            payout = %settlement.total_payout(),
            house_profit = %settlement.house_profit(),
            "Race settled"
        );
        Some(settlement)
    }

    /// Settlement history, newest first.
    pub fn settlements(&self) -> Vec<RaceSettlement> {
        self.state.lock().settlements.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let st = self.state.lock();
        let Some(book) = st.live.as_ref() else {
            return MarketSnapshot {
                race_id: None,
                locked: false,
                place_slots: 0,
                scale: None,
                win: PoolSnapshot::empty(BetCategory::Win),
                place: PoolSnapshot::empty(BetCategory::Place),
            };
        };

        let (win, place) = match st.locked_book(book.race_id) {
            Some(locked) => (
                PoolSnapshot {
                    category: BetCategory::Win,
                    total: locked.win.total,
                    runners: locked.win.quotes(),
                },
                PoolSnapshot {
                    category: BetCategory::Place,
                    total: locked.place.total,
                    runners: locked.place.quotes(),
                },
            ),
            None => (
                PoolSnapshot {
                    category: BetCategory::Win,
                    total: book.win.total(),
                    runners: book.win.quotes(),
                },
                PoolSnapshot {
                    category: BetCategory::Place,
                    total: book.place.total(),
                    runners: book.place.quotes(),
                },
            ),
        };

        MarketSnapshot {
            race_id: Some(book.race_id),
            locked: book.is_locked(),
            place_slots: book.place_slots,
            scale: Some(book.scale),
            win,
            place,
        }
    }

    fn publish(&self, event: LifecycleEvent) {
        if let Some(bus) = self.bus.upgrade() {
            bus.publish(&event);
        }
    }
}

impl LifecycleObserver for OddsMarket {
    fn name(&self) -> &str {
        "odds_market"
    }

    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::RaceSwitched(race) => self.seed(race),
            LifecycleEvent::StateChanged {
                race_id,
                state: RaceState::Running,
            } => {
                self.close_betting(*race_id);
            }
            LifecycleEvent::RaceFinished(race) => {
                self.settle(race);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
