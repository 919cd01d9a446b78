//! Composition root.
//!
//! [`Paddock`] builds the engine, market and wallet once, wires them onto
//! one event bus, and hands out the drivers that tick them. Nothing here is
//! global; tests build as many independent instances as they like.

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::engine::{EngineConfig, RaceEngine, Registration};
use crate::events::{EventBus, LifecycleObserver, SubscriptionId, TracingObserver};
use crate::ledger::{Wallet, WalletConfig};
use crate::market::{MarketConfig, MarketSnapshot, OddsMarket};
use crate::population::PopulationProvider;
use crate::race::RaceSnapshot;
use crate::scheduler;
use crate::types::{
    BetCategory, Horse, HorseId, PurchaseRejected, RaceId, RaceState, RegistrationError, Ticket,
};

pub struct Paddock {
    bus: Arc<EventBus>,
    engine: Arc<RaceEngine>,
    market: Arc<OddsMarket>,
    wallet: Arc<Wallet>,
    subscriptions: Vec<SubscriptionId>,
}

impl Paddock {
    pub fn new(
        config: &AppConfig,
        population: Arc<dyn PopulationProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_configs(
            config.engine(),
            config.market(),
            config.wallet(),
            population,
            clock,
        )
    }

    /// Wire the components. The market sees every event before the wallet,
    /// so tickets are always repriced and settled against finished books.
    pub fn with_configs(
        engine: EngineConfig,
        market: MarketConfig,
        wallet: WalletConfig,
        population: Arc<dyn PopulationProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let market = Arc::new(OddsMarket::new(market, clock.clone(), &bus));
        let wallet = Arc::new(Wallet::new(wallet, market.clone(), clock.clone()));
        let engine = Arc::new(RaceEngine::new(engine, population, clock, bus.clone()));

        let subscriptions = vec![
            bus.subscribe(market.clone()),
            bus.subscribe(wallet.clone()),
            bus.subscribe(Arc::new(TracingObserver)),
        ];

        Self {
            bus,
            engine,
            market,
            wallet,
            subscriptions,
        }
    }

    /// Announce the first race so the market opens its book.
    pub fn start(&self) {
        self.engine.start();
    }

    pub fn engine_tick(&self) {
        self.engine.tick();
    }

    pub fn market_tick(&self) -> u32 {
        self.market.tick()
    }

    /// Attach an extra read-only observer. It is detached when the paddock
    /// is dropped.
    pub fn subscribe(&mut self, observer: Arc<dyn LifecycleObserver>) -> SubscriptionId {
        let id = self.bus.subscribe(observer);
        self.subscriptions.push(id);
        id
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn engine(&self) -> &Arc<RaceEngine> {
        &self.engine
    }

    pub fn market(&self) -> &Arc<OddsMarket> {
        &self.market
    }

    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    // -- Player surface ----------------------------------------------------

    pub fn current_race(&self) -> RaceSnapshot {
        self.engine.current_race()
    }

    pub fn upcoming_races(&self) -> Vec<RaceSnapshot> {
        self.engine.upcoming_races()
    }

    pub fn market_snapshot(&self) -> MarketSnapshot {
        self.market.snapshot()
    }

    pub fn register_entrant(&self, horse: Horse) -> Result<Registration, RegistrationError> {
        self.engine.register_entrant(horse)
    }

    pub fn purchase_ticket(
        &self,
        race_id: RaceId,
        horse_id: HorseId,
        category: BetCategory,
        stake: Decimal,
    ) -> Result<Ticket, PurchaseRejected> {
        self.wallet.purchase_ticket(race_id, horse_id, category, stake)
    }

    pub fn status(&self) -> StatusReport {
        let race = self.engine.current_race();
        let market = self.market.snapshot();
        StatusReport {
            ticks: self.engine.ticks(),
            race_id: race.id,
            race_name: race.conditions.name.clone(),
            state: race.state,
            voting_seconds_left: race.voting_seconds_left,
            leader: race.leader().map(|e| e.horse.name.clone()),
            win_pool: market.win.total,
            place_pool: market.place.total,
            balance: self.wallet.balance(),
            settled_races: self.market.settlements().len(),
        }
    }

    // -- Drivers -----------------------------------------------------------

    /// Start the engine and market drivers on the current tokio runtime.
    pub fn spawn_drivers(&self) -> Drivers {
        let (shutdown, rx) = scheduler::shutdown_channel();
        let engine_period = Duration::from_secs_f64(self.engine.config().dt());
        let market_period = Duration::from_secs(self.market.config().interval_secs.max(1));

        let engine = self.engine.clone();
        let market = self.market.clone();
        let handles = vec![
            (
                "engine",
                scheduler::spawn_driver("engine", engine_period, rx.clone(), move || engine.tick()),
            ),
            (
                "market",
                scheduler::spawn_driver("market", market_period, rx, move || {
                    market.tick();
                }),
            ),
        ];

        Drivers { shutdown, handles }
    }
}

impl Drop for Paddock {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

/// Handles to running drivers plus their shared shutdown flag.
pub struct Drivers {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<u64>)>,
}

impl Drivers {
    /// Extra driver sharing the same shutdown flag.
    pub fn spawn<F>(&mut self, name: &'static str, period: Duration, tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        let handle = scheduler::spawn_driver(name, period, self.shutdown.subscribe(), tick);
        self.handles.push((name, handle));
    }

    /// Signal shutdown and wait for every driver. Returns ticks per driver.
    pub async fn stop(self) -> Result<Vec<(&'static str, u64)>> {
        if self.shutdown.send(true).is_err() {
            warn!("Drivers already gone");
        }
        let (names, handles): (Vec<&'static str>, Vec<JoinHandle<u64>>) =
            self.handles.into_iter().unzip();
        let ticks = futures::future::try_join_all(handles).await?;

        let counts: Vec<(&'static str, u64)> = names.into_iter().zip(ticks).collect();
        for (name, ticks) in &counts {
            info!(driver = *name, ticks = *ticks, "Driver joined");
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub ticks: u64,
    pub race_id: RaceId,
    pub race_name: String,
    pub state: RaceState,
    pub voting_seconds_left: u32,
    pub leader: Option<String>,
    pub win_pool: Decimal,
    pub place_pool: Decimal,
    pub balance: Decimal,
    pub settled_races: usize,
}

impl StatusReport {
    /// One-line JSON form for machine-readable logs.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.race_id, self.race_name, self.state)?;
        if self.state == RaceState::AcceptingBets {
            write!(f, " ({}s)", self.voting_seconds_left)?;
        }
        if let Some(leader) = &self.leader {
            if self.state == RaceState::Running {
                write!(f, " | leader {leader}")?;
            }
        }
        write!(
            f,
            " | pools ${:.0}/${:.0} | wallet ${:.0}",
            self.win_pool, self.place_pool, self.balance
        )
    }
}
