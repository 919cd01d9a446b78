//! Lifecycle events and the synchronous bus that delivers them.
//!
//! Every race and market transition produces a [`LifecycleEvent`].
//! Observers receive owned snapshots and cannot mutate the publisher.
//! The bus never holds its own lock while an observer runs, so handlers
//! may publish follow-up events.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::race::RaceSnapshot;
use crate::types::{RaceId, RaceState};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub enum LifecycleEvent {
    /// A new race occupies the active slot.
    RaceSwitched(RaceSnapshot),
    StateChanged { race_id: RaceId, state: RaceState },
    /// Emitted once per second of the voting window.
    VotingCountdown { race_id: RaceId, seconds_left: u32 },
    /// A scheduled race's field changed through registration.
    FieldChanged { race_id: RaceId, entrants: usize },
    RaceFinished(RaceSnapshot),
    /// The market froze its pools for this race.
    BettingLocked(RaceId),
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::RaceSwitched(_) => "race_switched",
            LifecycleEvent::StateChanged { .. } => "state_changed",
            LifecycleEvent::VotingCountdown { .. } => "voting_countdown",
            LifecycleEvent::FieldChanged { .. } => "field_changed",
            LifecycleEvent::RaceFinished(_) => "race_finished",
            LifecycleEvent::BettingLocked(_) => "betting_locked",
        }
    }

    pub fn race_id(&self) -> RaceId {
        match self {
            LifecycleEvent::RaceSwitched(snap) | LifecycleEvent::RaceFinished(snap) => snap.id,
            LifecycleEvent::StateChanged { race_id, .. }
            | LifecycleEvent::VotingCountdown { race_id, .. }
            | LifecycleEvent::FieldChanged { race_id, .. } => *race_id,
            LifecycleEvent::BettingLocked(race_id) => *race_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Observer trait
// ---------------------------------------------------------------------------

/// Read-only consumer of lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, event: &LifecycleEvent);
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct EventBus {
    subscribers: Mutex<Vec<(SubscriptionId, Arc<dyn LifecycleObserver>)>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer. Delivery follows subscription order.
    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(observer = observer.name(), "Observer subscribed");
        self.subscribers.lock().push((id, observer));
        id
    }

    /// Remove an observer. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver an event to every current subscriber, in order.
    pub fn publish(&self, event: &LifecycleEvent) {
        let targets: Vec<Arc<dyn LifecycleObserver>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, obs)| Arc::clone(obs))
            .collect();

        for observer in targets {
            observer.on_event(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in observers
// ---------------------------------------------------------------------------

/// Logs every lifecycle event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::RaceSwitched(snap) => info!(
                race_id = %snap.id,
                race = %snap.conditions,
                entrants = snap.entrants.len(),
                "Race switched"
            ),
            LifecycleEvent::StateChanged { race_id, state } => {
                info!(race_id = %race_id, state = %state, "Race state changed")
            }
            LifecycleEvent::VotingCountdown { race_id, seconds_left } => {
                debug!(race_id = %race_id, seconds_left, "Voting countdown")
            }
            LifecycleEvent::FieldChanged { race_id, entrants } => {
                info!(race_id = %race_id, entrants, "Field changed")
            }
            LifecycleEvent::RaceFinished(snap) => info!(
                race_id = %snap.id,
                winner = ?snap.winner(),
                finishers = snap.finish_order.len(),
                "Race finished"
            ),
            LifecycleEvent::BettingLocked(race_id) => {
                info!(race_id = %race_id, "Betting locked")
            }
        }
    }
}

/// Records every event it sees. Handy for tests and audits.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl LifecycleObserver for EventCollector {
    fn name(&self) -> &str {
        "collector"
    }

    fn on_event(&self, event: &LifecycleEvent) {
        self.events.lock().push(event.clone());
    }
}
