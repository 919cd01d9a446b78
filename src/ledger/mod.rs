//! Wallet: the player's balance and tickets.
//!
//! Purchases go through the odds market's wager path, so a ticket's stake
//! is part of the pool it will be paid from. Tickets are repriced to the
//! locked odds when betting closes and settled when the race finishes.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::events::{LifecycleEvent, LifecycleObserver};
use crate::market::{payable_slots, OddsMarket, NO_QUOTE};
use crate::race::RaceSnapshot;
use crate::types::{BetCategory, HorseId, PurchaseRejected, RaceId, Ticket};

#[derive(Debug, Clone, PartialEq)]
pub struct WalletConfig {
    pub starting_balance: Decimal,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::from(1_000_000),
        }
    }
}

/// Running totals over every ticket the wallet has held.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalletSummary {
    pub balance: Decimal,
    pub tickets: usize,
    pub open_tickets: usize,
    pub staked: Decimal,
    /// Stake still riding on unsettled tickets.
    pub open_stake: Decimal,
    pub returned: Decimal,
}

impl WalletSummary {
    /// Realised result of settled tickets.
    pub fn net(&self) -> Decimal {
        self.returned - (self.staked - self.open_stake)
    }
}

struct WalletState {
    balance: Decimal,
    tickets: Vec<Ticket>,
}

pub struct Wallet {
    market: Arc<OddsMarket>,
    clock: Arc<dyn Clock>,
    state: Mutex<WalletState>,
}

impl Wallet {
    pub fn new(config: WalletConfig, market: Arc<OddsMarket>, clock: Arc<dyn Clock>) -> Self {
        Self {
            market,
            clock,
            state: Mutex::new(WalletState {
                balance: config.starting_balance,
                tickets: Vec::new(),
            }),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.state.lock().balance
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state.lock().tickets.clone()
    }

    pub fn tickets_for(&self, race_id: RaceId) -> Vec<Ticket> {
        self.state
            .lock()
            .tickets
            .iter()
            .filter(|t| t.race_id == race_id)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> WalletSummary {
        let st = self.state.lock();
        WalletSummary {
            balance: st.balance,
            tickets: st.tickets.len(),
            open_tickets: st.tickets.iter().filter(|t| !t.settled).count(),
            staked: st.tickets.iter().map(|t| t.stake).sum(),
            open_stake: st.tickets.iter().filter(|t| !t.settled).map(|t| t.stake).sum(),
            returned: st.tickets.iter().map(|t| t.payout).sum(),
        }
    }

    /// Buy a ticket. The stake is rounded to whole units (half to even).
    /// A rejection leaves balance, tickets and pools untouched.
    pub fn purchase_ticket(
        &self,
        race_id: RaceId,
        horse_id: HorseId,
        category: BetCategory,
        stake: Decimal,
    ) -> Result<Ticket, PurchaseRejected> {
        let rounded = stake.round();
        if rounded <= Decimal::ZERO {
            warn!(race_id = %race_id, stake = %stake, "Ticket rejected: invalid stake");
            return Err(PurchaseRejected::InvalidStake(stake));
        }

        // Lock order: wallet, then market.
        let mut st = self.state.lock();
        if st.balance < rounded {
            warn!(
                race_id = %race_id,
                needed = %rounded,
                available = %st.balance,
                "Ticket rejected: insufficient funds"
            );
            return Err(PurchaseRejected::InsufficientFunds {
                needed: rounded,
                available: st.balance,
            });
        }

        let odds = self
            .market
            .place_wager(race_id, horse_id, category, rounded)
            .inspect_err(|e| {
                warn!(race_id = %race_id, horse_id = %horse_id, error = %e, "Ticket rejected")
            })?;

        st.balance -= rounded;
        let ticket = Ticket {
            id: Uuid::new_v4(),
            race_id,
            horse_id,
            category,
            stake: rounded,
            odds,
            settled: false,
            payout: Decimal::ZERO,
            purchased_at: self.clock.now(),
        };
        st.tickets.push(ticket.clone());

        info!(
            ticket = %ticket.id,
            race_id = %race_id,
            horse_id = %horse_id,
            category = %category,
            stake = %rounded,
            odds = %odds,
            balance = %st.balance,
            "Ticket purchased"
        );
        Ok(ticket)
    }

    /// Move every open ticket of `race_id` onto the locked odds.
    pub fn reprice(&self, race_id: RaceId) -> usize {
        let mut st = self.state.lock();
        let mut repriced = 0;
        for ticket in st
            .tickets
            .iter_mut()
            .filter(|t| t.race_id == race_id && !t.settled)
        {
            let locked = self
                .market
                .locked_odds(race_id, ticket.horse_id, ticket.category);
            if locked != NO_QUOTE {
                ticket.odds = locked;
                repriced += 1;
            }
        }
        if repriced > 0 {
            info!(race_id = %race_id, tickets = repriced, "Tickets repriced at lock");
        }
        repriced
    }

    /// Settle every open ticket of a finished race. Returns the amount paid.
    pub fn settle(&self, race: &RaceSnapshot) -> Decimal {
        let slots = payable_slots(race.entrants.len());
        let mut st = self.state.lock();
        let mut paid = Decimal::ZERO;
        let mut settled = 0;

        for ticket in st
            .tickets
            .iter_mut()
            .filter(|t| t.race_id == race.id && !t.settled)
        {
            let locked = self
                .market
                .locked_odds(race.id, ticket.horse_id, ticket.category);
            if locked != NO_QUOTE {
                ticket.odds = locked;
            }

            let hit = match ticket.category {
                BetCategory::Win => race.winner() == Some(ticket.horse_id),
                BetCategory::Place => race
                    .finishing_position(ticket.horse_id)
                    .is_some_and(|pos| pos < slots),
            };
            ticket.payout = if hit {
                ticket.stake * ticket.odds
            } else {
                Decimal::ZERO
            };
            ticket.settled = true;
            paid += ticket.payout;
            settled += 1;
        }
        st.balance += paid;

        if settled > 0 {
            info!(
                race_id = %race.id,
                tickets = settled,
                paid = %paid,
                balance = %st.balance,
                "Tickets settled"
            );
        }
        paid
    }
}

impl LifecycleObserver for Wallet {
    fn name(&self) -> &str {
        "wallet"
    }

    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::BettingLocked(race_id) => {
                self.reprice(*race_id);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventBus;
    use crate::market::MarketConfig;
    use crate::race::{Entrant, Race, RaceConditions, SimState};
    use crate::types::{ClassTier, Grade, Horse, RunningStyle, Surface};
    use rust_decimal_macros::dec;

    fn make_race(id: u64, n: u32) -> RaceSnapshot {
        let mut race = Race::new(
            RaceId(id),
            RaceConditions {
                name: format!("Race {id}"),
                class: ClassTier::Maiden,
                grade: Grade::General,
                surface: Surface::Dirt,
                distance_m: 1200,
            },
        );
        for i in 1..=n {
            race.entrants.push(Entrant {
                horse: Horse::sample(i, RunningStyle::PacePresser),
                sim: SimState {
                    progress: 0.0,
                    lateral: 0.3,
                    speed: 0.0,
                    stamina: 1.0,
                    start_delay_ticks: 0,
                    failed_kick: false,
                },
            });
        }
        race.snapshot(20)
    }

    fn make_wallet(balance: Decimal) -> (Wallet, Arc<OddsMarket>) {
        let bus = Arc::new(EventBus::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let market = Arc::new(OddsMarket::new(
            MarketConfig {
                seed: Some(5),
                ..Default::default()
            },
            clock.clone(),
            &bus,
        ));
        let wallet = Wallet::new(
            WalletConfig {
                starting_balance: balance,
            },
            market.clone(),
            clock,
        );
        (wallet, market)
    }

    #[test]
    fn test_purchase_debits_and_records() {
        let (wallet, market) = make_wallet(dec!(10000));
        market.seed(&make_race(1, 8));

        let ticket = wallet
            .purchase_ticket(RaceId(1), HorseId(3), BetCategory::Win, dec!(1000))
            .unwrap();
        assert_eq!(wallet.balance(), dec!(9000));
        assert_eq!(ticket.stake, dec!(1000));
        assert_eq!(ticket.odds, market.odds(HorseId(3), BetCategory::Win));
        assert_eq!(wallet.tickets().len(), 1);
    }

    #[test]
    fn test_stake_rounds_half_to_even() {
        let (wallet, market) = make_wallet(dec!(10000));
        market.seed(&make_race(1, 8));
        let ticket = wallet
            .purchase_ticket(RaceId(1), HorseId(1), BetCategory::Place, dec!(100.5))
            .unwrap();
        assert_eq!(ticket.stake, dec!(100));
        let ticket = wallet
            .purchase_ticket(RaceId(1), HorseId(1), BetCategory::Place, dec!(101.5))
            .unwrap();
        assert_eq!(ticket.stake, dec!(102));
    }

    #[test]
    fn test_rejections_leave_state_untouched() {
        let (wallet, market) = make_wallet(dec!(500));
        market.seed(&make_race(1, 8));
        let pools_before = market.snapshot();

        assert_eq!(
            wallet
                .purchase_ticket(RaceId(1), HorseId(1), BetCategory::Win, Decimal::ZERO)
                .unwrap_err(),
            PurchaseRejected::InvalidStake(Decimal::ZERO)
        );
        assert!(matches!(
            wallet
                .purchase_ticket(RaceId(1), HorseId(1), BetCategory::Win, dec!(600))
                .unwrap_err(),
            PurchaseRejected::InsufficientFunds { .. }
        ));
        assert!(matches!(
            wallet
                .purchase_ticket(RaceId(1), HorseId(77), BetCategory::Win, dec!(100))
                .unwrap_err(),
            PurchaseRejected::UnknownHorse { .. }
        ));

        market.lock(RaceId(1));
        assert_eq!(
            wallet
                .purchase_ticket(RaceId(1), HorseId(1), BetCategory::Win, dec!(100))
                .unwrap_err(),
            PurchaseRejected::MarketClosed(RaceId(1))
        );

        assert_eq!(wallet.balance(), dec!(500));
        assert!(wallet.tickets().is_empty());
        assert_eq!(market.snapshot().win.total, pools_before.win.total);
    }

    #[test]
    fn test_reprice_and_win_settlement() {
        let (wallet, market) = make_wallet(dec!(100000));
        let mut race = make_race(1, 8);
        market.seed(&race);

        wallet
            .purchase_ticket(RaceId(1), HorseId(2), BetCategory::Win, dec!(2000))
            .unwrap();
        // Crowd money after purchase moves the live odds.
        market.tick();
        market.lock(RaceId(1));
        assert_eq!(wallet.reprice(RaceId(1)), 1);

        let locked = market.locked_odds(RaceId(1), HorseId(2), BetCategory::Win);
        assert_eq!(wallet.tickets()[0].odds, locked);

        race.finish_order = vec![HorseId(2), HorseId(1), HorseId(3)];
        let paid = wallet.settle(&race);
        assert_eq!(paid, dec!(2000) * locked);
        assert_eq!(wallet.balance(), dec!(98000) + paid);

        let ticket = &wallet.tickets()[0];
        assert!(ticket.settled);
        assert!(ticket.is_winner());

        // Settling again pays nothing.
        assert_eq!(wallet.settle(&race), Decimal::ZERO);
    }

    #[test]
    fn test_place_settlement_respects_slots() {
        let (wallet, market) = make_wallet(dec!(100000));
        let mut race = make_race(1, 5);
        market.seed(&race);

        for id in [1, 2, 3] {
            wallet
                .purchase_ticket(RaceId(1), HorseId(id), BetCategory::Place, dec!(100))
                .unwrap();
        }
        market.lock(RaceId(1));

        // Five runners pay two places.
        race.finish_order = vec![HorseId(2), HorseId(1), HorseId(3), HorseId(4), HorseId(5)];
        wallet.settle(&race);

        let tickets = wallet.tickets();
        assert!(tickets[0].is_winner());
        assert!(tickets[1].is_winner());
        assert!(!tickets[2].is_winner());
        assert!(tickets.iter().all(|t| t.settled));
    }

    #[test]
    fn test_losing_win_ticket_pays_nothing() {
        let (wallet, market) = make_wallet(dec!(1000));
        let mut race = make_race(1, 3);
        market.seed(&race);
        wallet
            .purchase_ticket(RaceId(1), HorseId(3), BetCategory::Win, dec!(1000))
            .unwrap();
        market.lock(RaceId(1));
        race.finish_order = vec![HorseId(1), HorseId(2), HorseId(3)];
        assert_eq!(wallet.settle(&race), Decimal::ZERO);
        assert_eq!(wallet.balance(), Decimal::ZERO);

        let summary = wallet.summary();
        assert_eq!(summary.staked, dec!(1000));
        assert_eq!(summary.open_tickets, 0);
        assert_eq!(summary.net(), dec!(-1000));
    }

    #[test]
    fn test_settle_ignores_other_races() {
        let (wallet, market) = make_wallet(dec!(1000));
        market.seed(&make_race(1, 3));
        wallet
            .purchase_ticket(RaceId(1), HorseId(1), BetCategory::Win, dec!(100))
            .unwrap();
        let mut other = make_race(2, 3);
        other.finish_order = vec![HorseId(1)];
        assert_eq!(wallet.settle(&other), Decimal::ZERO);
        assert!(!wallet.tickets()[0].settled);
        assert_eq!(wallet.tickets_for(RaceId(1)).len(), 1);
    }
}
