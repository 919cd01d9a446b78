//! Race settlement: what the pools took in and what they paid out.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use super::pool::LockedPool;
use crate::types::{HorseId, RaceId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceSettlement {
    pub race_id: RaceId,
    pub race_name: String,
    pub settled_at: DateTime<Utc>,
    pub win_sales: Decimal,
    pub place_sales: Decimal,
    pub win_payout: Decimal,
    pub place_payout: Decimal,
}

impl RaceSettlement {
    /// Settle a race from its locked pools and finish order.
    pub fn compute(
        race_id: RaceId,
        race_name: &str,
        settled_at: DateTime<Utc>,
        win: &LockedPool,
        place: &LockedPool,
        place_slots: usize,
        finish_order: &[HorseId],
    ) -> Self {
        let win_payout = finish_order
            .first()
            .map(|winner| win.liability(*winner))
            .unwrap_or(Decimal::ZERO);
        let place_payout = finish_order
            .iter()
            .take(place_slots)
            .map(|id| place.liability(*id))
            .sum();

        Self {
            race_id,
            race_name: race_name.to_string(),
            settled_at,
            win_sales: win.total,
            place_sales: place.total,
            win_payout,
            place_payout,
        }
    }

    pub fn total_sales(&self) -> Decimal {
        self.win_sales + self.place_sales
    }

    pub fn total_payout(&self) -> Decimal {
        self.win_payout + self.place_payout
    }

    /// Negative when the pools paid out more than they took.
    pub fn house_profit(&self) -> Decimal {
        self.total_sales() - self.total_payout()
    }
}

impl fmt::Display for RaceSettlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | sales ${:.0} | payout ${:.0} | house ${:.0}",
            self.race_id,
            self.race_name,
            self.total_sales(),
            self.total_payout(),
            self.house_profit(),
        )
    }
}
