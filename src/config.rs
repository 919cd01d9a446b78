//! Configuration loading from TOML.
//!
//! Reads `paddock.toml` and deserializes into strongly-typed sections.
//! Every field has a default, so a partial file (or none at all) yields a
//! runnable configuration. Component configs are derived from here.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::EngineConfig;
use crate::ledger::WalletConfig;
use crate::market::MarketConfig;
use crate::population::HerdConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub market: MarketSection,
    pub population: PopulationConfig,
    pub ledger: LedgerConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed seed for reproducible runs. Random when absent.
    pub seed: Option<u64>,
    pub tick_hz: u32,
    pub voting_secs: u32,
    pub finish_hold_secs: u32,
    pub recovery_interval_secs: u32,
    pub upcoming_depth: usize,
    pub field_size: usize,
    pub winner_prize: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_hz: 10,
            voting_secs: 20,
            finish_hold_secs: 5,
            recovery_interval_secs: 10,
            upcoming_depth: 3,
            field_size: 8,
            winner_prize: 1_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketSection {
    pub interval_secs: u64,
    pub opening_pool_fraction: f64,
    pub seed: Option<u64>,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            opening_pool_fraction: 0.2,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PopulationConfig {
    pub size: usize,
    pub fatigue_ceiling: u8,
    pub min_rest_secs: i64,
    pub recovery_step: u8,
    pub seed: Option<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            fatigue_ceiling: 80,
            min_rest_secs: 20,
            recovery_step: 5,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub starting_balance: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatusConfig {
    /// Seconds between status lines from the binary. 0 disables them.
    pub report_interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 15,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load the file if it exists, otherwise run on defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.simulation.tick_hz > 0, "simulation.tick_hz must be positive");
        anyhow::ensure!(
            self.market.interval_secs > 0,
            "market.interval_secs must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.market.opening_pool_fraction),
            "market.opening_pool_fraction must be within [0, 1]"
        );
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        let sim = &self.simulation;
        EngineConfig {
            tick_hz: sim.tick_hz,
            voting_secs: sim.voting_secs,
            finish_hold_secs: sim.finish_hold_secs,
            recovery_interval_secs: sim.recovery_interval_secs,
            upcoming_depth: sim.upcoming_depth,
            field_size: sim.field_size,
            winner_prize: Decimal::from(sim.winner_prize),
            seed: sim.seed,
        }
    }

    /// Market seed falls back to one derived from the simulation seed.
    pub fn market(&self) -> MarketConfig {
        MarketConfig {
            interval_secs: self.market.interval_secs,
            opening_pool_fraction: Decimal::from_f64(self.market.opening_pool_fraction)
                .map(|f| f.round_dp(6))
                .unwrap_or_else(|| MarketConfig::default().opening_pool_fraction),
            seed: self
                .market
                .seed
                .or_else(|| self.simulation.seed.map(|s| s.wrapping_add(1))),
            ..MarketConfig::default()
        }
    }

    pub fn herd(&self) -> HerdConfig {
        let pop = &self.population;
        HerdConfig {
            size: pop.size,
            fatigue_ceiling: pop.fatigue_ceiling,
            min_rest_secs: pop.min_rest_secs,
            recovery_step: pop.recovery_step,
            seed: pop
                .seed
                .or_else(|| self.simulation.seed.map(|s| s.wrapping_add(2))),
        }
    }

    pub fn wallet(&self) -> WalletConfig {
        WalletConfig {
            starting_balance: Decimal::from(self.ledger.starting_balance),
        }
    }
}
