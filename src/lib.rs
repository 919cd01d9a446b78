//! PADDOCK: tick-driven horse race simulation with a pari-mutuel odds
//! market.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod app;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod market;
pub mod population;
pub mod race;
pub mod scheduler;
pub mod types;
