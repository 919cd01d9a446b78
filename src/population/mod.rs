//! Population provider: where race fields come from.
//!
//! The engine only knows the [`PopulationProvider`] trait. [`herd::Herd`]
//! is the in-memory implementation used by the binary.

pub mod herd;

use std::collections::HashSet;

use crate::types::{ClassTier, Grade, Horse, HorseId, RunRecord};

/// Source of eligible entrants and owner of the canonical horse records.
///
/// Implementations must be safe to call from the engine driver while other
/// threads read them.
pub trait PopulationProvider: Send + Sync {
    /// Up to `count` horses eligible for a race of this class and grade,
    /// skipping any id in `exclude` (horses already carded elsewhere).
    /// Returned horses are copies; order is arbitrary.
    fn select_entrants(
        &self,
        class: ClassTier,
        grade: Grade,
        count: usize,
        exclude: &HashSet<HorseId>,
    ) -> Vec<Horse>;

    /// Periodic fatigue recovery across the whole population.
    fn recover_all(&self);

    /// Post-race updates for horses that just ran.
    fn record_runs(&self, records: &[RunRecord]);
}

pub use herd::{Herd, HerdConfig};
