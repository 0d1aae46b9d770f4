use crate::coord::Neighborhood;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default population size at or below which births and deaths are drawn one cell at a time.
pub const DEFAULT_EXACT_ENUMERATION_LIMIT: u64 = 32;
/// Default number of cells a deme may hold before it tries to divide.
pub const DEFAULT_MAX_DEME_SIZE: u64 = 1000;
/// Default probability that a cell stays in its deme when the deme divides.
pub const DEFAULT_RETENTION_PROBABILITY: f64 = 0.5;

/// Tunable parameters answered by the base tumor environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvParams {
    /// Populations at or below this size are advanced by exact per-cell trials.
    pub exact_enumeration_limit: u64,
    /// Lattice offsets searched when placing a daughter deme.
    pub neighborhood: Neighborhood,
    /// Cell count above which a deme divides (or stops growing, if it may not divide).
    pub max_deme_size: u64,
    /// Per-cell probability of staying behind when a deme divides.
    pub retention_probability: f64,
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            exact_enumeration_limit: DEFAULT_EXACT_ENUMERATION_LIMIT,
            neighborhood: Neighborhood::default(),
            max_deme_size: DEFAULT_MAX_DEME_SIZE,
            retention_probability: DEFAULT_RETENTION_PROBABILITY,
        }
    }
}

impl EnvParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_deme_size == 0 {
            anyhow::bail!("max_deme_size must be greater than 0.");
        }
        if !(0.0..=1.0).contains(&self.retention_probability) {
            anyhow::bail!(
                "retention_probability must lie in [0, 1], got {}.",
                self.retention_probability
            );
        }
        Ok(())
    }
}
