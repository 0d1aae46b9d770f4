use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::coord::Neighborhood;
use crate::env_params::{
    EnvParams, DEFAULT_EXACT_ENUMERATION_LIMIT, DEFAULT_MAX_DEME_SIZE,
    DEFAULT_RETENTION_PROBABILITY,
};
use std::path::Path;

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub total_steps: u64,
    #[serde(default = "default_record_interval")]
    pub record_interval_steps: u64,
}

// Seeding and run-level limits
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub seed: u64,
    #[serde(default = "default_replicates")]
    pub replicates: u32,
    /// Stop a replicate early once its total cell count exceeds this value.
    #[serde(default)]
    pub max_tumor_size: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FounderKind {
    Lineage,
    Cell,
    PerfectLineage,
}

// The founding population placed in the origin deme
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FounderConfig {
    #[serde(default = "default_founder_kind")]
    pub kind: FounderKind,
    #[serde(default = "default_founder_cells")]
    pub cell_count: u64,
    pub birth_rate: f64,
    pub death_rate: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Neutral,
    Selective,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MutationConfig {
    #[serde(default = "default_mutation_kind")]
    pub kind: MutationKind,
    /// Mean number of new mutations per daughter cell.
    #[serde(default)]
    pub mean_rate: f64,
    /// Relative change in birth rate applied by each selective mutation.
    #[serde(default)]
    pub selection_coefficient: f64,
}

// Top-level restriction wrapped around the base environment
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    #[default]
    None,
    NoBirth,
    NoGrowth,
    NoCellDivision,
    NoDemeDivision,
    SlowGrowth,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EnvironmentConfig {
    #[serde(default = "default_exact_enumeration_limit")]
    pub exact_enumeration_limit: u64,
    #[serde(default = "default_max_deme_size")]
    pub max_deme_size: u64,
    #[serde(default = "default_retention_probability")]
    pub retention_probability: f64,
    #[serde(default)]
    pub neighborhood: Neighborhood,
    #[serde(default)]
    pub restriction: Restriction,
    /// Fraction of the net growth rate kept under `restriction = "slow_growth"`.
    #[serde(default = "default_slow_growth_fraction")]
    pub slow_growth_fraction: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            exact_enumeration_limit: DEFAULT_EXACT_ENUMERATION_LIMIT,
            max_deme_size: DEFAULT_MAX_DEME_SIZE,
            retention_probability: DEFAULT_RETENTION_PROBABILITY,
            neighborhood: Neighborhood::default(),
            restriction: Restriction::None,
            slow_growth_fraction: default_slow_growth_fraction(),
        }
    }
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_stats: bool,
    #[serde(default)]
    pub save_demes_in_snapshot: bool,
    /// Write the final mutation survey of each replicate as CSV.
    #[serde(default)]
    pub save_survey: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TumorConfig {
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    pub founder: FounderConfig,
    #[serde(default = "default_mutation_config")]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    pub output: OutputConfig,
}

impl TumorConfig {
    /// Loads the tumor configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: TumorConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.founder.cell_count == 0 {
            anyhow::bail!("founder.cell_count must be greater than 0.");
        }
        if self.founder.kind == FounderKind::Cell && self.founder.cell_count != 1 {
            anyhow::bail!("founder.cell_count must be 1 for a single-cell founder.");
        }
        if self.timing.record_interval_steps == 0 {
            anyhow::bail!("timing.record_interval_steps must be greater than 0.");
        }
        if self.initial_conditions.replicates == 0 {
            anyhow::bail!("initial_conditions.replicates must be greater than 0.");
        }
        if !(self.mutation.mean_rate >= 0.0 && self.mutation.mean_rate.is_finite()) {
            anyhow::bail!("mutation.mean_rate must be a finite non-negative number.");
        }
        if !(0.0..=1.0).contains(&self.environment.slow_growth_fraction) {
            anyhow::bail!("environment.slow_growth_fraction must lie in [0, 1].");
        }
        // Growth rates are checked again when the founder is built; fail early here.
        let (b, d) = (self.founder.birth_rate, self.founder.death_rate);
        if !(b >= 0.0 && d >= 0.0 && b + d <= 1.0) {
            anyhow::bail!("founder birth_rate ({}) and death_rate ({}) must be non-negative and sum to at most 1.", b, d);
        }
        self.env_params().validate()
    }

    /// Converts the configuration into the parameters answered by the base environment.
    pub fn env_params(&self) -> EnvParams {
        EnvParams {
            exact_enumeration_limit: self.environment.exact_enumeration_limit,
            neighborhood: self.environment.neighborhood,
            max_deme_size: self.environment.max_deme_size,
            retention_probability: self.environment.retention_probability,
        }
    }
}

fn default_record_interval() -> u64 { 1 }
fn default_replicates() -> u32 { 1 }
fn default_founder_kind() -> FounderKind { FounderKind::Lineage }
fn default_founder_cells() -> u64 { 1 }
fn default_mutation_kind() -> MutationKind { MutationKind::Neutral }
fn default_exact_enumeration_limit() -> u64 { DEFAULT_EXACT_ENUMERATION_LIMIT }
fn default_max_deme_size() -> u64 { DEFAULT_MAX_DEME_SIZE }
fn default_retention_probability() -> f64 { DEFAULT_RETENTION_PROBABILITY }
fn default_slow_growth_fraction() -> f64 { 0.5 }

fn default_mutation_config() -> MutationConfig {
    MutationConfig {
        kind: MutationKind::Neutral,
        mean_rate: 0.0,
        selection_coefficient: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [timing]
        total_steps = 50

        [initial_conditions]
        seed = 7

        [founder]
        birth_rate = 0.2
        death_rate = 0.1

        [output]
        base_filename = "tumor"
        save_stats = false
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = TumorConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.founder.kind, FounderKind::Lineage);
        assert_eq!(config.founder.cell_count, 1);
        assert_eq!(config.initial_conditions.replicates, 1);
        assert_eq!(config.mutation.kind, MutationKind::Neutral);
        assert_eq!(config.environment.restriction, Restriction::None);
        assert_eq!(config.env_params(), EnvParams::default());
    }

    #[test]
    fn test_environment_section_parses_enums() {
        let text = format!(
            "{}\n[environment]\nneighborhood = \"von_neumann_3d\"\nrestriction = \"slow_growth\"\nmax_deme_size = 64\n",
            MINIMAL
        );
        let config = TumorConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.environment.neighborhood, Neighborhood::VonNeumann3d);
        assert_eq!(config.environment.restriction, Restriction::SlowGrowth);
        assert_eq!(config.env_params().max_deme_size, 64);
    }

    #[test]
    fn test_rejects_invalid_rates() {
        let text = MINIMAL.replace("death_rate = 0.1", "death_rate = 0.9");
        assert!(TumorConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_retention() {
        let text = format!("{}\n[environment]\nretention_probability = 1.5\n", MINIMAL);
        assert!(TumorConfig::from_toml_str(&text).is_err());
    }
}
