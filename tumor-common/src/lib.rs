pub mod config;
pub mod coord;
pub mod env_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use config::{
    EnvironmentConfig, FounderConfig, FounderKind, InitialConditions, MutationConfig,
    MutationKind, OutputConfig, Restriction, TimingConfig, TumorConfig,
};
pub use coord::{Coord, Neighborhood};
pub use env_params::EnvParams;
pub use snapshot::{DemeSnapshot, Snapshot};
