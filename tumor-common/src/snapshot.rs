use crate::coord::Coord;
use serde::{Deserialize, Serialize};

/// A snapshot of the tumor state and metrics at a specific time step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Replicate index this snapshot belongs to.
    pub replicate: u32,
    /// Number of completed time steps.
    pub time_step: u64,
    /// Total number of live cells across every live deme.
    pub total_cell_count: u64,
    pub live_deme_count: usize,
    pub dead_deme_count: usize,
    /// Lineages (or single cells) with at least one live cell.
    pub live_lineage_count: usize,
    /// Distinct mutations carried by at least one live cell.
    pub mutation_count: usize,
    /// Per-deme occupancy. Included only if `output.save_demes_in_snapshot` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demes: Option<Vec<DemeSnapshot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemeSnapshot {
    pub coord: Coord,
    pub cell_count: u64,
    pub lineage_count: usize,
}
