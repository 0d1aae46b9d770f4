//! Agent-based tumor growth on a sparse lattice of demes.
//!
//! A [`Tumor`] owns every propagator: demes placed on a [`Lattice`], each holding
//! carriers (single cells or counted lineages) that grow, mutate and split under a
//! layered [`TumorEnv`].

pub mod carrier;
pub mod cell;
pub mod deme;
pub mod env;
pub mod growth;
pub mod lattice;
pub mod lineage;
pub mod mutation;
pub mod propagator;
pub mod simulation;
pub mod tumor;

pub use carrier::{Carrier, CarrierId, CarrierKind, CarrierRegistry, Partition};
pub use deme::{Deme, DemeId, DemeRegistry};
pub use env::{EnvRule, TumorEnv};
pub use growth::{GrowthCount, GrowthRate};
pub use lattice::Lattice;
pub use mutation::{
    Mutation, MutationEffect, MutationId, MutationIds, MutationRate, Mutator, NeutralMutator,
    SelectiveMutator,
};
pub use propagator::{Arena, ArenaId, Pedigree, Propagator, ReplicationState, StepContext};
pub use simulation::{SurveyRow, TumorSimulation};
pub use tumor::{Founder, MutationRecord, MutationSurvey, Tumor};
