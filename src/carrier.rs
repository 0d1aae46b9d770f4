//! Mutation-carrying propagators and the arena that owns them.

use crate::env::TumorEnv;
use crate::growth::GrowthRate;
use crate::mutation::{Mutation, Mutator};
use crate::propagator::{Arena, ArenaId, Pedigree, Propagator, ReplicationState, StepContext};
use crate::{cell, lineage};
use anyhow::Result;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CarrierId(pub u32);

impl ArenaId for CarrierId {
    fn from_index(index: usize) -> Self { CarrierId(index as u32) }
    fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierKind {
    /// One cell advanced by exact per-cell sampling.
    Cell,
    /// Homogeneous population that peels off mutated daughters.
    Lineage,
    /// Homogeneous population without a mutator.
    PerfectLineage,
}

pub(crate) enum CarrierBody {
    Cell { mutator: Rc<dyn Mutator> },
    Lineage { cell_count: u64, mutator: Rc<dyn Mutator> },
    PerfectLineage { cell_count: u64 },
}

/// Outcome of splitting one carrier during deme division.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Partition {
    /// Every cell stays.
    Retained,
    /// The whole carrier leaves (single cells cannot be split).
    Moved,
    /// Part of the population left as a new fission-product carrier.
    Split(CarrierId),
}

/// Form of a mutated daughter spawned by a carrier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum DaughterForm {
    Cell,
    Lineage,
}

/// A propagator with mutation provenance and one intrinsic growth rate.
pub struct Carrier {
    pub(crate) pedigree: Pedigree<CarrierId>,
    pub(crate) state: ReplicationState,
    /// Mutations that originated in this carrier, fixed at construction.
    pub(crate) original_mutations: Vec<Mutation>,
    pub(crate) growth_rate: GrowthRate,
    pub(crate) body: CarrierBody,
}

impl Carrier {
    pub fn id(&self) -> CarrierId {
        self.pedigree.ordinal()
    }

    pub fn kind(&self) -> CarrierKind {
        match self.body {
            CarrierBody::Cell { .. } => CarrierKind::Cell,
            CarrierBody::Lineage { .. } => CarrierKind::Lineage,
            CarrierBody::PerfectLineage { .. } => CarrierKind::PerfectLineage,
        }
    }

    pub fn cell_count(&self) -> u64 {
        match self.body {
            CarrierBody::Cell { .. } => u64::from(self.state.is_alive()),
            CarrierBody::Lineage { cell_count, .. } | CarrierBody::PerfectLineage { cell_count } => cell_count,
        }
    }

    pub fn growth_rate(&self) -> GrowthRate {
        self.growth_rate
    }

    pub fn original_mutations(&self) -> &[Mutation] {
        &self.original_mutations
    }

    pub fn is_dead(&self) -> bool {
        self.state.is_dead()
    }

    /// Sets the live cell count of a population; reaching zero kills it.
    pub(crate) fn set_cell_count(&mut self, count: u64) -> Result<()> {
        match &mut self.body {
            CarrierBody::Lineage { cell_count, .. } | CarrierBody::PerfectLineage { cell_count } => {
                *cell_count = count;
            }
            CarrierBody::Cell { .. } => anyhow::bail!("Carrier {} is a single cell and has no cell count.", self.pedigree.ordinal()),
        }
        if count == 0 {
            self.state.transition(ReplicationState::Dead)?;
        }
        Ok(())
    }

    pub(crate) fn retire(&mut self) -> Result<()> {
        self.state.transition(ReplicationState::Dead)
    }
}

impl Propagator for Carrier {
    type Id = CarrierId;

    fn pedigree(&self) -> &Pedigree<CarrierId> {
        &self.pedigree
    }

    fn state(&self) -> ReplicationState {
        self.state
    }
}

/// Owns every carrier of one tumor, live or dead.
#[derive(Default)]
pub struct CarrierRegistry {
    pub(crate) arena: Arena<Carrier>,
    accumulated: HashMap<CarrierId, Rc<[Mutation]>>,
}

impl CarrierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: CarrierId) -> Option<&Carrier> {
        self.arena.get(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Carrier> {
        self.arena.iter()
    }

    pub fn cell_count(&self, id: CarrierId) -> u64 {
        self.arena[id].cell_count()
    }

    pub fn trace_lineage(&self, id: CarrierId, min_generation: u32) -> Vec<CarrierId> {
        self.arena.trace_lineage(id, min_generation)
    }

    fn push_founder(&mut self, growth_rate: GrowthRate, body: CarrierBody) -> Result<CarrierId> {
        let pedigree = Pedigree::founder_of(self.arena.next_id());
        self.arena.push(Carrier {
            pedigree,
            state: ReplicationState::Alive,
            original_mutations: Vec::new(),
            growth_rate,
            body,
        })
    }

    pub fn found_lineage(&mut self, cell_count: u64, growth_rate: GrowthRate, mutator: Rc<dyn Mutator>) -> Result<CarrierId> {
        anyhow::ensure!(cell_count > 0, "A founding lineage needs at least one cell.");
        self.push_founder(growth_rate, CarrierBody::Lineage { cell_count, mutator })
    }

    pub fn found_perfect_lineage(&mut self, cell_count: u64, growth_rate: GrowthRate) -> Result<CarrierId> {
        anyhow::ensure!(cell_count > 0, "A founding lineage needs at least one cell.");
        self.push_founder(growth_rate, CarrierBody::PerfectLineage { cell_count })
    }

    pub fn found_cell(&mut self, growth_rate: GrowthRate, mutator: Rc<dyn Mutator>) -> Result<CarrierId> {
        self.push_founder(growth_rate, CarrierBody::Cell { mutator })
    }

    /// Child of `parent` holding `cell_count` of its cells, with no new mutations.
    pub(crate) fn spawn_fission(&mut self, parent: CarrierId, cell_count: u64) -> Result<CarrierId> {
        anyhow::ensure!(cell_count > 0, "Fission product of {} would be empty.", parent);
        let source = &self.arena[parent];
        let body = match &source.body {
            CarrierBody::Lineage { mutator, .. } => CarrierBody::Lineage { cell_count, mutator: Rc::clone(mutator) },
            CarrierBody::PerfectLineage { .. } => CarrierBody::PerfectLineage { cell_count },
            CarrierBody::Cell { .. } => anyhow::bail!("Single cell {} cannot undergo fission.", parent),
        };
        let carrier = Carrier {
            pedigree: source.pedigree.child(self.arena.next_id()),
            state: ReplicationState::Alive,
            original_mutations: Vec::new(),
            growth_rate: source.growth_rate,
            body,
        };
        self.arena.push(carrier)
    }

    /// Single-cell child of `parent` carrying `mutations` on top of the parent's.
    pub(crate) fn spawn_daughter(
        &mut self,
        parent: CarrierId,
        mutator: Rc<dyn Mutator>,
        mutations: Vec<Mutation>,
        form: DaughterForm,
    ) -> Result<CarrierId> {
        let source = &self.arena[parent];
        let growth_rate = Mutation::apply_all(&mutations, source.growth_rate);
        let body = match form {
            DaughterForm::Cell => CarrierBody::Cell { mutator },
            DaughterForm::Lineage => CarrierBody::Lineage { cell_count: 1, mutator },
        };
        let carrier = Carrier {
            pedigree: source.pedigree.child(self.arena.next_id()),
            state: ReplicationState::Alive,
            original_mutations: mutations,
            growth_rate,
            body,
        };
        self.arena.push(carrier)
    }

    /// Advances one carrier by a time step and returns the carriers it spawned.
    /// Dead carriers do nothing.
    pub fn advance(&mut self, id: CarrierId, env: &TumorEnv, ctx: &mut StepContext) -> Result<Vec<CarrierId>> {
        let carrier = &self.arena[id];
        if carrier.is_dead() {
            return Ok(Vec::new());
        }
        match carrier.kind() {
            CarrierKind::Cell => cell::advance(self, id, env, ctx),
            CarrierKind::Lineage | CarrierKind::PerfectLineage => lineage::advance(self, id, env, ctx),
        }
    }

    /// Splits a carrier between its deme and a daughter deme.
    pub fn divide(&mut self, id: CarrierId, retention_probability: f64, rng: &mut StdRng) -> Result<Partition> {
        if !(0.0..=1.0).contains(&retention_probability) {
            anyhow::bail!("Retention probability must lie in [0, 1], got {}.", retention_probability);
        }
        let carrier = &self.arena[id];
        if carrier.is_dead() {
            return Ok(Partition::Retained);
        }
        match carrier.kind() {
            CarrierKind::Cell => Ok(cell::divide(retention_probability, rng)),
            CarrierKind::Lineage | CarrierKind::PerfectLineage => lineage::divide(self, id, retention_probability, rng),
        }
    }

    /// Every mutation accumulated from the founder down to `id`, oldest first.
    ///
    /// Ancestry never changes, so the result is computed once per carrier and
    /// reused; a cached ancestor supplies the prefix of a new entry.
    pub fn accumulated_mutations(&mut self, id: CarrierId) -> Rc<[Mutation]> {
        if let Some(cached) = self.accumulated.get(&id) {
            return Rc::clone(cached);
        }
        let chain = self.arena.trace_lineage(id, 0);
        let mut start = 0;
        let mut mutations: Vec<Mutation> = Vec::new();
        for (position, ancestor) in chain.iter().enumerate().rev() {
            if let Some(cached) = self.accumulated.get(ancestor) {
                mutations.extend_from_slice(cached);
                start = position + 1;
                break;
            }
        }
        for ancestor in &chain[start..] {
            mutations.extend_from_slice(&self.arena[*ancestor].original_mutations);
        }
        let mutations: Rc<[Mutation]> = mutations.into();
        self.accumulated.insert(id, Rc::clone(&mutations));
        mutations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationIds, MutationRate, NeutralMutator};
    use rand::SeedableRng;
    use tumor_common::EnvParams;

    fn quiet() -> Rc<dyn Mutator> {
        Rc::new(NeutralMutator::new(MutationRate::never()))
    }

    #[test]
    fn test_founders_are_generation_zero() {
        let mut registry = CarrierRegistry::new();
        let rate = GrowthRate::new(0.1, 0.1).unwrap();
        let lineage = registry.found_lineage(10, rate, quiet()).unwrap();
        let cell = registry.found_cell(rate, quiet()).unwrap();
        for id in [lineage, cell] {
            let pedigree = registry.get(id).unwrap().pedigree();
            assert_eq!(pedigree.generation(), 0);
            assert_eq!(pedigree.founder(), id);
            assert!(pedigree.is_founder());
        }
        assert!(registry.found_lineage(0, rate, quiet()).is_err());
        assert_eq!(registry.cell_count(cell), 1);
    }

    #[test]
    fn test_accumulated_mutations_follow_ancestry() {
        let mut registry = CarrierRegistry::new();
        let mut ids = MutationIds::default();
        let rate = GrowthRate::new(0.1, 0.1).unwrap();
        let root = registry.found_lineage(5, rate, quiet()).unwrap();
        let m1 = Mutation::neutral(ids.issue(), 1);
        let m2 = Mutation::neutral(ids.issue(), 2);
        let m3 = Mutation::neutral(ids.issue(), 3);
        let child = registry.spawn_daughter(root, quiet(), vec![m1.clone()], DaughterForm::Lineage).unwrap();
        let fission = registry.spawn_fission(child, 1).unwrap();
        let grandchild = registry
            .spawn_daughter(fission, quiet(), vec![m2.clone(), m3.clone()], DaughterForm::Lineage)
            .unwrap();

        assert!(registry.accumulated_mutations(root).is_empty());
        assert_eq!(&*registry.accumulated_mutations(child), &[m1.clone()]);
        let all = registry.accumulated_mutations(grandchild);
        assert_eq!(&*all, &[m1, m2, m3]);
        // Served from the cache on the second call.
        assert!(Rc::ptr_eq(&all, &registry.accumulated_mutations(grandchild)));
        assert_eq!(registry.trace_lineage(grandchild, 0), vec![root, child, fission, grandchild]);
    }

    #[test]
    fn test_dead_carrier_is_immobile() {
        let params = EnvParams::default();
        let env = TumorEnv::unrestricted(&params);
        let mut rng = StdRng::seed_from_u64(42);
        let mut ids = MutationIds::default();
        let mut registry = CarrierRegistry::new();
        let doomed = GrowthRate::new(0.0, 1.0).unwrap();
        let lineage = registry.found_lineage(3, doomed, quiet()).unwrap();
        let cell = registry.found_cell(doomed, quiet()).unwrap();

        for id in [lineage, cell] {
            let mut ctx = StepContext { time_step: 0, rng: &mut rng, mutation_ids: &mut ids };
            assert!(registry.advance(id, &env, &mut ctx).unwrap().is_empty());
            assert!(registry.get(id).unwrap().is_dead());
            let mut ctx = StepContext { time_step: 1, rng: &mut rng, mutation_ids: &mut ids };
            assert!(registry.advance(id, &env, &mut ctx).unwrap().is_empty());
            assert_eq!(registry.get(id).unwrap().state(), ReplicationState::Dead);
            assert_eq!(registry.divide(id, 0.0, &mut rng).unwrap(), Partition::Retained);
        }
    }
}
