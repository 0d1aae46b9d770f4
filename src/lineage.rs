//! Homogeneous multi-cell lineages.
//!
//! A lineage stores its cells as a count. Only daughters that acquire at
//! least one mutation become carriers of their own; unmutated daughters stay
//! folded into the parent's count.

use crate::carrier::{CarrierBody, CarrierId, CarrierRegistry, DaughterForm, Partition};
use crate::env::TumorEnv;
use crate::propagator::StepContext;
use anyhow::Result;
use log::trace;
use rand::rngs::StdRng;
use rand_distr::{Binomial, Distribution};
use std::rc::Rc;

pub(crate) fn advance(
    registry: &mut CarrierRegistry,
    id: CarrierId,
    env: &TumorEnv,
    ctx: &mut StepContext,
) -> Result<Vec<CarrierId>> {
    let carrier = &registry.arena[id];
    let (cell_count, mutator) = match &carrier.body {
        CarrierBody::Lineage { cell_count, mutator } => (*cell_count, Some(Rc::clone(mutator))),
        CarrierBody::PerfectLineage { cell_count } => (*cell_count, None),
        CarrierBody::Cell { .. } => anyhow::bail!("Carrier {} is a single cell, not a lineage.", id),
    };

    let mut rate = env.growth_rate(carrier.growth_rate);
    if !env.allow_cell_division() {
        rate = rate.no_birth();
    }
    let count = if cell_count <= env.exact_enumeration_limit() {
        rate.sample(cell_count, ctx.rng)
    } else {
        rate.compute(cell_count, ctx.rng)?
    };

    // Every birth turns one cell into two daughters, so 2 * births daughter
    // slots are already inside the updated count.
    let mut next_count = cell_count + count.births - count.deaths;
    let mut daughters = Vec::new();
    if let Some(mutator) = mutator {
        for _ in 0..2 * count.births {
            let mutations = mutator.generate(ctx.time_step, ctx.mutation_ids, ctx.rng);
            if mutations.is_empty() {
                continue;
            }
            next_count -= 1;
            daughters.push(registry.spawn_daughter(id, Rc::clone(&mutator), mutations, DaughterForm::Lineage)?);
        }
    }
    registry.arena[id].set_cell_count(next_count)?;

    trace!(
        "Lineage {} at step {}: {} -> {} cells ({} births, {} deaths, {} mutants)",
        id,
        ctx.time_step,
        cell_count,
        next_count,
        count.births,
        count.deaths,
        daughters.len()
    );
    Ok(daughters)
}

/// Each cell leaves with probability `1 - retention_probability`; the
/// leavers form one fission product. The lineage may be emptied.
pub(crate) fn divide(
    registry: &mut CarrierRegistry,
    id: CarrierId,
    retention_probability: f64,
    rng: &mut StdRng,
) -> Result<Partition> {
    let cell_count = registry.arena[id].cell_count();
    let transferred = Binomial::new(cell_count, 1.0 - retention_probability)?.sample(rng);
    if transferred == 0 {
        return Ok(Partition::Retained);
    }
    registry.arena[id].set_cell_count(cell_count - transferred)?;
    let product = registry.spawn_fission(id, transferred)?;
    Ok(Partition::Split(product))
}

#[cfg(test)]
mod tests {
    use crate::carrier::{CarrierRegistry, Partition};
    use crate::env::{EnvRule, TumorEnv};
    use crate::growth::GrowthRate;
    use crate::mutation::{Mutation, MutationId, MutationIds, MutationRate, Mutator, NeutralMutator};
    use crate::propagator::{Propagator, StepContext};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::Cell;
    use std::rc::Rc;
    use tumor_common::EnvParams;

    /// Mutates only the first daughter it is asked about.
    #[derive(Debug)]
    struct FirstDaughterMutator {
        calls: Cell<u32>,
        rate: MutationRate,
    }

    impl Mutator for FirstDaughterMutator {
        fn rate(&self) -> &MutationRate {
            &self.rate
        }

        fn fabricate(&self, id: MutationId, time_step: u64) -> Mutation {
            Mutation::neutral(id, time_step)
        }

        fn generate(&self, time_step: u64, ids: &mut MutationIds, _rng: &mut StdRng) -> Vec<Mutation> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == 0 {
                vec![self.fabricate(ids.issue(), time_step)]
            } else {
                Vec::new()
            }
        }
    }

    fn total_cells(registry: &CarrierRegistry, ids: &[crate::carrier::CarrierId]) -> u64 {
        ids.iter().map(|id| registry.cell_count(*id)).sum()
    }

    #[test]
    fn test_mutated_daughter_is_peeled_off() {
        let params = EnvParams::default();
        let env = TumorEnv::unrestricted(&params);
        let mut rng = StdRng::seed_from_u64(42);
        let mut ids = MutationIds::default();
        let mut registry = CarrierRegistry::new();
        let mutator = Rc::new(FirstDaughterMutator { calls: Cell::new(0), rate: MutationRate::never() });
        let always_divides = GrowthRate::new(1.0, 0.0).unwrap();
        let parent = registry.found_lineage(1, always_divides, mutator.clone()).unwrap();

        let mut ctx = StepContext { time_step: 4, rng: &mut rng, mutation_ids: &mut ids };
        let spawned = registry.advance(parent, &env, &mut ctx).unwrap();

        assert_eq!(mutator.calls.get(), 2);
        assert_eq!(registry.cell_count(parent), 1);
        assert_eq!(spawned.len(), 1);
        let daughter = registry.get(spawned[0]).unwrap();
        assert_eq!(daughter.cell_count(), 1);
        assert_eq!(daughter.original_mutations().len(), 1);
        assert_eq!(daughter.original_mutations()[0].origin_step, 4);
        assert_eq!(daughter.pedigree().parent(), Some(parent));
        assert_eq!(daughter.pedigree().generation(), 1);
    }

    #[test]
    fn test_mass_conserved_across_spawned_daughters() {
        let params = EnvParams { exact_enumeration_limit: 16, ..EnvParams::default() };
        let env = TumorEnv::unrestricted(&params);
        let mut rng = StdRng::seed_from_u64(7);
        let mut ids = MutationIds::default();
        let always_divides = GrowthRate::new(1.0, 0.0).unwrap();

        // One population below and one above the exact enumeration limit.
        for start in [10u64, 500] {
            let mut registry = CarrierRegistry::new();
            let mutator = Rc::new(NeutralMutator::new(MutationRate::poisson(0.5).unwrap()));
            let parent = registry.found_lineage(start, always_divides, mutator).unwrap();
            let mut ctx = StepContext { time_step: 1, rng: &mut rng, mutation_ids: &mut ids };
            let spawned = registry.advance(parent, &env, &mut ctx).unwrap();
            assert!(!spawned.is_empty());
            assert!(spawned.iter().all(|id| registry.cell_count(*id) == 1));
            assert_eq!(registry.cell_count(parent) + total_cells(&registry, &spawned), 2 * start);
        }
    }

    #[test]
    fn test_no_cell_division_blocks_births() {
        let params = EnvParams::default();
        let base = TumorEnv::unrestricted(&params);
        let env = base.restrict(EnvRule::NoCellDivision);
        let mut rng = StdRng::seed_from_u64(3);
        let mut ids = MutationIds::default();
        let mut registry = CarrierRegistry::new();
        let rate = GrowthRate::new(0.9, 0.05).unwrap();
        let parent = registry.found_perfect_lineage(200, rate).unwrap();
        for step in 0..5 {
            let before = registry.cell_count(parent);
            let mut ctx = StepContext { time_step: step, rng: &mut rng, mutation_ids: &mut ids };
            assert!(registry.advance(parent, &env, &mut ctx).unwrap().is_empty());
            assert!(registry.cell_count(parent) <= before);
        }
    }

    #[test]
    fn test_division_conserves_cells() {
        let mut rng = StdRng::seed_from_u64(42);
        let rate = GrowthRate::new(0.1, 0.1).unwrap();
        for retention in [0.0, 0.25, 0.5, 0.9] {
            let mut registry = CarrierRegistry::new();
            let parent = registry.found_perfect_lineage(100, rate).unwrap();
            match registry.divide(parent, retention, &mut rng).unwrap() {
                Partition::Split(product) => {
                    assert_eq!(registry.cell_count(parent) + registry.cell_count(product), 100);
                    assert!(registry.get(product).unwrap().original_mutations().is_empty());
                    assert_eq!(registry.get(product).unwrap().growth_rate(), rate);
                }
                Partition::Retained => assert_eq!(registry.cell_count(parent), 100),
                Partition::Moved => panic!("lineages are never moved whole"),
            }
        }
    }

    #[test]
    fn test_full_retention_never_transfers() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut registry = CarrierRegistry::new();
        let quiet = Rc::new(NeutralMutator::new(MutationRate::never()));
        let parent = registry.found_lineage(4, GrowthRate::new(0.2, 0.1).unwrap(), quiet).unwrap();
        for _ in 0..1000 {
            assert_eq!(registry.divide(parent, 1.0, &mut rng).unwrap(), Partition::Retained);
        }
        assert_eq!(registry.cell_count(parent), 4);
    }

    #[test]
    fn test_zero_retention_empties_lineage() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut registry = CarrierRegistry::new();
        let parent = registry.found_perfect_lineage(12, GrowthRate::new(0.2, 0.1).unwrap()).unwrap();
        let Partition::Split(product) = registry.divide(parent, 0.0, &mut rng).unwrap() else {
            panic!("every cell should transfer");
        };
        assert_eq!(registry.cell_count(product), 12);
        assert_eq!(registry.cell_count(parent), 0);
        assert!(registry.get(parent).unwrap().is_dead());
        assert!(registry.divide(parent, 1.5, &mut rng).is_err());
    }
}
