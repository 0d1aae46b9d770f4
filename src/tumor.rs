//! The tumor: demes on a sparse lattice plus provenance and spatial queries.

use crate::carrier::{CarrierId, CarrierRegistry};
use crate::deme::{Deme, DemeId, DemeRegistry};
use crate::env::{EnvRule, TumorEnv};
use crate::growth::GrowthRate;
use crate::lattice::Lattice;
use crate::mutation::{Mutation, MutationId, MutationIds, Mutator};
use crate::propagator::{Propagator, StepContext};
use anyhow::Result;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tumor_common::Coord;

/// One founding population of the origin deme.
pub enum Founder {
    Lineage { cell_count: u64, growth_rate: GrowthRate, mutator: Rc<dyn Mutator> },
    Cell { growth_rate: GrowthRate, mutator: Rc<dyn Mutator> },
    PerfectLineage { cell_count: u64, growth_rate: GrowthRate },
}

/// Where one mutation came from and where it is now.
#[derive(Clone, Debug)]
pub struct MutationRecord {
    pub mutation: Mutation,
    /// The only carrier listing this mutation among its original mutations.
    pub originator: CarrierId,
    /// Site of the originator's deme (its last site, if that deme is extinct).
    pub origin_site: Coord,
    /// Live cells carrying the mutation.
    pub cell_count: u64,
    /// Occupied sites holding at least one carrying cell.
    pub sites: BTreeSet<Coord>,
}

/// Every mutation carried by at least one live cell.
#[derive(Clone, Debug, Default)]
pub struct MutationSurvey {
    pub total_cells: u64,
    pub records: BTreeMap<MutationId, MutationRecord>,
}

impl MutationSurvey {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: MutationId) -> Option<&MutationRecord> {
        self.records.get(&id)
    }

    /// Fraction of live cells carrying `id`.
    pub fn frequency(&self, id: MutationId) -> f64 {
        match self.records.get(&id) {
            Some(record) if self.total_cells > 0 => record.cell_count as f64 / self.total_cells as f64,
            _ => 0.0,
        }
    }
}

pub struct Tumor {
    carriers: CarrierRegistry,
    demes: DemeRegistry,
    lattice: Lattice,
    live_demes: BTreeSet<DemeId>,
    /// Extinct demes and the last site each one occupied.
    dead_demes: BTreeMap<DemeId, Coord>,
    mutation_ids: MutationIds,
    time_step: u64,
}

impl Tumor {
    /// Founds a tumor with one deme at the origin holding `founders`.
    pub fn create(founders: Vec<Founder>) -> Result<Self> {
        anyhow::ensure!(!founders.is_empty(), "A tumor needs at least one founder.");
        let mut carriers = CarrierRegistry::new();
        let mut members = Vec::with_capacity(founders.len());
        for founder in founders {
            let id = match founder {
                Founder::Lineage { cell_count, growth_rate, mutator } => {
                    carriers.found_lineage(cell_count, growth_rate, mutator)?
                }
                Founder::Cell { growth_rate, mutator } => carriers.found_cell(growth_rate, mutator)?,
                Founder::PerfectLineage { cell_count, growth_rate } => {
                    carriers.found_perfect_lineage(cell_count, growth_rate)?
                }
            };
            members.push(id);
        }

        let mut demes = DemeRegistry::new();
        let founder_deme = demes.found(&members, &carriers)?;
        let mut lattice = Lattice::new();
        lattice.occupy(founder_deme, Coord::ORIGIN)?;

        Ok(Self {
            carriers,
            demes,
            lattice,
            live_demes: BTreeSet::from([founder_deme]),
            dead_demes: BTreeMap::new(),
            mutation_ids: MutationIds::default(),
            time_step: 0,
        })
    }

    /// Advances every live deme once, in random order.
    ///
    /// A deme with no free neighboring site may not divide. Daughter demes
    /// go to a uniformly chosen free neighbor and first advance next step.
    /// Demes left without cells are retired with their last site recorded.
    pub fn advance(&mut self, env: &TumorEnv, rng: &mut StdRng) -> Result<()> {
        let mut order: Vec<DemeId> = self.live_demes.iter().copied().collect();
        order.shuffle(rng);

        let neighborhood = env.neighborhood();
        let component = env.component_env();
        let enclosed = component.restrict(EnvRule::NoDemeDivision);
        let mut ctx = StepContext { time_step: self.time_step, rng, mutation_ids: &mut self.mutation_ids };

        for deme in order {
            let deme_env = if self.lattice.has_available_neighbor(deme, neighborhood)? {
                &component
            } else {
                &enclosed
            };
            let offspring = self.demes.advance(deme, deme_env, &mut self.carriers, &mut ctx)?;
            anyhow::ensure!(
                offspring.len() <= 1,
                "Deme {} produced {} daughters in one step.",
                deme,
                offspring.len()
            );
            for daughter in offspring {
                let site = self
                    .lattice
                    .find_available(deme, neighborhood, ctx.rng)?
                    .ok_or_else(|| anyhow::anyhow!("Deme {} divided with no free neighboring site.", deme))?;
                self.lattice.occupy(daughter, site)?;
                self.live_demes.insert(daughter);
                debug!("Deme {} placed at {:?} (parent {}) at step {}", daughter, site, deme, self.time_step);
            }

            let retired = self.demes.get(deme).map_or(false, |d| d.state().is_dead());
            if retired {
                let last_site = self.lattice.vacate(deme)?;
                self.live_demes.remove(&deme);
                self.dead_demes.insert(deme, last_site);
                debug!("Deme {} died at {:?} at step {}", deme, last_site, self.time_step);
            }
        }

        self.time_step += 1;
        Ok(())
    }

    fn deme(&self, id: DemeId) -> Result<&Deme> {
        self.demes.get(id).ok_or_else(|| anyhow::anyhow!("Deme {} does not exist.", id))
    }

    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    pub fn carriers(&self) -> &CarrierRegistry {
        &self.carriers
    }

    pub fn demes(&self) -> &DemeRegistry {
        &self.demes
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn live_demes(&self) -> &BTreeSet<DemeId> {
        &self.live_demes
    }

    pub fn dead_demes(&self) -> &BTreeMap<DemeId, Coord> {
        &self.dead_demes
    }

    pub fn count_live_demes(&self) -> usize {
        self.live_demes.len()
    }

    pub fn count_dead_demes(&self) -> usize {
        self.dead_demes.len()
    }

    pub fn count_cells(&self) -> u64 {
        self.live_demes
            .iter()
            .filter_map(|id| self.demes.get(*id))
            .map(|deme| deme.cell_count(&self.carriers))
            .sum()
    }

    pub fn count_live_lineages(&self) -> usize {
        self.live_demes
            .iter()
            .filter_map(|id| self.demes.get(*id))
            .map(|deme| deme.live_lineages().len())
            .sum()
    }

    /// Current site of a live deme, or the last site of an extinct one.
    pub fn deme_coord(&self, deme: DemeId) -> Option<Coord> {
        self.lattice.locate(deme).or_else(|| self.dead_demes.get(&deme).copied())
    }

    pub fn trace_lineage(&self, carrier: CarrierId, min_generation: u32) -> Vec<CarrierId> {
        self.carriers.trace_lineage(carrier, min_generation)
    }

    pub fn accumulated_mutations(&mut self, carrier: CarrierId) -> Rc<[Mutation]> {
        self.carriers.accumulated_mutations(carrier)
    }

    /// Maps each mutation to the single carrier it originated in.
    pub fn find_originators(&self) -> Result<BTreeMap<MutationId, CarrierId>> {
        let mut originators = BTreeMap::new();
        for carrier in self.carriers.iter() {
            for mutation in carrier.original_mutations() {
                if let Some(previous) = originators.insert(mutation.id, carrier.id()) {
                    anyhow::bail!(
                        "Mutation {} originated in both {} and {}.",
                        mutation.id,
                        previous,
                        carrier.id()
                    );
                }
            }
        }
        Ok(originators)
    }

    /// Maps each carrier to the site of the deme holding it.
    pub fn locate_lineages(&self) -> Result<BTreeMap<CarrierId, Coord>> {
        let mut locations = BTreeMap::new();
        for deme in self.demes.iter() {
            let coord = self
                .deme_coord(deme.id())
                .ok_or_else(|| anyhow::anyhow!("Deme {} has no recorded site.", deme.id()))?;
            for carrier in deme.live_lineages().iter().chain(deme.dead_lineages()) {
                if let Some(previous) = locations.insert(*carrier, coord) {
                    anyhow::bail!("Lineage {} is located at both {:?} and {:?}.", carrier, previous, coord);
                }
            }
        }
        Ok(locations)
    }

    /// Surveys every mutation carried by a live cell.
    pub fn survey_mutations(&mut self) -> Result<MutationSurvey> {
        let originators = self.find_originators()?;
        let locations = self.locate_lineages()?;

        let mut occupants: Vec<(CarrierId, u64, Coord)> = Vec::new();
        for deme_id in &self.live_demes {
            let deme = self.deme(*deme_id)?;
            let coord = self
                .lattice
                .locate(*deme_id)
                .ok_or_else(|| anyhow::anyhow!("Live deme {} is not on the lattice.", deme_id))?;
            for carrier in deme.live_lineages() {
                occupants.push((*carrier, self.carriers.cell_count(*carrier), coord));
            }
        }

        let mut survey = MutationSurvey::default();
        for (carrier, cell_count, coord) in occupants {
            survey.total_cells += cell_count;
            for mutation in self.carriers.accumulated_mutations(carrier).iter() {
                let record = match survey.records.entry(mutation.id) {
                    Entry::Occupied(slot) => slot.into_mut(),
                    Entry::Vacant(slot) => {
                        let originator = *originators
                            .get(&mutation.id)
                            .ok_or_else(|| anyhow::anyhow!("Mutation {} has no originating lineage.", mutation.id))?;
                        let origin_site = *locations
                            .get(&originator)
                            .ok_or_else(|| anyhow::anyhow!("Lineage {} has no location.", originator))?;
                        slot.insert(MutationRecord {
                            mutation: mutation.clone(),
                            originator,
                            origin_site,
                            cell_count: 0,
                            sites: BTreeSet::new(),
                        })
                    }
                };
                record.cell_count += cell_count;
                record.sites.insert(coord);
            }
        }
        Ok(survey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationRate, NeutralMutator};
    use rand::SeedableRng;
    use tumor_common::{EnvParams, Neighborhood};

    fn founder(cell_count: u64, birth: f64, death: f64, mean_mutations: f64) -> Founder {
        Founder::Lineage {
            cell_count,
            growth_rate: GrowthRate::new(birth, death).unwrap(),
            mutator: Rc::new(NeutralMutator::new(MutationRate::poisson(mean_mutations).unwrap())),
        }
    }

    #[test]
    fn test_founder_deme_at_origin() {
        let tumor = Tumor::create(vec![founder(10, 0.2, 0.1, 0.0)]).unwrap();
        assert_eq!(tumor.count_live_demes(), 1);
        assert_eq!(tumor.count_dead_demes(), 0);
        let deme = *tumor.live_demes().iter().next().unwrap();
        assert_eq!(tumor.lattice().locate(deme), Some(Coord::ORIGIN));
        assert_eq!(tumor.count_cells(), 10);
        assert!(Tumor::create(Vec::new()).is_err());
    }

    #[test]
    fn test_daughter_demes_land_next_to_parents() {
        let params = EnvParams { max_deme_size: 40, neighborhood: Neighborhood::VonNeumann2d, ..EnvParams::default() };
        let env = TumorEnv::unrestricted(&params);
        let mut rng = StdRng::seed_from_u64(42);
        let mut tumor = Tumor::create(vec![founder(10, 0.4, 0.05, 0.05)]).unwrap();
        for _ in 0..40 {
            tumor.advance(&env, &mut rng).unwrap();
        }
        assert!(tumor.count_live_demes() > 1);
        for deme in tumor.demes().iter() {
            if let Some(parent) = deme.pedigree().parent() {
                let here = tumor.deme_coord(deme.id()).unwrap();
                let there = tumor.deme_coord(parent).unwrap();
                let offset = (here.x - there.x).abs() + (here.y - there.y).abs();
                assert_eq!(offset, 1, "{} at {:?}, parent {} at {:?}", deme.id(), here, parent, there);
            }
        }
        assert_eq!(tumor.time_step(), 40);
    }

    #[test]
    fn test_enclosed_deme_cannot_divide() {
        let params = EnvParams { max_deme_size: 20, neighborhood: Neighborhood::VonNeumann2d, ..EnvParams::default() };
        let env = TumorEnv::unrestricted(&params);
        let mut rng = StdRng::seed_from_u64(42);
        let mut tumor = Tumor::create(vec![founder(30, 0.5, 0.05, 0.0)]).unwrap();
        for (k, offset) in Neighborhood::VonNeumann2d.offsets().iter().enumerate() {
            tumor.lattice.occupy(DemeId(1000 + k as u32), *offset).unwrap();
        }
        let mut previous = tumor.count_cells();
        for _ in 0..10 {
            tumor.advance(&env, &mut rng).unwrap();
            assert_eq!(tumor.demes().len(), 1);
            let current = tumor.count_cells();
            assert!(current <= previous || previous <= params.max_deme_size);
            previous = current;
        }
    }

    #[test]
    fn test_extinct_tumor_records_last_site() {
        let params = EnvParams::default();
        let env = TumorEnv::unrestricted(&params);
        let mut rng = StdRng::seed_from_u64(42);
        let mut tumor = Tumor::create(vec![founder(5, 0.0, 1.0, 0.0)]).unwrap();
        tumor.advance(&env, &mut rng).unwrap();
        assert_eq!(tumor.count_live_demes(), 0);
        assert_eq!(tumor.count_dead_demes(), 1);
        assert!(tumor.lattice().is_empty());
        assert_eq!(tumor.dead_demes().values().next(), Some(&Coord::ORIGIN));
        assert_eq!(tumor.count_cells(), 0);
        // Dead lineages remain locatable at the extinct deme's last site.
        let locations = tumor.locate_lineages().unwrap();
        assert_eq!(locations.values().collect::<Vec<_>>(), vec![&Coord::ORIGIN]);
    }

    #[test]
    fn test_survey_attributes_each_mutation_once() {
        let params = EnvParams { max_deme_size: 50, ..EnvParams::default() };
        let env = TumorEnv::unrestricted(&params);
        let mut rng = StdRng::seed_from_u64(11);
        let mut tumor = Tumor::create(vec![founder(20, 0.3, 0.05, 0.1)]).unwrap();
        for _ in 0..25 {
            tumor.advance(&env, &mut rng).unwrap();
        }
        let survey = tumor.survey_mutations().unwrap();
        assert!(!survey.is_empty());
        assert_eq!(survey.total_cells, tumor.count_cells());
        let originators = tumor.find_originators().unwrap();
        for (id, record) in &survey.records {
            assert_eq!(originators[id], record.originator);
            assert!(record.cell_count > 0 && record.cell_count <= survey.total_cells);
            assert!(!record.sites.is_empty());
            let originator = tumor.carriers().get(record.originator).unwrap();
            assert!(originator.original_mutations().iter().any(|m| m.id == *id));
            assert!(survey.frequency(*id) > 0.0);
        }
    }

    #[test]
    fn test_duplicate_originator_is_fatal() {
        let mut tumor = Tumor::create(vec![founder(3, 0.0, 0.0, 0.0)]).unwrap();
        let shared = Mutation::neutral(MutationId(99), 0);
        tumor.carriers.arena[CarrierId(0)].original_mutations.push(shared.clone());
        let quiet: Rc<dyn Mutator> = Rc::new(NeutralMutator::new(MutationRate::never()));
        tumor
            .carriers
            .spawn_daughter(CarrierId(0), quiet, vec![shared], crate::carrier::DaughterForm::Lineage)
            .unwrap();
        assert!(tumor.find_originators().is_err());
    }
}
