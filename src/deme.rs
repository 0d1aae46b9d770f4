//! Spatially co-located groups of carriers.

use crate::carrier::{CarrierId, CarrierRegistry, Partition};
use crate::env::{EnvRule, TumorEnv};
use crate::propagator::{Arena, ArenaId, Pedigree, Propagator, ReplicationState, StepContext};
use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DemeId(pub u32);

impl ArenaId for DemeId {
    fn from_index(index: usize) -> Self { DemeId(index as u32) }
    fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for DemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// A set of carriers sharing one lattice site.
///
/// Members are split into `live` and `dead` by their replication state. A
/// carrier moves from `live` to `dead` once, the first time it is seen dead
/// after an advance or a division.
#[derive(Debug)]
pub struct Deme {
    pedigree: Pedigree<DemeId>,
    state: ReplicationState,
    live: BTreeSet<CarrierId>,
    dead: BTreeSet<CarrierId>,
}

impl Propagator for Deme {
    type Id = DemeId;

    fn pedigree(&self) -> &Pedigree<DemeId> {
        &self.pedigree
    }

    fn state(&self) -> ReplicationState {
        self.state
    }
}

impl Deme {
    fn new(pedigree: Pedigree<DemeId>, live: BTreeSet<CarrierId>) -> Self {
        Self { pedigree, state: ReplicationState::Alive, live, dead: BTreeSet::new() }
    }

    pub fn id(&self) -> DemeId {
        self.pedigree.ordinal()
    }

    pub fn live_lineages(&self) -> &BTreeSet<CarrierId> {
        &self.live
    }

    pub fn dead_lineages(&self) -> &BTreeSet<CarrierId> {
        &self.dead
    }

    pub fn contains(&self, carrier: CarrierId) -> bool {
        self.live.contains(&carrier) || self.dead.contains(&carrier)
    }

    pub fn cell_count(&self, carriers: &CarrierRegistry) -> u64 {
        self.live.iter().map(|id| carriers.cell_count(*id)).sum()
    }

    /// Moves members that have died since the last look into the dead set.
    fn reap(&mut self, carriers: &CarrierRegistry) {
        let newly_dead: Vec<CarrierId> = self
            .live
            .iter()
            .copied()
            .filter(|id| carriers.arena[*id].is_dead())
            .collect();
        for id in newly_dead {
            self.live.remove(&id);
            self.dead.insert(id);
        }
    }

    /// Advances every live member, then divides if the deme is over capacity
    /// and the environment allows it. Returns the members of the daughter deme.
    ///
    /// All carriers that leave in one division are merged into a single
    /// daughter, however many members contributed to it.
    fn advance(
        &mut self,
        env: &TumorEnv,
        carriers: &mut CarrierRegistry,
        ctx: &mut StepContext,
    ) -> Result<Option<BTreeSet<CarrierId>>> {
        if self.state.is_dead() {
            return Ok(None);
        }
        let max_size = env.max_deme_size();
        let component = env.component_env();
        let restricted;
        // Over capacity but unable to divide: members may only shrink.
        let member_env = if self.cell_count(carriers) > max_size && !env.allow_deme_division() {
            restricted = component.restrict(EnvRule::NoBirth);
            &restricted
        } else {
            &component
        };

        let members: Vec<CarrierId> = self.live.iter().copied().collect();
        let mut spawned = Vec::new();
        for member in members {
            spawned.extend(carriers.advance(member, member_env, ctx)?);
        }
        self.live.extend(spawned);
        self.reap(carriers);

        let mut daughter = None;
        let cell_count = self.cell_count(carriers);
        if cell_count > max_size && env.allow_deme_division() {
            let retention = env.retention_probability();
            let members: Vec<CarrierId> = self.live.iter().copied().collect();
            let mut transferred = BTreeSet::new();
            for member in members {
                match carriers.divide(member, retention, ctx.rng)? {
                    Partition::Retained => {}
                    Partition::Moved => {
                        self.live.remove(&member);
                        transferred.insert(member);
                    }
                    Partition::Split(product) => {
                        transferred.insert(product);
                    }
                }
            }
            self.reap(carriers);
            if !transferred.is_empty() {
                debug!(
                    "Deme {} divided at step {}: {} carriers leave, {} cells stay",
                    self.id(),
                    ctx.time_step,
                    transferred.len(),
                    self.cell_count(carriers)
                );
                daughter = Some(transferred);
            }
        }

        if self.live.is_empty() {
            self.state.transition(ReplicationState::Dead)?;
        }
        Ok(daughter)
    }
}

/// Owns every deme of one tumor, live or dead.
#[derive(Debug, Default)]
pub struct DemeRegistry {
    arena: Arena<Deme>,
}

impl DemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: DemeId) -> Option<&Deme> {
        self.arena.get(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deme> {
        self.arena.iter()
    }

    pub fn trace_lineage(&self, id: DemeId, min_generation: u32) -> Vec<DemeId> {
        self.arena.trace_lineage(id, min_generation)
    }

    /// Creates a founding deme holding `members`, which must all be alive.
    pub fn found(&mut self, members: &[CarrierId], carriers: &CarrierRegistry) -> Result<DemeId> {
        anyhow::ensure!(!members.is_empty(), "A founding deme needs at least one lineage.");
        for member in members {
            let carrier = carriers
                .get(*member)
                .ok_or_else(|| anyhow::anyhow!("Founding lineage {} does not exist.", member))?;
            anyhow::ensure!(!carrier.is_dead(), "Founding lineage {} is dead.", member);
        }
        let pedigree = Pedigree::founder_of(self.arena.next_id());
        self.arena.push(Deme::new(pedigree, members.iter().copied().collect()))
    }

    /// Advances one deme and returns the daughter demes it produced (at most one).
    pub fn advance(
        &mut self,
        id: DemeId,
        env: &TumorEnv,
        carriers: &mut CarrierRegistry,
        ctx: &mut StepContext,
    ) -> Result<Vec<DemeId>> {
        let next_id = self.arena.next_id();
        let deme = self
            .arena
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Deme {} does not exist.", id))?;
        let Some(members) = deme.advance(env, carriers, ctx)? else {
            return Ok(Vec::new());
        };
        let pedigree = deme.pedigree.child(next_id);
        let daughter = self.arena.push(Deme::new(pedigree, members))?;
        Ok(vec![daughter])
    }
}
