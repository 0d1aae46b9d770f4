//! Replicating entities: state machine, pedigree bookkeeping and arena storage.
//!
//! Propagators are never deleted and their parent links never change, so each
//! kind lives in an append-only [`Arena`] and refers to its parent and founder
//! by stable index.

use crate::mutation::MutationIds;
use anyhow::Result;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Replication state. Transitions only move forward; `Dead` is terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationState {
    Alive,
    /// Not replicating but not extinct. Nothing enters this state yet.
    Dormant,
    Dead,
}

impl ReplicationState {
    #[inline(always)]
    pub fn is_alive(self) -> bool { self == ReplicationState::Alive }
    #[inline(always)]
    pub fn is_dead(self) -> bool { self == ReplicationState::Dead }

    /// Moves to `next`, rejecting any backward transition.
    pub fn transition(&mut self, next: ReplicationState) -> Result<()> {
        use ReplicationState::*;
        match (*self, next) {
            (Alive, _) | (Dormant, Dormant) | (Dormant, Dead) | (Dead, Dead) => {
                *self = next;
                Ok(())
            }
            (from, to) => anyhow::bail!("Illegal replication state transition {:?} -> {:?}.", from, to),
        }
    }
}

/// Typed index into an [`Arena`].
pub trait ArenaId: Copy + Eq + Ord + fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

/// Generation, parent and founder of a propagator.
///
/// `generation == 0` iff `parent` is `None` iff `founder == ordinal`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pedigree<K> {
    ordinal: K,
    generation: u32,
    parent: Option<K>,
    founder: K,
}

impl<K: ArenaId> Pedigree<K> {
    pub fn founder_of(ordinal: K) -> Self {
        Self { ordinal, generation: 0, parent: None, founder: ordinal }
    }

    /// Pedigree of a new child of `self`.
    pub fn child(&self, ordinal: K) -> Self {
        Self {
            ordinal,
            generation: self.generation + 1,
            parent: Some(self.ordinal),
            founder: self.founder,
        }
    }

    pub fn ordinal(&self) -> K { self.ordinal }
    pub fn generation(&self) -> u32 { self.generation }
    pub fn parent(&self) -> Option<K> { self.parent }
    pub fn founder(&self) -> K { self.founder }
    pub fn is_founder(&self) -> bool { self.parent.is_none() }
}

/// An entity that can produce offspring and has a replication state.
pub trait Propagator {
    type Id: ArenaId;

    fn pedigree(&self) -> &Pedigree<Self::Id>;
    fn state(&self) -> ReplicationState;
}

/// Append-only store of propagators addressed by their ordinal.
#[derive(Debug)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Propagator> Arena<T> {
    /// Ordinal the next pushed propagator must carry.
    pub fn next_id(&self) -> T::Id {
        T::Id::from_index(self.items.len())
    }

    /// Appends `item`, checking its pedigree against the arena contents.
    pub fn push(&mut self, item: T) -> Result<T::Id> {
        let pedigree = item.pedigree();
        let id = pedigree.ordinal();
        anyhow::ensure!(id == self.next_id(), "Propagator {:?} pushed out of order (expected {:?}).", id, self.next_id());
        match pedigree.parent() {
            None => anyhow::ensure!(
                pedigree.generation() == 0 && pedigree.founder() == id,
                "Founder {:?} has an inconsistent pedigree.",
                id
            ),
            Some(parent) => {
                let parent_pedigree = self
                    .get(parent)
                    .ok_or_else(|| anyhow::anyhow!("Parent {:?} of {:?} does not exist.", parent, id))?
                    .pedigree();
                anyhow::ensure!(
                    pedigree.generation() == parent_pedigree.generation() + 1
                        && pedigree.founder() == parent_pedigree.founder(),
                    "Child {:?} does not extend the pedigree of {:?}.",
                    id,
                    parent
                );
            }
        }
        self.items.push(item);
        Ok(id)
    }

    pub fn get(&self, id: T::Id) -> Option<&T> {
        self.items.get(id.index())
    }

    pub fn get_mut(&mut self, id: T::Id) -> Option<&mut T> {
        self.items.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Ancestors of `id` back to the founder (or to `min_generation`), oldest first, ending with `id`.
    pub fn trace_lineage(&self, id: T::Id, min_generation: u32) -> Vec<T::Id> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let pedigree = self[current].pedigree();
            if pedigree.generation() < min_generation {
                break;
            }
            chain.push(current);
            cursor = pedigree.parent();
        }
        chain.reverse();
        chain
    }
}

impl<T: Propagator> Index<T::Id> for Arena<T> {
    type Output = T;

    fn index(&self, id: T::Id) -> &T {
        &self.items[id.index()]
    }
}

impl<T: Propagator> IndexMut<T::Id> for Arena<T> {
    fn index_mut(&mut self, id: T::Id) -> &mut T {
        &mut self.items[id.index()]
    }
}

/// Per-step inputs shared by every stochastic operation in one advance.
pub struct StepContext<'a> {
    pub time_step: u64,
    pub rng: &'a mut StdRng,
    pub mutation_ids: &'a mut MutationIds,
}
