//! Heritable changes and the generators that produce them at cell division.

use crate::growth::GrowthRate;
use anyhow::Result;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Run-unique identity of a mutation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Issues mutation identities in creation order, one counter per tumor.
#[derive(Debug, Default)]
pub struct MutationIds {
    next: u64,
}

impl MutationIds {
    pub fn issue(&mut self) -> MutationId {
        let id = MutationId(self.next);
        self.next += 1;
        id
    }

    pub fn issued(&self) -> u64 {
        self.next
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MutationEffect {
    Neutral,
    /// Multiplies the birth rate by `1 + coefficient`.
    Selective { coefficient: f64 },
}

/// A single heritable change, created at one time step in exactly one carrier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: MutationId,
    pub origin_step: u64,
    pub effect: MutationEffect,
}

impl Mutation {
    pub fn neutral(id: MutationId, origin_step: u64) -> Self {
        Self { id, origin_step, effect: MutationEffect::Neutral }
    }

    pub fn selective(id: MutationId, origin_step: u64, coefficient: f64) -> Self {
        Self { id, origin_step, effect: MutationEffect::Selective { coefficient } }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self.effect, MutationEffect::Neutral)
    }

    /// Growth rate of a cell carrying this mutation on top of `rate`.
    pub fn apply(&self, rate: GrowthRate) -> GrowthRate {
        match self.effect {
            MutationEffect::Neutral => rate,
            MutationEffect::Selective { coefficient } => rate.scale_birth(coefficient),
        }
    }

    /// Applies every mutation in order.
    pub fn apply_all(mutations: &[Mutation], rate: GrowthRate) -> GrowthRate {
        mutations.iter().fold(rate, |acc, m| m.apply(acc))
    }
}

#[derive(Clone, Debug)]
enum RateKind {
    Never,
    Poisson(Poisson<f64>),
    Fixed(u64),
}

/// Distribution of the number of new mutations acquired by one daughter cell.
#[derive(Clone, Debug)]
pub struct MutationRate {
    mean: f64,
    kind: RateKind,
}

impl MutationRate {
    pub fn never() -> Self {
        Self { mean: 0.0, kind: RateKind::Never }
    }

    /// Poisson-distributed counts. A zero mean never mutates.
    pub fn poisson(mean: f64) -> Result<Self> {
        if !(mean >= 0.0 && mean.is_finite()) {
            anyhow::bail!("Mutation rate mean must be finite and non-negative, got {}.", mean);
        }
        if mean == 0.0 {
            return Ok(Self::never());
        }
        let dist = Poisson::new(mean)
            .map_err(|e| anyhow::anyhow!("Unsupported mutation rate mean {}: {}", mean, e))?;
        Ok(Self { mean, kind: RateKind::Poisson(dist) })
    }

    /// Exactly `count` mutations every time.
    pub fn fixed(count: u64) -> Self {
        Self { mean: count as f64, kind: RateKind::Fixed(count) }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sample(&self, rng: &mut StdRng) -> u64 {
        match &self.kind {
            RateKind::Never => 0,
            RateKind::Poisson(dist) => dist.sample(rng) as u64,
            RateKind::Fixed(count) => *count,
        }
    }
}

/// Generates the new mutations of one daughter cell.
///
/// How many mutations occur is owned by [`Mutator::rate`]; implementors only
/// decide what each mutation does.
pub trait Mutator: fmt::Debug {
    fn rate(&self) -> &MutationRate;

    fn fabricate(&self, id: MutationId, time_step: u64) -> Mutation;

    fn generate(&self, time_step: u64, ids: &mut MutationIds, rng: &mut StdRng) -> Vec<Mutation> {
        match self.rate().sample(rng) {
            0 => Vec::new(),
            1 => vec![self.fabricate(ids.issue(), time_step)],
            2 => {
                let first = self.fabricate(ids.issue(), time_step);
                let second = self.fabricate(ids.issue(), time_step);
                vec![first, second]
            }
            n => (0..n).map(|_| self.fabricate(ids.issue(), time_step)).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NeutralMutator {
    rate: MutationRate,
}

impl NeutralMutator {
    pub fn new(rate: MutationRate) -> Self {
        Self { rate }
    }
}

impl Mutator for NeutralMutator {
    fn rate(&self) -> &MutationRate {
        &self.rate
    }

    fn fabricate(&self, id: MutationId, time_step: u64) -> Mutation {
        Mutation::neutral(id, time_step)
    }
}

/// Every mutation scales the birth rate by the same coefficient.
#[derive(Clone, Debug)]
pub struct SelectiveMutator {
    rate: MutationRate,
    coefficient: f64,
}

impl SelectiveMutator {
    pub fn new(rate: MutationRate, coefficient: f64) -> Result<Self> {
        if !(coefficient > -1.0 && coefficient.is_finite()) {
            anyhow::bail!("Selection coefficient must be finite and greater than -1, got {}.", coefficient);
        }
        Ok(Self { rate, coefficient })
    }
}

impl Mutator for SelectiveMutator {
    fn rate(&self) -> &MutationRate {
        &self.rate
    }

    fn fabricate(&self, id: MutationId, time_step: u64) -> Mutation {
        Mutation::selective(id, time_step, self.coefficient)
    }
}
