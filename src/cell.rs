//! Single tumor cells advanced by exact per-cell sampling.

use crate::carrier::{CarrierBody, CarrierId, CarrierRegistry, DaughterForm, Partition};
use crate::env::TumorEnv;
use crate::propagator::StepContext;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;
use std::rc::Rc;

/// A dividing cell is replaced by two daughter cells, each carrying whatever
/// new mutations it acquired; a dying cell leaves nothing.
pub(crate) fn advance(
    registry: &mut CarrierRegistry,
    id: CarrierId,
    env: &TumorEnv,
    ctx: &mut StepContext,
) -> Result<Vec<CarrierId>> {
    let carrier = &registry.arena[id];
    let CarrierBody::Cell { mutator } = &carrier.body else {
        anyhow::bail!("Carrier {} is a lineage, not a single cell.", id);
    };
    let mutator = Rc::clone(mutator);

    let mut rate = env.growth_rate(carrier.growth_rate);
    if !env.allow_cell_division() {
        rate = rate.no_birth();
    }
    let count = rate.sample(1, ctx.rng);
    if count.deaths > 0 {
        registry.arena[id].retire()?;
        return Ok(Vec::new());
    }
    if count.births == 0 {
        return Ok(Vec::new());
    }

    let mut daughters = Vec::with_capacity(2);
    for _ in 0..2 {
        let mutations = mutator.generate(ctx.time_step, ctx.mutation_ids, ctx.rng);
        daughters.push(registry.spawn_daughter(id, Rc::clone(&mutator), mutations, DaughterForm::Cell)?);
    }
    registry.arena[id].retire()?;
    Ok(daughters)
}

/// A cell cannot be split: it either stays or moves as a whole.
pub(crate) fn divide(retention_probability: f64, rng: &mut StdRng) -> Partition {
    let u: f64 = rng.random();
    if u < 1.0 - retention_probability {
        Partition::Moved
    } else {
        Partition::Retained
    }
}
