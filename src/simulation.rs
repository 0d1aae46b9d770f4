use crate::env::{EnvRule, TumorEnv};
use crate::growth::GrowthRate;
use crate::mutation::{MutationRate, Mutator, NeutralMutator, SelectiveMutator};
use crate::tumor::{Founder, MutationSurvey, Tumor};
use anyhow::Result;
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Instant;
use tumor_common::{DemeSnapshot, EnvParams, FounderKind, MutationConfig, MutationKind, Snapshot, TumorConfig};

/// One row of a mutation survey, flattened for CSV output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyRow {
    pub replicate: u32,
    pub mutation: u64,
    pub origin_step: u64,
    pub neutral: bool,
    pub originator: u32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub origin_z: i32,
    pub cell_count: u64,
    pub frequency: f64,
    pub site_count: usize,
}

/// Drives one replicate of a tumor growth run from a configuration.
pub struct TumorSimulation {
    /// The run configuration, including founder and environment settings.
    pub config: TumorConfig,
    pub tumor: Tumor,
    /// Single random source consumed by every stochastic operation of this replicate.
    pub rng: StdRng,
    replicate: u32,
    params: EnvParams,
    /// Run-wide restrictions from `[environment] restriction`.
    session: Vec<EnvRule>,
    recorded_snapshots: Vec<Snapshot>,
}

impl TumorSimulation {
    /// Creates replicate `replicate`, seeded from `seed + replicate`.
    pub fn new(config: TumorConfig, replicate: u32) -> Result<Self> {
        config.validate()?;
        let seed = config.initial_conditions.seed.wrapping_add(replicate as u64);
        let rng = StdRng::seed_from_u64(seed);
        let params = config.env_params();
        let session = EnvRule::from_restriction(
            config.environment.restriction,
            config.environment.slow_growth_fraction,
        )?
        .into_iter()
        .collect();
        let tumor = Tumor::create(vec![build_founder(&config)?])?;
        debug!("Replicate {} seeded with {}", replicate, seed);

        Ok(Self {
            config,
            tumor,
            rng,
            replicate,
            params,
            session,
            recorded_snapshots: Vec::new(),
        })
    }

    /// Advances the tumor by one time step.
    pub fn step(&mut self) -> Result<()> {
        let env = TumorEnv::session(&self.params, &self.session);
        self.tumor.advance(&env, &mut self.rng)
    }

    /// True once the step budget is spent, the tumor is extinct, or it outgrew `max_tumor_size`.
    pub fn is_finished(&self) -> bool {
        if self.tumor.time_step() >= self.config.timing.total_steps || self.tumor.count_live_demes() == 0 {
            return true;
        }
        match self.config.initial_conditions.max_tumor_size {
            Some(limit) => self.tumor.count_cells() > limit,
            None => false,
        }
    }

    /// Steps until finished, recording a snapshot every `record_interval_steps`.
    pub fn run(&mut self) -> Result<()> {
        let start_time = Instant::now();
        let record_interval = self.config.timing.record_interval_steps;
        self.record_snapshot()?;

        while !self.is_finished() {
            let step_start_time = Instant::now();
            self.step()?;
            let step = self.tumor.time_step();

            if step % record_interval == 0 || self.is_finished() {
                self.record_snapshot()?;
                info!(
                    "Replicate {} step [{}/{}] | Cells: {} | Demes: {} live, {} dead | Elapsed: {:.2} s",
                    self.replicate,
                    step,
                    self.config.timing.total_steps,
                    self.tumor.count_cells(),
                    self.tumor.count_live_demes(),
                    self.tumor.count_dead_demes(),
                    start_time.elapsed().as_secs_f64()
                );
            } else {
                trace!(
                    "Replicate {} step {} completed in {:.2} ms",
                    self.replicate,
                    step,
                    step_start_time.elapsed().as_secs_f64() * 1000.0
                );
            }
        }
        Ok(())
    }

    pub fn record_snapshot(&mut self) -> Result<()> {
        let survey = self.tumor.survey_mutations()?;
        let demes = if self.config.output.save_demes_in_snapshot {
            let mut rows = Vec::with_capacity(self.tumor.count_live_demes());
            for id in self.tumor.live_demes() {
                let Some(deme) = self.tumor.demes().get(*id) else { continue };
                let coord = self
                    .tumor
                    .deme_coord(*id)
                    .ok_or_else(|| anyhow::anyhow!("Live deme {} has no site.", id))?;
                rows.push(DemeSnapshot {
                    coord,
                    cell_count: deme.cell_count(self.tumor.carriers()),
                    lineage_count: deme.live_lineages().len(),
                });
            }
            Some(rows)
        } else {
            None
        };

        self.recorded_snapshots.push(Snapshot {
            replicate: self.replicate,
            time_step: self.tumor.time_step(),
            total_cell_count: survey.total_cells,
            live_deme_count: self.tumor.count_live_demes(),
            dead_deme_count: self.tumor.count_dead_demes(),
            live_lineage_count: self.tumor.count_live_lineages(),
            mutation_count: survey.len(),
            demes,
        });
        Ok(())
    }

    pub fn recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    pub fn take_snapshots(&mut self) -> Vec<Snapshot> {
        std::mem::take(&mut self.recorded_snapshots)
    }

    pub fn current_cell_count(&self) -> u64 {
        self.tumor.count_cells()
    }

    pub fn replicate(&self) -> u32 {
        self.replicate
    }

    pub fn params(&self) -> &EnvParams {
        &self.params
    }

    pub fn config(&self) -> &TumorConfig {
        &self.config
    }

    pub fn survey(&mut self) -> Result<MutationSurvey> {
        self.tumor.survey_mutations()
    }

    /// The current mutation survey as flat rows.
    pub fn survey_rows(&mut self) -> Result<Vec<SurveyRow>> {
        let survey = self.tumor.survey_mutations()?;
        Ok(survey
            .records
            .values()
            .map(|record| SurveyRow {
                replicate: self.replicate,
                mutation: record.mutation.id.0,
                origin_step: record.mutation.origin_step,
                neutral: record.mutation.is_neutral(),
                originator: record.originator.0,
                origin_x: record.origin_site.x,
                origin_y: record.origin_site.y,
                origin_z: record.origin_site.z,
                cell_count: record.cell_count,
                frequency: survey.frequency(record.mutation.id),
                site_count: record.sites.len(),
            })
            .collect())
    }
}

/// Builds the mutation generator described by `[mutation]`.
pub fn build_mutator(config: &MutationConfig) -> Result<Rc<dyn Mutator>> {
    let rate = MutationRate::poisson(config.mean_rate)?;
    Ok(match config.kind {
        MutationKind::Neutral => Rc::new(NeutralMutator::new(rate)),
        MutationKind::Selective => Rc::new(SelectiveMutator::new(rate, config.selection_coefficient)?),
    })
}

/// Builds the founding population described by `[founder]`.
pub fn build_founder(config: &TumorConfig) -> Result<Founder> {
    let growth_rate = GrowthRate::new(config.founder.birth_rate, config.founder.death_rate)?;
    let cell_count = config.founder.cell_count;
    Ok(match config.founder.kind {
        FounderKind::Lineage => Founder::Lineage { cell_count, growth_rate, mutator: build_mutator(&config.mutation)? },
        FounderKind::Cell => Founder::Cell { growth_rate, mutator: build_mutator(&config.mutation)? },
        FounderKind::PerfectLineage => Founder::PerfectLineage { cell_count, growth_rate },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> TumorConfig {
        let text = format!(
            r#"
            [timing]
            total_steps = 30
            record_interval_steps = 10

            [initial_conditions]
            seed = 5

            [founder]
            cell_count = 10
            birth_rate = 0.3
            death_rate = 0.05

            [mutation]
            mean_rate = 0.05

            [output]
            base_filename = "test"
            save_stats = false
            save_demes_in_snapshot = true

            {}
            "#,
            extra
        );
        TumorConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn test_run_records_snapshots_at_interval() {
        let mut sim = TumorSimulation::new(config(""), 0).unwrap();
        sim.run().unwrap();
        let steps: Vec<u64> = sim.recorded_snapshots().iter().map(|s| s.time_step).collect();
        if sim.tumor.count_live_demes() > 0 {
            assert_eq!(steps, vec![0, 10, 20, 30]);
        }
        let last = sim.recorded_snapshots().last().unwrap();
        assert_eq!(last.total_cell_count, sim.current_cell_count());
        assert_eq!(last.demes.as_ref().unwrap().len(), last.live_deme_count);
    }

    #[test]
    fn test_same_seed_same_tumor() {
        let mut a = TumorSimulation::new(config(""), 3).unwrap();
        let mut b = TumorSimulation::new(config(""), 3).unwrap();
        a.run().unwrap();
        b.run().unwrap();
        assert_eq!(a.current_cell_count(), b.current_cell_count());
        assert_eq!(a.tumor.count_live_demes(), b.tumor.count_live_demes());
        assert_eq!(a.survey_rows().unwrap().len(), b.survey_rows().unwrap().len());
    }

    #[test]
    fn test_session_no_birth_never_grows() {
        let mut sim = TumorSimulation::new(config("[environment]\nrestriction = \"no_birth\"\n"), 0).unwrap();
        let mut previous = sim.current_cell_count();
        while !sim.is_finished() {
            sim.step().unwrap();
            let current = sim.current_cell_count();
            assert!(current <= previous);
            previous = current;
        }
        assert!(sim.survey().unwrap().is_empty());
    }

    #[test]
    fn test_max_tumor_size_stops_early() {
        let mut cfg = config("");
        cfg.initial_conditions.max_tumor_size = Some(15);
        cfg.founder.birth_rate = 0.9;
        cfg.founder.death_rate = 0.0;
        let mut sim = TumorSimulation::new(cfg, 0).unwrap();
        sim.run().unwrap();
        assert!(sim.current_cell_count() > 15);
        assert!(sim.tumor.time_step() < 30);
    }
}
