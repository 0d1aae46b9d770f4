use anyhow::Result;
use clap::Parser;
use log::{debug, error, info};
use rayon::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tumor_common::{Snapshot, TumorConfig};
use tumor_engine::{SurveyRow, TumorSimulation};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs replicate tumor growth simulations", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the number of replicates from the configuration
    #[arg(short, long)]
    replicates: Option<u32>,

    /// Override the base seed from the configuration
    #[arg(short, long)]
    seed: Option<u64>,
}

struct ReplicateOutput {
    snapshots: Vec<Snapshot>,
    survey: Vec<SurveyRow>,
}

fn run_replicate(config: &TumorConfig, replicate: u32) -> Result<ReplicateOutput> {
    let mut sim = TumorSimulation::new(config.clone(), replicate)?;
    debug!("Replicate {} environment: {:#?}", replicate, sim.params());
    sim.run()?;
    info!(
        "Replicate {} finished at step {} with {} cells in {} demes.",
        replicate,
        sim.tumor.time_step(),
        sim.current_cell_count(),
        sim.tumor.count_live_demes()
    );
    let survey = if config.output.save_survey { sim.survey_rows()? } else { Vec::new() };
    Ok(ReplicateOutput { snapshots: sim.take_snapshots(), survey })
}

fn save_snapshots(config: &TumorConfig, snapshots: &[Snapshot]) -> Result<()> {
    let output_format = config.output.format.as_deref().unwrap_or("json");
    let base = &config.output.base_filename;

    match output_format {
        "bincode" => {
            let filename = format!("{}_snapshots.bin", base);
            let file = File::create(&filename)
                .map_err(|e| anyhow::anyhow!("Error creating snapshot file '{}': {}", filename, e))?;
            bincode::serialize_into(file, snapshots)?;
            info!("All snapshots saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            let mut file = File::create(&filename)
                .map_err(|e| anyhow::anyhow!("Error creating snapshot file '{}': {}", filename, e))?;
            rmp_serde::encode::write(&mut file, snapshots)?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                error!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base);
            let mut file = File::create(&filename)
                .map_err(|e| anyhow::anyhow!("Error creating snapshot file '{}': {}", filename, e))?;
            let json_string = serde_json::to_string(snapshots)?;
            file.write_all(json_string.as_bytes())?;
            info!("All snapshots saved to {} ({}MB)", filename, json_string.len() / 1_048_576);
        }
    }
    Ok(())
}

fn save_survey(config: &TumorConfig, rows: &[SurveyRow]) -> Result<()> {
    let filename = format!("{}_survey.csv", config.output.base_filename);
    let mut writer = csv::Writer::from_path(&filename)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Mutation survey saved to {} ({} rows)", filename, rows.len());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting Tumor Engine...");
    let mut config = TumorConfig::load(&args.config)?;
    if let Some(replicates) = args.replicates {
        config.initial_conditions.replicates = replicates;
    }
    if let Some(seed) = args.seed {
        config.initial_conditions.seed = seed;
    }
    config.validate()?;

    let replicates = config.initial_conditions.replicates;
    info!("Using {} Rayon threads for {} replicates.", rayon::current_num_threads(), replicates);

    let start_time = Instant::now();
    let outputs = (0..replicates)
        .into_par_iter()
        .map(|replicate| {
            run_replicate(&config, replicate).map_err(|e| {
                error!("Replicate {} failed: {}", replicate, e);
                e
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.3} minutes).",
        total_duration.as_secs_f64(),
        total_duration.as_secs_f64() / 60.0
    );

    let mut snapshots = Vec::new();
    let mut survey = Vec::new();
    for output in outputs {
        snapshots.extend(output.snapshots);
        survey.extend(output.survey);
    }

    info!("Saving recorded data...");
    if config.output.save_stats {
        save_snapshots(&config, &snapshots)?;
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }
    if config.output.save_survey {
        save_survey(&config, &survey)?;
    }

    info!("Simulation Complete.");
    Ok(())
}
