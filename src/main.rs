use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use enrich_lib::config::{BatchSpec, RunConfig};
use enrich_lib::export::csv_export::export_to_csv;
use enrich_lib::ingest::csv_import::read_table;
use enrich_lib::matching::enrich_population;
use enrich_lib::models::BatchStats;
use enrich_lib::utils::env::load_env;
use enrich_lib::utils::get_memory_usage;
use enrich_lib::utils::progress::ProgressConfig;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "enrich",
    about = "Enrich a synthetic household population with donor attributes via propensity score matching"
)]
struct Cli {
    /// Run configuration file
    #[arg(long, default_value = "config/psm.yaml")]
    config: PathBuf,

    /// Target population CSV for a single ad-hoc batch (replaces the
    /// config's batch list; requires --donor)
    #[arg(long, requires = "donor")]
    target: Option<PathBuf>,

    /// Donor CSV for the ad-hoc batch
    #[arg(long, requires = "target")]
    donor: Option<PathBuf>,

    /// Label for the ad-hoc batch
    #[arg(long, default_value = "batch")]
    batch_id: String,

    /// Output directory (overrides the config)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Seed for the match draws (overrides the config)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct RunSummary {
    run_id: String,
    started_at: String,
    finished_at: String,
    seed: Option<u64>,
    batches: Vec<BatchStats>,
    failed_batches: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    info!("Starting population enrichment pipeline");
    load_env();

    let cli = Cli::parse();
    let config = RunConfig::load(&cli.config)?;
    config
        .validate()
        .with_context(|| format!("Invalid config {}", cli.config.display()))?;

    let batches: Vec<BatchSpec> = match (&cli.target, &cli.donor) {
        (Some(target), Some(donor)) => vec![BatchSpec {
            id: cli.batch_id.clone(),
            target: target.display().to_string(),
            donor: donor.display().to_string(),
        }],
        _ => config.batches.clone(),
    };
    if batches.is_empty() {
        bail!("No batches to run: pass --target/--donor or list batches in the config");
    }

    let output_dir = cli
        .output_dir
        .clone()
        .or_else(|| config.output_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data/output"));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let seed = cli.seed.or(config.psm.seed);
    let mut rng = match seed {
        Some(seed) => {
            info!("Match draws seeded with {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    info!(
        "Run {}: {} batch(es), k = {}",
        run_id,
        batches.len(),
        config.psm.n_neighbors
    );

    let progress_config = ProgressConfig::from_env();
    let batch_bar = progress_config.create_batch_bar(batches.len() as u64);

    let run_start = Instant::now();
    let mut stats: Vec<BatchStats> = Vec::new();
    let mut failed: Vec<String> = Vec::new();

    for batch in &batches {
        if let Some(pb) = &batch_bar {
            if progress_config.show_memory {
                pb.set_message(format!(
                    "{} (Memory: {} MB)",
                    batch.id,
                    get_memory_usage()
                ));
            } else {
                pb.set_message(batch.id.clone());
            }
        }

        match run_batch(batch, &config, &output_dir, &mut rng) {
            Ok(batch_stats) => stats.push(batch_stats),
            Err(err) => {
                // A failed batch never halts the run; later batches own
                // their own data.
                error!("Batch {} failed: {:#}", batch.id, err);
                failed.push(batch.id.clone());
            }
        }

        if let Some(pb) = &batch_bar {
            pb.inc(1);
        }
    }
    if let Some(pb) = &batch_bar {
        pb.finish_with_message("done");
    }

    let finished_at = Utc::now();
    let total_rows: usize = stats.iter().map(|s| s.enriched_rows).sum();

    info!("=== Run Summary ===");
    info!("Run ID: {}", run_id);
    info!(
        "Batches: {} succeeded, {} failed",
        stats.len(),
        failed.len()
    );
    info!("Total enriched rows: {}", total_rows);
    info!("Total execution time: {:.2?}", run_start.elapsed());
    if progress_config.show_memory {
        info!("Final memory usage: {} MB", get_memory_usage());
    }
    if !failed.is_empty() {
        warn!("Failed batches: {:?}", failed);
    }

    let summary = RunSummary {
        run_id,
        started_at: started_at.to_rfc3339(),
        finished_at: finished_at.to_rfc3339(),
        seed,
        batches: stats,
        failed_batches: failed,
    };
    let summary_path = output_dir.join("run_summary.json");
    fs::write(
        &summary_path,
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?,
    )
    .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    info!("Run summary written to {}", summary_path.display());

    Ok(())
}

fn run_batch(
    batch: &BatchSpec,
    config: &RunConfig,
    output_dir: &Path,
    rng: &mut StdRng,
) -> Result<BatchStats> {
    info!("Batch {}: starting", batch.id);

    let target = read_table(Path::new(&batch.target))
        .with_context(|| format!("Failed to load target table for batch {}", batch.id))?;
    let donor = read_table(Path::new(&batch.donor))
        .with_context(|| format!("Failed to load donor table for batch {}", batch.id))?;

    let enriched = enrich_population(&batch.id, &target, &donor, &config.psm, rng)
        .with_context(|| format!("Matching failed for batch {}", batch.id))?;

    let out_path = output_dir.join(format!("{}_enriched.csv", batch.id));
    export_to_csv(&enriched.table, &out_path)
        .with_context(|| format!("Failed to export batch {}", batch.id))?;
    info!(
        "Batch {}: wrote {} rows to {}",
        batch.id,
        enriched.table.n_rows(),
        out_path.display()
    );

    Ok(enriched.stats)
}
