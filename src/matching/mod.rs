//! The propensity score matching engine.
//!
//! One call per batch: pool and label the two tables, estimate propensity,
//! match every target row to a donor row, fuse the donor-only fields in.
//! The stages run strictly forward and share no state across batches.

pub mod fusion;
pub mod neighbors;
pub mod pooling;
pub mod propensity;
pub mod selection;

use std::time::Instant;

use log::{debug, info, warn};
use rand::Rng;

use crate::config::PsmConfig;
use crate::error::{EnrichError, PreconditionViolation};
use crate::models::{BatchStats, MatchPair, PropensitySummary, Table, Value};
use neighbors::{PropensityIndex, SortedScoreIndex};

/// Added by pooling: 0 = target row, 1 = donor row.
pub const ORIGIN_COLUMN: &str = "origin";
/// Added by the estimator: fitted membership probability per pooled row.
pub const PROPENSITY_COLUMN: &str = "propensity";
/// Added by pooling: factorized id of the configured grouping field.
pub const GROUP_FACTOR_COLUMN: &str = "group_factor";

#[derive(Debug)]
pub struct EnrichedBatch {
    pub table: Table,
    pub stats: BatchStats,
}

/// Run the four-stage pipeline for one batch.
///
/// An empty target table is a no-op yielding an empty enriched table with
/// the output schema. Every other degenerate input aborts the batch with a
/// typed error; no partial matches are ever returned.
pub fn enrich_population<R: Rng>(
    batch_id: &str,
    target: &Table,
    donor: &Table,
    config: &PsmConfig,
    rng: &mut R,
) -> Result<EnrichedBatch, EnrichError> {
    let started = Instant::now();
    let k = config.n_neighbors;
    let target_rows = target.n_rows();
    let donor_rows = donor.n_rows();

    if target_rows == 0 {
        warn!("Batch {}: target table is empty, nothing to enrich", batch_id);
        return Ok(EnrichedBatch {
            table: empty_enriched(target, config),
            stats: BatchStats {
                batch_id: batch_id.to_string(),
                target_rows: 0,
                donor_rows,
                enriched_rows: 0,
                uniform_draws: 0,
                mean_match_distance: 0.0,
                max_match_distance: 0.0,
                target_propensity: PropensitySummary::from_scores(&[]),
                donor_propensity: PropensitySummary::from_scores(&[]),
                elapsed_secs: started.elapsed().as_secs_f64(),
            },
        });
    }

    if donor_rows < k {
        return Err(PreconditionViolation::DonorPoolTooSmall {
            available: donor_rows,
            required: k,
        }
        .into());
    }

    // Stage 1: pool and label.
    let mut pooled = pooling::pool(target, donor, config.group_column.as_deref())?;
    debug!(
        "Batch {}: pooled {} target and {} donor rows",
        batch_id, target_rows, donor_rows
    );

    // Stage 2: propensity estimation over the shared covariates.
    let fit = propensity::estimate(&pooled, &config.covariates)?;
    pooled.push_column(
        PROPENSITY_COLUMN,
        fit.scores.iter().map(|&s| Value::Float(s)).collect(),
    );
    let (target_scores, donor_scores) = fit.scores.split_at(target_rows);
    info!(
        "Batch {}: propensity model fit in {} iterations",
        batch_id, fit.iterations
    );

    // Stage 3: neighbor search and randomized pair assignment.
    let index = SortedScoreIndex::build(donor_scores);
    let mut pairs = Vec::with_capacity(target_rows);
    let mut uniform_draws = 0usize;
    let mut distance_sum = 0.0f64;
    let mut distance_max = 0.0f64;
    for (target_index, &score) in target_scores.iter().enumerate() {
        let candidates = index.query(score, k);
        debug_assert_eq!(candidates.len(), k);
        let outcome = selection::draw_match(rng, &candidates);
        if outcome.uniform_branch {
            uniform_draws += 1;
        }
        distance_sum += outcome.distance;
        distance_max = distance_max.max(outcome.distance);
        pairs.push(MatchPair {
            target_index,
            donor_index: outcome.donor_index,
        });
    }

    // Stage 4: fusion.
    let table = fusion::fuse(
        target,
        donor,
        &pairs,
        &config.donor_columns,
        &config.drop_columns,
    )?;

    let stats = BatchStats {
        batch_id: batch_id.to_string(),
        target_rows,
        donor_rows,
        enriched_rows: table.n_rows(),
        uniform_draws,
        mean_match_distance: distance_sum / target_rows as f64,
        max_match_distance: distance_max,
        target_propensity: PropensitySummary::from_scores(target_scores),
        donor_propensity: PropensitySummary::from_scores(donor_scores),
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    info!(
        "Batch {}: enriched {} rows ({} uniform tie draws, mean match distance {:.6})",
        batch_id, stats.enriched_rows, stats.uniform_draws, stats.mean_match_distance
    );

    Ok(EnrichedBatch { table, stats })
}

/// Output schema for the empty-target no-op: the enriched column set with
/// zero rows.
fn empty_enriched(target: &Table, config: &PsmConfig) -> Table {
    let mut out = Table::new();
    for name in target.column_names() {
        if name == ORIGIN_COLUMN
            || name == PROPENSITY_COLUMN
            || name == GROUP_FACTOR_COLUMN
            || config.drop_columns.iter().any(|d| d == name)
            || config.donor_columns.iter().any(|d| d == name)
        {
            continue;
        }
        out.push_column(name.clone(), Vec::new());
    }
    for name in &config.donor_columns {
        out.push_column(name.clone(), Vec::new());
    }
    out
}
