//! Stage 4: copy donor-only fields onto matched target rows.

use crate::error::PreconditionViolation;
use crate::matching::{GROUP_FACTOR_COLUMN, ORIGIN_COLUMN, PROPENSITY_COLUMN};
use crate::models::{MatchPair, Table};

const BOOKKEEPING_COLUMNS: [&str; 3] = [ORIGIN_COLUMN, PROPENSITY_COLUMN, GROUP_FACTOR_COLUMN];

/// Build the enriched table: the target's own columns (minus matching-only
/// and bookkeeping columns) followed by the donor-only columns, each donor
/// cell looked up by the matched donor's position. `pairs` must hold one
/// entry per target row, in target row order.
pub fn fuse(
    target: &Table,
    donor: &Table,
    pairs: &[MatchPair],
    donor_columns: &[String],
    drop_columns: &[String],
) -> Result<Table, PreconditionViolation> {
    debug_assert_eq!(pairs.len(), target.n_rows());
    debug_assert!(pairs
        .iter()
        .enumerate()
        .all(|(i, p)| p.target_index == i));

    let mut enriched = Table::new();
    for name in target.column_names() {
        if BOOKKEEPING_COLUMNS.contains(&name.as_str())
            || drop_columns.iter().any(|d| d == name)
            || donor_columns.iter().any(|d| d == name)
        {
            continue;
        }
        // Target row order is preserved, so the column carries over whole.
        let values = target
            .column(name)
            .map(|col| col.to_vec())
            .unwrap_or_default();
        enriched.push_column(name.clone(), values);
    }

    for name in donor_columns {
        let source = donor
            .column(name)
            .ok_or_else(|| PreconditionViolation::MissingColumn {
                table: "donor",
                column: name.clone(),
            })?;
        let values = pairs
            .iter()
            .map(|pair| source[pair.donor_index].clone())
            .collect();
        enriched.push_column(name.clone(), values);
    }

    Ok(enriched)
}
