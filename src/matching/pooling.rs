//! Stage 1: pool the target and donor tables into one labeled table.

use std::collections::HashMap;

use crate::error::PreconditionViolation;
use crate::matching::{GROUP_FACTOR_COLUMN, ORIGIN_COLUMN};
use crate::models::{Table, Value};

/// Row-concatenate `target` and `donor` into a single pooled table.
///
/// The pooled column set is the union of both inputs (target columns first,
/// donor-only columns appended); cells absent from one side are `Null`. An
/// `origin` column is added (0 = target row, 1 = donor row), and, when
/// `group_column` is set, a `group_factor` column assigning a stable integer
/// id to each distinct grouping value in first-appearance order. Inputs are
/// never mutated.
pub fn pool(
    target: &Table,
    donor: &Table,
    group_column: Option<&str>,
) -> Result<Table, PreconditionViolation> {
    let target_rows = target.n_rows();
    let donor_rows = donor.n_rows();

    let mut names: Vec<String> = target.column_names().to_vec();
    for name in donor.column_names() {
        if !target.has_column(name) {
            names.push(name.clone());
        }
    }

    let mut pooled = Table::new();
    for name in &names {
        let mut values = Vec::with_capacity(target_rows + donor_rows);
        match target.column(name) {
            Some(col) => values.extend_from_slice(col),
            None => values.extend(std::iter::repeat(Value::Null).take(target_rows)),
        }
        match donor.column(name) {
            Some(col) => values.extend_from_slice(col),
            None => values.extend(std::iter::repeat(Value::Null).take(donor_rows)),
        }
        pooled.push_column(name.clone(), values);
    }

    let mut origin = Vec::with_capacity(target_rows + donor_rows);
    origin.extend(std::iter::repeat(Value::Int(0)).take(target_rows));
    origin.extend(std::iter::repeat(Value::Int(1)).take(donor_rows));
    pooled.push_column(ORIGIN_COLUMN, origin);

    if let Some(group) = group_column {
        let factor = factorize(&pooled, group)?;
        pooled.push_column(GROUP_FACTOR_COLUMN, factor);
    }

    Ok(pooled)
}

/// Assign a stable integer id per distinct value of `column`, in
/// first-appearance order over the pooled rows. Null cells get -1.
fn factorize(pooled: &Table, column: &str) -> Result<Vec<Value>, PreconditionViolation> {
    let values = pooled
        .column(column)
        .ok_or_else(|| PreconditionViolation::MissingColumn {
            table: "pooled",
            column: column.to_string(),
        })?;

    let mut ids: HashMap<String, i64> = HashMap::new();
    let mut next_id = 0i64;
    let factor = values
        .iter()
        .map(|v| {
            if v.is_null() {
                return Value::Int(-1);
            }
            let key = v.to_string();
            let id = *ids.entry(key).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                id
            });
            Value::Int(id)
        })
        .collect();
    Ok(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_table() -> Table {
        let mut t = Table::new();
        t.push_column("id", vec![Value::Int(0), Value::Int(1)]);
        t.push_column(
            "area",
            vec![Value::Text("E01".into()), Value::Text("E02".into())],
        );
        t.push_column("tenure", vec![Value::Int(1), Value::Int(2)]);
        t
    }

    fn donor_table() -> Table {
        let mut d = Table::new();
        d.push_column(
            "area",
            vec![Value::Text("E02".into()), Value::Text("E03".into())],
        );
        d.push_column("tenure", vec![Value::Int(2), Value::Int(1)]);
        d.push_column("floor_area", vec![Value::Int(4), Value::Int(7)]);
        d
    }

    #[test]
    fn test_pool_labels_and_row_order() {
        let target = target_table();
        let donor = donor_table();
        let pooled = pool(&target, &donor, None).unwrap();

        assert_eq!(pooled.n_rows(), 4);
        assert_eq!(
            pooled.column(ORIGIN_COLUMN).unwrap(),
            &[Value::Int(0), Value::Int(0), Value::Int(1), Value::Int(1)]
        );
        // Target columns keep their order, donor-only columns come after.
        assert_eq!(
            pooled.column_names(),
            &["id", "area", "tenure", "floor_area", ORIGIN_COLUMN]
        );
    }

    #[test]
    fn test_pool_fills_one_sided_columns_with_null() {
        let pooled = pool(&target_table(), &donor_table(), None).unwrap();

        // "id" exists only on the target side.
        assert_eq!(pooled.cell("id", 2), Some(&Value::Null));
        // "floor_area" exists only on the donor side.
        assert_eq!(pooled.cell("floor_area", 0), Some(&Value::Null));
        assert_eq!(pooled.cell("floor_area", 2), Some(&Value::Int(4)));
    }

    #[test]
    fn test_group_factor_first_appearance_order() {
        let pooled = pool(&target_table(), &donor_table(), Some("area")).unwrap();

        // E01 -> 0, E02 -> 1 (reused by the donor row), E03 -> 2.
        assert_eq!(
            pooled.column(GROUP_FACTOR_COLUMN).unwrap(),
            &[
                Value::Int(0),
                Value::Int(1),
                Value::Int(1),
                Value::Int(2)
            ]
        );
    }

    #[test]
    fn test_pool_missing_group_column_is_fatal() {
        let err = pool(&target_table(), &donor_table(), Some("postcode")).unwrap_err();
        assert!(matches!(
            err,
            PreconditionViolation::MissingColumn { table: "pooled", ref column } if column == "postcode"
        ));
    }

    #[test]
    fn test_pool_leaves_inputs_unchanged() {
        let target = target_table();
        let donor = donor_table();
        let before_target = target.clone();
        let before_donor = donor.clone();

        let _ = pool(&target, &donor, Some("area")).unwrap();

        assert_eq!(target, before_target);
        assert_eq!(donor, before_donor);
    }
}
