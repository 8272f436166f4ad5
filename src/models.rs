use serde::Serialize;
use std::fmt;

use crate::error::PreconditionViolation;

/// A single table cell. `Null` only appears in pooled tables, for fields
/// that exist on one side of the pool and not the other.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Null => Ok(()),
        }
    }
}

/// Column-oriented table with a dynamic schema.
///
/// Column order is significant (it is preserved through pooling and fusion
/// and drives CSV export). All transformations in the pipeline build new
/// tables instead of mutating their inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[idx])
    }

    pub fn cell(&self, name: &str, row: usize) -> Option<&Value> {
        self.column(name)?.get(row)
    }

    /// Append a column. Panics if the column length disagrees with the
    /// table's row count; that is a construction bug, not a data error.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        let name = name.into();
        assert!(
            self.columns.is_empty() || values.len() == self.n_rows(),
            "column '{}' has {} rows, table has {}",
            name,
            values.len(),
            self.n_rows()
        );
        self.names.push(name);
        self.columns.push(values);
    }

    /// Extract a covariate column as `f64`, rejecting missing columns and
    /// any cell that is null, textual, or non-finite.
    pub fn numeric_column(
        &self,
        table: &'static str,
        name: &str,
    ) -> Result<Vec<f64>, PreconditionViolation> {
        let values = self
            .column(name)
            .ok_or_else(|| PreconditionViolation::MissingColumn {
                table,
                column: name.to_string(),
            })?;
        values
            .iter()
            .enumerate()
            .map(|(row, v)| {
                v.as_f64()
                    .ok_or_else(|| PreconditionViolation::NonNumericCovariate {
                        column: name.to_string(),
                        row,
                    })
            })
            .collect()
    }

    /// Row values in column order, for export.
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c[index]).collect()
    }
}

/// One donor row assigned to one target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPair {
    pub target_index: usize,
    pub donor_index: usize,
}

/// Read-only propensity distribution summary for one origin class.
/// This is what a diagnostic plotting collaborator gets to see.
#[derive(Debug, Clone, Serialize)]
pub struct PropensitySummary {
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl PropensitySummary {
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self {
                count: 0,
                min: 0.0,
                mean: 0.0,
                max: 0.0,
            };
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &s in scores {
            min = min.min(s);
            max = max.max(s);
            sum += s;
        }
        Self {
            count: scores.len(),
            min,
            mean: sum / scores.len() as f64,
            max,
        }
    }
}

/// Per-batch outcome statistics, aggregated into the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStats {
    pub batch_id: String,
    pub target_rows: usize,
    pub donor_rows: usize,
    pub enriched_rows: usize,
    /// Targets resolved through the uniform all-ties draw branch.
    pub uniform_draws: usize,
    pub mean_match_distance: f64,
    pub max_match_distance: f64,
    pub target_propensity: PropensitySummary,
    pub donor_propensity: PropensitySummary,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_as_f64() {
        assert_eq!(Value::Int(5).as_f64(), Some(5.0));
        assert_eq!(Value::Float(0.25).as_f64(), Some(0.25));
        assert_eq!(Value::Text("5".into()).as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
    }

    #[test]
    fn test_table_columns_and_rows() {
        let mut t = Table::new();
        t.push_column("id", vec![Value::Int(0), Value::Int(1)]);
        t.push_column(
            "area",
            vec![Value::Text("E01".into()), Value::Text("E02".into())],
        );

        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.n_cols(), 2);
        assert_eq!(t.column_names(), &["id", "area"]);
        assert_eq!(t.cell("area", 1), Some(&Value::Text("E02".into())));
        assert!(t.column("missing").is_none());
    }

    #[test]
    fn test_numeric_column_rejects_bad_cells() {
        let mut t = Table::new();
        t.push_column("cov", vec![Value::Int(1), Value::Null]);

        let err = t.numeric_column("target", "cov").unwrap_err();
        assert!(matches!(
            err,
            PreconditionViolation::NonNumericCovariate { ref column, row: 1 } if column == "cov"
        ));

        let err = t.numeric_column("target", "other").unwrap_err();
        assert!(matches!(err, PreconditionViolation::MissingColumn { .. }));
    }

    #[test]
    fn test_propensity_summary() {
        let s = PropensitySummary::from_scores(&[0.2, 0.4, 0.6]);
        assert_eq!(s.count, 3);
        assert!((s.mean - 0.4).abs() < 1e-12);
        assert_eq!(s.min, 0.2);
        assert_eq!(s.max, 0.6);

        assert_eq!(PropensitySummary::from_scores(&[]).count, 0);
    }
}
