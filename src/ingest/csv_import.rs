//! Headered CSV files into in-memory tables.
//!
//! This is the stand-in for the upstream acquisition component: it expects
//! already-cleaned, numerically coded inputs and does no recoding of its
//! own. Cells parse as Int, then Float, else Text; empty cells become Null.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::models::{Table, Value};

pub fn read_table(path: &Path) -> Result<Table> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read headers from {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for (line, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("Failed to read record {} from {}", line + 1, path.display()))?;
        for (i, field) in record.iter().enumerate() {
            columns[i].push(parse_cell(field));
        }
    }

    let mut table = Table::new();
    for (name, values) in headers.into_iter().zip(columns) {
        table.push_column(name, values);
    }
    Ok(table)
}

fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        if v.is_finite() {
            return Value::Float(v);
        }
    }
    Value::Text(trimmed.to_string())
}
