//! Enriched tables out to CSV, one file per batch.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::models::Table;

pub fn export_to_csv(table: &Table, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let buf_writer = BufWriter::with_capacity(512 * 1024, file);
    let mut w = WriterBuilder::new().from_writer(buf_writer);

    w.write_record(table.column_names())?;
    for row in 0..table.n_rows() {
        let record: Vec<String> = table.row(row).iter().map(|v| v.to_string()).collect();
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}
