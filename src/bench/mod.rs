//! Benchmark result aggregation.
//!
//! Consumes a `benchmark,run,result` CSV produced by an external benchmark
//! harness and reports, per benchmark and run, how many instructions an
//! optimization removed relative to the baseline run. Plotting stays
//! outside the crate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;

/// One raw CSV record.
#[derive(Debug, Deserialize)]
struct RawRow {
    benchmark: String,
    run: String,
    result: String,
}

/// One aggregated output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchRow {
    pub benchmark: String,
    pub run: String,
    pub result: i64,
    pub removed: i64,
    pub percent: f64,
}

/// Aggregate benchmark results against `baseline`.
///
/// Rows whose result is `timeout`, `missing`, or `incorrect` are dropped,
/// as are benchmarks with no baseline entry. Output is sorted by percent
/// removed, descending (ties by benchmark name).
pub fn aggregate<R: io::Read>(reader: R, baseline: &str) -> Result<Vec<BenchRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let mut data: BTreeMap<(String, String), i64> = BTreeMap::new();
    for record in csv_reader.deserialize() {
        let row: RawRow = record.context("reading benchmark CSV row")?;
        if matches!(row.result.as_str(), "timeout" | "missing" | "incorrect") {
            continue;
        }
        let result: i64 = row
            .result
            .parse()
            .with_context(|| format!("result for {}/{} is not a count", row.benchmark, row.run))?;
        data.insert((row.benchmark, row.run), result);
    }

    let mut rows = Vec::new();
    for ((benchmark, run), &result) in &data {
        if run == baseline {
            continue;
        }
        let Some(&base) = data.get(&(benchmark.clone(), baseline.to_string())) else {
            continue;
        };
        let removed = base - result;
        rows.push(BenchRow {
            benchmark: benchmark.clone(),
            run: run.clone(),
            result,
            removed,
            percent: removed as f64 / base as f64,
        });
    }

    rows.sort_by(|a, b| {
        b.percent
            .partial_cmp(&a.percent)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.benchmark.cmp(&b.benchmark))
    });
    Ok(rows)
}

/// Write aggregated rows back out as CSV.
pub fn write_csv<W: io::Write>(writer: W, rows: &[BenchRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
