//! CSV and JSON export of prepared measures.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::summary::{Quantity, Summary};

/// Column header of the summary CSV.
const HEADER: &str = "measure,scheme,year,captured_stock,\
                       energy_baseline,energy_efficient,energy_savings,energy_savings_p5,energy_savings_p95,\
                       carbon_baseline,carbon_efficient,carbon_savings,carbon_savings_p5,carbon_savings_p95,\
                       stock_cost_baseline,stock_cost_efficient,\
                       energy_cost_savings,carbon_cost_savings";

/// Exports summary rows to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(summary: &Summary, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(summary, buf)
}

fn savings_columns(q: &Quantity) -> [String; 5] {
    [
        format!("{:.4}", q.baseline.mean),
        format!("{:.4}", q.efficient.mean),
        format!("{:.4}", q.savings.mean),
        format!("{:.4}", q.savings.p5),
        format!("{:.4}", q.savings.p95),
    ]
}

/// Writes summary rows as CSV to any writer.
///
/// Sampled quantities are reported by their mean, with 5th/95th percentiles
/// for energy and carbon savings.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(summary: &Summary, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in &summary.rows {
        let mut record = vec![
            r.measure.clone(),
            r.scheme.as_str().to_string(),
            r.year.to_string(),
            format!("{:.4}", r.captured_stock.mean),
        ];
        record.extend(savings_columns(&r.energy));
        record.extend(savings_columns(&r.carbon));
        record.push(format!("{:.4}", r.stock_cost.baseline.mean));
        record.push(format!("{:.4}", r.stock_cost.efficient.mean));
        record.push(format!("{:.4}", r.energy_cost.savings.mean));
        record.push(format!("{:.4}", r.carbon_cost.savings.mean));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes any serializable value as pretty JSON to `path`.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn export_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut buf = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut buf, value)?;
    buf.flush()
}
