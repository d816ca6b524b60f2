//! CSV exchange format for draw history.
//!
//! Layout: header `id,date,f1,f2,f3,f4,f5,b1,b2`, one draw per line,
//! unpadded integers, numbers in stored order. Used for the export
//! endpoint, manual imports, and the remote CSV source.

use anyhow::{Context, Result};
use tracing::debug;

use crate::types::{DrawRecord, BACK_COUNT, FRONT_COUNT};

pub const CSV_HEADER: [&str; 9] = ["id", "date", "f1", "f2", "f3", "f4", "f5", "b1", "b2"];

const COLUMNS: usize = 2 + FRONT_COUNT + BACK_COUNT;

/// Outcome of parsing a CSV document.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub draws: Vec<DrawRecord>,
    /// Data rows seen (header excluded).
    pub rows: usize,
    /// Rows dropped for a wrong column count or failed validation.
    pub skipped: usize,
}

/// Serialise draws to CSV, header first.
pub fn to_csv(draws: &[DrawRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER).context("Failed to write CSV header")?;

    for d in draws {
        let mut row = Vec::with_capacity(COLUMNS);
        row.push(d.id().to_string());
        row.push(d.date_string());
        row.extend(d.front().iter().map(|n| n.to_string()));
        row.extend(d.back().iter().map(|n| n.to_string()));
        writer
            .write_record(&row)
            .with_context(|| format!("Failed to write CSV row for draw {}", d.id()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Parse CSV text into draws. Never fails as a whole: bad rows are
/// counted and dropped. A leading row whose first field is not a draw
/// number is treated as the header.
pub fn parse_csv(text: &str) -> ParseReport {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut report = ParseReport::default();

    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                debug!(line = line + 1, error = %e, "Unreadable CSV row");
                report.rows += 1;
                report.skipped += 1;
                continue;
            }
        };

        if line == 0 && record.get(0).is_some_and(|f| f.parse::<u64>().is_err()) {
            continue;
        }

        report.rows += 1;

        if record.len() != COLUMNS {
            debug!(line = line + 1, columns = record.len(), "Skipping CSV row with wrong column count");
            report.skipped += 1;
            continue;
        }

        match parse_row(&record) {
            Some(d) => report.draws.push(d),
            None => {
                debug!(line = line + 1, "Skipping invalid CSV row");
                report.skipped += 1;
            }
        }
    }

    report
}

fn parse_row(record: &csv::StringRecord) -> Option<DrawRecord> {
    let numbers: Vec<u32> = record
        .iter()
        .skip(2)
        .map(|f| f.parse::<u32>().ok())
        .collect::<Option<_>>()?;
    let (front, back) = numbers.split_at(FRONT_COUNT);
    DrawRecord::new(record.get(0)?, record.get(1)?, front, back).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
