use crate::error::{Result, StatementPrepError};
use crate::quality::{DataQualityIssue, DataQualityReport};
use crate::schema::LedgerRecord;
use crate::utils::{parse_amount, parse_month_label, parse_us_date};
use chrono::NaiveDate;
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

/// Fixed column set of the general-ledger export, in export order.
pub const LEDGER_COLUMNS: [&str; 10] = [
    "Month",
    "Date",
    "GL Account",
    "Type",
    "Property Name",
    "Property Street Address 1",
    "Property Street Address 2",
    "Debit",
    "Credit",
    "Balance",
];

pub fn ingest(path: impl AsRef<Path>, rows_to_skip_after_header: usize) -> Result<Vec<LedgerRecord>> {
    let mut report = DataQualityReport::new();
    ingest_with_report(path, rows_to_skip_after_header, &mut report)
}

pub fn ingest_with_report(
    path: impl AsRef<Path>,
    rows_to_skip_after_header: usize,
    report: &mut DataQualityReport,
) -> Result<Vec<LedgerRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StatementPrepError::InputNotFound(path.to_path_buf()));
    }
    info!("Ingesting general ledger: {}", path.display());
    let file = File::open(path)?;
    parse_ledger(file, rows_to_skip_after_header, report)
}

/// Reads a ledger export. Rows directly after the header are skipped (export
/// banners), every cell is read as text and coerced leniently.
///
/// The skip counts physical lines, blank ones included, so those lines are
/// dropped before the csv reader (which ignores empty lines) sees them.
/// Reported line numbers stay physical.
pub fn parse_ledger<R: Read>(
    reader: R,
    rows_to_skip_after_header: usize,
    report: &mut DataQualityReport,
) -> Result<Vec<LedgerRecord>> {
    let mut input = BufReader::new(reader);
    let mut dropped_lines = 0usize;

    let mut header = String::new();
    loop {
        header.clear();
        if input.read_line(&mut header)? == 0 || !header.trim().is_empty() {
            break;
        }
        dropped_lines += 1;
    }

    let mut banner = String::new();
    for _ in 0..rows_to_skip_after_header {
        banner.clear();
        if input.read_line(&mut banner)? == 0 {
            break;
        }
        dropped_lines += 1;
    }
    debug!("Skipped {} lines around the ledger header", dropped_lines);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(header.into_bytes()).chain(input));

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing: Vec<String> = LEDGER_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(StatementPrepError::ColumnMismatch { missing });
    }

    let idx: Vec<usize> = LEDGER_COLUMNS
        .iter()
        .filter_map(|c| headers.iter().position(|h| h == *c))
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line() as usize).unwrap_or(0) + dropped_lines;
        let cell = |i: usize| row.get(idx[i]).unwrap_or("").trim();

        let mut record = LedgerRecord::new(cell(4), cell(2));
        record.month = parse_date_cell(line, "Month", cell(0), parse_month_label, report);
        record.txn_date = parse_date_cell(line, "Date", cell(1), parse_us_date, report);
        record.gl_type = cell(3).to_string();
        record.street_address_1 = cell(5).to_string();
        record.street_address_2 = cell(6).to_string();
        record.debit = parse_amount_cell(line, "Debit", cell(7), report);
        record.credit = parse_amount_cell(line, "Credit", cell(8), report);
        record.balance = parse_amount_cell(line, "Balance", cell(9), report);

        records.push(record);
    }

    debug!("Parsed {} ledger rows", records.len());
    Ok(records)
}

fn parse_amount_cell(line: usize, column: &str, raw: &str, report: &mut DataQualityReport) -> f64 {
    match parse_amount(raw) {
        Some(v) => v,
        None => {
            report.record(DataQualityIssue::UnparsableAmount {
                line,
                column: column.to_string(),
                value: raw.to_string(),
            });
            0.0
        }
    }
}

fn parse_date_cell(
    line: usize,
    column: &str,
    raw: &str,
    parse: fn(&str) -> Option<NaiveDate>,
    report: &mut DataQualityReport,
) -> Option<NaiveDate> {
    if raw.is_empty() {
        return None;
    }
    let parsed = parse(raw);
    if parsed.is_none() {
        report.record(DataQualityIssue::UnparsableDate {
            line,
            column: column.to_string(),
            value: raw.to_string(),
        });
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Month,Date,GL Account,Type,Property Name,Property Street Address 1,Property Street Address 2,Debit,Credit,Balance\n";

    fn ledger(body: &str) -> String {
        format!("{}Report generated 07/02/2024,,,,,,,,,\nAll properties\n{}", HEADER, body)
    }

    #[test]
    fn test_parse_ledger_skips_banner_rows() {
        let csv = ledger(
            "Jun 2024,06/01/2024,4000,Income,Harbor 1 - Main St,1 Main St,,,\"1,500.00\",\"1,500.00\"\n\
             Jun 2024,06/15/2024,6100,Expense,Harbor 1 - Main St,1 Main St,Unit 2,250.25,,-1249.75\n",
        );
        let mut report = DataQualityReport::new();
        let records = parse_ledger(csv.as_bytes(), 2, &mut report).unwrap();

        assert_eq!(records.len(), 2);
        assert!(report.is_clean());

        let rent = &records[0];
        assert_eq!(rent.month, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(rent.txn_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(rent.gl_account, "4000");
        assert_eq!(rent.property_name, "Harbor 1 - Main St");
        assert!((rent.credit - 1500.0).abs() < 0.01);
        assert_eq!(rent.debit, 0.0);

        let interest = &records[1];
        assert_eq!(interest.street_address_2, "Unit 2");
        assert!((interest.debit - 250.25).abs() < 0.01);
        assert!((interest.balance + 1249.75).abs() < 0.01);
    }

    #[test]
    fn test_blank_banner_line_counts_towards_skip() {
        let csv = format!(
            "{}\nReport banner,,,,,,,,,\n\
             Jun 2024,06/01/2024,4000,Income,Harbor 1 - Main St,,,,100,\n\
             Jun 2024,06/02/2024,4000,Income,Harbor 1 - Main St,,,,200,\n",
            HEADER
        );
        let mut report = DataQualityReport::new();
        let records = parse_ledger(csv.as_bytes(), 2, &mut report).unwrap();

        let credits: Vec<f64> = records.iter().map(|r| r.credit).collect();
        assert_eq!(credits, vec![100.0, 200.0]);
        assert!(report.is_clean());

        // blank line after the banner: still two skipped lines, and bad
        // cells report their physical line
        let csv = format!(
            "{}Report banner,,,,,,,,,\n\n\
             Jun 2024,06/01/2024,4000,Income,Harbor 1 - Main St,,,x,100,\n",
            HEADER
        );
        let mut report = DataQualityReport::new();
        let records = parse_ledger(csv.as_bytes(), 2, &mut report).unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].credit - 100.0).abs() < 0.01);
        assert_eq!(
            report.issues,
            vec![DataQualityIssue::UnparsableAmount {
                line: 4,
                column: "Debit".to_string(),
                value: "x".to_string(),
            }]
        );
    }

    #[test]
    fn test_unparsable_cells_are_coerced_and_reported() {
        let csv = ledger("June-ish,6/31/2024,4000,Income,Harbor 1 - Main St,,,abc,100,\n");
        let mut report = DataQualityReport::new();
        let records = parse_ledger(csv.as_bytes(), 2, &mut report).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].month, None);
        assert_eq!(records[0].txn_date, None);
        assert_eq!(records[0].debit, 0.0);
        assert_eq!(records[0].credit, 100.0);
        assert_eq!(report.count("unparsable_amount"), 1);
        assert_eq!(report.count("unparsable_date"), 2);
    }

    #[test]
    fn test_missing_columns_are_listed() {
        let csv = "Month,Date,GL Account,Property Name,Debit,Credit\nJun 2024,06/01/2024,4000,X,1,0\n";
        let mut report = DataQualityReport::new();
        let err = parse_ledger(csv.as_bytes(), 0, &mut report).unwrap_err();
        match err {
            StatementPrepError::ColumnMismatch { missing } => assert_eq!(
                missing,
                vec![
                    "Type",
                    "Property Street Address 1",
                    "Property Street Address 2",
                    "Balance"
                ]
            ),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_ingest_missing_file() {
        let err = ingest("/definitely/not/here/gl.csv", 2).unwrap_err();
        assert!(matches!(err, StatementPrepError::InputNotFound(_)));
    }
}
