use crate::error::Result;
use crate::ownership::OwnershipScaling;
use crate::query::{AggregateQuery, CashTotals, PerformanceTotals, QueryScope};
use crate::schema::AggregateRecord;
use chrono::NaiveDate;
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const KEY_COLUMNS: [&str; 3] = ["Investor", "Owner", "Property"];

/// Writes the per-(investor, owner, property) monthly statement tables.
/// Figures are exported at 100% ownership. Returns the performance and cash
/// file paths, in that order.
pub fn export_monthly_statement(
    aggregates: &[AggregateRecord],
    output_dir: impl AsRef<Path>,
    statement_thru_date: NaiveDate,
) -> Result<(PathBuf, PathBuf)> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let prefix = statement_thru_date.format("%Y_%m").to_string();
    let perf_path = output_dir.join(format!("{}_monthly_perf_table.csv", prefix));
    let cash_path = output_dir.join(format!("{}_monthly_cash_table.csv", prefix));

    let query = AggregateQuery::new(aggregates);
    let triplets = query.investor_owner_property_triplets();
    info!("Exporting {} investor/owner/property combinations", triplets.len());

    let scaling = OwnershipScaling::full();
    let mut perf = csv::Writer::from_path(&perf_path)?;
    let mut cash = csv::Writer::from_path(&cash_path)?;

    perf.write_record(KEY_COLUMNS.iter().chain(PerformanceTotals::COLUMNS))?;
    cash.write_record(KEY_COLUMNS.iter().chain(CashTotals::COLUMNS))?;

    for (investor, owner, property) in &triplets {
        let scope = QueryScope::investor(investor.as_str())
            .with_owner(owner.as_str())
            .with_property(property.as_str());

        let figures = query.performance_totals(&scope).columns();
        perf.write_record(statement_row(investor, owner, property, figures, "monthly_perf_table", &scaling))?;

        let figures = query.cash_totals(&scope).columns();
        cash.write_record(statement_row(investor, owner, property, figures, "monthly_cash_table", &scaling))?;
    }

    perf.flush()?;
    cash.flush()?;
    info!("Saved monthly statement export: {}", perf_path.display());
    Ok((perf_path, cash_path))
}

fn statement_row(
    investor: &str,
    owner: &str,
    property: &str,
    figures: Vec<(&'static str, f64)>,
    table: &str,
    scaling: &OwnershipScaling,
) -> Vec<String> {
    let mut row = vec![investor.to_string(), owner.to_string(), property.to_string()];
    row.extend(figures.into_iter().map(|(column, amount)| {
        let amount = scaling.apply(amount, &format!("export.{}.{}", table, column));
        format!("{:.2}", amount)
    }));
    row
}

/// Serialises the aggregate store as CSV, one row per record in store order.
pub fn write_aggregates_csv<W: Write>(aggregates: &[AggregateRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in aggregates {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tests::agg;
    use crate::schema::{CashType, PerformanceType, Timeframe};

    #[test]
    fn test_export_writes_one_row_per_triplet() {
        let rows = vec![
            agg((2024, 6), Timeframe::Trailing(1), "Rent", PerformanceType::Revenue, -1500.0, "Rent & Dividend", CashType::Inflow),
            agg((2024, 7), Timeframe::NotApplicable, "Rent", PerformanceType::Revenue, -99.0, "Rent & Dividend", CashType::Inflow),
        ];
        let dir = tempfile::tempdir().unwrap();
        let (perf, cash) =
            export_monthly_statement(&rows, dir.path(), NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()).unwrap();

        assert!(perf.ends_with("2024_06_monthly_perf_table.csv"));
        let perf_text = fs::read_to_string(&perf).unwrap();
        let lines: Vec<&str> = perf_text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Investor,Owner,Property,Rent,Dividend"));
        assert!(lines[1].starts_with("Alice,Harbor LLC,HB1,1500.00,0.00,1500.00"));

        let cash_text = fs::read_to_string(&cash).unwrap();
        assert!(cash_text.contains("Alice,Harbor LLC,HB1,0.00,0.00,1500.00,1500.00"));
    }

    #[test]
    fn test_aggregates_csv_is_deterministic() {
        let rows = vec![agg((2024, 6), Timeframe::Trailing(1), "Rent", PerformanceType::Revenue, -1500.0, "Rent & Dividend", CashType::Inflow)];
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_aggregates_csv(&rows, &mut first).unwrap();
        write_aggregates_csv(&rows, &mut second).unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        assert!(text.starts_with("month,investor,owner,property_name"));
        assert!(text.contains("2024-06-01,Alice,Harbor LLC,Harbor 1,HB1"));
        assert!(text.contains("[T1]"));
    }
}
