use anyhow::Result;
use chrono::NaiveDate;
use serde_json::{json, Value};
use statement_prep::*;
use std::fs;
use std::path::Path;

const LEDGER: &str = "\
Month,Date,GL Account,Type,Property Name,Property Street Address 1,Property Street Address 2,Debit,Credit,Balance
General Ledger export,,,,,,,,,
Cash basis,,,,,,,,,
Jun 2024,06/01/2024,4000,Income,Harbor 1 - Main St,1 Main St,,,\"1,500.00\",\"1,500.00\"
Jun 2024,06/03/2024,5100,Expense,Harbor 1 - Main St,1 Main St,,200.00,,1300.00
Jun 2024,06/05/2024,2500,Liability,Harbor 1 - Main St,1 Main St,,900.00,,400.00
Jun 2024,06/05/2024,2500,Liability,Harbor 1 - Main St,1 Main St,,,\"10,000.00\",10400.00
May 2024,05/01/2024,4000,Income,Harbor 1 - Main St,1 Main St,,,1500.00,1500.00
Jul 2023,07/01/2023,4000,Income,Harbor 1 - Main St,1 Main St,,,1400.00,1400.00
Jun 2023,06/01/2023,4000,Income,Harbor 1 - Main St,1 Main St,,,1400.00,1400.00
Jul 2024,07/01/2024,4000,Income,Harbor 1 - Main St,1 Main St,,,1600.00,1600.00
Jun 2024,06/09/2024,4000,Income,Bay 7 - Shore Rd,7 Shore Rd,,,800.00,800.00
Jun 2024,06/10/2024,5100,Expense,Harbor 1 - Main St,1 Main St,,n/a,,
";

fn setup_json(dir: &Path, pcts: [Value; 2], run_rows: Vec<Value>) -> Value {
    let [alice, bob] = pcts;
    let mut run = vec![json!(["Investor", "Owner", "Base Template"])];
    run.extend(run_rows);

    json!({
        "sheets": {
            "General Config": [
                ["GL Location:", dir.to_string_lossy()],
                ["GL File Name:", "gl_export.csv"],
                ["Output Location:", dir.join("out").to_string_lossy()],
                ["Statement Thru Date:", "06/30/2024"],
                ["Ledger Rows To Skip:", 2],
            ],
            "Run Config": run,
            "Investor Table": [
                ["Investor", "Property", "Property Name", "Owner", "Acquired", "Type", "% Ownership"],
                ["Alice", "HB1", "Harbor 1 - Main St", "Harbor LLC", "03/15/2022", "Individual", alice],
                ["Bob", "HB1", "Harbor 1 - Main St", "Harbor LLC", "03/15/2022", "Trust", bob],
            ],
            "GL Mapping": [
                ["GL Account", "Categorization", "GL Type", "Cash Categorization", "Cash Type"],
                ["4000", "Rent", "Revenue", "Rent & Dividend", "Inflow"],
                ["5100", "HOA & Mgt. Fee", "Expense", "HOA & Mgt. Fee", "Outflow"],
                ["2500", "Mortgage Interest", "Expense", "Mortgage", "Outflow"],
            ],
        }
    })
}

fn default_run_rows() -> Vec<Value> {
    vec![
        json!(["Alice", "Harbor LLC", "standard"]),
        json!(["Bob", "Harbor LLC", null]),
    ]
}

fn write_inputs(dir: &Path, pcts: [Value; 2], run_rows: Vec<Value>) -> Result<std::path::PathBuf> {
    fs::write(dir.join("gl_export.csv"), LEDGER)?;
    let setup_path = dir.join("setup.json");
    fs::write(&setup_path, serde_json::to_string_pretty(&setup_json(dir, pcts, run_rows))?)?;
    Ok(setup_path)
}

fn aggregates_csv(aggregates: &[AggregateRecord]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_aggregates_csv(aggregates, &mut buf)?;
    Ok(buf)
}

#[test]
fn test_full_pipeline_into_sqlite() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = write_inputs(dir.path(), [json!(0.6), json!("40%")], default_run_rows())?;
    let config = SetupConfig::load(&setup)?;

    let db = dir.path().join("statement_prep.sqlite");
    let mut store = SqliteStore::open(&db)?;
    let summary = StatementPipeline::run(&config, &mut store)?;

    assert_eq!(summary.ledger_rows, 10);
    assert_eq!(summary.included_run_rows, 2);
    assert_eq!(summary.report.count("unparsable_amount"), 1);
    assert_eq!(summary.report.count("unmatched_property"), 1);
    assert!(!summary.report.is_clean());

    let aggregates = store.aggregates()?;
    assert_eq!(aggregates.len(), summary.aggregate_rows);

    // one mortgage group becomes a payment leg and a loan leg
    let mortgage: Vec<&AggregateRecord> = aggregates
        .iter()
        .filter(|r| r.categorization.as_deref() == Some("Mortgage Interest"))
        .collect();
    assert_eq!(mortgage.len(), 2);
    let loan = mortgage
        .iter()
        .find(|r| r.cash_categorization.as_deref() == Some(MORTGAGE_LOAN_CATEGORY))
        .unwrap();
    assert!((loan.value + 10_000.0).abs() < 0.01);
    assert!((loan.cash_value - 10_000.0).abs() < 0.01);
    assert_eq!(loan.property.as_deref(), Some("HB1"));

    let timeframe_of = |month: (i32, u32)| {
        aggregates
            .iter()
            .find(|r| {
                r.month == NaiveDate::from_ymd_opt(month.0, month.1, 1)
                    && r.categorization.as_deref() == Some("Rent")
                    && r.investor.is_some()
            })
            .map(|r| r.timeframe)
    };
    assert_eq!(timeframe_of((2024, 6)), Some(Timeframe::Trailing(1)));
    assert_eq!(timeframe_of((2023, 7)), Some(Timeframe::Trailing(12)));
    assert_eq!(timeframe_of((2023, 6)), Some(Timeframe::Trailing(13)));
    assert_eq!(timeframe_of((2024, 7)), Some(Timeframe::NotApplicable));

    let query = AggregateQuery::new(&aggregates);
    let scope = QueryScope::investor("Alice").with_owner("Harbor LLC");
    let perf = query.performance_totals(&scope);
    // 1500 + 1500 + 1400 + 1400 inside the window, July 2024 is after the cutoff
    assert!((perf.rent - 5800.0).abs() < 0.01);

    let cash = query.cash_totals(&scope);
    assert!((cash.mortgage_loan - 10_000.0).abs() < 0.01);
    assert!((cash.mortgage_payment + 900.0).abs() < 0.01);
    assert!((cash.hoa_mgt_fee + 200.0).abs() < 0.01);

    let labels = query.month_labels(&scope);
    assert_eq!(labels.get(&Timeframe::Trailing(1)).map(String::as_str), Some("Jun 2024"));

    let statements = StatementPipeline::statements(&config, &aggregates);
    let alice = &statements[0];
    assert!((alice.ownership_pct - 60.0).abs() < 1e-9);
    match &alice.sections[0] {
        SectionValues::PerformanceSummary(v) => assert!((v.rent - 3480.0).abs() < 0.01),
        other => panic!("unexpected section: {:?}", other),
    }
    Ok(())
}

#[test]
fn test_rerun_produces_identical_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = write_inputs(dir.path(), [json!(60), json!(40)], default_run_rows())?;
    let config = SetupConfig::load(&setup)?;

    let mut store = SqliteStore::open(dir.path().join("store.sqlite"))?;
    StatementPipeline::run(&config, &mut store)?;
    let first = aggregates_csv(&store.aggregates()?)?;
    let first_ledger = store.ledger()?;

    StatementPipeline::run(&config, &mut store)?;
    let second = aggregates_csv(&store.aggregates()?)?;

    assert_eq!(first, second);
    assert_eq!(store.ledger()?.len(), first_ledger.len());

    let mut memory = MemoryStore::new();
    StatementPipeline::run(&config, &mut memory)?;
    assert_eq!(aggregates_csv(&memory.aggregates()?)?, first);
    Ok(())
}

#[test]
fn test_cli_stages_write_report_and_export() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = write_inputs(dir.path(), [json!(60), json!(40)], default_run_rows())?;
    let config = SetupConfig::load(&setup)?;
    let db = dir.path().join("statement_prep.sqlite");

    run_stages(&Stage::parse_list("1,2")?, &config, &db)?;

    let report: DataQualityReport =
        serde_json::from_str(&fs::read_to_string(quality_report_path(&db))?)?;
    assert_eq!(report.count("unmatched_property"), 1);

    let perf = fs::read_to_string(dir.path().join("out").join("2024_06_monthly_perf_table.csv"))?;
    let lines: Vec<&str> = perf.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("Alice,Harbor LLC,HB1,5800.00"));
    assert!(dir
        .path()
        .join("out")
        .join("2024_06_monthly_cash_table.csv")
        .exists());

    let err = run_stages(&[Stage::Combine], &config, &db).unwrap_err();
    assert!(matches!(err, StatementPrepError::StageNotImplemented(_)));
    assert!(matches!(
        Stage::parse_list("1,five"),
        Err(StatementPrepError::UnknownStage(_))
    ));
    Ok(())
}

#[test]
fn test_bad_ownership_fails_before_any_output() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = write_inputs(dir.path(), [json!(60), json!(30)], default_run_rows())?;

    let err = SetupConfig::load(&setup).unwrap_err();
    assert!(err.is_configuration_error());
    let message = err.to_string();
    assert!(message.contains("Owner=Harbor LLC"));
    assert!(message.contains("Property=Harbor 1 - Main St"));
    assert!(!dir.path().join("statement_prep.sqlite").exists());
    Ok(())
}

#[test]
fn test_missing_inputs_are_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(matches!(
        SetupConfig::load(dir.path().join("nope.json")),
        Err(StatementPrepError::InputNotFound(_))
    ));

    let setup = write_inputs(dir.path(), [json!(60), json!(40)], default_run_rows())?;
    fs::remove_file(dir.path().join("gl_export.csv"))?;
    let config = SetupConfig::load(&setup)?;

    let mut store = MemoryStore::new();
    let err = StatementPipeline::run(&config, &mut store).unwrap_err();
    assert!(matches!(err, StatementPrepError::InputNotFound(_)));
    assert!(store.aggregates()?.is_empty());
    Ok(())
}

#[test]
fn test_owner_with_partial_run_rows_is_excluded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = write_inputs(
        dir.path(),
        [json!(60), json!(40)],
        vec![json!(["Alice", "Harbor LLC", "standard"])],
    )?;
    let config = SetupConfig::load(&setup)?;

    let mut store = MemoryStore::new();
    let summary = StatementPipeline::run(&config, &mut store)?;
    assert_eq!(summary.included_run_rows, 0);
    assert_eq!(summary.report.count("excluded_owner"), 1);
    assert!(StatementPipeline::statements(&config, &store.aggregates()?).is_empty());
    Ok(())
}

#[test]
fn test_strict_enrichment_rejects_unknown_property() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = write_inputs(dir.path(), [json!(60), json!(40)], default_run_rows())?;
    let mut workbook: SetupWorkbook = serde_json::from_str(&fs::read_to_string(&setup)?)?;
    if let Some(general) = workbook.sheets.get_mut("General Config") {
        general.push(vec![json!("Strict Enrichment:"), json!("yes")]);
    }
    let config = SetupConfig::from_workbook(&workbook)?;

    let mut store = MemoryStore::new();
    match StatementPipeline::run(&config, &mut store) {
        Err(StatementPrepError::UnmatchedJoinKeys { properties, gl_accounts }) => {
            assert_eq!(properties, vec!["Bay 7 - Shore Rd"]);
            assert!(gl_accounts.is_empty());
        }
        other => panic!("unexpected result: {:?}", other.map(|s| s.aggregate_rows)),
    }
    Ok(())
}
