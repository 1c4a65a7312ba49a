//! # Statement Prep
//!
//! Turns a property-management general-ledger export into the per-investor
//! aggregates that monthly investor statements are built from.
//!
//! ## Core Concepts
//!
//! - **Setup workbook**: general parameters, the run list, the investor/ownership
//!   table and the GL-to-category mapping, validated up front
//! - **Ledger**: one CSV export per run, read leniently (bad cells become zero or null)
//! - **Enrichment**: first-match joins of ownership by property name and of
//!   categories by GL account
//! - **Aggregate store**: monthly sums per investor/owner/property/category,
//!   labelled `[T1]`..`[T13]` relative to the statement cutoff month, with
//!   mortgage rows split into a payment leg and a loan leg
//! - **Query layer**: report-ready totals with income shown positive and
//!   figures scaled by ownership share
//!
//! ## Example
//!
//! ```rust,ignore
//! use statement_prep::*;
//!
//! let config = SetupConfig::load("setup.json")?;
//! let mut store = SqliteStore::open("statement_prep.sqlite")?;
//! let summary = StatementPipeline::run(&config, &mut store)?;
//!
//! let aggregates = store.aggregates()?;
//! let query = AggregateQuery::new(&aggregates);
//! let totals = query.performance_totals(&QueryScope::investor("Alice"));
//! println!("{} rows, revenue {}", summary.aggregate_rows, totals.total_revenue);
//! ```

pub mod config;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod ownership;
pub mod quality;
pub mod query;
pub mod report;
pub mod schema;
pub mod store;
pub mod utils;

pub use config::{GeneralConfig, OwnershipLayout, RunConfigRow, RunPlan, SetupConfig, SetupWorkbook};
pub use engine::{aggregate, Aggregator};
pub use enrichment::Enricher;
pub use error::{Result, StatementPrepError};
pub use export::{export_monthly_statement, write_aggregates_csv};
pub use ingestion::{ingest, ingest_with_report, parse_ledger, LEDGER_COLUMNS};
pub use ownership::OwnershipScaling;
pub use quality::{DataQualityIssue, DataQualityReport};
pub use query::*;
pub use report::{build_statement, ReportSection, SectionValues};
pub use schema::*;
pub use store::{MemoryStore, SqliteStore, StatementStore};
pub use utils::*;

use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ledger_rows: usize,
    pub aggregate_rows: usize,
    /// Run rows left after owners with incomplete ownership were excluded.
    pub included_run_rows: usize,
    pub report: DataQualityReport,
}

/// Scaled report sections for one run row.
#[derive(Debug, Clone, Serialize)]
pub struct InvestorStatement {
    pub investor: String,
    pub owner: String,
    pub template: Option<String>,
    pub ownership_pct: f64,
    pub sections: Vec<SectionValues>,
}

pub struct StatementPipeline;

impl StatementPipeline {
    /// Ingests the configured ledger and rebuilds both store tables.
    pub fn run<S: StatementStore + ?Sized>(config: &SetupConfig, store: &mut S) -> Result<RunSummary> {
        let mut report = config.diagnostics.clone();
        let records = ingest_with_report(
            config.general.ledger_path(),
            config.general.rows_to_skip_after_header,
            &mut report,
        )?;
        Self::process(config, records, store, report)
    }

    /// Same as [`StatementPipeline::run`] for records that were parsed elsewhere.
    pub fn run_records<S: StatementStore + ?Sized>(
        config: &SetupConfig,
        records: Vec<LedgerRecord>,
        store: &mut S,
    ) -> Result<RunSummary> {
        Self::process(config, records, store, config.diagnostics.clone())
    }

    fn process<S: StatementStore + ?Sized>(
        config: &SetupConfig,
        mut records: Vec<LedgerRecord>,
        store: &mut S,
        mut report: DataQualityReport,
    ) -> Result<RunSummary> {
        info!("Processing {} ledger rows", records.len());

        // nothing is written until every in-memory step has succeeded
        Enricher::new(&config.ownership, &config.gl_mapping)
            .strict(config.general.strict_enrichment)
            .enrich(&mut records, &mut report)?;
        let aggregates =
            Aggregator::new(&config.ownership, config.general.statement_thru_date).build(&records);

        store.replace_ledger(&records)?;
        store.replace_aggregates(&aggregates)?;

        let plan = config.run_plan();
        report.extend(plan.report);

        debug!("Data quality summary: {:?}", report.summary());
        info!(
            "Built {} aggregate rows; {} of {} run rows included",
            aggregates.len(),
            plan.rows.len(),
            config.run.len()
        );

        Ok(RunSummary {
            ledger_rows: records.len(),
            aggregate_rows: aggregates.len(),
            included_run_rows: plan.rows.len(),
            report,
        })
    }

    /// Evaluates every report section for each included run row.
    pub fn statements(config: &SetupConfig, aggregates: &[AggregateRecord]) -> Vec<InvestorStatement> {
        let query = AggregateQuery::new(aggregates);
        config
            .run_plan()
            .rows
            .into_iter()
            .map(|row| {
                let scaling = OwnershipScaling::for_run(config, &row.investor, &row.owner);
                let scope = QueryScope::investor(row.investor.as_str()).with_owner(row.owner.as_str());
                InvestorStatement {
                    sections: build_statement(
                        &query,
                        &scope,
                        config.general.statement_thru_date,
                        &scaling,
                    ),
                    ownership_pct: scaling.pct(),
                    investor: row.investor,
                    owner: row.owner,
                    template: row.template,
                }
            })
            .collect()
    }
}

/// Pipeline stages selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Ingest, enrich and aggregate the ledger.
    Ledger,
    /// Export the monthly statement tables.
    Export,
    /// Populate statement decks.
    Statements,
    /// Combine statement decks.
    Combine,
}

impl Stage {
    /// Parses a comma-separated stage list such as `"1,2"`. Every id is
    /// checked before any stage runs.
    pub fn parse_list(list: &str) -> Result<Vec<Stage>> {
        let stages = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Stage::from_str)
            .collect::<Result<Vec<Stage>>>()?;
        if stages.is_empty() {
            return Err(StatementPrepError::UnknownStage(list.trim().to_string()));
        }
        Ok(stages)
    }
}

impl FromStr for Stage {
    type Err = StatementPrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(Self::Ledger),
            "2" => Ok(Self::Export),
            "3" => Ok(Self::Statements),
            "4" => Ok(Self::Combine),
            other => Err(StatementPrepError::UnknownStage(other.to_string())),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            Self::Ledger => "1",
            Self::Export => "2",
            Self::Statements => "3",
            Self::Combine => "4",
        };
        write!(f, "{}", id)
    }
}

/// Where the data-quality report for a store is written.
pub fn quality_report_path(db_path: &Path) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statement_prep".to_string());
    db_path.with_file_name(format!("{}_quality_report.json", stem))
}

/// Runs the given stages in order against a SQLite store at `db_path`.
pub fn run_stages(stages: &[Stage], config: &SetupConfig, db_path: &Path) -> Result<()> {
    for stage in stages {
        info!("Running part {}", stage);
        match stage {
            Stage::Ledger => {
                let mut store = SqliteStore::open(db_path)?;
                let summary = StatementPipeline::run(config, &mut store)?;
                let report_path = quality_report_path(db_path);
                std::fs::write(&report_path, summary.report.to_json()?)?;
                info!(
                    "Part 1 complete: {} ledger rows, {} aggregate rows, report at {}",
                    summary.ledger_rows,
                    summary.aggregate_rows,
                    report_path.display()
                );
            }
            Stage::Export => {
                let store = SqliteStore::open(db_path)?;
                let aggregates = store.aggregates()?;
                export_monthly_statement(
                    &aggregates,
                    &config.general.output_location,
                    config.general.statement_thru_date,
                )?;
            }
            Stage::Statements | Stage::Combine => {
                return Err(StatementPrepError::StageNotImplemented(stage.to_string()));
            }
        }
    }
    Ok(())
}
