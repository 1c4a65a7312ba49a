//! Typed view of the setup workbook.
//!
//! The workbook is kept in its spreadsheet shape (named sheets holding grids of
//! scalar cells) and serialised as JSON, so no binary spreadsheet format is
//! involved. Loading validates every sheet up front and either returns a fully
//! checked [`SetupConfig`] or fails before any ledger row is read.

use crate::error::{Result, StatementPrepError};
use crate::quality::{DataQualityIssue, DataQualityReport};
use crate::schema::{CategoryMapping, OwnershipEntry};
use crate::utils::{first_of_month, parse_calendar_date, parse_statement_date};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

pub const GENERAL_CONFIG_SHEET: &str = "General Config";
pub const RUN_CONFIG_SHEET: &str = "Run Config";
pub const INVESTOR_TABLE_SHEET: &str = "Investor Table";
pub const GL_MAPPING_SHEET: &str = "GL Mapping";

pub const DEFAULT_ROWS_TO_SKIP_AFTER_HEADER: usize = 2;
pub const OWNERSHIP_SUM_TOLERANCE: f64 = 0.01;
const OWNERSHIP_FAILURE_SAMPLE: usize = 10;

const INVESTOR_TABLE_COLUMNS: [&str; 7] = [
    "Investor",
    "Property",
    "Property Name",
    "Owner",
    "Acquired",
    "Type",
    "% Ownership",
];

const GL_MAPPING_COLUMNS: [&str; 5] = [
    "GL Account",
    "Categorization",
    "GL Type",
    "Cash Categorization",
    "Cash Type",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupWorkbook {
    pub sheets: BTreeMap<String, Vec<Vec<Value>>>,
}

impl SetupWorkbook {
    pub fn with_sheet(mut self, name: &str, rows: Vec<Vec<Value>>) -> Self {
        self.sheets.insert(name.to_string(), rows);
        self
    }

    fn sheet(&self, name: &str) -> Result<&[Vec<Value>]> {
        self.sheets
            .get(name)
            .map(|rows| rows.as_slice())
            .ok_or_else(|| StatementPrepError::MissingSheet(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OwnershipLayout {
    /// Several investors may share an owner and property, provided the shares sum to 100%.
    #[default]
    Shared,
    /// Every Property Name appears exactly once in the Investor Table.
    UniquePropertyName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub gl_location: PathBuf,
    pub gl_file_name: String,
    pub output_location: PathBuf,
    pub statement_thru_date: NaiveDate,
    pub rows_to_skip_after_header: usize,
    pub ownership_layout: OwnershipLayout,
    /// Report every figure at 100% regardless of ownership share.
    pub force_100_pct: bool,
    /// Figure keys ("section.column") that are never scaled by ownership.
    pub ownership_scaling_exceptions: Vec<String>,
    pub strict_enrichment: bool,
}

impl GeneralConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.gl_location.join(&self.gl_file_name)
    }

    /// The calendar month containing the statement thru date.
    pub fn cutoff_month(&self) -> NaiveDate {
        first_of_month(self.statement_thru_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfigRow {
    pub investor: String,
    pub owner: String,
    pub template: Option<String>,
}

/// Run rows that survive the ownership-sum check, plus what was dropped.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub rows: Vec<RunConfigRow>,
    pub report: DataQualityReport,
}

#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub general: GeneralConfig,
    pub run: Vec<RunConfigRow>,
    pub ownership: Vec<OwnershipEntry>,
    pub gl_mapping: Vec<CategoryMapping>,
    /// Non-fatal findings made while loading (de-duplicated run rows).
    pub diagnostics: DataQualityReport,
}

impl SetupConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StatementPrepError::InputNotFound(path.to_path_buf()));
        }
        info!("Loading setup workbook: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let workbook: SetupWorkbook = serde_json::from_str(json)?;
        Self::from_workbook(&workbook)
    }

    pub fn from_workbook(workbook: &SetupWorkbook) -> Result<Self> {
        let general = read_general_config(workbook.sheet(GENERAL_CONFIG_SHEET)?)?;

        let mut diagnostics = DataQualityReport::new();
        let run = read_run_config(workbook.sheet(RUN_CONFIG_SHEET)?, &mut diagnostics)?;
        let ownership = read_investor_table(
            workbook.sheet(INVESTOR_TABLE_SHEET)?,
            general.ownership_layout,
        )?;
        let gl_mapping = read_gl_mapping(workbook.sheet(GL_MAPPING_SHEET)?)?;

        debug!(
            "Setup workbook contains {} run rows, {} investor table rows and {} GL mapping rows",
            run.len(),
            ownership.len(),
            gl_mapping.len()
        );

        Ok(Self {
            general,
            run,
            ownership,
            gl_mapping,
            diagnostics,
        })
    }

    /// Ownership percentages listed for an investor/owner pair, matched case-insensitively.
    pub fn ownership_percentages(&self, investor: &str, owner: &str) -> Vec<f64> {
        let investor = investor.trim().to_lowercase();
        let owner = owner.trim().to_lowercase();
        self.ownership
            .iter()
            .filter(|e| e.investor.to_lowercase() == investor && e.owner.to_lowercase() == owner)
            .map(|e| e.pct_ownership)
            .collect()
    }

    /// Run rows to process. An owner whose run rows do not cover 100% of
    /// every one of its properties is left out of the plan. This is recorded
    /// as a data-quality issue, not raised as an error.
    pub fn run_plan(&self) -> RunPlan {
        let mut plan = RunPlan::default();
        let mut owners_seen = HashSet::new();
        let mut excluded = HashSet::new();

        for row in &self.run {
            let owner_key = row.owner.to_lowercase();
            if !owners_seen.insert(owner_key.clone()) {
                continue;
            }

            let investors: HashSet<String> = self
                .run
                .iter()
                .filter(|r| r.owner.to_lowercase() == owner_key)
                .map(|r| r.investor.to_lowercase())
                .collect();

            let mut sums: BTreeMap<String, (String, f64)> = BTreeMap::new();
            for entry in &self.ownership {
                if entry.owner.to_lowercase() != owner_key
                    || !investors.contains(&entry.investor.to_lowercase())
                {
                    continue;
                }
                let slot = sums
                    .entry(entry.property_name.to_lowercase())
                    .or_insert_with(|| (entry.property_name.clone(), 0.0));
                slot.1 += entry.pct_ownership;
            }

            let shortfall = if sums.is_empty() {
                Some((String::new(), 0.0))
            } else {
                sums.into_values()
                    .find(|(_, total)| (total - 100.0).abs() > OWNERSHIP_SUM_TOLERANCE)
            };

            if let Some((property_name, total_pct)) = shortfall {
                excluded.insert(owner_key);
                plan.report.record(DataQualityIssue::ExcludedOwner {
                    owner: row.owner.clone(),
                    property_name,
                    total_pct,
                });
            }
        }

        plan.rows = self
            .run
            .iter()
            .filter(|r| !excluded.contains(&r.owner.to_lowercase()))
            .cloned()
            .collect();
        plan
    }
}

/// Header row plus data rows of a tabular sheet. Row numbers are 1-based, as
/// a spreadsheet shows them.
struct SheetTable<'a> {
    section: &'static str,
    headers: Vec<String>,
    rows: Vec<(usize, &'a [Value])>,
}

impl<'a> SheetTable<'a> {
    fn parse(section: &'static str, grid: &'a [Vec<Value>]) -> Result<Self> {
        let header_idx = grid
            .iter()
            .position(|row| row.iter().any(|c| !cell_text(c).is_empty()))
            .ok_or_else(|| StatementPrepError::EmptySection(section.to_string()))?;

        let headers = grid[header_idx].iter().map(cell_text).collect();
        let rows = grid
            .iter()
            .enumerate()
            .skip(header_idx + 1)
            .map(|(idx, row)| (idx + 1, row.as_slice()))
            .collect();

        Ok(Self {
            section,
            headers,
            rows,
        })
    }

    fn column(&self, name: &str) -> Option<usize> {
        let target = name.trim().to_lowercase();
        self.headers.iter().position(|h| h.to_lowercase() == target)
    }

    fn require(&self, names: &[&str]) -> Result<Vec<usize>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| self.column(n).is_none())
            .map(|n| n.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StatementPrepError::MissingColumns {
                section: self.section.to_string(),
                columns: missing,
            });
        }
        Ok(names.iter().filter_map(|n| self.column(n)).collect())
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn cell_at(row: &[Value], idx: usize) -> String {
    row.get(idx).map(cell_text).unwrap_or_default()
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn normalize_label(label: &str) -> String {
    let trimmed = label.trim();
    trimmed
        .strip_suffix(':')
        .unwrap_or(trimmed)
        .trim()
        .to_lowercase()
}

fn parse_flag(section: &str, label: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "" | "false" | "no" | "n" | "0" => Ok(false),
        "true" | "yes" | "y" | "1" => Ok(true),
        other => Err(StatementPrepError::InvalidValue {
            section: section.to_string(),
            row: 0,
            details: format!("{} must be yes/no, got '{}'", label, other),
        }),
    }
}

fn read_general_config(grid: &[Vec<Value>]) -> Result<GeneralConfig> {
    let mut kv: BTreeMap<String, String> = BTreeMap::new();
    for row in grid {
        if row.len() < 2 {
            continue;
        }
        let key = normalize_label(&cell_text(&row[0]));
        if !key.is_empty() {
            kv.insert(key, cell_text(&row[1]));
        }
    }

    let get_required = |label: &str| -> Result<String> {
        kv.get(&normalize_label(label))
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| StatementPrepError::MissingValue {
                section: GENERAL_CONFIG_SHEET.to_string(),
                label: label.to_string(),
            })
    };
    let get_optional = |label: &str| -> Option<&String> {
        kv.get(&normalize_label(label)).filter(|v| !v.is_empty())
    };

    let statement_thru_date = parse_statement_date(&get_required("Statement Thru Date")?)?;

    let rows_to_skip_after_header = match get_optional("Ledger Rows To Skip") {
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as usize)
            .ok_or_else(|| StatementPrepError::InvalidValue {
                section: GENERAL_CONFIG_SHEET.to_string(),
                row: 0,
                details: format!("Ledger Rows To Skip must be a whole number, got '{}'", raw),
            })?,
        None => DEFAULT_ROWS_TO_SKIP_AFTER_HEADER,
    };

    let ownership_layout = match get_optional("Ownership Layout").map(|v| normalize_label(v)) {
        None => OwnershipLayout::Shared,
        Some(v) if v == "shared" => OwnershipLayout::Shared,
        Some(v) if v == "unique property name" || v == "unique" => {
            OwnershipLayout::UniquePropertyName
        }
        Some(v) => {
            return Err(StatementPrepError::InvalidValue {
                section: GENERAL_CONFIG_SHEET.to_string(),
                row: 0,
                details: format!("Unknown Ownership Layout '{}'", v),
            })
        }
    };

    let force_100_pct = parse_flag(
        GENERAL_CONFIG_SHEET,
        "Ownership Force 100%",
        get_optional("Ownership Force 100%").map(String::as_str).unwrap_or(""),
    )?;
    let strict_enrichment = parse_flag(
        GENERAL_CONFIG_SHEET,
        "Strict Enrichment",
        get_optional("Strict Enrichment").map(String::as_str).unwrap_or(""),
    )?;

    let ownership_scaling_exceptions = get_optional("Ownership Scaling Exceptions")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(GeneralConfig {
        gl_location: PathBuf::from(get_required("GL Location")?),
        gl_file_name: get_required("GL File Name")?,
        output_location: PathBuf::from(get_required("Output Location")?),
        statement_thru_date,
        rows_to_skip_after_header,
        ownership_layout,
        force_100_pct,
        ownership_scaling_exceptions,
        strict_enrichment,
    })
}

fn read_run_config(
    grid: &[Vec<Value>],
    diagnostics: &mut DataQualityReport,
) -> Result<Vec<RunConfigRow>> {
    let table = SheetTable::parse(RUN_CONFIG_SHEET, grid)?;
    let cols = table.require(&["Investor", "Owner"])?;
    let (investor_col, owner_col) = (cols[0], cols[1]);
    let template_col = table
        .column("Base Template")
        .or_else(|| table.column("Template"));

    let mut rows = Vec::new();
    let mut seen_pairs = HashSet::new();

    for (row_no, row) in &table.rows {
        let investor = cell_at(row, investor_col);
        if investor.is_empty() {
            break;
        }

        let owner = cell_at(row, owner_col);
        if owner.is_empty() {
            return Err(StatementPrepError::InvalidValue {
                section: RUN_CONFIG_SHEET.to_string(),
                row: *row_no,
                details: "has an Investor but missing Owner".to_string(),
            });
        }

        if !seen_pairs.insert((investor.to_lowercase(), owner.to_lowercase())) {
            diagnostics.record(DataQualityIssue::DuplicateRunRow {
                row: *row_no,
                investor,
                owner,
            });
            continue;
        }

        rows.push(RunConfigRow {
            investor,
            owner,
            template: template_col.and_then(|c| non_empty(cell_at(row, c))),
        });
    }

    if rows.is_empty() {
        return Err(StatementPrepError::EmptySection(RUN_CONFIG_SHEET.to_string()));
    }

    Ok(rows)
}

/// Normalises a % Ownership cell to percent. Numbers in (0, 1] are fractions,
/// text with a trailing '%' is already a percentage.
fn parse_pct_ownership(cell: Option<&Value>, row_no: usize) -> Result<f64> {
    let invalid = |details: String| StatementPrepError::InvalidValue {
        section: INVESTOR_TABLE_SHEET.to_string(),
        row: row_no,
        details,
    };

    let pct = match cell {
        None | Some(Value::Null) => return Err(invalid("missing % Ownership".to_string())),
        Some(Value::Number(n)) => {
            let v = n
                .as_f64()
                .ok_or_else(|| invalid(format!("invalid % Ownership: {}", n)))?;
            scale_fraction(v)
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(invalid("missing % Ownership".to_string()));
            }
            match trimmed.strip_suffix('%') {
                Some(number) => number
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("invalid % Ownership: {}", s)))?,
                None => scale_fraction(
                    trimmed
                        .parse::<f64>()
                        .map_err(|_| invalid(format!("invalid % Ownership: {}", s)))?,
                ),
            }
        }
        Some(other) => return Err(invalid(format!("invalid % Ownership: {}", other))),
    };

    if pct <= 0.0 || pct > 100.0 || !pct.is_finite() {
        return Err(StatementPrepError::OwnershipOutOfRange {
            row: row_no,
            value: pct,
        });
    }
    Ok(pct)
}

fn scale_fraction(value: f64) -> f64 {
    if value > 0.0 && value <= 1.0 {
        value * 100.0
    } else {
        value
    }
}

fn read_investor_table(grid: &[Vec<Value>], layout: OwnershipLayout) -> Result<Vec<OwnershipEntry>> {
    let table = SheetTable::parse(INVESTOR_TABLE_SHEET, grid)?;
    let cols = table.require(&INVESTOR_TABLE_COLUMNS)?;
    let (investor_col, property_col, name_col, owner_col, acquired_col, type_col, pct_col) =
        (cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6]);

    let mut entries = Vec::new();
    for (row_no, row) in &table.rows {
        let investor = cell_at(row, investor_col);
        if investor.is_empty() {
            break;
        }

        let owner = cell_at(row, owner_col);
        let property = cell_at(row, property_col);
        for (label, value) in [("Owner", &owner), ("Property", &property)] {
            if value.is_empty() {
                return Err(StatementPrepError::InvalidValue {
                    section: INVESTOR_TABLE_SHEET.to_string(),
                    row: *row_no,
                    details: format!("has an Investor but missing {}", label),
                });
            }
        }

        let acquired_raw = cell_at(row, acquired_col);
        let acquired = parse_calendar_date(&acquired_raw);
        if acquired.is_none() && !acquired_raw.is_empty() {
            warn!(
                "Investor Table row {} has unparsable Acquired date '{}'",
                row_no, acquired_raw
            );
        }

        entries.push(OwnershipEntry {
            investor,
            owner,
            property,
            property_name: cell_at(row, name_col),
            acquired,
            investor_type: non_empty(cell_at(row, type_col)),
            pct_ownership: parse_pct_ownership(row.get(pct_col), *row_no)?,
        });
    }

    if entries.is_empty() {
        return Err(StatementPrepError::EmptySection(
            INVESTOR_TABLE_SHEET.to_string(),
        ));
    }

    if layout == OwnershipLayout::UniquePropertyName {
        let mut seen = HashSet::new();
        let duplicates: BTreeSet<String> = entries
            .iter()
            .filter(|e| !seen.insert(e.property_name.clone()))
            .map(|e| e.property_name.clone())
            .collect();
        if !duplicates.is_empty() {
            return Err(StatementPrepError::DuplicatePropertyNames(
                duplicates.into_iter().collect(),
            ));
        }
    }

    validate_ownership_sums(&entries)?;
    Ok(entries)
}

fn validate_ownership_sums(entries: &[OwnershipEntry]) -> Result<()> {
    let mut sums: BTreeMap<(String, String), (String, String, f64)> = BTreeMap::new();
    for entry in entries {
        let key = (entry.owner.to_lowercase(), entry.property_name.to_lowercase());
        let slot = sums
            .entry(key)
            .or_insert_with(|| (entry.owner.clone(), entry.property_name.clone(), 0.0));
        slot.2 += entry.pct_ownership;
    }

    let bad: Vec<(String, String, f64)> = sums
        .into_values()
        .filter(|(_, _, total)| (total - 100.0).abs() > OWNERSHIP_SUM_TOLERANCE)
        .collect();

    if bad.is_empty() {
        return Ok(());
    }

    let sample = bad
        .iter()
        .take(OWNERSHIP_FAILURE_SAMPLE)
        .map(|(owner, property, total)| {
            format!("Owner={} Property={} Sum={}", owner, property, total)
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(StatementPrepError::OwnershipSumMismatch {
        failures: bad.len(),
        sample,
    })
}

fn read_gl_mapping(grid: &[Vec<Value>]) -> Result<Vec<CategoryMapping>> {
    let table = SheetTable::parse(GL_MAPPING_SHEET, grid)?;
    let cols = table.require(&GL_MAPPING_COLUMNS)?;
    let (account_col, cat_col, type_col, cash_cat_col, cash_type_col) =
        (cols[0], cols[1], cols[2], cols[3], cols[4]);

    let mut mappings = Vec::new();
    let mut accounts = HashSet::new();

    for (row_no, row) in &table.rows {
        let gl_account = cell_at(row, account_col);
        if gl_account.is_empty() {
            continue;
        }
        if !accounts.insert(gl_account.clone()) {
            warn!(
                "GL Mapping row {} repeats GL Account '{}'; the first row wins",
                row_no, gl_account
            );
        }

        let gl_type_label = non_empty(cell_at(row, type_col));
        let cash_type_label = non_empty(cell_at(row, cash_type_col));
        mappings.push(CategoryMapping {
            gl_account,
            categorization: non_empty(cell_at(row, cat_col)),
            mapping_type: gl_type_label.as_deref().and_then(|t| t.parse().ok()),
            cash_categorization: non_empty(cell_at(row, cash_cat_col)),
            cash_type: cash_type_label.as_deref().and_then(|t| t.parse().ok()),
            gl_type_label,
            cash_type_label,
        });
    }

    Ok(mappings)
}
