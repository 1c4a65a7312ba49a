//! Structured record of the silent data-quality degradations a run tolerates.
//!
//! None of these stop the batch. They only shrink what a record contributes
//! to the aggregates, so the report is the one place a run that "ran with
//! silent nulls" can be told apart from a clean one.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityIssue {
    /// A Debit, Credit or Balance cell that was coerced to 0.0.
    UnparsableAmount {
        line: usize,
        column: String,
        value: String,
    },
    /// A Month or Date cell that was coerced to null.
    UnparsableDate {
        line: usize,
        column: String,
        value: String,
    },
    UnmatchedProperty { property_name: String, rows: usize },
    UnmatchedGlAccount { gl_account: String, rows: usize },
    DuplicateRunRow {
        row: usize,
        investor: String,
        owner: String,
    },
    /// Owner left out of the run because its run rows do not sum to 100%.
    ExcludedOwner {
        owner: String,
        property_name: String,
        total_pct: f64,
    },
}

impl DataQualityIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnparsableAmount { .. } => "unparsable_amount",
            Self::UnparsableDate { .. } => "unparsable_date",
            Self::UnmatchedProperty { .. } => "unmatched_property",
            Self::UnmatchedGlAccount { .. } => "unmatched_gl_account",
            Self::DuplicateRunRow { .. } => "duplicate_run_row",
            Self::ExcludedOwner { .. } => "excluded_owner",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub issues: Vec<DataQualityIssue>,
}

impl DataQualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, issue: DataQualityIssue) {
        warn!("Data quality: {:?}", issue);
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: DataQualityReport) {
        self.issues.extend(other.issues);
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.issues.iter().filter(|i| i.kind() == kind).count()
    }

    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
