use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatementPrepError {
    #[error("Missing sheet '{0}' in setup workbook")]
    MissingSheet(String),

    #[error("{section} missing required columns: {columns:?}")]
    MissingColumns {
        section: String,
        columns: Vec<String>,
    },

    #[error("Missing required {section} value for: {label}")]
    MissingValue { section: String, label: String },

    #[error("{section} row {row}: {details}")]
    InvalidValue {
        section: String,
        row: usize,
        details: String,
    },

    #[error("Investor Table row {row} has % Ownership out of range: {value}. Valid range is >0 and <=100")]
    OwnershipOutOfRange { row: usize, value: f64 },

    #[error("Investor Table ownership sums must equal 100% for each Owner Property. Found {failures} failures. Sample: {sample}")]
    OwnershipSumMismatch { failures: usize, sample: String },

    #[error("Investor Table requires unique Property Name values. Duplicates found: {0:?}")]
    DuplicatePropertyNames(Vec<String>),

    #[error("{0} contains no rows")]
    EmptySection(String),

    #[error("Unrecognized Statement Thru Date: {0}")]
    InvalidStatementDate(String),

    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("GL CSV missing required columns: {missing:?}")]
    ColumnMismatch { missing: Vec<String> },

    #[error("Unmatched join keys. Properties: {properties:?}. GL accounts: {gl_accounts:?}")]
    UnmatchedJoinKeys {
        properties: Vec<String>,
        gl_accounts: Vec<String>,
    },

    #[error("Unknown part: {0}")]
    UnknownStage(String),

    #[error("Part {0} not implemented yet")]
    StageNotImplemented(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl StatementPrepError {
    /// True for failures that come from the setup workbook rather than the ledger or the store.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSheet(_)
                | Self::MissingColumns { .. }
                | Self::MissingValue { .. }
                | Self::InvalidValue { .. }
                | Self::OwnershipOutOfRange { .. }
                | Self::OwnershipSumMismatch { .. }
                | Self::DuplicatePropertyNames(_)
                | Self::EmptySection(_)
                | Self::InvalidStatementDate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StatementPrepError>;
