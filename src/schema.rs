use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cash categorization that triggers the mortgage decomposition.
pub const MORTGAGE_CASH_CATEGORY: &str = "Mortgage";
pub const MORTGAGE_PAYMENT_CATEGORY: &str = "Mortgage Payment";
pub const MORTGAGE_LOAN_CATEGORY: &str = "Mortgage Loan";
pub const MORTGAGE_PRINCIPAL_CATEGORY: &str = "Mortgage Principal";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PerformanceType {
    #[schemars(description = "Income accounts (credit balance). Displayed sign is flipped so income is positive.")]
    Revenue,

    #[schemars(description = "Expense accounts (debit balance). Displayed sign is flipped alongside revenue.")]
    Expense,

    #[schemars(description = "Balance and memo accounts that never enter income totals.")]
    Other,
}

impl PerformanceType {
    pub fn flips_sign(&self) -> bool {
        matches!(self, Self::Revenue | Self::Expense)
    }
}

impl FromStr for PerformanceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "revenue" => Self::Revenue,
            "expense" => Self::Expense,
            _ => Self::Other,
        })
    }
}

impl fmt::Display for PerformanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revenue => write!(f, "Revenue"),
            Self::Expense => write!(f, "Expense"),
            Self::Other => write!(f, "Other"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum CashType {
    #[schemars(description = "Cash entering the investor's accounts")]
    Inflow,

    #[schemars(description = "Cash leaving the investor's accounts")]
    Outflow,

    #[schemars(description = "Direction decided by the sign of the net amount (Mortgage Principal)")]
    Both,

    #[schemars(description = "Anything else; contributes nothing to inflow or outflow totals")]
    Other,
}

impl FromStr for CashType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "inflow" => Self::Inflow,
            "outflow" => Self::Outflow,
            "both" => Self::Both,
            _ => Self::Other,
        })
    }
}

impl fmt::Display for CashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inflow => write!(f, "Inflow"),
            Self::Outflow => write!(f, "Outflow"),
            Self::Both => write!(f, "Both"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Rolling window label relative to the statement cutoff month.
///
/// The cutoff month itself is `[T1]`, eleven months prior is `[T12]`, and
/// anything older falls into the `[T13]` overflow bucket. Months after the
/// cutoff are `N/A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Timeframe {
    Trailing(u8),
    NotApplicable,
}

impl Timeframe {
    pub const WINDOW: u8 = 13;

    /// `[Tn]` for `n` in `1..=13`, `None` otherwise.
    pub fn trailing(n: u8) -> Option<Self> {
        (1..=Self::WINDOW).contains(&n).then_some(Self::Trailing(n))
    }

    /// Classifies a month given the calendar-month distance back from the cutoff.
    pub fn from_months_before_cutoff(diff: i32) -> Self {
        if diff < 0 {
            Self::NotApplicable
        } else if diff <= 11 {
            Self::Trailing(diff as u8 + 1)
        } else {
            Self::Trailing(Self::WINDOW)
        }
    }

    /// All window tokens, `[T1]` through `[T13]`.
    pub fn window() -> impl DoubleEndedIterator<Item = Timeframe> {
        (1..=Self::WINDOW).map(Self::Trailing)
    }

    pub fn is_in_window(&self) -> bool {
        matches!(self, Self::Trailing(n) if (1..=Self::WINDOW).contains(n))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trailing(n) => write!(f, "[T{}]", n),
            Self::NotApplicable => write!(f, "N/A"),
        }
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "N/A" {
            return Ok(Self::NotApplicable);
        }
        trimmed
            .strip_prefix("[T")
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(|n| n.parse::<u8>().ok())
            .and_then(Self::trailing)
            .ok_or_else(|| format!("Invalid timeframe token: {}", s))
    }
}

/// One line of the general-ledger export, plus the fields filled in by enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerRecord {
    #[schemars(description = "First day of the ledger month; None when the Month label was unparsable")]
    pub month: Option<NaiveDate>,
    pub txn_date: Option<NaiveDate>,
    pub gl_account: String,
    pub gl_type: String,
    pub property_name: String,
    pub street_address_1: String,
    pub street_address_2: String,
    pub debit: f64,
    pub credit: f64,
    pub balance: f64,

    pub investor: Option<String>,
    pub owner: Option<String>,
    pub acquired: Option<NaiveDate>,
    pub investor_type: Option<String>,
    pub categorization: Option<String>,
    pub mapping_type: Option<PerformanceType>,
    pub cash_categorization: Option<String>,
    pub cash_type: Option<CashType>,
}

impl LedgerRecord {
    pub fn new(property_name: impl Into<String>, gl_account: impl Into<String>) -> Self {
        Self {
            month: None,
            txn_date: None,
            gl_account: gl_account.into(),
            gl_type: String::new(),
            property_name: property_name.into(),
            street_address_1: String::new(),
            street_address_2: String::new(),
            debit: 0.0,
            credit: 0.0,
            balance: 0.0,
            investor: None,
            owner: None,
            acquired: None,
            investor_type: None,
            categorization: None,
            mapping_type: None,
            cash_categorization: None,
            cash_type: None,
        }
    }

    pub fn is_mortgage(&self) -> bool {
        self.cash_categorization.as_deref() == Some(MORTGAGE_CASH_CATEGORY)
    }
}

/// One row of the Investor Table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OwnershipEntry {
    pub investor: String,
    pub owner: String,
    #[schemars(description = "Short property code")]
    pub property: String,
    pub property_name: String,
    pub acquired: Option<NaiveDate>,
    pub investor_type: Option<String>,
    #[schemars(description = "Ownership share in percent, (0, 100]")]
    pub pct_ownership: f64,
}

/// One row of the GL Mapping table, keyed by GL account code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryMapping {
    pub gl_account: String,
    pub categorization: Option<String>,
    pub mapping_type: Option<PerformanceType>,
    pub cash_categorization: Option<String>,
    pub cash_type: Option<CashType>,
    /// GL Type cell as written, e.g. "Liability" where `mapping_type` is `Other`
    pub gl_type_label: Option<String>,
    pub cash_type_label: Option<String>,
}

/// One row of the aggregate store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregateRecord {
    pub month: Option<NaiveDate>,
    pub investor: Option<String>,
    pub owner: Option<String>,
    pub property_name: String,
    #[schemars(description = "Short property code joined from the Investor Table")]
    pub property: Option<String>,
    pub acquired: Option<NaiveDate>,
    pub categorization: Option<String>,
    pub mapping_type: Option<PerformanceType>,
    #[schemars(description = "Sum of debit minus sum of credit for the group")]
    pub value: f64,
    pub cash_categorization: Option<String>,
    pub cash_value: f64,
    pub cash_type: Option<CashType>,
    /// [T1]..[T13] or N/A
    #[schemars(with = "String")]
    pub timeframe: Timeframe,
}

impl AggregateRecord {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AggregateRecord)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
