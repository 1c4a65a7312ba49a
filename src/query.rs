//! Read-only views over the aggregate store.
//!
//! Every query is scoped to one investor, optionally narrowed to an owner and a
//! property code, and only sees rows inside the `[T1]`..`[T13]` window.

use crate::schema::*;
use crate::utils::{format_month_label, whole_months_between};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const RESERVE_CASH_ACCOUNT: &str = "1180 Cash Account";
pub const INVESTOR_CASH_ACCOUNT: &str = "1150 Cash Account";
pub const TOTAL_INVESTED_CATEGORY: &str = "Total Invested";
pub const MORTGAGE_BALANCE_CATEGORY: &str = "Mortgage Balance";
const MORTGAGE_PRINCIPAL_LEGACY: &str = "Mortgage Principle";

/// Declares a set of named money figures with their display column labels.
macro_rules! figure_set {
    ($(#[$meta:meta])* $name:ident { $($field:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
        pub struct $name {
            $(pub $field: f64),+
        }

        impl $name {
            pub const COLUMNS: &'static [&'static str] = &[$($label),+];

            pub fn columns(&self) -> Vec<(&'static str, f64)> {
                vec![$(($label, self.$field)),+]
            }

            /// Rebuilds the set with every figure passed through `f(column, amount)`.
            pub fn map_amounts(&self, mut f: impl FnMut(&'static str, f64) -> f64) -> Self {
                Self {
                    $($field: f($label, self.$field)),+
                }
            }
        }
    };
}

figure_set!(
    /// Trailing-window performance totals, income positive.
    PerformanceTotals {
        rent => "Rent",
        dividend => "Dividend",
        total_revenue => "Total Revenue",
        hoa_mgt_fee => "HOA & Mgt. Fee",
        repairs_other => "Repairs & Other Exp.",
        mortgage_interest => "Mortgage Interest",
        total_expenses => "Total Expenses",
        monthly => "Monthly",
        cumulative => "Cumulative",
    }
);

figure_set!(
    /// Trailing-window cash totals, inflows positive and outflows negative.
    CashTotals {
        owner_contribution => "Owner Contribution",
        mortgage_loan => "Mortgage Loan",
        rent_dividend => "Rent & Dividend",
        total_inflow => "Total Inflow",
        hoa_mgt_fee => "HOA & Mgt. Fee",
        repairs_other => "Repairs & Other Exp.",
        mortgage_interest => "Mortgage Interest",
        mortgage_principal => "Mortgage Principal",
        mortgage_payment => "Mortgage Payment",
        apartment_improve => "Apartment & Improve.",
        owner_distribution => "Owner Distribution",
        total_outflow => "Total Outflow",
        monthly => "Monthly",
        cumulative => "Cumulative",
    }
);

figure_set!(
    MonthlyPerformanceFigures {
        rent => "Rent",
        other_revenue => "Other Revenue",
        total_revenue => "Total Revenue",
        mortgage => "Mortgage",
        hoa => "HOA",
        mgt_fee => "Mgt. Fee",
        repairs => "Repairs Exp.",
        other_expense => "Other Expense",
        total_expenses => "Total Expenses",
        monthly => "Monthly",
        cumulative => "Cumulative",
    }
);

figure_set!(
    MonthlyCashFigures {
        owner_contribution => "Owner Contribution",
        mortgage_loan => "Mortgage Loan",
        rent_dividend => "Rent & Dividend",
        total_inflow => "Total Inflow",
        apartment_improve => "Apartment & Improve.",
        mortgage_payment => "Mortgage Payment",
        hoa => "HOA",
        mgt_fee => "Mgt. Fee",
        repairs_other => "Repairs & Other Expense",
        owner_distribution => "Owner Distribution",
        total_outflow => "Total Outflow",
        monthly => "Monthly",
        cumulative => "Cumulative",
    }
);

figure_set!(
    AvailableCash {
        reserve_balance => "Reserve Account Balance",
        investor_balance => "Investor Account Balance",
        current_available => "Current Available Cash",
    }
);

figure_set!(
    PortfolioIncome {
        total_invested => "Total Invested",
        mortgage_balance => "Mortgage Balance",
        cumulative_income => "Cumulative Income",
    }
);

impl PortfolioIncome {
    pub fn cash_on_cash(&self) -> f64 {
        if self.total_invested == 0.0 {
            0.0
        } else {
            self.cumulative_income / self.total_invested
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPerformanceRow {
    pub timeframe: Timeframe,
    pub month_label: String,
    pub figures: MonthlyPerformanceFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCashRow {
    pub timeframe: Timeframe,
    pub month_label: String,
    pub figures: MonthlyCashFigures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryScope {
    pub investor: String,
    pub owner: Option<String>,
    pub property: Option<String>,
}

impl QueryScope {
    pub fn investor(investor: impl Into<String>) -> Self {
        Self {
            investor: investor.into(),
            owner: None,
            property: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    fn matches(&self, row: &AggregateRecord) -> bool {
        if !row.timeframe.is_in_window() || row.investor.as_deref() != Some(self.investor.as_str()) {
            return false;
        }
        if let Some(owner) = self.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            if row.owner.as_deref() != Some(owner) {
                return false;
            }
        }
        if let Some(property) = self.property.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            if row.property.as_deref() != Some(property) {
                return false;
            }
        }
        true
    }
}

/// Performance value as presented: revenue and expense signs are flipped so
/// income reads positive.
fn displayed_value(row: &AggregateRecord) -> f64 {
    match row.mapping_type {
        Some(t) if t.flips_sign() => -row.value,
        _ => row.value,
    }
}

fn category(label: &Option<String>) -> &str {
    label.as_deref().map(str::trim).unwrap_or("")
}

/// Signed cash amounts per category plus the inflow and outflow totals.
#[derive(Debug, Default)]
struct CashFlows {
    by_category: BTreeMap<String, f64>,
    inflow: f64,
    outflow: f64,
}

impl CashFlows {
    fn get(&self, label: &str) -> f64 {
        self.by_category.get(label).copied().unwrap_or(0.0)
    }

    fn mortgage_principal(&self) -> f64 {
        self.by_category
            .get(MORTGAGE_PRINCIPAL_CATEGORY)
            .or_else(|| self.by_category.get(MORTGAGE_PRINCIPAL_LEGACY))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Sums cash per (cash categorization, cash type), then classifies each group.
/// Inflows land positive and outflows negative. A "Both" Mortgage Principal
/// group is an inflow (Mortgage Loan) when its net is positive, else an outflow.
fn classify_cash<'r>(rows: impl Iterator<Item = &'r AggregateRecord>) -> CashFlows {
    let mut groups: BTreeMap<(String, Option<CashType>), f64> = BTreeMap::new();
    for row in rows {
        *groups
            .entry((category(&row.cash_categorization).to_string(), row.cash_type))
            .or_insert(0.0) += row.cash_value;
    }

    let mut flows = CashFlows::default();
    for ((mut label, cash_type), total) in groups {
        let net = -total;
        let amount = net.abs();

        let signed = match cash_type {
            Some(CashType::Both) if label == MORTGAGE_PRINCIPAL_CATEGORY => {
                if net > 0.0 {
                    label = MORTGAGE_LOAN_CATEGORY.to_string();
                    flows.inflow += amount;
                    amount
                } else if net < 0.0 {
                    flows.outflow -= amount;
                    -amount
                } else {
                    0.0
                }
            }
            Some(CashType::Inflow) => {
                flows.inflow += amount;
                amount
            }
            Some(CashType::Outflow) => {
                flows.outflow -= amount;
                -amount
            }
            _ => 0.0,
        };

        if !label.is_empty() {
            *flows.by_category.entry(label).or_insert(0.0) += signed;
        }
    }
    flows
}

pub struct AggregateQuery<'a> {
    rows: &'a [AggregateRecord],
}

impl<'a> AggregateQuery<'a> {
    pub fn new(rows: &'a [AggregateRecord]) -> Self {
        Self { rows }
    }

    fn scoped<'s>(&'s self, scope: &'s QueryScope) -> impl Iterator<Item = &'a AggregateRecord> + 's {
        self.rows.iter().filter(move |r| scope.matches(r))
    }

    /// Distinct (investor, owner, property) triples with data in the window.
    pub fn investor_owner_property_triplets(&self) -> Vec<(String, String, String)> {
        let mut seen = BTreeSet::new();
        for row in self.rows.iter().filter(|r| r.timeframe.is_in_window()) {
            let investor = category(&row.investor);
            let owner = category(&row.owner);
            let property = category(&row.property);
            if investor.is_empty() || owner.is_empty() || property.is_empty() {
                continue;
            }
            seen.insert((investor.to_string(), owner.to_string(), property.to_string()));
        }
        seen.into_iter().collect()
    }

    /// For each window token, the latest month carrying it.
    pub fn month_starts(&self, scope: &QueryScope) -> BTreeMap<Timeframe, NaiveDate> {
        let mut latest: BTreeMap<Timeframe, NaiveDate> = BTreeMap::new();
        for row in self.scoped(scope) {
            if let Some(month) = row.month {
                let slot = latest.entry(row.timeframe).or_insert(month);
                if month > *slot {
                    *slot = month;
                }
            }
        }
        latest
    }

    /// Window tokens resolved to "Mon YYYY" labels.
    pub fn month_labels(&self, scope: &QueryScope) -> BTreeMap<Timeframe, String> {
        self.month_starts(scope)
            .into_iter()
            .map(|(tf, month)| (tf, format_month_label(month)))
            .collect()
    }

    pub fn performance_totals(&self, scope: &QueryScope) -> PerformanceTotals {
        let mut by_category: BTreeMap<&str, f64> = BTreeMap::new();
        for row in self.scoped(scope) {
            *by_category.entry(category(&row.categorization)).or_insert(0.0) += displayed_value(row);
        }
        let get = |label: &str| by_category.get(label).copied().unwrap_or(0.0);

        let rent = get("Rent");
        let dividend = get("Dividend");
        let hoa_mgt_fee = get("HOA & Mgt. Fee");
        let repairs_other = get("Repairs & Other Exp.");
        let mortgage_interest = get("Mortgage Interest");

        let total_revenue = rent + dividend;
        let total_expenses = hoa_mgt_fee + repairs_other + mortgage_interest;
        let monthly = total_revenue + total_expenses;

        PerformanceTotals {
            rent,
            dividend,
            total_revenue,
            hoa_mgt_fee,
            repairs_other,
            mortgage_interest,
            total_expenses,
            monthly,
            cumulative: monthly,
        }
    }

    pub fn cash_totals(&self, scope: &QueryScope) -> CashTotals {
        let flows = classify_cash(self.scoped(scope));
        let monthly = flows.inflow + flows.outflow;

        CashTotals {
            owner_contribution: flows.get("Owner Contribution"),
            mortgage_loan: flows.get(MORTGAGE_LOAN_CATEGORY),
            rent_dividend: flows.get("Rent & Dividend"),
            total_inflow: flows.inflow,
            hoa_mgt_fee: flows.get("HOA & Mgt. Fee"),
            repairs_other: flows.get("Repairs & Other Exp."),
            mortgage_interest: flows.get("Mortgage Interest"),
            mortgage_principal: flows.mortgage_principal(),
            mortgage_payment: flows.get(MORTGAGE_PAYMENT_CATEGORY),
            apartment_improve: flows.get("Apartment & Improve."),
            owner_distribution: flows.get("Owner Distribution"),
            total_outflow: flows.outflow,
            monthly,
            cumulative: monthly,
        }
    }

    /// Month-by-month performance, oldest token first, with a running cumulative.
    pub fn monthly_performance_rows(&self, scope: &QueryScope) -> Vec<MonthlyPerformanceRow> {
        let labels = self.month_labels(scope);
        let mut by_token: BTreeMap<(Timeframe, &str), f64> = BTreeMap::new();
        for row in self.scoped(scope) {
            *by_token
                .entry((row.timeframe, category(&row.categorization)))
                .or_insert(0.0) += displayed_value(row);
        }

        let mut running = 0.0;
        let mut out = Vec::new();
        for tf in Timeframe::window().rev() {
            let Some(label) = labels.get(&tf) else {
                continue;
            };
            let get = |cat: &'static str| by_token.get(&(tf, cat)).copied().unwrap_or(0.0);

            let rent = get("Rent");
            let other_revenue = get("Other Revenue");
            let mortgage = get("Mortgage");
            let hoa = get("HOA");
            let mgt_fee = get("Mgt. Fee");
            let repairs = get("Repairs Exp.");
            let other_expense = get("Other Expense");

            let total_revenue = rent + other_revenue;
            let total_expenses = mortgage + hoa + mgt_fee + repairs + other_expense;
            let monthly = total_revenue + total_expenses;
            running += monthly;

            out.push(MonthlyPerformanceRow {
                timeframe: tf,
                month_label: label.clone(),
                figures: MonthlyPerformanceFigures {
                    rent,
                    other_revenue,
                    total_revenue,
                    mortgage,
                    hoa,
                    mgt_fee,
                    repairs,
                    other_expense,
                    total_expenses,
                    monthly,
                    cumulative: running,
                },
            });
        }
        out
    }

    /// Month-by-month cash, oldest token first, with a running cumulative.
    pub fn monthly_cash_rows(&self, scope: &QueryScope) -> Vec<MonthlyCashRow> {
        let labels = self.month_labels(scope);

        let mut running = 0.0;
        let mut out = Vec::new();
        for tf in Timeframe::window().rev() {
            let Some(label) = labels.get(&tf) else {
                continue;
            };
            let flows = classify_cash(self.scoped(scope).filter(|r| r.timeframe == tf));
            let monthly = flows.inflow + flows.outflow;
            running += monthly;

            out.push(MonthlyCashRow {
                timeframe: tf,
                month_label: label.clone(),
                figures: MonthlyCashFigures {
                    owner_contribution: flows.get("Owner Contribution"),
                    mortgage_loan: flows.get(MORTGAGE_LOAN_CATEGORY),
                    rent_dividend: flows.get("Rent & Dividend"),
                    total_inflow: flows.inflow,
                    apartment_improve: flows.get("Apartment & Improve."),
                    mortgage_payment: flows.get(MORTGAGE_PAYMENT_CATEGORY),
                    hoa: flows.get("HOA"),
                    mgt_fee: flows.get("Mgt. Fee"),
                    repairs_other: flows.get("Repairs & Other Expense"),
                    owner_distribution: flows.get("Owner Distribution"),
                    total_outflow: flows.outflow,
                    monthly,
                    cumulative: running,
                },
            });
        }
        out
    }

    pub fn available_cash(&self, scope: &QueryScope) -> AvailableCash {
        let mut reserve_balance = 0.0;
        let mut investor_balance = 0.0;
        for row in self.scoped(scope) {
            match category(&row.cash_categorization) {
                RESERVE_CASH_ACCOUNT => reserve_balance += row.cash_value,
                INVESTOR_CASH_ACCOUNT => investor_balance += row.cash_value,
                _ => {}
            }
        }
        AvailableCash {
            reserve_balance,
            investor_balance,
            current_available: reserve_balance + investor_balance,
        }
    }

    pub fn portfolio_income(&self, scope: &QueryScope) -> PortfolioIncome {
        let mut invested = 0.0;
        let mut mortgage_balance = 0.0;
        let mut cumulative_income = 0.0;
        for row in self.scoped(scope) {
            match category(&row.categorization) {
                TOTAL_INVESTED_CATEGORY => invested += row.value,
                MORTGAGE_BALANCE_CATEGORY => mortgage_balance += row.value,
                _ => {}
            }
            if row.mapping_type.is_some_and(|t| t.flips_sign()) {
                cumulative_income -= row.value;
            }
        }
        PortfolioIncome {
            total_invested: invested.abs(),
            mortgage_balance: mortgage_balance.abs(),
            cumulative_income,
        }
    }

    /// Whole months each property has been held as of `statement_thru_date`.
    pub fn holding_months(&self, scope: &QueryScope, statement_thru_date: NaiveDate) -> BTreeMap<String, i32> {
        let mut acquired: BTreeMap<String, NaiveDate> = BTreeMap::new();
        for row in self.scoped(scope) {
            let (Some(property), Some(date)) = (row.property.as_ref(), row.acquired) else {
                continue;
            };
            let slot = acquired.entry(property.clone()).or_insert(date);
            if date < *slot {
                *slot = date;
            }
        }
        acquired
            .into_iter()
            .map(|(property, date)| (property, whole_months_between(date, statement_thru_date)))
            .collect()
    }
}
