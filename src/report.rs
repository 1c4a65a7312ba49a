//! Report sections a statement deck is assembled from.
//!
//! Each section kind has one typed evaluator over the aggregate store, and
//! ownership scaling is applied per column with keys of the form
//! `"<section>.<column>"`.

use crate::ownership::OwnershipScaling;
use crate::query::*;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReportSection {
    PerformanceSummary,
    CashSummary,
    MonthlyPerformance,
    MonthlyCash,
    AvailableCash,
    PortfolioIncome,
    HoldingPeriod,
}

impl ReportSection {
    pub const ALL: [ReportSection; 7] = [
        Self::PerformanceSummary,
        Self::CashSummary,
        Self::MonthlyPerformance,
        Self::MonthlyCash,
        Self::AvailableCash,
        Self::PortfolioIncome,
        Self::HoldingPeriod,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::PerformanceSummary => "perf_summary",
            Self::CashSummary => "cash_summary",
            Self::MonthlyPerformance => "monthly_perf_table",
            Self::MonthlyCash => "monthly_cash_table",
            Self::AvailableCash => "available_cash",
            Self::PortfolioIncome => "portfolio_income",
            Self::HoldingPeriod => "holding_period",
        }
    }

    pub fn evaluate(
        &self,
        query: &AggregateQuery<'_>,
        scope: &QueryScope,
        statement_thru_date: NaiveDate,
    ) -> SectionValues {
        match self {
            Self::PerformanceSummary => {
                SectionValues::PerformanceSummary(query.performance_totals(scope))
            }
            Self::CashSummary => SectionValues::CashSummary(query.cash_totals(scope)),
            Self::MonthlyPerformance => {
                SectionValues::MonthlyPerformance(query.monthly_performance_rows(scope))
            }
            Self::MonthlyCash => SectionValues::MonthlyCash(query.monthly_cash_rows(scope)),
            Self::AvailableCash => SectionValues::AvailableCash(query.available_cash(scope)),
            Self::PortfolioIncome => SectionValues::PortfolioIncome(query.portfolio_income(scope)),
            Self::HoldingPeriod => {
                SectionValues::HoldingPeriod(query.holding_months(scope, statement_thru_date))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "section", content = "values", rename_all = "snake_case")]
pub enum SectionValues {
    PerformanceSummary(PerformanceTotals),
    CashSummary(CashTotals),
    MonthlyPerformance(Vec<MonthlyPerformanceRow>),
    MonthlyCash(Vec<MonthlyCashRow>),
    AvailableCash(AvailableCash),
    PortfolioIncome(PortfolioIncome),
    /// Months held per property code. Not a money figure, never scaled.
    HoldingPeriod(BTreeMap<String, i32>),
}

impl SectionValues {
    pub fn section(&self) -> ReportSection {
        match self {
            Self::PerformanceSummary(_) => ReportSection::PerformanceSummary,
            Self::CashSummary(_) => ReportSection::CashSummary,
            Self::MonthlyPerformance(_) => ReportSection::MonthlyPerformance,
            Self::MonthlyCash(_) => ReportSection::MonthlyCash,
            Self::AvailableCash(_) => ReportSection::AvailableCash,
            Self::PortfolioIncome(_) => ReportSection::PortfolioIncome,
            Self::HoldingPeriod(_) => ReportSection::HoldingPeriod,
        }
    }

    pub fn scale(&self, scaling: &OwnershipScaling) -> SectionValues {
        let section = self.section().key();
        let apply = |column: &'static str, amount: f64| {
            scaling.apply(amount, &format!("{}.{}", section, column))
        };

        match self {
            Self::PerformanceSummary(v) => Self::PerformanceSummary(v.map_amounts(&apply)),
            Self::CashSummary(v) => Self::CashSummary(v.map_amounts(&apply)),
            Self::MonthlyPerformance(rows) => Self::MonthlyPerformance(
                rows.iter()
                    .map(|r| MonthlyPerformanceRow {
                        figures: r.figures.map_amounts(&apply),
                        ..r.clone()
                    })
                    .collect(),
            ),
            Self::MonthlyCash(rows) => Self::MonthlyCash(
                rows.iter()
                    .map(|r| MonthlyCashRow {
                        figures: r.figures.map_amounts(&apply),
                        ..r.clone()
                    })
                    .collect(),
            ),
            Self::AvailableCash(v) => Self::AvailableCash(v.map_amounts(&apply)),
            Self::PortfolioIncome(v) => Self::PortfolioIncome(v.map_amounts(&apply)),
            Self::HoldingPeriod(months) => Self::HoldingPeriod(months.clone()),
        }
    }

    /// Flattened (column, amount) pairs, rows labelled by their month.
    pub fn columns(&self) -> Vec<(String, f64)> {
        fn flat(cols: Vec<(&'static str, f64)>) -> Vec<(String, f64)> {
            cols.into_iter().map(|(c, v)| (c.to_string(), v)).collect()
        }

        match self {
            Self::PerformanceSummary(v) => flat(v.columns()),
            Self::CashSummary(v) => flat(v.columns()),
            Self::MonthlyPerformance(rows) => rows
                .iter()
                .flat_map(|r| {
                    r.figures
                        .columns()
                        .into_iter()
                        .map(move |(c, v)| (format!("{} {}", r.month_label, c), v))
                })
                .collect(),
            Self::MonthlyCash(rows) => rows
                .iter()
                .flat_map(|r| {
                    r.figures
                        .columns()
                        .into_iter()
                        .map(move |(c, v)| (format!("{} {}", r.month_label, c), v))
                })
                .collect(),
            Self::AvailableCash(v) => flat(v.columns()),
            Self::PortfolioIncome(v) => flat(v.columns()),
            Self::HoldingPeriod(months) => months
                .iter()
                .map(|(property, m)| (property.clone(), f64::from(*m)))
                .collect(),
        }
    }
}

/// Evaluates every section for one scope and applies the run's scaling.
pub fn build_statement(
    query: &AggregateQuery<'_>,
    scope: &QueryScope,
    statement_thru_date: NaiveDate,
    scaling: &OwnershipScaling,
) -> Vec<SectionValues> {
    ReportSection::ALL
        .iter()
        .map(|section| {
            section
                .evaluate(query, scope, statement_thru_date)
                .scale(scaling)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tests::agg;
    use crate::schema::{CashType, PerformanceType, Timeframe};

    fn rows() -> Vec<crate::schema::AggregateRecord> {
        vec![
            agg((2024, 6), Timeframe::Trailing(1), "Rent", PerformanceType::Revenue, -1000.0, "Rent & Dividend", CashType::Inflow),
            agg((2024, 6), Timeframe::Trailing(1), "Cash", PerformanceType::Other, 800.0, RESERVE_CASH_ACCOUNT, CashType::Other),
        ]
    }

    fn thru() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    #[test]
    fn test_scaling_is_applied_per_column() {
        let rows = rows();
        let query = AggregateQuery::new(&rows);
        let scope = QueryScope::investor("Alice");
        let scaling = OwnershipScaling::new(
            50.0,
            false,
            vec!["perf_summary.Total Revenue".to_string()],
        );

        let scaled = ReportSection::PerformanceSummary
            .evaluate(&query, &scope, thru())
            .scale(&scaling);
        match scaled {
            SectionValues::PerformanceSummary(v) => {
                assert!((v.rent - 500.0).abs() < 0.01);
                assert!((v.total_revenue - 1000.0).abs() < 0.01);
            }
            other => panic!("unexpected section: {:?}", other),
        }
    }

    #[test]
    fn test_statement_covers_every_section() {
        let rows = rows();
        let query = AggregateQuery::new(&rows);
        let scope = QueryScope::investor("Alice");

        let sections = build_statement(&query, &scope, thru(), &OwnershipScaling::new(50.0, false, Vec::new()));
        assert_eq!(sections.len(), ReportSection::ALL.len());

        let cash = sections
            .iter()
            .find(|s| s.section() == ReportSection::AvailableCash)
            .unwrap();
        assert_eq!(
            cash.columns()[0],
            ("Reserve Account Balance".to_string(), 400.0)
        );

        let monthly = sections
            .iter()
            .find(|s| s.section() == ReportSection::MonthlyPerformance)
            .unwrap();
        assert!(monthly
            .columns()
            .contains(&("Jun 2024 Rent".to_string(), 500.0)));

        let held = sections
            .iter()
            .find(|s| s.section() == ReportSection::HoldingPeriod)
            .unwrap();
        assert_eq!(held.columns(), vec![("HB1".to_string(), 27.0)]);
    }
}
