use crate::schema::*;
use crate::utils::{first_of_month, months_between};
use chrono::NaiveDate;
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

pub struct Aggregator {
    cutoff_month: NaiveDate,
    property_codes: HashMap<String, String>,
}

// (month, investor, owner, property name, categorization, mapping type)
type GroupKey = (
    Option<NaiveDate>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<PerformanceType>,
);

// Running sums for one aggregation group
#[derive(Default)]
struct GroupTotals {
    debit: f64,
    credit: f64,
    acquired: Option<NaiveDate>,
    cash_type: Option<CashType>,
}

impl GroupTotals {
    fn add(&mut self, record: &LedgerRecord) {
        self.debit += record.debit;
        self.credit += record.credit;
        self.acquired = match (self.acquired, record.acquired) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if self.cash_type.is_none() {
            self.cash_type = record.cash_type;
        }
    }
}

impl Aggregator {
    pub fn new(ownership: &[OwnershipEntry], statement_thru_date: NaiveDate) -> Self {
        let mut property_codes = HashMap::new();
        for entry in ownership {
            property_codes
                .entry(entry.property_name.clone())
                .or_insert_with(|| entry.property.clone());
        }

        Self {
            cutoff_month: first_of_month(statement_thru_date),
            property_codes,
        }
    }

    pub fn cutoff_month(&self) -> NaiveDate {
        self.cutoff_month
    }

    pub fn timeframe_for(&self, month: Option<NaiveDate>) -> Timeframe {
        match month {
            Some(m) => Timeframe::from_months_before_cutoff(months_between(m, self.cutoff_month)),
            None => Timeframe::NotApplicable,
        }
    }

    /// Collapses enriched ledger rows into the aggregate store.
    ///
    /// Rows tagged with the "Mortgage" cash categorization are split into a
    /// payment leg (debits, outflow) and a loan leg (credits, inflow), so each
    /// mortgage group yields two aggregate rows.
    pub fn build(&self, records: &[LedgerRecord]) -> Vec<AggregateRecord> {
        info!(
            "Aggregating {} ledger rows against cutoff {}",
            records.len(),
            self.cutoff_month
        );

        let mut regular: BTreeMap<(GroupKey, Option<String>), GroupTotals> = BTreeMap::new();
        let mut mortgage: BTreeMap<GroupKey, GroupTotals> = BTreeMap::new();

        for record in records {
            let key = (
                record.month,
                record.investor.clone(),
                record.owner.clone(),
                record.property_name.clone(),
                record.categorization.clone(),
                record.mapping_type,
            );
            if record.is_mortgage() {
                mortgage.entry(key).or_default().add(record);
            } else {
                regular
                    .entry((key, record.cash_categorization.clone()))
                    .or_default()
                    .add(record);
            }
        }

        debug!(
            "{} regular groups, {} mortgage groups",
            regular.len(),
            mortgage.len()
        );

        let mut rows = Vec::with_capacity(regular.len() + mortgage.len() * 2);

        for ((key, cash_categorization), totals) in regular {
            let value = totals.debit - totals.credit;
            rows.push(self.row(
                &key,
                &totals,
                value,
                cash_categorization,
                value,
                totals.cash_type,
            ));
        }

        for (key, totals) in mortgage {
            rows.push(self.row(
                &key,
                &totals,
                totals.debit,
                Some(MORTGAGE_PAYMENT_CATEGORY.to_string()),
                totals.debit,
                Some(CashType::Outflow),
            ));
            rows.push(self.row(
                &key,
                &totals,
                0.0 - totals.credit,
                Some(MORTGAGE_LOAN_CATEGORY.to_string()),
                totals.credit,
                Some(CashType::Inflow),
            ));
        }

        rows.sort_by(compare_rows);
        rows
    }

    fn row(
        &self,
        key: &GroupKey,
        totals: &GroupTotals,
        value: f64,
        cash_categorization: Option<String>,
        cash_value: f64,
        cash_type: Option<CashType>,
    ) -> AggregateRecord {
        let (month, investor, owner, property_name, categorization, mapping_type) = key;
        AggregateRecord {
            month: *month,
            investor: investor.clone(),
            owner: owner.clone(),
            property_name: property_name.clone(),
            property: self.property_codes.get(property_name).cloned(),
            acquired: totals.acquired,
            categorization: categorization.clone(),
            mapping_type: *mapping_type,
            value,
            cash_categorization,
            cash_value,
            cash_type,
            timeframe: self.timeframe_for(*month),
        }
    }
}

fn compare_rows(a: &AggregateRecord, b: &AggregateRecord) -> Ordering {
    a.month
        .cmp(&b.month)
        .then_with(|| a.investor.cmp(&b.investor))
        .then_with(|| a.owner.cmp(&b.owner))
        .then_with(|| a.property_name.cmp(&b.property_name))
        .then_with(|| a.categorization.cmp(&b.categorization))
        .then_with(|| a.cash_categorization.cmp(&b.cash_categorization))
        .then_with(|| a.mapping_type.cmp(&b.mapping_type))
}

pub fn aggregate(
    records: &[LedgerRecord],
    ownership: &[OwnershipEntry],
    statement_thru_date: NaiveDate,
) -> Vec<AggregateRecord> {
    Aggregator::new(ownership, statement_thru_date).build(records)
}
