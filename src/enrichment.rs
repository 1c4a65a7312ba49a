use crate::error::{Result, StatementPrepError};
use crate::quality::{DataQualityIssue, DataQualityReport};
use crate::schema::{CategoryMapping, LedgerRecord, OwnershipEntry};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};

/// Joins ownership and GL mapping onto ledger records.
///
/// Both joins are first-match-wins lookups. A record with no match keeps its
/// enrichment fields empty, and only strict mode turns that into an error.
pub struct Enricher<'a> {
    ownership: HashMap<&'a str, &'a OwnershipEntry>,
    mapping: HashMap<&'a str, &'a CategoryMapping>,
    strict: bool,
}

impl<'a> Enricher<'a> {
    pub fn new(ownership: &'a [OwnershipEntry], mapping: &'a [CategoryMapping]) -> Self {
        let mut by_property = HashMap::new();
        for entry in ownership {
            by_property.entry(entry.property_name.as_str()).or_insert(entry);
        }

        let mut by_account = HashMap::new();
        for m in mapping {
            by_account.entry(m.gl_account.as_str()).or_insert(m);
        }

        Self {
            ownership: by_property,
            mapping: by_account,
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn enrich(&self, records: &mut [LedgerRecord], report: &mut DataQualityReport) -> Result<()> {
        info!("Enriching {} ledger rows", records.len());

        let mut unmatched_properties: BTreeMap<String, usize> = BTreeMap::new();
        let mut unmatched_accounts: BTreeMap<String, usize> = BTreeMap::new();

        for record in records.iter_mut() {
            match self.ownership.get(record.property_name.as_str()) {
                Some(entry) => {
                    record.investor = Some(entry.investor.clone());
                    record.owner = Some(entry.owner.clone());
                    record.acquired = entry.acquired;
                    record.investor_type = entry.investor_type.clone();
                }
                None => {
                    *unmatched_properties
                        .entry(record.property_name.clone())
                        .or_insert(0) += 1;
                }
            }

            match self.mapping.get(record.gl_account.as_str()) {
                Some(m) => {
                    record.categorization = m.categorization.clone();
                    record.mapping_type = m.mapping_type;
                    record.cash_categorization = m.cash_categorization.clone();
                    record.cash_type = m.cash_type;
                }
                None => {
                    *unmatched_accounts
                        .entry(record.gl_account.clone())
                        .or_insert(0) += 1;
                }
            }
        }

        debug!(
            "{} unmatched property names, {} unmatched GL accounts",
            unmatched_properties.len(),
            unmatched_accounts.len()
        );

        if self.strict && (!unmatched_properties.is_empty() || !unmatched_accounts.is_empty()) {
            return Err(StatementPrepError::UnmatchedJoinKeys {
                properties: unmatched_properties.into_keys().collect(),
                gl_accounts: unmatched_accounts.into_keys().collect(),
            });
        }

        for (property_name, rows) in unmatched_properties {
            report.record(DataQualityIssue::UnmatchedProperty {
                property_name,
                rows,
            });
        }
        for (gl_account, rows) in unmatched_accounts {
            report.record(DataQualityIssue::UnmatchedGlAccount { gl_account, rows });
        }

        Ok(())
    }
}
