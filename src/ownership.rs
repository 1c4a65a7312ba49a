use crate::config::SetupConfig;
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

/// Scales report figures by an investor's ownership share.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipScaling {
    pct: f64,
    force_100_pct: bool,
    exceptions: BTreeSet<String>,
}

impl OwnershipScaling {
    pub fn new(pct: f64, force_100_pct: bool, exceptions: impl IntoIterator<Item = String>) -> Self {
        Self {
            pct,
            force_100_pct,
            exceptions: exceptions.into_iter().collect(),
        }
    }

    /// Scaling that leaves every figure unchanged.
    pub fn full() -> Self {
        Self::new(100.0, false, Vec::new())
    }

    /// Share used for one run row. When the investor holds several properties
    /// through the owner at different shares, the smallest share wins.
    pub fn for_run(config: &SetupConfig, investor: &str, owner: &str) -> Self {
        let pcts = config.ownership_percentages(investor, owner);
        let pct = if pcts.iter().all(|p| *p >= 100.0) {
            100.0
        } else {
            pcts.iter().copied().fold(f64::INFINITY, f64::min)
        };
        debug!("Ownership for {} / {}: {}%", investor, owner, pct);

        Self::new(
            pct,
            config.general.force_100_pct,
            config.general.ownership_scaling_exceptions.iter().cloned(),
        )
    }

    pub fn pct(&self) -> f64 {
        self.pct
    }

    pub fn factor(&self) -> f64 {
        self.pct / 100.0
    }

    pub fn apply(&self, amount: f64, key: &str) -> f64 {
        if self.force_100_pct || self.pct >= 100.0 {
            return amount;
        }
        let key = key.trim();
        if !key.is_empty() && self.exceptions.contains(key) {
            return amount;
        }
        amount * self.factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::workbook;
    use serde_json::json;

    #[test]
    fn test_half_share_scales_amount() {
        let scaling = OwnershipScaling::new(50.0, false, Vec::new());
        assert!((scaling.apply(1000.0, "perf_summary.Rent") - 500.0).abs() < 0.01);
    }

    #[test]
    fn test_force_100_leaves_amount_unchanged() {
        let scaling = OwnershipScaling::new(50.0, true, Vec::new());
        assert!((scaling.apply(1000.0, "perf_summary.Rent") - 1000.0).abs() < 0.01);
    }

    #[test]
    fn test_exception_keys_are_not_scaled() {
        let scaling = OwnershipScaling::new(25.0, false, vec!["available_cash.Current Available Cash".to_string()]);
        assert_eq!(scaling.apply(400.0, " available_cash.Current Available Cash "), 400.0);
        assert_eq!(scaling.apply(400.0, "available_cash.Reserve Account Balance"), 100.0);
        assert_eq!(OwnershipScaling::full().apply(400.0, ""), 400.0);
    }

    #[test]
    fn test_for_run_uses_configured_share() {
        let config = SetupConfig::from_workbook(&workbook([json!(60), json!(40)])).unwrap();

        let bob = OwnershipScaling::for_run(&config, "Bob", "Harbor LLC");
        assert!((bob.pct() - 40.0).abs() < 1e-9);
        assert!((bob.apply(1000.0, "cash_summary.Monthly") - 400.0).abs() < 0.01);

        let stranger = OwnershipScaling::for_run(&config, "Carol", "Harbor LLC");
        assert_eq!(stranger.pct(), 100.0);
    }
}
