use crate::error::{Result, StatementPrepError};
use chrono::{Datelike, NaiveDate};

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// Calendar months from `start` to `end`, not counting the last month until
/// its day of month has been reached.
pub fn whole_months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let months = months_between(start, end);
    if end.day() < start.day() {
        months - 1
    } else {
        months
    }
}

/// Parses a ledger month label such as "Jun 2024" into the first day of that month.
pub fn parse_month_label(label: &str) -> Option<NaiveDate> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return None;
    }
    // %B also accepts the three-letter abbreviation when parsing
    NaiveDate::parse_from_str(&format!("1 {}", trimmed), "%d %B %Y").ok()
}

pub fn format_month_label(date: NaiveDate) -> String {
    date.format("%b %Y").to_string()
}

/// Parses an "MM/DD/YYYY" transaction date. Two-digit years are rejected.
pub fn parse_us_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let year = trimmed.rsplit('/').next()?;
    if year.len() != 4 {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").ok()
}

/// Parses the date shapes found in the setup workbook: "MM/DD/YYYY",
/// "MM/DD/YY" and ISO dates, optionally followed by a time component.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.contains('/') {
        let year_len = trimmed.rsplit('/').next().map(str::len).unwrap_or(0);
        let format = if year_len == 2 { "%m/%d/%y" } else { "%m/%d/%Y" };
        return NaiveDate::parse_from_str(trimmed, format).ok();
    }

    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn parse_statement_date(value: &str) -> Result<NaiveDate> {
    parse_calendar_date(value)
        .ok_or_else(|| StatementPrepError::InvalidStatementDate(value.trim().to_string()))
}

/// Parses a ledger amount after stripping thousands separators.
/// Empty cells are zero; `None` means the text was not a number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Some(0.0);
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_months_between() {
        let june = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let july_prior = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
        assert_eq!(months_between(july_prior, june), 11);
        assert_eq!(months_between(june, july_prior), -11);
        assert_eq!(months_between(june, june), 0);
    }

    #[test]
    fn test_whole_months_between() {
        let acquired = NaiveDate::from_ymd_opt(2022, 3, 15).unwrap();
        let thru = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        assert_eq!(whole_months_between(acquired, thru), 26);

        let thru = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(whole_months_between(acquired, thru), 27);
    }

    #[test]
    fn test_parse_month_label() {
        assert_eq!(
            parse_month_label("Jun 2024"),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert_eq!(
            parse_month_label("  Dec 2023 "),
            NaiveDate::from_ymd_opt(2023, 12, 1)
        );
        assert_eq!(parse_month_label(""), None);
        assert_eq!(parse_month_label("2024-06"), None);
    }

    #[test]
    fn test_parse_us_date() {
        assert_eq!(
            parse_us_date("06/15/2024"),
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
        assert_eq!(parse_us_date("06/15/24"), None);
        assert_eq!(parse_us_date("13/01/2024"), None);
        assert_eq!(parse_us_date("not a date"), None);
    }

    #[test]
    fn test_parse_statement_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(parse_statement_date("06/30/2024").unwrap(), expected);
        assert_eq!(parse_statement_date("06/30/24").unwrap(), expected);
        assert_eq!(parse_statement_date("2024-06-30").unwrap(), expected);
        assert_eq!(
            parse_statement_date("2024-06-30 00:00:00").unwrap(),
            expected
        );

        let err = parse_statement_date("June thirtieth").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("  -12 "), Some(-12.0));
        assert_eq!(parse_amount(""), Some(0.0));
        assert_eq!(parse_amount("n/a"), None);
    }
}
