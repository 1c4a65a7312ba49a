//! Backing stores for the ledger and aggregate tables.
//!
//! Both tables are rebuilt wholesale on every write. Nothing is merged or
//! updated in place, so two runs over the same inputs leave identical tables.

use crate::error::Result;
use crate::schema::{AggregateRecord, LedgerRecord, Timeframe};
use chrono::NaiveDate;
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;

pub trait StatementStore {
    /// Drops any previous ledger rows and stores `records`.
    fn replace_ledger(&mut self, records: &[LedgerRecord]) -> Result<()>;
    fn ledger(&self) -> Result<Vec<LedgerRecord>>;
    /// Drops any previous aggregate rows and stores `rows`.
    fn replace_aggregates(&mut self, rows: &[AggregateRecord]) -> Result<()>;
    fn aggregates(&self) -> Result<Vec<AggregateRecord>>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    ledger: Vec<LedgerRecord>,
    aggregates: Vec<AggregateRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatementStore for MemoryStore {
    fn replace_ledger(&mut self, records: &[LedgerRecord]) -> Result<()> {
        self.ledger = records.to_vec();
        Ok(())
    }

    fn ledger(&self) -> Result<Vec<LedgerRecord>> {
        Ok(self.ledger.clone())
    }

    fn replace_aggregates(&mut self, rows: &[AggregateRecord]) -> Result<()> {
        self.aggregates = rows.to_vec();
        Ok(())
    }

    fn aggregates(&self) -> Result<Vec<AggregateRecord>> {
        Ok(self.aggregates.clone())
    }
}

const GL_RAW_SCHEMA: &str = r#"
DROP TABLE IF EXISTS gl_raw;
CREATE TABLE gl_raw (
    month TEXT,
    txn_date TEXT,
    gl_account TEXT NOT NULL,
    gl_type TEXT NOT NULL,
    property_name TEXT NOT NULL,
    street_address_1 TEXT NOT NULL,
    street_address_2 TEXT NOT NULL,
    debit REAL NOT NULL,
    credit REAL NOT NULL,
    balance REAL NOT NULL,
    investor TEXT,
    owner TEXT,
    acquired TEXT,
    investor_type TEXT,
    categorization TEXT,
    mapping_type TEXT,
    cash_categorization TEXT,
    cash_type TEXT
);
"#;

const GL_AGG_SCHEMA: &str = r#"
DROP TABLE IF EXISTS gl_agg;
CREATE TABLE gl_agg (
    month TEXT,
    investor TEXT,
    owner TEXT,
    property_name TEXT NOT NULL,
    property TEXT,
    acquired TEXT,
    categorization TEXT,
    mapping_type TEXT,
    value REAL NOT NULL,
    cash_categorization TEXT,
    cash_value REAL NOT NULL,
    cash_type TEXT,
    timeframe TEXT NOT NULL
);
"#;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        NaiveDate::parse_from_str(&t, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn label_col<T: std::str::FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    Ok(text.and_then(|t| t.parse().ok()))
}

impl StatementStore for SqliteStore {
    fn replace_ledger(&mut self, records: &[LedgerRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(GL_RAW_SCHEMA)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO gl_raw VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            )?;
            for r in records {
                stmt.execute(params![
                    date_text(r.month),
                    date_text(r.txn_date),
                    r.gl_account,
                    r.gl_type,
                    r.property_name,
                    r.street_address_1,
                    r.street_address_2,
                    r.debit,
                    r.credit,
                    r.balance,
                    r.investor,
                    r.owner,
                    date_text(r.acquired),
                    r.investor_type,
                    r.categorization,
                    r.mapping_type.map(|t| t.to_string()),
                    r.cash_categorization,
                    r.cash_type.map(|t| t.to_string()),
                ])?;
            }
        }
        tx.commit()?;
        debug!("Replaced gl_raw with {} rows", records.len());
        Ok(())
    }

    fn ledger(&self) -> Result<Vec<LedgerRecord>> {
        if !self.table_exists("gl_raw")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare("SELECT * FROM gl_raw ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(LedgerRecord {
                month: date_col(row, 0)?,
                txn_date: date_col(row, 1)?,
                gl_account: row.get(2)?,
                gl_type: row.get(3)?,
                property_name: row.get(4)?,
                street_address_1: row.get(5)?,
                street_address_2: row.get(6)?,
                debit: row.get(7)?,
                credit: row.get(8)?,
                balance: row.get(9)?,
                investor: row.get(10)?,
                owner: row.get(11)?,
                acquired: date_col(row, 12)?,
                investor_type: row.get(13)?,
                categorization: row.get(14)?,
                mapping_type: label_col(row, 15)?,
                cash_categorization: row.get(16)?,
                cash_type: label_col(row, 17)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn replace_aggregates(&mut self, rows: &[AggregateRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(GL_AGG_SCHEMA)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO gl_agg VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for r in rows {
                stmt.execute(params![
                    date_text(r.month),
                    r.investor,
                    r.owner,
                    r.property_name,
                    r.property,
                    date_text(r.acquired),
                    r.categorization,
                    r.mapping_type.map(|t| t.to_string()),
                    r.value,
                    r.cash_categorization,
                    r.cash_value,
                    r.cash_type.map(|t| t.to_string()),
                    r.timeframe.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        debug!("Replaced gl_agg with {} rows", rows.len());
        Ok(())
    }

    fn aggregates(&self) -> Result<Vec<AggregateRecord>> {
        if !self.table_exists("gl_agg")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare("SELECT * FROM gl_agg ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            let timeframe: String = row.get(12)?;
            let timeframe = timeframe.parse::<Timeframe>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(12, Type::Text, e.into())
            })?;
            Ok(AggregateRecord {
                month: date_col(row, 0)?,
                investor: row.get(1)?,
                owner: row.get(2)?,
                property_name: row.get(3)?,
                property: row.get(4)?,
                acquired: date_col(row, 5)?,
                categorization: row.get(6)?,
                mapping_type: label_col(row, 7)?,
                value: row.get(8)?,
                cash_categorization: row.get(9)?,
                cash_value: row.get(10)?,
                cash_type: label_col(row, 11)?,
                timeframe,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
