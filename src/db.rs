use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Date format used for every report_date column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// POSITION RECORDS
// ============================================================================

/// Direct equity position, unique per (fund, company, report_date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub fund_id: i64,
    pub company_id: i64,
    pub report_date: NaiveDate,
    pub shares: f64,
    /// Reported value in USD (already scaled from thousands)
    pub value: f64,
}

/// PUT or CALL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivativeKind {
    Put,
    Call,
}

impl DerivativeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivativeKind::Put => "PUT",
            DerivativeKind::Call => "CALL",
        }
    }

    /// Trim + uppercase, then exact match; anything else is not a derivative
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PUT" => Some(DerivativeKind::Put),
            "CALL" => Some(DerivativeKind::Call),
            _ => None,
        }
    }
}

/// Option exposure, unique per (fund, company, report_date, kind)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativePosition {
    pub fund_id: i64,
    pub company_id: i64,
    pub report_date: NaiveDate,
    pub kind: DerivativeKind,
    pub shares_underlying: f64,
    /// Notional value in USD
    pub value: f64,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL keeps committed files intact if a pass dies mid-file
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS funds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cik TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            strategy TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            ticker TEXT,
            cusip TEXT UNIQUE NOT NULL,
            cik TEXT,
            sector TEXT,
            industry TEXT,
            country TEXT,
            description TEXT,
            is_sp500 INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS holdings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fund_id INTEGER NOT NULL REFERENCES funds(id),
            company_id INTEGER NOT NULL REFERENCES companies(id),
            report_date TEXT NOT NULL,
            shares REAL NOT NULL,
            value REAL NOT NULL,
            UNIQUE (fund_id, company_id, report_date)
        );

        CREATE TABLE IF NOT EXISTS derivatives (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fund_id INTEGER NOT NULL REFERENCES funds(id),
            company_id INTEGER NOT NULL REFERENCES companies(id),
            report_date TEXT NOT NULL,
            derivative_type TEXT NOT NULL CHECK (derivative_type IN ('PUT', 'CALL')),
            shares_underlying REAL NOT NULL,
            value REAL NOT NULL,
            UNIQUE (fund_id, company_id, report_date, derivative_type)
        );

        CREATE TABLE IF NOT EXISTS filing_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            outcome TEXT NOT NULL,
            path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            data TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_holdings_company ON holdings(company_id);
        CREATE INDEX IF NOT EXISTS idx_derivatives_company ON derivatives(company_id);
        CREATE INDEX IF NOT EXISTS idx_companies_ticker ON companies(ticker);
        CREATE INDEX IF NOT EXISTS idx_filing_events_path ON filing_events(path);",
    )?;

    Ok(())
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date_column(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ============================================================================
// POSITION QUERIES
// ============================================================================

pub fn get_holdings(conn: &Connection) -> Result<Vec<Holding>> {
    let mut stmt = conn.prepare(
        "SELECT fund_id, company_id, report_date, shares, value
         FROM holdings
         ORDER BY fund_id, company_id, report_date",
    )?;

    let holdings = stmt
        .query_map([], |row| {
            let date: String = row.get(2)?;
            Ok(Holding {
                fund_id: row.get(0)?,
                company_id: row.get(1)?,
                report_date: parse_date_column(2, &date)?,
                shares: row.get(3)?,
                value: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(holdings)
}

pub fn get_derivatives(conn: &Connection) -> Result<Vec<DerivativePosition>> {
    let mut stmt = conn.prepare(
        "SELECT fund_id, company_id, report_date, derivative_type, shares_underlying, value
         FROM derivatives
         ORDER BY fund_id, company_id, report_date, derivative_type",
    )?;

    let derivatives = stmt
        .query_map([], |row| {
            let date: String = row.get(2)?;
            let kind: String = row.get(3)?;
            let kind = DerivativeKind::parse(&kind).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("unknown derivative type {kind:?}").into(),
                )
            })?;
            Ok(DerivativePosition {
                fund_id: row.get(0)?,
                company_id: row.get(1)?,
                report_date: parse_date_column(2, &date)?,
                kind,
                shares_underlying: row.get(4)?,
                value: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(derivatives)
}

// ============================================================================
// STORE STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub funds: i64,
    pub companies: i64,
    pub companies_with_ticker: i64,
    pub index_members: i64,
    pub holdings: i64,
    pub derivatives: i64,
    pub filing_events: i64,
}

pub fn store_stats(conn: &Connection) -> Result<StoreStats> {
    let count = |sql: &str| -> Result<i64> {
        conn.query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("Failed to run {sql}"))
    };

    Ok(StoreStats {
        funds: count("SELECT COUNT(*) FROM funds")?,
        companies: count("SELECT COUNT(*) FROM companies")?,
        companies_with_ticker: count(
            "SELECT COUNT(*) FROM companies WHERE ticker IS NOT NULL AND ticker != ''",
        )?,
        index_members: count("SELECT COUNT(*) FROM companies WHERE is_sp500 = 1")?,
        holdings: count("SELECT COUNT(*) FROM holdings")?,
        derivatives: count("SELECT COUNT(*) FROM derivatives")?,
        filing_events: count("SELECT COUNT(*) FROM filing_events")?,
    })
}

// ============================================================================
// FILING AUDIT LOG
// ============================================================================

/// What happened to one filing file during a pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    /// "ingested", "skipped" or "reconciled"
    pub outcome: String,
    pub path: String,
    /// SHA-256 of the raw file bytes (empty when unreadable)
    pub content_hash: String,
    pub data: serde_json::Value,
}

impl FilingEvent {
    pub fn new(outcome: &str, path: &str, content_hash: &str, data: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            outcome: outcome.to_string(),
            path: path.to_string(),
            content_hash: content_hash.to_string(),
            data,
        }
    }
}

pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn insert_filing_event(conn: &Connection, event: &FilingEvent) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO filing_events (event_id, timestamp, outcome, path, content_hash, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.outcome,
            event.path,
            event.content_hash,
            data_json,
        ],
    )?;

    Ok(())
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn filing_event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FilingEvent> {
    let timestamp: String = row.get(1)?;
    let data: String = row.get(5)?;

    Ok(FilingEvent {
        event_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| conversion_error(1, e))?
            .with_timezone(&Utc),
        outcome: row.get(2)?,
        path: row.get(3)?,
        content_hash: row.get(4)?,
        data: serde_json::from_str(&data).map_err(|e| conversion_error(5, e))?,
    })
}

/// Most recent event for a path, if the file was ever seen
pub fn latest_filing_event(conn: &Connection, path: &str) -> Result<Option<FilingEvent>> {
    let event = conn
        .query_row(
            "SELECT event_id, timestamp, outcome, path, content_hash, data
             FROM filing_events
             WHERE path = ?1
             ORDER BY id DESC
             LIMIT 1",
            params![path],
            filing_event_from_row,
        )
        .optional()?;

    Ok(event)
}

/// Append `event` unless the path's latest event already says the same
/// thing (same outcome, content hash and detail). Returns whether a row
/// was written, so an unchanged filing set leaves the log untouched.
pub fn record_filing_event(conn: &Connection, event: &FilingEvent) -> Result<bool> {
    if let Some(latest) = latest_filing_event(conn, &event.path)? {
        if latest.outcome == event.outcome
            && latest.content_hash == event.content_hash
            && latest.data == event.data
        {
            return Ok(false);
        }
    }

    insert_filing_event(conn, event)?;
    Ok(true)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_database_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let stats = store_stats(&conn).unwrap();
        assert_eq!(stats, StoreStats::default());
    }

    #[test]
    fn test_derivative_kind_parse() {
        assert_eq!(DerivativeKind::parse("put"), Some(DerivativeKind::Put));
        assert_eq!(DerivativeKind::parse(" Call "), Some(DerivativeKind::Call));
        assert_eq!(DerivativeKind::parse("CALL"), Some(DerivativeKind::Call));
        assert_eq!(DerivativeKind::parse("Common Stock"), None);
        assert_eq!(DerivativeKind::parse(""), None);
    }

    #[test]
    fn test_holding_uniqueness_enforced_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn.execute("INSERT INTO funds (cik, name) VALUES ('102909', 'Vanguard')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO companies (name, cusip) VALUES ('APPLE INC', '037833100')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO holdings (fund_id, company_id, report_date, shares, value)
                      VALUES (1, 1, '2024-02-14', 10, 1000)";
        conn.execute(insert, []).unwrap();
        let second = conn.execute(insert, []);

        match second {
            Err(rusqlite::Error::SqliteFailure(err, _)) => {
                assert_eq!(err.code, rusqlite::ErrorCode::ConstraintViolation)
            }
            other => panic!("expected constraint violation, got {other:?}"),
        }
    }

    #[test]
    fn test_filing_event_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let hash = content_hash(b"filing body");
        let event = FilingEvent::new(
            "ingested",
            "102909/q1.txt",
            &hash,
            serde_json::json!({"equity_rows": 3}),
        );
        assert!(record_filing_event(&conn, &event).unwrap());

        let latest = latest_filing_event(&conn, "102909/q1.txt").unwrap().unwrap();
        assert_eq!(latest.event_id, event.event_id);
        assert_eq!(latest.outcome, "ingested");
        assert_eq!(latest.content_hash, hash);
        assert_eq!(latest.data["equity_rows"], 3);
        assert!(latest_filing_event(&conn, "other.txt").unwrap().is_none());
    }

    #[test]
    fn test_repeated_filing_event_is_not_appended() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let hash = content_hash(b"filing body");
        let detail = serde_json::json!({"reason": "unknown_filer"});

        let first = FilingEvent::new("skipped", "777777/q1.txt", &hash, detail.clone());
        let again = FilingEvent::new("skipped", "777777/q1.txt", &hash, detail);
        assert!(record_filing_event(&conn, &first).unwrap());
        assert!(!record_filing_event(&conn, &again).unwrap());
        assert_eq!(store_stats(&conn).unwrap().filing_events, 1);

        // A changed outcome or changed content is new information
        let empty = serde_json::json!({});
        let ingested = FilingEvent::new("ingested", "777777/q1.txt", &hash, empty.clone());
        let edited = FilingEvent::new("ingested", "777777/q1.txt", &content_hash(b"v2"), empty);
        assert!(record_filing_event(&conn, &ingested).unwrap());
        assert!(record_filing_event(&conn, &edited).unwrap());
        assert_eq!(store_stats(&conn).unwrap().filing_events, 3);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"abc").len(), 64);
    }
}
