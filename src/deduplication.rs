// 🔍 Dedup & Persistence Writer - at most one position per key
//
// Two keys:
//   equity:     (fund, company, report_date)
//   derivative: (fund, company, report_date, kind)
//
// Every insert is check-then-insert inside the caller's per-file
// transaction, with the table's UNIQUE constraint as the final word.

use crate::db::{format_date, DerivativeKind, DerivativePosition, Holding};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// KEYS & OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldingKey {
    pub fund_id: i64,
    pub company_id: i64,
    pub report_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivativeKey {
    pub fund_id: i64,
    pub company_id: i64,
    pub report_date: NaiveDate,
    pub kind: DerivativeKind,
}

impl Holding {
    pub fn key(&self) -> HoldingKey {
        HoldingKey {
            fund_id: self.fund_id,
            company_id: self.company_id,
            report_date: self.report_date,
        }
    }
}

impl DerivativePosition {
    pub fn key(&self) -> DerivativeKey {
        DerivativeKey {
            fund_id: self.fund_id,
            company_id: self.company_id,
            report_date: self.report_date,
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// Key already stored (or already emitted this pass); nothing written
    Duplicate,
}

// ============================================================================
// EXISTENCE CHECKS
// ============================================================================

pub fn holding_exists(conn: &Connection, key: &HoldingKey) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM holdings
             WHERE fund_id = ?1 AND company_id = ?2 AND report_date = ?3",
            params![key.fund_id, key.company_id, format_date(key.report_date)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn derivative_exists(conn: &Connection, key: &DerivativeKey) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM derivatives
             WHERE fund_id = ?1 AND company_id = ?2 AND report_date = ?3 AND derivative_type = ?4",
            params![
                key.fund_id,
                key.company_id,
                format_date(key.report_date),
                key.kind.as_str()
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// A UNIQUE violation means a concurrent writer got there first
fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// POSITION WRITER
// ============================================================================

/// Dedup-guarded inserts for one pass.
///
/// `check_store` consults already-stored rows before inserting; the
/// reconciliation pass turns it off because it just emptied the table.
/// Keys emitted during the pass are always tracked, so the same key is
/// never written twice within one pass either way.
#[derive(Debug)]
pub struct PositionWriter {
    check_store: bool,
    seen_holdings: HashSet<HoldingKey>,
    seen_derivatives: HashSet<DerivativeKey>,
}

impl PositionWriter {
    /// Writer for incremental ingestion against a populated store
    pub fn new() -> Self {
        PositionWriter {
            check_store: true,
            seen_holdings: HashSet::new(),
            seen_derivatives: HashSet::new(),
        }
    }

    /// Writer for a from-scratch rebuild; only in-pass duplicates are checked
    pub fn for_rebuild() -> Self {
        PositionWriter {
            check_store: false,
            ..Self::new()
        }
    }

    pub fn write_holding(&mut self, conn: &Connection, holding: &Holding) -> Result<WriteOutcome> {
        let key = holding.key();
        if self.seen_holdings.contains(&key) {
            return Ok(WriteOutcome::Duplicate);
        }
        if self.check_store && holding_exists(conn, &key)? {
            self.seen_holdings.insert(key);
            return Ok(WriteOutcome::Duplicate);
        }

        let result = conn.execute(
            "INSERT INTO holdings (fund_id, company_id, report_date, shares, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                holding.fund_id,
                holding.company_id,
                format_date(holding.report_date),
                holding.shares,
                holding.value,
            ],
        );

        match result {
            Ok(_) => {
                self.seen_holdings.insert(key);
                Ok(WriteOutcome::Inserted)
            }
            Err(e) if is_constraint_violation(&e) => {
                self.seen_holdings.insert(key);
                Ok(WriteOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_derivative(
        &mut self,
        conn: &Connection,
        position: &DerivativePosition,
    ) -> Result<WriteOutcome> {
        let key = position.key();
        if self.seen_derivatives.contains(&key) {
            return Ok(WriteOutcome::Duplicate);
        }
        if self.check_store && derivative_exists(conn, &key)? {
            self.seen_derivatives.insert(key);
            return Ok(WriteOutcome::Duplicate);
        }

        let result = conn.execute(
            "INSERT INTO derivatives (fund_id, company_id, report_date, derivative_type, shares_underlying, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                position.fund_id,
                position.company_id,
                format_date(position.report_date),
                position.kind.as_str(),
                position.shares_underlying,
                position.value,
            ],
        );

        match result {
            Ok(_) => {
                self.seen_derivatives.insert(key);
                Ok(WriteOutcome::Inserted)
            }
            Err(e) if is_constraint_violation(&e) => {
                self.seen_derivatives.insert(key);
                Ok(WriteOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop keys recorded by a file whose transaction rolled back
    pub fn forget(&mut self, holdings: &[HoldingKey], derivatives: &[DerivativeKey]) {
        for key in holdings {
            self.seen_holdings.remove(key);
        }
        for key in derivatives {
            self.seen_derivatives.remove(key);
        }
    }
}

impl Default for PositionWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete every derivative position; returns the number removed
pub fn clear_derivatives(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM derivatives", [])?)
}

// ============================================================================
// TESTS
// ============================================================================
