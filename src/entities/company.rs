// 🏢 Company Entity - issuers, keyed by security identifier (CUSIP)
//
// Companies are created lazily: the first filing row carrying an unknown
// CUSIP inserts a placeholder with only the issuer name. Tickers and
// classification arrive later from enrichment passes.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// COMPANY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub cusip: String,
    pub ticker: Option<String>,
    /// Issuer's own regulatory ID, zero-padded to 10 digits
    pub cik: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub is_sp500: bool,
}

impl Company {
    pub fn has_ticker(&self) -> bool {
        self.ticker.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

const COMPANY_COLUMNS: &str =
    "id, name, cusip, ticker, cik, sector, industry, country, description, is_sp500";

fn company_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        cusip: row.get(2)?,
        ticker: row.get(3)?,
        cik: row.get(4)?,
        sector: row.get(5)?,
        industry: row.get(6)?,
        country: row.get(7)?,
        description: row.get(8)?,
        is_sp500: row.get(9)?,
    })
}

pub fn get_all_companies(conn: &Connection) -> Result<Vec<Company>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMPANY_COLUMNS} FROM companies ORDER BY id"
    ))?;
    let companies = stmt
        .query_map([], company_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(companies)
}

pub fn get_company_by_cusip(conn: &Connection, cusip: &str) -> Result<Option<Company>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMPANY_COLUMNS} FROM companies WHERE cusip = ?1"
    ))?;
    let mut rows = stmt.query_map(params![cusip], company_from_row)?;
    Ok(rows.next().transpose()?)
}

// ============================================================================
// COMPANY REGISTRY
// ============================================================================

/// CUSIP → company id, with read-your-writes for companies created this pass.
///
/// Creations happen inside the caller's per-file transaction, so the registry
/// keeps them pending until the caller confirms the commit. A rolled-back
/// file forgets its creations instead of leaving dangling ids in the cache.
#[derive(Debug, Default)]
pub struct CompanyRegistry {
    by_cusip: HashMap<String, i64>,
    pending: Vec<String>,
}

impl CompanyRegistry {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT cusip, id FROM companies")?;
        let by_cusip = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(CompanyRegistry {
            by_cusip,
            pending: Vec::new(),
        })
    }

    pub fn get(&self, cusip: &str) -> Option<i64> {
        self.by_cusip.get(cusip).copied()
    }

    /// Existing id, or a freshly inserted placeholder. Returns (id, created).
    pub fn resolve_or_create(
        &mut self,
        conn: &Connection,
        cusip: &str,
        issuer_name: Option<&str>,
    ) -> Result<(i64, bool)> {
        if let Some(id) = self.get(cusip) {
            return Ok((id, false));
        }

        // Another writer may have created it since the cache was loaded
        let existing = conn
            .query_row(
                "SELECT id FROM companies WHERE cusip = ?1",
                params![cusip],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if let Some(id) = existing {
            self.by_cusip.insert(cusip.to_string(), id);
            return Ok((id, false));
        }

        conn.execute(
            "INSERT INTO companies (name, cusip) VALUES (?1, ?2)",
            params![issuer_name.unwrap_or(""), cusip],
        )?;
        let id = conn.last_insert_rowid();

        self.by_cusip.insert(cusip.to_string(), id);
        self.pending.push(cusip.to_string());
        Ok((id, true))
    }

    /// The enclosing transaction committed; pending creations are permanent
    pub fn commit_pending(&mut self) -> usize {
        let created = self.pending.len();
        self.pending.clear();
        created
    }

    /// The enclosing transaction rolled back; forget what it created
    pub fn rollback_pending(&mut self) {
        for cusip in self.pending.drain(..) {
            self.by_cusip.remove(&cusip);
        }
    }

    pub fn count(&self) -> usize {
        self.by_cusip.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_unknown_cusip_creates_placeholder_once() {
        let conn = test_conn();
        let mut registry = CompanyRegistry::load(&conn).unwrap();

        let (id, created) = registry
            .resolve_or_create(&conn, "037833100", Some("APPLE INC"))
            .unwrap();
        assert!(created);

        // Read-your-writes within the same pass
        let (again, created_again) = registry
            .resolve_or_create(&conn, "037833100", Some("APPLE INC NEW NAME"))
            .unwrap();
        assert_eq!(again, id);
        assert!(!created_again);
        assert_eq!(registry.commit_pending(), 1);

        let companies = get_all_companies(&conn).unwrap();
        assert_eq!(companies.len(), 1);
        let apple = &companies[0];
        assert_eq!(apple.name, "APPLE INC");
        assert_eq!(apple.cusip, "037833100");
        assert_eq!(apple.ticker, None);
        assert_eq!(apple.sector, None);
        assert_eq!(apple.industry, None);
        assert_eq!(apple.country, None);
        assert!(!apple.is_sp500);
    }

    #[test]
    fn test_registry_loads_existing_companies() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO companies (name, cusip, ticker) VALUES ('MICROSOFT CORP', '594918104', 'MSFT')",
            [],
        )
        .unwrap();

        let mut registry = CompanyRegistry::load(&conn).unwrap();
        assert_eq!(registry.count(), 1);
        let (_, created) = registry
            .resolve_or_create(&conn, "594918104", Some("MICROSOFT"))
            .unwrap();
        assert!(!created);

        let msft = get_company_by_cusip(&conn, "594918104").unwrap().unwrap();
        assert!(msft.has_ticker());
        assert!(get_company_by_cusip(&conn, "000000000").unwrap().is_none());
    }

    #[test]
    fn test_rollback_forgets_pending_creations() {
        let mut conn = test_conn();
        let mut registry = CompanyRegistry::load(&conn).unwrap();

        {
            let tx = conn.transaction().unwrap();
            registry
                .resolve_or_create(&tx, "88160R101", Some("TESLA INC"))
                .unwrap();
            // dropped without commit
        }
        registry.rollback_pending();

        assert_eq!(registry.get("88160R101"), None);
        assert!(get_all_companies(&conn).unwrap().is_empty());

        let (_, created) = registry
            .resolve_or_create(&conn, "88160R101", Some("TESLA INC"))
            .unwrap();
        assert!(created);
    }
}
