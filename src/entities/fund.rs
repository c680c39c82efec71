// 🏛️ Fund Entity - registered filers, keyed by regulatory ID (CIK)
//
// Funds are never created by ingestion. They come from the seed list and
// ingestion fails closed for any filer that is not registered.
//
// Folder names and seed entries disagree on zero padding ("0000102909" vs
// "102909"), so the registry indexes both the exact and the stripped form.

use crate::report::PassSummary;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// FUND ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fund {
    pub id: i64,
    pub cik: String,
    pub name: String,
    pub strategy: Option<String>,
}

/// "0000102909" -> "102909"; an all-zero ID stays "0"
pub fn strip_leading_zeros(cik: &str) -> &str {
    let stripped = cik.trim_start_matches('0');
    if stripped.is_empty() && !cik.is_empty() {
        "0"
    } else {
        stripped
    }
}

// ============================================================================
// SEED LIST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundSeed {
    pub cik: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SeedFile {
    selected_funds: Vec<FundSeed>,
}

/// Load `selected_funds` from a YAML seed file
pub fn load_fund_seeds(path: &Path) -> Result<Vec<FundSeed>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fund seed file: {}", path.display()))?;
    parse_fund_seeds(&content)
}

pub fn parse_fund_seeds(yaml: &str) -> Result<Vec<FundSeed>> {
    let file: SeedFile = serde_yaml::from_str(yaml).context("Failed to parse fund seed YAML")?;
    Ok(file.selected_funds)
}

fn register_one(conn: &mut Connection, seed: &FundSeed) -> Result<bool> {
    let tx = conn.transaction()?;

    let exists: Option<i64> = tx
        .query_row(
            "SELECT id FROM funds WHERE cik = ?1",
            params![seed.cik],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(false);
    }

    let strategy = seed.strategy.as_deref().unwrap_or("General");
    tx.execute(
        "INSERT INTO funds (cik, name, strategy) VALUES (?1, ?2, ?3)",
        params![seed.cik, seed.name, strategy],
    )?;
    tx.commit()?;
    Ok(true)
}

/// Register seed funds one entry per transaction.
///
/// A failing entry (duplicate key, bad data) is rolled back on its own and
/// counted; it never takes the rest of the batch down with it.
pub fn seed_funds(conn: &mut Connection, seeds: &[FundSeed]) -> PassSummary {
    let mut summary = PassSummary::default();

    for seed in seeds {
        match register_one(conn, seed) {
            Ok(true) => {
                info!(cik = %seed.cik, name = %seed.name, "registered fund");
                summary.created += 1;
            }
            Ok(false) => summary.skipped += 1,
            Err(err) => {
                warn!(cik = %seed.cik, name = %seed.name, error = %err, "fund registration failed");
                summary.fail(&seed.cik, format!("{err:#}"));
            }
        }
    }

    summary
}

// ============================================================================
// FUND REGISTRY
// ============================================================================

/// Read-only regulatory ID → fund lookup, loaded once per pass
#[derive(Debug, Default)]
pub struct FundRegistry {
    by_cik: HashMap<String, i64>,
    by_stripped: HashMap<String, i64>,
    funds: HashMap<i64, Fund>,
}

impl FundRegistry {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT id, cik, name, strategy FROM funds")?;
        let funds = stmt
            .query_map([], |row| {
                Ok(Fund {
                    id: row.get(0)?,
                    cik: row.get(1)?,
                    name: row.get(2)?,
                    strategy: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut registry = FundRegistry::default();
        for fund in funds {
            registry.insert(fund);
        }
        Ok(registry)
    }

    fn insert(&mut self, fund: Fund) {
        self.by_cik.insert(fund.cik.clone(), fund.id);
        self.by_stripped
            .entry(strip_leading_zeros(&fund.cik).to_string())
            .or_insert(fund.id);
        self.funds.insert(fund.id, fund);
    }

    /// Exact ID first, then the zero-stripped form
    pub fn resolve(&self, cik: &str) -> Option<&Fund> {
        let stripped = strip_leading_zeros(cik);
        self.by_cik
            .get(cik)
            .or_else(|| self.by_cik.get(stripped))
            .or_else(|| self.by_stripped.get(stripped))
            .and_then(|id| self.funds.get(id))
    }

    pub fn count(&self) -> usize {
        self.funds.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
