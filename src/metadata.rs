// 🧾 Metadata Fill - sector, industry, country, description for ticked issuers
//
// Targets companies that have a ticker but no usable sector or country.
// The source sits behind a trait so a quote service, a cached JSON dump,
// or a test double can feed the same pass.

use crate::entities::{get_all_companies, Company};
use crate::report::PassSummary;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const DESCRIPTION_LIMIT: usize = 500;

/// Progress is committed after this many updates
pub const COMMIT_EVERY: usize = 10;

// ============================================================================
// SOURCE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerMetadata {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    #[serde(alias = "longBusinessSummary")]
    pub description: Option<String>,
}

pub trait MetadataSource {
    /// `Ok(None)` when the source has nothing for this ticker
    fn fetch(&self, ticker: &str) -> Result<Option<IssuerMetadata>>;
}

/// Ticker → metadata, read from a JSON object
#[derive(Debug, Default)]
pub struct JsonMetadataSource {
    by_ticker: HashMap<String, IssuerMetadata>,
}

impl JsonMetadataSource {
    pub fn from_json(json: &str) -> Result<Self> {
        let by_ticker =
            serde_json::from_str(json).context("Failed to parse issuer metadata JSON")?;
        Ok(JsonMetadataSource { by_ticker })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata file {}", path.display()))?;
        Self::from_json(&json)
    }
}

impl MetadataSource for JsonMetadataSource {
    fn fetch(&self, ticker: &str) -> Result<Option<IssuerMetadata>> {
        Ok(self.by_ticker.get(ticker).cloned())
    }
}

// ============================================================================
// MERGE RULES
// ============================================================================

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Missing sector (or the "Unknown" placeholder) or missing country
pub fn needs_metadata(company: &Company) -> bool {
    let sector_missing = is_blank(&company.sector)
        || company.sector.as_deref().map(str::trim) == Some("Unknown");
    company.has_ticker() && (sector_missing || is_blank(&company.country))
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Take the incoming value only when it carries something
fn prefer(current: &Option<String>, incoming: Option<&String>) -> Option<String> {
    match incoming.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(v) => Some(v.to_string()),
        None => current.clone(),
    }
}

/// Fields after applying `incoming`; never empties a populated field
pub fn merge_metadata(company: &Company, incoming: &IssuerMetadata) -> IssuerMetadata {
    let description = incoming
        .description
        .as_deref()
        .map(|d| truncate_chars(d.trim(), DESCRIPTION_LIMIT));

    IssuerMetadata {
        sector: prefer(&company.sector, incoming.sector.as_ref()),
        industry: prefer(&company.industry, incoming.industry.as_ref()),
        country: prefer(&company.country, incoming.country.as_ref()),
        description: prefer(&company.description, description.as_ref()),
    }
}

fn current_metadata(company: &Company) -> IssuerMetadata {
    IssuerMetadata {
        sector: company.sector.clone(),
        industry: company.industry.clone(),
        country: company.country.clone(),
        description: company.description.clone(),
    }
}

// ============================================================================
// PASS
// ============================================================================

struct PendingUpdate {
    company_id: i64,
    ticker: String,
    fields: IssuerMetadata,
}

fn flush(
    conn: &mut Connection,
    batch: &mut Vec<PendingUpdate>,
    summary: &mut PassSummary,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for update in batch.drain(..) {
        let result = tx.execute(
            "UPDATE companies SET sector = ?2, industry = ?3, country = ?4, description = ?5
             WHERE id = ?1",
            params![
                update.company_id,
                update.fields.sector,
                update.fields.industry,
                update.fields.country,
                update.fields.description,
            ],
        );
        match result {
            Ok(_) => summary.updated += 1,
            Err(e) => {
                warn!(ticker = %update.ticker, error = %e, "failed to store metadata");
                summary.fail(update.ticker, e);
            }
        }
    }
    tx.commit()?;
    Ok(())
}

/// Fill gaps from `source`. Source errors are recorded per ticker.
pub fn fill_metadata(conn: &mut Connection, source: &dyn MetadataSource) -> Result<PassSummary> {
    let targets: Vec<Company> = get_all_companies(conn)?
        .into_iter()
        .filter(needs_metadata)
        .collect();
    info!(targets = targets.len(), "filling issuer metadata");

    let mut summary = PassSummary::default();
    let mut batch = Vec::new();

    for company in &targets {
        let Some(ticker) = company.ticker.as_deref().map(str::trim) else {
            continue;
        };

        let fetched = match source.fetch(ticker) {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                debug!(ticker, "no metadata available");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(ticker, error = %e, "metadata lookup failed");
                summary.fail(ticker, e);
                continue;
            }
        };

        let merged = merge_metadata(company, &fetched);
        if merged == current_metadata(company) {
            summary.skipped += 1;
            continue;
        }

        batch.push(PendingUpdate {
            company_id: company.id,
            ticker: ticker.to_string(),
            fields: merged,
        });
        if batch.len() >= COMMIT_EVERY {
            flush(conn, &mut batch, &mut summary)?;
        }
    }
    flush(conn, &mut batch, &mut summary)?;

    info!(summary = %summary.summary(), "metadata fill complete");
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
