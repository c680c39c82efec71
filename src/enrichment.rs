// 🏷️ Name-Based Enrichment - fill missing tickers from legal names
//
// Two sources, tried in order for each company without a ticker:
//   (a) curated reference: substring match on the issuer name
//   (b) authoritative registry: exact match on the canonical name,
//       assigning ticker plus a 10-digit regulatory ID
//
// Afterwards the index-membership flag is recomputed for every company
// that has a ticker. Nothing non-empty is ever overwritten except that flag.

use crate::entities::{get_all_companies, Company};
use crate::report::PassSummary;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// CANONICAL NAMES
// ============================================================================

const CORPORATE_SUFFIXES: [&str; 7] = ["INC", "CORP", "CO", "LTD", "PLC", "AG", "SA"];

/// Uppercase, drop punctuation, drop corporate-suffix tokens.
///
/// Suffixes are removed as whole tokens, so "COCA COLA CO" keeps its "COLA".
pub fn canonicalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !CORPORATE_SUFFIXES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hand-maintained tickers for the issuers that dominate portfolio value.
/// Patterns are matched by substring against the uppercased issuer name.
pub const CURATED_TICKERS: &[(&str, &str)] = &[
    ("APPLE INC", "AAPL"),
    ("MICROSOFT CORP", "MSFT"),
    ("NVIDIA CORP", "NVDA"),
    ("AMAZON COM INC", "AMZN"),
    ("META PLATFORMS INC", "META"),
    ("ALPHABET INC", "GOOGL"),
    ("TESLA INC", "TSLA"),
    ("BROADCOM INC", "AVGO"),
    ("NETFLIX INC", "NFLX"),
    ("AMD", "AMD"),
    ("INTEL CORP", "INTC"),
    ("QUALCOMM INC", "QCOM"),
    ("BERKSHIRE HATHAWAY INC DEL", "BRK-B"),
    ("JPMORGAN CHASE & CO", "JPM"),
    ("VISA INC", "V"),
    ("MASTERCARD INC", "MA"),
    ("BANK OF AMERICA CORP", "BAC"),
    ("LILLY ELI & CO", "LLY"),
    ("UNITEDHEALTH GROUP INC", "UNH"),
    ("JOHNSON & JOHNSON", "JNJ"),
    ("MERCK & CO INC", "MRK"),
    ("ABBVIE INC", "ABBV"),
    ("PFIZER INC", "PFE"),
    ("WALMART INC", "WMT"),
    ("COSTCO WHSL CORP", "COST"),
    ("PROCTER & GAMBLE CO", "PG"),
    ("HOME DEPOT INC", "HD"),
    ("COCA COLA CO", "KO"),
    ("PEPSICO INC", "PEP"),
    ("EXXON MOBIL CORP", "XOM"),
    ("CHEVRON CORP", "CVX"),
];

/// First curated pattern contained in the issuer name
pub fn curated_ticker(name: &str) -> Option<&'static str> {
    let upper = name.to_uppercase();
    CURATED_TICKERS
        .iter()
        .find(|(pattern, _)| upper.contains(pattern))
        .map(|(_, ticker)| *ticker)
}

// ============================================================================
// AUTHORITATIVE REGISTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub ticker: String,
    /// Zero-padded to 10 digits
    pub cik: String,
}

/// One record of a `company_tickers.json` style file
#[derive(Debug, Deserialize)]
struct TickerRecord {
    cik_str: u64,
    ticker: String,
    title: String,
}

/// Canonical legal name → (ticker, regulatory ID)
#[derive(Debug, Default)]
pub struct AuthoritativeRegistry {
    by_name: HashMap<String, RegistryEntry>,
}

impl AuthoritativeRegistry {
    /// Build from (title, ticker, cik). The first entry for a canonical name wins.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str, u64)>) -> Self {
        let mut by_name = HashMap::new();
        for (title, ticker, cik) in entries {
            let key = canonicalize_name(title);
            if key.is_empty() || ticker.trim().is_empty() {
                continue;
            }
            by_name.entry(key).or_insert_with(|| RegistryEntry {
                ticker: ticker.trim().to_string(),
                cik: format!("{:0>10}", cik),
            });
        }
        AuthoritativeRegistry { by_name }
    }

    /// Parse `{"0": {"cik_str": .., "ticker": .., "title": ..}, ...}`.
    /// Records are taken in index order, so earlier listings win name collisions.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, TickerRecord> =
            serde_json::from_str(json).context("Failed to parse ticker registry JSON")?;

        let mut records: Vec<(String, TickerRecord)> = raw.into_iter().collect();
        records.sort_by_key(|(index, _)| (index.parse::<u64>().unwrap_or(u64::MAX), index.clone()));

        Ok(Self::from_entries(
            records
                .iter()
                .map(|(_, r)| (r.title.as_str(), r.ticker.as_str(), r.cik_str)),
        ))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ticker registry {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        let key = canonicalize_name(name);
        if key.is_empty() {
            return None;
        }
        self.by_name.get(&key)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ============================================================================
// INDEX MEMBERSHIP
// ============================================================================

const TICKER_HEADERS: [&str; 2] = ["symbol", "ticker"];

#[derive(Debug, Default)]
pub struct IndexMembership {
    tickers: HashSet<String>,
}

impl IndexMembership {
    pub fn from_tickers<S: AsRef<str>>(tickers: impl IntoIterator<Item = S>) -> Self {
        IndexMembership {
            tickers: tickers
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// CSV with a `Symbol` or `Ticker` column (any case), or a headerless
    /// list whose first column is the ticker
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = rdr.records();
        let first = match records.next() {
            Some(record) => record.context("Failed to read membership CSV")?,
            None => return Ok(Self::default()),
        };

        let header_column = first.iter().position(|field| {
            TICKER_HEADERS
                .iter()
                .any(|name| field.eq_ignore_ascii_case(name))
        });

        let column = header_column.unwrap_or(0);
        let mut tickers = Vec::new();
        if header_column.is_none() {
            tickers.extend(first.get(column).map(str::to_string));
        }
        for record in records {
            let record = record.context("Failed to read membership CSV")?;
            tickers.extend(record.get(column).map(str::to_string));
        }

        Ok(Self::from_tickers(tickers))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open membership file {}", path.display()))?;
        Self::from_reader(file)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.tickers.contains(ticker.trim())
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

// ============================================================================
// MATCHER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TickerSource {
    Curated,
    Registry,
}

/// Changes decided for one company, before they are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyUpdate {
    pub company_id: i64,
    pub ticker: Option<String>,
    pub cik: Option<String>,
    pub is_sp500: bool,
    pub ticker_source: Option<TickerSource>,
    pub membership_changed: bool,
}

impl CompanyUpdate {
    pub fn is_noop(&self) -> bool {
        self.ticker_source.is_none() && !self.membership_changed
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    pub pass: PassSummary,
    pub tickers_curated: usize,
    pub tickers_registry: usize,
    pub membership_updated: usize,
}

impl EnrichmentReport {
    pub fn summary(&self) -> String {
        format!(
            "Enrichment: {} tickers from curated map, {} from registry, {} membership flags changed ({})",
            self.tickers_curated,
            self.tickers_registry,
            self.membership_updated,
            self.pass.summary()
        )
    }
}

pub struct EnrichmentMatcher {
    registry: AuthoritativeRegistry,
    membership: IndexMembership,
}

impl EnrichmentMatcher {
    pub fn new(registry: AuthoritativeRegistry, membership: IndexMembership) -> Self {
        EnrichmentMatcher {
            registry,
            membership,
        }
    }

    /// Decide what (if anything) changes for one company
    pub fn plan(&self, company: &Company) -> CompanyUpdate {
        let mut ticker = company.ticker.clone().filter(|_| company.has_ticker());
        let mut cik = company.cik.clone().filter(|c| !c.trim().is_empty());
        let mut ticker_source = None;

        if ticker.is_none() {
            if let Some(curated) = curated_ticker(&company.name) {
                ticker = Some(curated.to_string());
                ticker_source = Some(TickerSource::Curated);
            } else if let Some(entry) = self.registry.lookup(&company.name) {
                ticker = Some(entry.ticker.clone());
                if cik.is_none() {
                    cik = Some(entry.cik.clone());
                }
                ticker_source = Some(TickerSource::Registry);
            }
        }

        let is_sp500 = match &ticker {
            Some(t) => self.membership.contains(t),
            None => company.is_sp500,
        };

        CompanyUpdate {
            company_id: company.id,
            ticker,
            cik,
            is_sp500,
            ticker_source,
            membership_changed: is_sp500 != company.is_sp500,
        }
    }

    pub fn run(&self, conn: &mut Connection) -> Result<EnrichmentReport> {
        let companies = get_all_companies(conn)?;
        info!(
            companies = companies.len(),
            registry = self.registry.len(),
            members = self.membership.len(),
            "matching tickers"
        );
        if self.registry.is_empty() {
            warn!("ticker registry is empty, only curated names will match");
        }
        if self.membership.is_empty() {
            warn!("index membership list is empty, every company will be marked non-member");
        }

        let mut report = EnrichmentReport::default();
        let tx = conn.transaction()?;

        for company in &companies {
            let update = self.plan(company);
            if update.is_noop() {
                report.pass.skipped += 1;
                continue;
            }

            if let Err(e) = apply_update(&tx, &update) {
                warn!(cusip = %company.cusip, error = %e, "failed to update company");
                report.pass.fail(&company.cusip, e);
                continue;
            }

            debug!(
                cusip = %company.cusip,
                ticker = update.ticker.as_deref().unwrap_or(""),
                source = ?update.ticker_source,
                "company enriched"
            );
            report.pass.updated += 1;
            match update.ticker_source {
                Some(TickerSource::Curated) => report.tickers_curated += 1,
                Some(TickerSource::Registry) => report.tickers_registry += 1,
                None => {}
            }
            if update.membership_changed {
                report.membership_updated += 1;
            }
        }

        tx.commit()?;
        info!(summary = %report.summary(), "enrichment complete");
        Ok(report)
    }
}

fn apply_update(conn: &Connection, update: &CompanyUpdate) -> Result<()> {
    conn.execute(
        "UPDATE companies SET ticker = ?2, cik = ?3, is_sp500 = ?4 WHERE id = ?1",
        params![update.company_id, update.ticker, update.cik, update.is_sp500],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
