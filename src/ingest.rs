// 🗄️ Ingestion Pipeline - filing files → funds, companies, positions
//
// Per file:
//   path → regulatory ID → text → information table → rows
//   fund lookup (fail closed) → company lookup (create on miss)
//   dedup-guarded inserts, one transaction per file
//
// The same walk backs the derivative rebuild in reconciliation.rs, with a
// row filter and a writer that skips the store check.

use crate::db::{content_hash, record_filing_event, DerivativePosition, FilingEvent, Holding};
use crate::deduplication::{DerivativeKey, HoldingKey, PositionWriter, WriteOutcome};
use crate::entities::{CompanyRegistry, FundRegistry};
use crate::error::SkipReason;
use crate::extractor::{discover_filings, extract_tree, FilingFile};
use crate::parser::{parse_rows, InfoTableRow, RowKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// LOADED FILING
// ============================================================================

/// A filing that passed extraction and is ready for identity resolution
#[derive(Debug, Clone)]
pub struct LoadedFiling {
    pub relative_path: String,
    pub regulatory_id: String,
    /// File modification date; filings' own period-of-report is not read
    pub report_date: NaiveDate,
    pub content_hash: String,
    pub rows: Vec<InfoTableRow>,
    pub rows_discarded: usize,
}

/// Last-modification timestamp as a local calendar date
pub fn modification_date(path: &Path) -> std::io::Result<NaiveDate> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).date_naive())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Read, hash, extract and parse one file. Any failure is a file-level skip.
pub fn load_filing(root: &Path, file: &FilingFile) -> Result<LoadedFiling, (SkipReason, String)> {
    let regulatory_id = file
        .regulatory_id
        .clone()
        .ok_or((SkipReason::NoRegulatoryId, String::new()))?;

    let bytes = std::fs::read(&file.path)
        .map_err(|e| (SkipReason::Unreadable(e.to_string()), String::new()))?;
    let hash = content_hash(&bytes);

    let report_date = modification_date(&file.path)
        .map_err(|e| (SkipReason::Unreadable(e.to_string()), hash.clone()))?;

    // Filings carry stray non-UTF-8 bytes; they never fall inside the table markup
    let content = String::from_utf8_lossy(&bytes);
    let tree = extract_tree(&content).map_err(|reason| (reason, hash.clone()))?;

    let mut rows = Vec::new();
    let mut rows_discarded = 0;
    for parsed in parse_rows(&tree) {
        match parsed {
            Ok(row) => rows.push(row),
            Err(skip) => {
                debug!(path = %file.path.display(), reason = %skip, "discarding row");
                rows_discarded += 1;
            }
        }
    }

    Ok(LoadedFiling {
        relative_path: relative_path(root, &file.path),
        regulatory_id,
        report_date,
        content_hash: hash,
        rows,
        rows_discarded,
    })
}

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// Counts written by one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    pub companies_created: usize,
    pub holdings_inserted: usize,
    pub derivatives_inserted: usize,
    pub duplicates_skipped: usize,
    pub rows_discarded: usize,
}

/// Run-level summary for an ingestion (or rebuild) pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_ingested: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub companies_created: usize,
    pub holdings_inserted: usize,
    pub derivatives_inserted: usize,
    pub duplicates_skipped: usize,
    pub rows_discarded: usize,
}

impl IngestReport {
    fn add(&mut self, counts: &FileCounts) {
        self.files_ingested += 1;
        self.companies_created += counts.companies_created;
        self.holdings_inserted += counts.holdings_inserted;
        self.derivatives_inserted += counts.derivatives_inserted;
        self.duplicates_skipped += counts.duplicates_skipped;
        self.rows_discarded += counts.rows_discarded;
    }

    pub fn files_skipped(&self) -> usize {
        self.skipped_files.len()
    }

    /// Skipped files with a given reason code (see `SkipReason::code`)
    pub fn skipped_with(&self, code: &str) -> usize {
        self.skipped_files
            .iter()
            .filter(|s| s.reason.code() == code)
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files ({} ingested, {} skipped): {} holdings, {} derivatives, {} new companies, {} duplicates skipped, {} rows discarded",
            self.files_seen,
            self.files_ingested,
            self.files_skipped(),
            self.holdings_inserted,
            self.derivatives_inserted,
            self.companies_created,
            self.duplicates_skipped,
            self.rows_discarded
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Which rows a pass writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All,
    DerivativesOnly,
}

impl RowFilter {
    fn accepts(&self, kind: RowKind) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::DerivativesOnly => kind.is_derivative(),
        }
    }
}

/// One pass over a raw filing tree.
///
/// Owns the identity registries for the lifetime of the pass; they are
/// loaded at construction and dropped with the pipeline.
pub struct IngestionPipeline {
    root: PathBuf,
    funds: FundRegistry,
    companies: CompanyRegistry,
    writer: PositionWriter,
    filter: RowFilter,
    outcome: &'static str,
}

impl IngestionPipeline {
    /// Incremental ingestion of equity and derivative rows
    pub fn new(conn: &Connection, root: &Path) -> Result<Self> {
        Ok(IngestionPipeline {
            root: root.to_path_buf(),
            funds: FundRegistry::load(conn).context("Failed to load fund registry")?,
            companies: CompanyRegistry::load(conn).context("Failed to load company registry")?,
            writer: PositionWriter::new(),
            filter: RowFilter::All,
            outcome: "ingested",
        })
    }

    /// Derivative-only walk for a freshly cleared derivatives table
    pub fn derivative_rebuild(conn: &Connection, root: &Path) -> Result<Self> {
        Ok(IngestionPipeline {
            writer: PositionWriter::for_rebuild(),
            filter: RowFilter::DerivativesOnly,
            outcome: "reconciled",
            ..Self::new(conn, root)?
        })
    }

    pub fn fund_count(&self) -> usize {
        self.funds.count()
    }

    pub fn company_count(&self) -> usize {
        self.companies.count()
    }

    /// Walk every filing under the root
    pub fn run(&mut self, conn: &mut Connection) -> Result<IngestReport> {
        let files = discover_filings(&self.root);
        info!(
            files = files.len(),
            funds = self.funds.count(),
            companies = self.companies.count(),
            root = %self.root.display(),
            "scanning filings"
        );

        let mut report = IngestReport::default();
        for file in &files {
            self.ingest_file(conn, file, &mut report)?;
        }

        info!(summary = %report.summary(), "pass complete");
        Ok(report)
    }

    /// Process a single file. Skips are recorded in `report`; only storage
    /// failures return an error, after the file's transaction rolls back.
    pub fn ingest_file(
        &mut self,
        conn: &mut Connection,
        file: &FilingFile,
        report: &mut IngestReport,
    ) -> Result<()> {
        report.files_seen += 1;
        let rel = relative_path(&self.root, &file.path);

        let filing = match load_filing(&self.root, file) {
            Ok(filing) => filing,
            Err((reason, hash)) => return self.record_skip(conn, report, rel, hash, reason),
        };

        let fund_id = match self.funds.resolve(&filing.regulatory_id) {
            Some(fund) => fund.id,
            None => {
                let reason = SkipReason::UnknownFiler(filing.regulatory_id.clone());
                return self.record_skip(conn, report, rel, filing.content_hash, reason);
            }
        };

        let mut holding_keys = Vec::new();
        let mut derivative_keys = Vec::new();
        let written =
            self.write_filing(conn, &filing, fund_id, &mut holding_keys, &mut derivative_keys);

        match written {
            Ok(counts) => {
                self.companies.commit_pending();
                if counts.holdings_inserted > 0 || counts.derivatives_inserted > 0 {
                    info!(
                        path = %filing.relative_path,
                        holdings = counts.holdings_inserted,
                        derivatives = counts.derivatives_inserted,
                        "saved positions"
                    );
                }
                report.add(&counts);
                Ok(())
            }
            Err(err) => {
                self.companies.rollback_pending();
                self.writer.forget(&holding_keys, &derivative_keys);
                Err(err.context(format!("Failed to write filing {}", filing.relative_path)))
            }
        }
    }

    fn write_filing(
        &mut self,
        conn: &mut Connection,
        filing: &LoadedFiling,
        fund_id: i64,
        holding_keys: &mut Vec<HoldingKey>,
        derivative_keys: &mut Vec<DerivativeKey>,
    ) -> Result<FileCounts> {
        let tx = conn.transaction()?;
        let mut counts = FileCounts {
            rows_discarded: filing.rows_discarded,
            ..FileCounts::default()
        };

        let filter = self.filter;
        for row in filing.rows.iter().filter(|r| filter.accepts(r.kind)) {
            let (company_id, created) =
                self.companies
                    .resolve_or_create(&tx, &row.cusip, row.issuer_name.as_deref())?;
            if created {
                counts.companies_created += 1;
            }

            let outcome = match row.kind {
                RowKind::Equity => {
                    let holding = Holding {
                        fund_id,
                        company_id,
                        report_date: filing.report_date,
                        shares: row.shares,
                        value: row.value,
                    };
                    let outcome = self.writer.write_holding(&tx, &holding)?;
                    if outcome == WriteOutcome::Inserted {
                        holding_keys.push(holding.key());
                        counts.holdings_inserted += 1;
                    }
                    outcome
                }
                RowKind::Derivative(kind) => {
                    let position = DerivativePosition {
                        fund_id,
                        company_id,
                        report_date: filing.report_date,
                        kind,
                        shares_underlying: row.shares,
                        value: row.value,
                    };
                    let outcome = self.writer.write_derivative(&tx, &position)?;
                    if outcome == WriteOutcome::Inserted {
                        derivative_keys.push(position.key());
                        counts.derivatives_inserted += 1;
                    }
                    outcome
                }
            };

            if outcome == WriteOutcome::Duplicate {
                counts.duplicates_skipped += 1;
            }
        }

        // Detail describes the file, not this run's inserts
        let accepted = filing.rows.iter().filter(|r| filter.accepts(r.kind));
        let derivative_rows = accepted.clone().filter(|r| r.kind.is_derivative()).count();
        let equity_rows = accepted.count() - derivative_rows;
        let event = FilingEvent::new(
            self.outcome,
            &filing.relative_path,
            &filing.content_hash,
            serde_json::json!({
                "regulatory_id": filing.regulatory_id,
                "report_date": filing.report_date.to_string(),
                "equity_rows": equity_rows,
                "derivative_rows": derivative_rows,
                "rows_discarded": filing.rows_discarded,
            }),
        );
        record_filing_event(&tx, &event)?;

        tx.commit()?;
        Ok(counts)
    }

    fn record_skip(
        &self,
        conn: &Connection,
        report: &mut IngestReport,
        path: String,
        hash: String,
        reason: SkipReason,
    ) -> Result<()> {
        warn!(path = %path, reason = %reason, "skipping filing");

        let event = FilingEvent::new(
            "skipped",
            &path,
            &hash,
            serde_json::json!({ "reason": reason.code(), "detail": reason.to_string() }),
        );
        record_filing_event(conn, &event)?;

        report.skipped_files.push(SkippedFile { path, reason });
        Ok(())
    }
}

/// Load registries, walk `raw_dir`, write positions
pub fn run_ingestion(conn: &mut Connection, raw_dir: &Path) -> Result<IngestReport> {
    let mut pipeline = IngestionPipeline::new(conn, raw_dir)?;
    pipeline.run(conn)
}

// ============================================================================
// TESTS
// ============================================================================
