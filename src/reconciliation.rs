// ⚖️ Derivative Reconciliation - rebuild the PUT/CALL table from the filings
//
// Used to backfill or repair derivative classification after the fact:
//   1. delete every derivative position (own commit)
//   2. reload fund/company registries
//   3. re-walk every filing, writing only PUT/CALL rows
//
// Safe to re-run: step 1 makes the result independent of prior state.
// Duplicate keys inside the source filings keep the first row seen.

use crate::deduplication::clear_derivatives;
use crate::ingest::{IngestReport, IngestionPipeline};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Rows deleted before the rebuild
    pub removed: usize,
    pub rebuild: IngestReport,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Rebuilt count minus removed count
    pub fn net_change(&self) -> i64 {
        self.rebuild.derivatives_inserted as i64 - self.removed as i64
    }

    pub fn summary(&self) -> String {
        format!(
            "Derivative rebuild: removed {}, rebuilt {} ({:+}), {} in-pass duplicates, {} files skipped",
            self.removed,
            self.rebuild.derivatives_inserted,
            self.net_change(),
            self.rebuild.duplicates_skipped,
            self.rebuild.files_skipped()
        )
    }
}

pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn rebuild_derivatives(
        conn: &mut Connection,
        raw_dir: &Path,
    ) -> Result<ReconciliationReport> {
        let removed = clear_derivatives(conn).context("Failed to clear derivatives table")?;
        info!(removed, "cleared derivatives table");

        let mut pipeline = IngestionPipeline::derivative_rebuild(conn, raw_dir)?;
        info!(
            funds = pipeline.fund_count(),
            companies = pipeline.company_count(),
            "identity registries loaded"
        );
        let rebuild = pipeline.run(conn)?;

        let report = ReconciliationReport {
            removed,
            rebuild,
            reconciled_at: Utc::now(),
        };
        info!(summary = %report.summary(), "reconciliation complete");
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_derivatives, get_holdings, setup_database, DerivativeKind};
    use crate::entities::{seed_funds, FundSeed};
    use crate::ingest::run_ingestion;
    use std::fs;

    const FILING: &str = r#"<informationTable>
<infoTable><nameOfIssuer>TESLA INC</nameOfIssuer><cusip>88160R101</cusip><value>300</value>
  <shrsOrPrnAmt><sshPrnamt>50</sshPrnamt></shrsOrPrnAmt><putCall>Call</putCall></infoTable>
<infoTable><nameOfIssuer>TESLA INC</nameOfIssuer><cusip>88160R101</cusip><value>999</value>
  <shrsOrPrnAmt><sshPrnamt>77</sshPrnamt></shrsOrPrnAmt><putCall>CALL</putCall></infoTable>
<infoTable><nameOfIssuer>TESLA INC</nameOfIssuer><cusip>88160R101</cusip><value>1000</value></infoTable>
</informationTable>"#;

    fn setup() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("1318605");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("q3.txt"), FILING).unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_funds(
            &mut conn,
            &[FundSeed {
                cik: "0001318605".to_string(),
                name: "Options Desk".to_string(),
                strategy: Some("Quant".to_string()),
            }],
        );
        (dir, conn)
    }

    #[test]
    fn test_rebuild_replaces_stale_derivatives() {
        let (dir, mut conn) = setup();
        run_ingestion(&mut conn, dir.path()).unwrap();

        // Corrupt the table: wrong value plus a row no filing supports
        conn.execute_batch(
            "UPDATE derivatives SET value = -1;
             INSERT INTO derivatives (fund_id, company_id, report_date, derivative_type, shares_underlying, value)
             VALUES (1, 1, '1999-01-01', 'PUT', 1, 1);",
        )
        .unwrap();

        let report = ReconciliationEngine::rebuild_derivatives(&mut conn, dir.path()).unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.rebuild.derivatives_inserted, 1);
        assert_eq!(report.rebuild.duplicates_skipped, 1);
        assert_eq!(report.net_change(), -1);

        let derivatives = get_derivatives(&conn).unwrap();
        assert_eq!(derivatives.len(), 1);
        assert_eq!(derivatives[0].kind, DerivativeKind::Call);
        // First row seen wins
        assert_eq!(derivatives[0].value, 300_000.0);
        assert_eq!(derivatives[0].shares_underlying, 50.0);
    }

    #[test]
    fn test_rebuild_is_repeatable_and_leaves_holdings() {
        let (dir, mut conn) = setup();
        run_ingestion(&mut conn, dir.path()).unwrap();

        let first = ReconciliationEngine::rebuild_derivatives(&mut conn, dir.path()).unwrap();
        let second = ReconciliationEngine::rebuild_derivatives(&mut conn, dir.path()).unwrap();

        assert_eq!(first.rebuild.derivatives_inserted, second.rebuild.derivatives_inserted);
        assert_eq!(second.removed, 1);
        assert_eq!(get_derivatives(&conn).unwrap().len(), 1);
        assert_eq!(get_holdings(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_on_empty_store_backfills() {
        let (dir, mut conn) = setup();

        let report = ReconciliationEngine::rebuild_derivatives(&mut conn, dir.path()).unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.rebuild.derivatives_inserted, 1);
        assert_eq!(report.rebuild.companies_created, 1);
        assert!(get_holdings(&conn).unwrap().is_empty());
    }
}
