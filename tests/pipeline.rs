// End-to-end runs over a temporary filing tree and a file-backed store

use holdings_radar::{
    get_all_companies, get_company_by_cusip, get_derivatives, get_holdings, latest_filing_event,
    open_database, run_ingestion, seed_funds, store_stats, AuthoritativeRegistry, DerivativeKind,
    EnrichmentMatcher, FundSeed, IndexMembership, ReconciliationEngine,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const APPLE_FILING: &str = r#"<SEC-DOCUMENT>0000102909-24-000123.txt : 20240214
<SEC-HEADER>
CONFORMED SUBMISSION TYPE:	13F-HR
</SEC-HEADER>
<DOCUMENT>
<TYPE>INFORMATION TABLE
<TEXT>
<XML>
<?xml version="1.0" encoding="UTF-8"?>
<ns1:informationTable xmlns:ns1="http://www.sec.gov/edgar/document/thirteenf/informationtable">
  <ns1:infoTable>
    <ns1:nameOfIssuer>APPLE INC</ns1:nameOfIssuer>
    <ns1:titleOfClass>COM</ns1:titleOfClass>
    <ns1:cusip>037833100</ns1:cusip>
    <ns1:value>5000</ns1:value>
    <ns1:shrsOrPrnAmt>
      <ns1:sshPrnamt>26000</ns1:sshPrnamt>
      <ns1:sshPrnamtType>SH</ns1:sshPrnamtType>
    </ns1:shrsOrPrnAmt>
  </ns1:infoTable>
  <ns1:infoTable>
    <ns1:nameOfIssuer>APPLE INC</ns1:nameOfIssuer>
    <ns1:titleOfClass>COM</ns1:titleOfClass>
    <ns1:cusip>037833100</ns1:cusip>
    <ns1:value>200</ns1:value>
    <ns1:shrsOrPrnAmt>
      <ns1:sshPrnamt>1000</ns1:sshPrnamt>
      <ns1:sshPrnamtType>SH</ns1:sshPrnamtType>
    </ns1:shrsOrPrnAmt>
    <ns1:putCall>Put</ns1:putCall>
  </ns1:infoTable>
</ns1:informationTable>
</XML>
</TEXT>
</DOCUMENT>
</SEC-DOCUMENT>"#;

const LEGACY_FILING: &str = r#"<informationTable xmlns="http://www.sec.gov/edgar/thirteenf/informationtable">
  <infoTable>
    <nameOfIssuer>COCA COLA CO</nameOfIssuer>
    <cusip>191216100</cusip>
    <value>1,500</value>
    <shrsOrPrnAmt><sshPrnamt>20000</sshPrnamt></shrsOrPrnAmt>
  </infoTable>
  <infoTable>
    <nameOfIssuer>Abbott Laboratories</nameOfIssuer>
    <cusip>002824100</cusip>
    <value>700</value>
    <shrsOrPrnAmt><sshPrnamt>5000</sshPrnamt></shrsOrPrnAmt>
    <putCall>CALL</putCall>
  </infoTable>
  <infoTable>
    <nameOfIssuer>APPLE INC</nameOfIssuer>
    <cusip>037833100</cusip>
    <value>90</value>
    <putCall>Common Stock</putCall>
  </infoTable>
</informationTable>"#;

struct Workspace {
    _dir: TempDir,
    raw: PathBuf,
    conn: Connection,
}

fn workspace(funds: &[(&str, &str)]) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();

    let mut conn = open_database(&dir.path().join("db").join("radar.db")).unwrap();
    let seeds: Vec<FundSeed> = funds
        .iter()
        .map(|(cik, name)| FundSeed {
            cik: cik.to_string(),
            name: name.to_string(),
            strategy: None,
        })
        .collect();
    let summary = seed_funds(&mut conn, &seeds);
    assert_eq!(summary.created, funds.len());

    Workspace {
        _dir: dir,
        raw,
        conn,
    }
}

fn add_filing(root: &Path, relative: &str, body: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn apple_filing_end_to_end() {
    let mut ws = workspace(&[("0000102909", "Vanguard Group")]);
    add_filing(&ws.raw, "102909/2024Q4/0000102909-24-000123.txt", APPLE_FILING);

    let report = run_ingestion(&mut ws.conn, &ws.raw).unwrap();
    assert_eq!(report.files_ingested, 1);
    assert!(report.skipped_files.is_empty());

    let companies = get_all_companies(&ws.conn).unwrap();
    assert_eq!(companies.len(), 1);
    assert_eq!(companies[0].cusip, "037833100");
    assert_eq!(companies[0].name, "APPLE INC");
    assert!(companies[0].ticker.is_none());
    assert!(companies[0].sector.is_none());

    let holdings = get_holdings(&ws.conn).unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].value, 5_000_000.0);
    assert_eq!(holdings[0].shares, 26_000.0);

    let derivatives = get_derivatives(&ws.conn).unwrap();
    assert_eq!(derivatives.len(), 1);
    assert_eq!(derivatives[0].kind, DerivativeKind::Put);
    assert_eq!(derivatives[0].value, 200_000.0);
    assert_eq!(derivatives[0].shares_underlying, 1_000.0);
}

#[test]
fn second_run_changes_nothing() {
    let mut ws = workspace(&[("0000102909", "Vanguard Group"), ("200217", "Dodge & Cox")]);
    add_filing(&ws.raw, "102909/q4.txt", APPLE_FILING);
    add_filing(&ws.raw, "200217/q4.txt", LEGACY_FILING);
    add_filing(&ws.raw, "777777/q4.txt", APPLE_FILING);

    let first = run_ingestion(&mut ws.conn, &ws.raw).unwrap();
    let after_first = store_stats(&ws.conn).unwrap();
    let second = run_ingestion(&mut ws.conn, &ws.raw).unwrap();
    let after_second = store_stats(&ws.conn).unwrap();

    assert_eq!(first.holdings_inserted, 3);
    assert_eq!(first.derivatives_inserted, 2);
    assert_eq!(first.companies_created, 3);
    assert_eq!(second.holdings_inserted + second.derivatives_inserted, 0);
    assert_eq!(second.companies_created, 0);
    assert_eq!(second.duplicates_skipped, 5);
    assert_eq!(second.skipped_with("unknown_filer"), 1);
    // Includes the filing log: nothing new to record
    assert_eq!(after_first.filing_events, 3);
    assert_eq!(after_first, after_second);
}

#[test]
fn positions_are_unique_per_key() {
    let mut ws = workspace(&[("102909", "Vanguard Group")]);
    // The same table filed twice for the same period
    add_filing(&ws.raw, "102909/a.txt", APPLE_FILING);
    add_filing(&ws.raw, "102909/b.txt", APPLE_FILING);

    let report = run_ingestion(&mut ws.conn, &ws.raw).unwrap();
    assert_eq!(report.files_ingested, 2);

    let holdings = get_holdings(&ws.conn).unwrap();
    let keys: HashSet<_> = holdings.iter().map(|h| h.key()).collect();
    assert_eq!(keys.len(), holdings.len());

    let derivatives = get_derivatives(&ws.conn).unwrap();
    let keys: HashSet<_> = derivatives.iter().map(|d| d.key()).collect();
    assert_eq!(keys.len(), derivatives.len());
}

#[test]
fn padded_folder_resolves_unpadded_registration() {
    let mut ws = workspace(&[("1234567", "Padded Capital")]);
    add_filing(&ws.raw, "0001234567/q1.txt", LEGACY_FILING);

    let report = run_ingestion(&mut ws.conn, &ws.raw).unwrap();
    assert_eq!(report.files_ingested, 1);
    assert_eq!(report.holdings_inserted, 2);
    assert_eq!(report.derivatives_inserted, 1);
}

#[test]
fn unregistered_and_unparseable_files_are_skipped_and_logged() {
    let mut ws = workspace(&[("102909", "Vanguard Group")]);
    add_filing(&ws.raw, "777777/q1.txt", APPLE_FILING);
    add_filing(
        &ws.raw,
        "102909/broken.txt",
        "<informationTable><x:infoTable></x:infoTable></informationTable>",
    );
    add_filing(&ws.raw, "102909/good.txt", APPLE_FILING);

    let report = run_ingestion(&mut ws.conn, &ws.raw).unwrap();
    assert_eq!(report.files_ingested, 1);
    assert_eq!(report.skipped_with("unknown_filer"), 1);
    assert_eq!(report.skipped_with("malformed_table"), 1);

    let event = latest_filing_event(&ws.conn, "102909/broken.txt").unwrap().unwrap();
    assert_eq!(event.outcome, "skipped");
    assert_eq!(event.data["reason"], "malformed_table");
}

#[test]
fn reconcile_then_enrich() {
    let mut ws = workspace(&[("0000102909", "Vanguard Group"), ("200217", "Dodge & Cox")]);
    add_filing(&ws.raw, "102909/q4.txt", APPLE_FILING);
    add_filing(&ws.raw, "200217/q4.txt", LEGACY_FILING);
    run_ingestion(&mut ws.conn, &ws.raw).unwrap();

    ws.conn.execute("DELETE FROM derivatives WHERE derivative_type = 'CALL'", []).unwrap();
    let rebuilt = ReconciliationEngine::rebuild_derivatives(&mut ws.conn, &ws.raw).unwrap();
    assert_eq!(rebuilt.removed, 1);
    assert_eq!(rebuilt.rebuild.derivatives_inserted, 2);
    assert_eq!(get_holdings(&ws.conn).unwrap().len(), 3);

    // A second identical rebuild records nothing new
    let events_before = store_stats(&ws.conn).unwrap().filing_events;
    ReconciliationEngine::rebuild_derivatives(&mut ws.conn, &ws.raw).unwrap();
    assert_eq!(store_stats(&ws.conn).unwrap().filing_events, events_before);

    let registry = AuthoritativeRegistry::from_json(
        r#"{"0": {"cik_str": 1800, "ticker": "ABT", "title": "ABBOTT LABORATORIES"}}"#,
    )
    .unwrap();
    let members = IndexMembership::from_tickers(["AAPL", "ABT"]);
    let report = EnrichmentMatcher::new(registry, members).run(&mut ws.conn).unwrap();
    assert_eq!(report.tickers_curated, 2);
    assert_eq!(report.tickers_registry, 1);

    let coke = get_company_by_cusip(&ws.conn, "191216100").unwrap().unwrap();
    assert_eq!(coke.ticker.as_deref(), Some("KO"));
    assert!(!coke.is_sp500);

    let abbott = get_company_by_cusip(&ws.conn, "002824100").unwrap().unwrap();
    assert_eq!(abbott.cik.as_deref(), Some("0000001800"));
    assert!(abbott.is_sp500);

    let stats = store_stats(&ws.conn).unwrap();
    assert_eq!(stats.companies_with_ticker, 3);
    assert_eq!(stats.index_members, 2);
}
