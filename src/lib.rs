// Holdings Radar - Core Library
// Filing ingestion, identity resolution and enrichment for institutional holdings

pub mod config;
pub mod db;
pub mod deduplication;
pub mod enrichment;
pub mod entities;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod metadata;
pub mod parser;
pub mod reconciliation;
pub mod report;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use db::{
    content_hash, get_derivatives, get_holdings, latest_filing_event, open_database,
    record_filing_event, setup_database, store_stats, DerivativeKind, DerivativePosition,
    FilingEvent, Holding, StoreStats,
};
pub use deduplication::{DerivativeKey, HoldingKey, PositionWriter, WriteOutcome};
pub use enrichment::{
    canonicalize_name, AuthoritativeRegistry, EnrichmentMatcher, EnrichmentReport,
    IndexMembership,
};
pub use entities::{
    get_all_companies, get_company_by_cusip, load_fund_seeds, seed_funds, Company,
    CompanyRegistry, Fund, FundRegistry, FundSeed,
};
pub use error::{ExtractError, RowSkip, SkipReason};
pub use extractor::{discover_filings, extract_information_table, FilingFile, LookupStrategy};
pub use ingest::{run_ingestion, IngestReport, IngestionPipeline};
pub use metadata::{fill_metadata, IssuerMetadata, JsonMetadataSource, MetadataSource};
pub use parser::{InfoTableRow, RowKind};
pub use reconciliation::{ReconciliationEngine, ReconciliationReport};
pub use report::{Failure, PassSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
