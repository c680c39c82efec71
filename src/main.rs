use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use holdings_radar::{
    fill_metadata, load_fund_seeds, open_database, run_ingestion, seed_funds, store_stats,
    AuthoritativeRegistry, EnrichmentMatcher, IndexMembership, JsonMetadataSource,
    PipelineConfig, ReconciliationEngine,
};

#[derive(Parser)]
#[command(name = "holdings-radar")]
#[command(about = "Ingest institutional holdings filings into a resolved SQLite store", version)]
struct Cli {
    /// YAML config file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the raw filing directory
    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema
    Init,

    /// Register funds from the seed list
    SeedFunds {
        /// Seed YAML with `selected_funds`
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Parse every filing and write holdings and derivatives
    Ingest,

    /// Assign tickers by name and refresh index membership
    Enrich {
        /// `company_tickers.json` style registry
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Index membership CSV
        #[arg(long)]
        members: Option<PathBuf>,
    },

    /// Fill sector/industry/country for companies with a ticker
    FillMetadata {
        /// Ticker → metadata JSON
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Delete and rebuild every derivative position from the filings
    ReconcileDerivatives,

    /// Print table counts
    Stats,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("holdings_radar=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(raw_dir) = cli.raw_dir {
        config.raw_dir = raw_dir;
    }

    let mut conn = open_database(&config.db_path)?;

    match cli.command {
        Commands::Init => {
            println!("🔧 Schema ready at {}", config.db_path.display());
        }
        Commands::SeedFunds { file } => {
            let path = file.unwrap_or(config.funds_seed);
            let seeds = load_fund_seeds(&path)?;
            println!("🏛️  Registering {} funds from {}", seeds.len(), path.display());
            let summary = seed_funds(&mut conn, &seeds);
            println!("✓ {}", summary.summary());
            for failure in &summary.failures {
                println!("  ❌ {}: {}", failure.entity, failure.reason);
            }
        }
        Commands::Ingest => {
            println!("🗄️  Ingesting filings from {}", config.raw_dir.display());
            let report = run_ingestion(&mut conn, &config.raw_dir)?;
            println!("✓ {}", report.summary());
            for skipped in &report.skipped_files {
                println!("  ⏭️  {}: {}", skipped.path, skipped.reason);
            }
        }
        Commands::Enrich { registry, members } => {
            let registry_path = registry.unwrap_or(config.ticker_registry);
            let members_path = members.unwrap_or(config.index_members);
            let matcher = EnrichmentMatcher::new(
                AuthoritativeRegistry::load(&registry_path)?,
                IndexMembership::load(&members_path)?,
            );
            let report = matcher.run(&mut conn)?;
            println!("✓ {}", report.summary());
            for failure in &report.pass.failures {
                println!("  ❌ {}: {}", failure.entity, failure.reason);
            }
        }
        Commands::FillMetadata { file } => {
            let path = file.unwrap_or(config.metadata);
            let source = JsonMetadataSource::load(&path)?;
            let summary = fill_metadata(&mut conn, &source)?;
            println!("✓ Metadata: {}", summary.summary());
            for failure in &summary.failures {
                println!("  ❌ {}: {}", failure.entity, failure.reason);
            }
        }
        Commands::ReconcileDerivatives => {
            println!("⚖️  Rebuilding derivatives from {}", config.raw_dir.display());
            let report = ReconciliationEngine::rebuild_derivatives(&mut conn, &config.raw_dir)?;
            println!("✓ {}", report.summary());
        }
        Commands::Stats => {
            let stats = store_stats(&conn)?;
            println!("📊 {}", config.db_path.display());
            println!("  Funds:        {}", stats.funds);
            println!(
                "  Companies:    {} ({} with ticker, {} index members)",
                stats.companies, stats.companies_with_ticker, stats.index_members
            );
            println!("  Holdings:     {}", stats.holdings);
            println!("  Derivatives:  {}", stats.derivatives);
            println!("  Filing log:   {}", stats.filing_events);
        }
    }

    Ok(())
}
