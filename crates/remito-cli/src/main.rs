//! CLI application for supplier remito ingestion and stock confirmation.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, catalog, config, ingest, metrics, purchase};

/// Supplier remito ingestion - extract purchase drafts from PDFs and apply
/// stock with full audit trail
#[derive(Parser)]
#[command(name = "remito")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Path to the purchase database
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a single remito PDF into a purchase draft
    Ingest(ingest::IngestArgs),

    /// Ingest every PDF matching a glob pattern
    Batch(batch::BatchArgs),

    /// Auto-link draft lines against the catalog
    Validate(purchase::ValidateArgs),

    /// Apply stock deltas for a draft
    Confirm(purchase::ConfirmArgs),

    /// Reverse a confirmed purchase
    Rollback(purchase::RollbackArgs),

    /// Reapply or preview lost stock effects
    Resend(purchase::ResendArgs),

    /// Void a draft that never touched stock
    Cancel(purchase::CancelArgs),

    /// Show a purchase draft and its trail
    Show(purchase::ShowArgs),

    /// Rolling-window pipeline diagnostics
    Metrics(metrics::MetricsArgs),

    /// Seed suppliers and products
    Catalog(catalog::CatalogArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = commands::Context::new(cli.config.as_deref(), cli.db.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => ingest::run(args, &ctx).await,
        Commands::Batch(args) => batch::run(args, &ctx).await,
        Commands::Validate(args) => purchase::validate(args, &ctx).await,
        Commands::Confirm(args) => purchase::confirm(args, &ctx).await,
        Commands::Rollback(args) => purchase::rollback(args, &ctx).await,
        Commands::Resend(args) => purchase::resend(args, &ctx).await,
        Commands::Cancel(args) => purchase::cancel(args, &ctx).await,
        Commands::Show(args) => purchase::show(args, &ctx).await,
        Commands::Metrics(args) => metrics::run(args, &ctx).await,
        Commands::Catalog(args) => catalog::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
