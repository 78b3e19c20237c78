//! Ingest command - run the extraction cascade over a single remito PDF.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use remito_core::{ConfirmationEngine, ExtractionPipeline, IngestOutcome, UploadReport, ingest_document};

use super::Context;

/// Arguments for the ingest command.
#[derive(Args)]
pub struct IngestArgs {
    /// Input PDF file
    #[arg(required = true)]
    pub input: PathBuf,

    /// Supplier the document belongs to
    #[arg(short, long)]
    pub supplier: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Auto-link lines against the catalog right after ingest
    #[arg(long)]
    pub link: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON report
    Json,
}

pub async fn run(args: IngestArgs, ctx: &Context) -> anyhow::Result<()> {
    let start = Instant::now();

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let store = ctx.store()?;
    let pipeline = ExtractionPipeline::new(&ctx.config, store);

    let filename = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("documento.pdf");

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_message(format!("Extracting {}", filename));

    let bytes = fs::read(&args.input)?;
    let report = ingest_document(store, &pipeline, &args.supplier, filename, &bytes)?;

    pb.finish_with_message("Done");

    if args.link {
        let engine = ConfirmationEngine::new(store);
        let linked = engine.validate(report.purchase_id)?;
        eprintln!(
            "{} linked {}/{} lines",
            style("validate:").cyan(),
            linked.linked,
            linked.total_lines
        );
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_summary(&report),
    }

    info!("Finished in {:.1}s", start.elapsed().as_secs_f32());
    Ok(())
}

fn print_summary(report: &UploadReport) {
    let outcome = match report.outcome {
        IngestOutcome::Parsed => style("parsed").green(),
        IngestOutcome::NeedsReview => style("needs review").yellow(),
        IngestOutcome::Failed => style("failed").red(),
    };

    println!(
        "purchase #{} [{}] {}",
        report.purchase_id, outcome, report.filename
    );
    println!(
        "  number:     {} ({:?})",
        report.parsed_summary.invoice_number, report.parsed_summary.number_trust
    );
    println!(
        "  lines:      {} ({} from oracle)",
        report.parsed_summary.line_count, report.parsed_summary.oracle_lines
    );
    println!(
        "  confidence: {:.2} via {}",
        report.parsed_summary.classic_confidence, report.parsed_summary.strategy_used
    );
    if let Some(fatal) = &report.fatal {
        println!("  {} {}", style("fatal:").red(), fatal);
    }
}
