//! Batch command - ingest every PDF matching a glob pattern.
//!
//! Each document is one independent pipeline run; a failure on one file
//! never aborts the rest.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use remito_core::{ExtractionPipeline, IngestOutcome, ingest_document};

use super::Context;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern for input files (e.g. "remitos/*.pdf")
    #[arg(required = true)]
    pub pattern: String,

    /// Supplier the documents belong to
    #[arg(short, long)]
    pub supplier: String,

    /// Stop at the first error instead of continuing
    #[arg(long)]
    pub fail_fast: bool,
}

pub async fn run(args: BatchArgs, ctx: &Context) -> anyhow::Result<()> {
    let start = Instant::now();

    let files: Vec<PathBuf> = glob::glob(&args.pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();

    if files.is_empty() {
        anyhow::bail!("No files match pattern: {}", args.pattern);
    }

    let store = ctx.store()?;
    let pipeline = ExtractionPipeline::new(&ctx.config, store);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    let mut parsed = 0usize;
    let mut needs_review = 0usize;
    let mut failed = 0usize;
    let mut errors = 0usize;

    for path in &files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("documento.pdf");
        pb.set_message(filename.to_string());

        let result = fs::read(path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| {
                ingest_document(store, &pipeline, &args.supplier, filename, &bytes)
                    .map_err(anyhow::Error::from)
            });

        match result {
            Ok(report) => match report.outcome {
                IngestOutcome::Parsed => parsed += 1,
                IngestOutcome::NeedsReview => needs_review += 1,
                IngestOutcome::Failed => failed += 1,
            },
            Err(e) => {
                errors += 1;
                warn!(file = %path.display(), error = %e, "ingest failed");
                if args.fail_fast {
                    pb.abandon();
                    return Err(e);
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_and_clear();

    println!(
        "{} {} files in {:.1}s",
        style("Processed").bold(),
        files.len(),
        start.elapsed().as_secs_f32()
    );
    println!("  {} parsed", style(parsed).green());
    println!("  {} need review", style(needs_review).yellow());
    println!("  {} failed extraction", style(failed).red());
    if errors > 0 {
        println!("  {} rejected (bad type / unknown supplier)", style(errors).red());
    }

    Ok(())
}
