//! Metrics command - rolling-window pipeline diagnostics.

use clap::Args;
use console::style;

use remito_core::metrics;

use super::Context;

#[derive(Args)]
pub struct MetricsArgs {
    /// How many recent runs to fold
    #[arg(short, long, default_value = "50")]
    pub window: usize,

    /// Emit JSON instead of the summary
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: MetricsArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let report = metrics::collect(store, args.window)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} last {} runs (window {})",
        style("Pipeline metrics").bold(),
        report.runs,
        report.window
    );
    println!("  average confidence:   {:.2}", report.average_confidence);
    println!("  oracle invocations:   {}", report.oracle_invocations);
    println!("  oracle success rate:  {:.0}%", report.success_rate * 100.0);
    println!("  lines added by oracle: {}", report.lines_added_by_oracle);

    if report.error_breakdown.is_empty() {
        println!("  errors:               none");
    } else {
        println!("  errors:");
        for (name, count) in &report.error_breakdown {
            println!("    {:<24} {}", name, count);
        }
    }

    Ok(())
}
