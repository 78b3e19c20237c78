//! Purchase lifecycle commands: validate, confirm, rollback, resend,
//! cancel, show.

use clap::Args;
use console::style;
use rust_decimal::Decimal;

use remito_core::{ConfirmOptions, ConfirmStatus, ConfirmationEngine};

use super::Context;

#[derive(Args)]
pub struct ValidateArgs {
    /// Purchase id
    pub id: i64,
}

pub async fn validate(args: ValidateArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let engine = ConfirmationEngine::new(store);
    let report = engine.validate(args.id)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Args)]
pub struct ConfirmArgs {
    /// Purchase id
    pub id: i64,

    /// Absolute total tolerance (overrides config)
    #[arg(long)]
    pub tolerance_abs: Option<Decimal>,

    /// Relative total tolerance as a fraction (overrides config)
    #[arg(long)]
    pub tolerance_pct: Option<Decimal>,

    /// Apply stock even when the totals mismatch
    #[arg(long)]
    pub force: bool,

    /// Confirm while unmatched lines remain
    #[arg(long)]
    pub allow_partial: bool,

    /// Include per-line detail in the report
    #[arg(long)]
    pub debug: bool,
}

pub async fn confirm(args: ConfirmArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let engine = ConfirmationEngine::new(store);

    let mut opts = ConfirmOptions::from_config(&ctx.config.confirm);
    if let Some(abs) = args.tolerance_abs {
        opts.tolerance_abs = abs;
    }
    if let Some(pct) = args.tolerance_pct {
        opts.tolerance_pct = pct;
    }
    opts.force = args.force;
    opts.allow_partial = opts.allow_partial || args.allow_partial;
    opts.debug = args.debug;

    let report = engine.confirm(args.id, &opts)?;

    match report.status {
        ConfirmStatus::Applied => {
            eprintln!("{} stock applied", style("ok:").green());
        }
        ConfirmStatus::AlreadyConfirmed => {
            eprintln!("{} already confirmed, nothing re-applied", style("noop:").yellow());
        }
        ConfirmStatus::Mismatch => {
            eprintln!(
                "{} declared/applied totals differ beyond tolerance; use --force to override",
                style("blocked:").red()
            );
        }
        ConfirmStatus::Unresolved => {
            eprintln!(
                "{} unmatched lines remain; run validate or use --allow-partial",
                style("blocked:").red()
            );
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Args)]
pub struct RollbackArgs {
    /// Purchase id
    pub id: i64,
}

pub async fn rollback(args: RollbackArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let engine = ConfirmationEngine::new(store);
    let report = engine.rollback(args.id)?;

    if report.noop {
        eprintln!("{} already voided, nothing reversed", style("noop:").yellow());
    } else {
        eprintln!(
            "{} reversed {} ledger entries",
            style("ok:").green(),
            report.reverted.len()
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Args)]
pub struct ResendArgs {
    /// Purchase id
    pub id: i64,

    /// Write the missing deltas instead of previewing them
    #[arg(long)]
    pub apply: bool,
}

pub async fn resend(args: ResendArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let engine = ConfirmationEngine::new(store);
    let report = engine.resend_stock(args.id, args.apply)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Args)]
pub struct CancelArgs {
    /// Purchase id
    pub id: i64,
}

pub async fn cancel(args: CancelArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let engine = ConfirmationEngine::new(store);
    let status = engine.cancel(args.id)?;
    println!("purchase {} is now {}", args.id, status.as_str());
    Ok(())
}

#[derive(Args)]
pub struct ShowArgs {
    /// Purchase id
    pub id: i64,

    /// Include the extraction event trail
    #[arg(long)]
    pub events: bool,

    /// Include the ledger entries of this purchase
    #[arg(long)]
    pub ledger: bool,
}

pub async fn show(args: ShowArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;

    let draft = store.get_draft(args.id)?;
    println!("{}", serde_json::to_string_pretty(&draft)?);

    if args.events {
        let events = store.events_for(args.id)?;
        println!("{}", serde_json::to_string_pretty(&events)?);
    }

    if args.ledger {
        let entries = store.ledger_for_purchase(args.id)?;
        println!("{}", serde_json::to_string_pretty(&entries)?);
    }

    Ok(())
}
