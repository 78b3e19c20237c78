//! Catalog command - seed suppliers and products.
//!
//! This is the narrow glue interface that feeds the read-only catalog
//! lookup; full product management lives elsewhere.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;
use serde::Deserialize;

use super::Context;

#[derive(Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommand,
}

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// Register a supplier
    AddSupplier {
        /// Supplier id (short slug)
        id: String,
        /// Display name
        name: String,
    },

    /// Import products from a CSV with `sku,title` columns
    Import {
        /// CSV file
        file: PathBuf,

        /// Supplier the products belong to
        #[arg(short, long)]
        supplier: String,
    },
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    sku: String,
    title: String,
}

pub async fn run(args: CatalogArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store()?;

    match args.command {
        CatalogCommand::AddSupplier { id, name } => {
            store.add_supplier(&id, &name)?;
            println!("supplier '{}' registered", id);
        }
        CatalogCommand::Import { file, supplier } => {
            let mut reader = csv::Reader::from_path(&file)?;
            let mut imported = 0usize;
            let mut skipped = 0usize;

            for row in reader.deserialize::<ProductRow>() {
                match row {
                    Ok(row) if !row.sku.trim().is_empty() => {
                        store.add_product(&supplier, row.sku.trim(), row.title.trim())?;
                        imported += 1;
                    }
                    _ => skipped += 1,
                }
            }

            println!(
                "{} {} products for '{}' ({} rows skipped)",
                style("Imported").green(),
                imported,
                supplier,
                skipped
            );
        }
    }

    Ok(())
}
