//! Config command - show, initialize, and locate the configuration.

use clap::{Args, Subcommand};
use console::style;

use remito_core::RemitoConfig;

use super::Context;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the paths in use
    Path,
}

pub async fn run(args: ConfigArgs, ctx: &Context) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&ctx.config)?);
        }
        ConfigCommand::Init { force } => {
            if ctx.config_path.exists() && !force {
                anyhow::bail!(
                    "config already exists at {} (use --force to overwrite)",
                    ctx.config_path.display()
                );
            }
            if let Some(parent) = ctx.config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            RemitoConfig::default().save(&ctx.config_path)?;
            println!(
                "{} default config at {}",
                style("Wrote").green(),
                ctx.config_path.display()
            );
        }
        ConfigCommand::Path => {
            println!("config: {}", ctx.config_path.display());
            println!("db:     {}", ctx.db_path.display());
        }
    }

    Ok(())
}
