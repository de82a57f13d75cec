//! Config command implementation.

use anyhow::{Context, bail};
use clap::Subcommand;
use colored::Colorize;
use tally_core::TallyConfig;
use tally_core::batch::BatchConfig;
use tally_core::config::BatchSection;

/// Config command actions.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration after files and environment
    Show,

    /// Write a configuration file with the default values
    Init {
        /// Write ~/.tally/config.toml instead of ./.tallyrc
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Execute config command.
pub fn execute(action: ConfigAction, config: &TallyConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => show(config),
        ConfigAction::Init { global, force } => init(global, force),
    }
}

fn show(config: &TallyConfig) -> anyhow::Result<()> {
    println!("{}", "Configuration sources".bold().cyan());
    for path in [TallyConfig::default_global_path(), TallyConfig::default_local_path()] {
        let marker = if path.exists() { "✓".green() } else { "-".dimmed() };
        println!("  {} {}", marker, path.display());
    }
    println!();

    let mut effective =
        TallyConfig { batch: BatchSection::from(&config.batch_config()), ..config.clone() };
    effective.output.format = Some(config.output.format().to_string());
    let rendered = toml::to_string_pretty(&effective).context("Failed to render configuration")?;
    println!("{}", rendered.trim_end());
    Ok(())
}

fn init(global: bool, force: bool) -> anyhow::Result<()> {
    let path = if global {
        TallyConfig::default_global_path()
    } else {
        TallyConfig::default_local_path()
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    // Worker count depends on the machine, so leave it unset
    let mut batch = BatchSection::from(&BatchConfig::default());
    batch.max_workers = None;
    let config = TallyConfig { batch, ..TallyConfig::default() };
    config
        .save_to_file(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}
