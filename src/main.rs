// Forge CLI - resolve and inspect host inventories

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forge::diagnostics::Diagnostics;
use forge::inventory::{
    discover_inventory_files, parse_inventory_files_with, Inventory, InventoryFile, ResolveOptions,
};
use forge::output::{configure_colors, render_diagnostics, render_inventory, OutputFormat};

#[derive(Parser)]
#[command(
    name = "forge",
    about = "Resolve hosts, groups and variables from inventory files",
    version,
    author,
    disable_colored_help = true,
    term_width = 0,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Resolve hosts one at a time instead of in parallel
    #[arg(long, global = true)]
    no_parallel: bool,

    /// Treat warnings as errors
    #[arg(long, global = true)]
    strict: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
#[command(disable_colored_help = true)]
enum Commands {
    /// Print resolved hosts and groups
    Inventory {
        /// Inventory files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Target pattern (e.g. "webservers:&production:!web3")
        #[arg(short, long, default_value = "all")]
        target: String,

        /// Show resolved variables
        #[arg(long)]
        vars: bool,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check inventory files and report diagnostics
    Validate {
        /// Inventory files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    configure_colors(!cli.no_color);

    let options = ResolveOptions {
        parallel: !cli.no_parallel,
        strict_warnings: cli.strict,
    };

    let ok = match cli.command {
        Commands::Inventory {
            paths,
            target,
            vars,
            format,
        } => list_inventory(&paths, &options, &target, vars, format)?,
        Commands::Validate { paths } => validate_inventory(&paths, &options)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| "forge=warn".into()),
        1 => "forge=debug".into(),
        _ => "forge=trace".into(),
    };

    // stdout is reserved for inventory output
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Discover and resolve files, printing any diagnostics to stderr
fn build_inventory(
    paths: &[PathBuf],
    options: &ResolveOptions,
) -> Result<(Option<Inventory>, Diagnostics)> {
    let files = discover_inventory_files(paths).context("failed to collect inventory files")?;
    debug!(files = files.len(), "resolving inventory");

    let (inventory, diags) = parse_inventory_files_with(&files, options);
    if !diags.is_empty() {
        eprint!("{}", render_diagnostics(&diags, &sources(&files)));
    }
    Ok((inventory, diags))
}

fn sources(files: &[InventoryFile]) -> HashMap<String, String> {
    files
        .iter()
        .map(|f| (f.name(), f.content.clone()))
        .collect()
}

fn list_inventory(
    paths: &[PathBuf],
    options: &ResolveOptions,
    target: &str,
    show_vars: bool,
    format: OutputFormat,
) -> Result<bool> {
    let (inventory, _) = build_inventory(paths, options)?;
    let Some(inventory) = inventory else {
        return Ok(false);
    };

    let hosts = inventory.select(target)?;
    print!("{}", render_inventory(&inventory, &hosts, format, show_vars));
    if format == OutputFormat::Json {
        println!();
    }
    Ok(true)
}

fn validate_inventory(paths: &[PathBuf], options: &ResolveOptions) -> Result<bool> {
    let (inventory, _) = build_inventory(paths, options)?;
    match inventory {
        Some(inventory) => {
            println!(
                "{} Inventory is valid ({} hosts, {} groups)",
                "✓".green(),
                inventory.hosts().len(),
                inventory.groups().len()
            );
            Ok(true)
        }
        None => {
            println!("{} Inventory is invalid", "✗".red());
            Ok(false)
        }
    }
}
