use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use menagerie::config::Config;
use menagerie::driver::{self, PluginRequest};
use menagerie::plugins::{discover_modules, AllocationStrategy};

/// Menagerie - loads animal plugins and lets them introduce themselves
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Plugin modules to load, by name or by path
    plugins: Vec<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Allocation strategy for the constructed animals
    #[arg(short, long, value_enum)]
    strategy: Option<AllocationStrategy>,

    /// Name given to every animal
    #[arg(short = 'a', long = "arg")]
    constructor_arg: Option<String>,

    /// Extra directory to search for plugins (repeatable, searched first)
    #[arg(short = 'I', long = "search-path")]
    search_paths: Vec<PathBuf>,

    /// Load every plugin library found in this directory
    #[arg(long, conflicts_with = "plugins")]
    discover: Option<PathBuf>,

    /// Print the batch report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout only carries what the animals say
    let log_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_default()?
    };

    // Command line overrides
    if let Some(strategy) = args.strategy {
        config.driver.strategy = strategy;
    }
    if let Some(arg) = args.constructor_arg {
        config.driver.constructor_arg = arg;
    }
    if !args.search_paths.is_empty() {
        let mut search_paths = args.search_paths;
        search_paths.append(&mut config.plugins.search_paths);
        config.plugins.search_paths = search_paths;
    }

    let strategy = config.driver.strategy;
    let mut factory = config.plugins.factory();

    let report = if let Some(dir) = &args.discover {
        let modules = discover_modules(dir)
            .with_context(|| format!("Failed to read plugin directory {}", dir.display()))?;
        info!("Discovered {} plugins in {}", modules.len(), dir.display());
        driver::run_discovered(&mut factory, &modules, strategy)
    } else {
        let names = if args.plugins.is_empty() {
            config.driver.plugins.clone()
        } else {
            args.plugins
        };
        if names.is_empty() {
            warn!("No plugins requested");
        }

        let requests = names
            .iter()
            .map(|name| PluginRequest::new(name.as_str(), &config.driver.constructor_arg))
            .collect::<Result<Vec<_>, _>>()
            .context("Constructor argument must not contain NUL bytes")?;
        driver::run_batch(&mut factory, &requests, strategy)
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        for line in report.lines() {
            println!("{line}");
        }
    }

    info!(
        "{} of {} plugins constructed ({} strategy)",
        report.succeeded(),
        report.entries.len(),
        strategy
    );

    // Failed plugins are reported, not fatal
    Ok(())
}
