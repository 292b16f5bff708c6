//! # Geobatch CLI
//!
//! Thin command-line front end: validate configuration, list the work items
//! a directory walk would produce, and run the photo transfer against the
//! local filesystem.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geobatch::backend::{DataType, LocalFileSystem, MemoryBackend};
use geobatch::config::ConfigManager;
use geobatch::constants::attributes;
use geobatch::logging::init_structured_logging;
use geobatch::models::BatchReport;
use geobatch::sources::{by_data_type, DirectoryWalker};
use geobatch::workflows::{photo_transfer, Backends};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "geobatch")]
#[command(about = "Batch geoprocessing pipelines")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: $GEOBATCH_CONFIG_DIR or ./config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Single configuration file, bypassing directory lookup
    #[arg(short = 'f', long, global = true, conflicts_with = "config_dir")]
    config_file: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration
    Validate,

    /// List the items a directory walk produces
    Inventory {
        root: PathBuf,

        /// Only items of this data type (feature_class, raster, image)
        #[arg(short, long)]
        data_type: Option<String>,

        /// Stay in the root directory
        #[arg(long)]
        no_recurse: bool,
    },

    /// Rename and copy survey photos to the master photo folder
    Photos,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "geobatch failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = match &cli.config_file {
        Some(path) => ConfigManager::load_file(path),
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("loading configuration")?;
    init_structured_logging(&manager.config().logging, manager.environment());

    match cli.command {
        Commands::Validate => {
            println!("Configuration OK ({})", manager.environment());
            println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
            Ok(())
        }
        Commands::Inventory {
            root,
            data_type,
            no_recurse,
        } => {
            let mut walker = DirectoryWalker::new(&root).recursive(!no_recurse);
            if let Some(data_type) = data_type {
                let data_type: DataType = data_type.parse().map_err(anyhow::Error::msg)?;
                walker = walker.filter(by_data_type(data_type));
            }
            for item in walker {
                println!(
                    "{}\t{}",
                    item.attribute_str(attributes::DATA_TYPE).unwrap_or("other"),
                    item.id
                );
            }
            Ok(())
        }
        Commands::Photos => {
            let backends = Backends::new(Arc::new(MemoryBackend::new()), Arc::new(LocalFileSystem::new()));
            let report = photo_transfer::run(manager.config(), &backends).await?;
            print_report(&report, cli.json)?;
            if let Some(error) = report.finalization_error() {
                return Err(error.into());
            }
            if !report.is_clean() {
                anyhow::bail!("{} of {} photos failed", report.failed, report.processed);
            }
            Ok(())
        }
    }
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{}: {} processed, {} succeeded, {} failed",
        report.pipeline, report.processed, report.succeeded, report.failed
    );
    for error in report.errors() {
        println!("  step {} {} [{}]: {}", error.step_index, error.operation, error.item_id, error.message);
    }
    Ok(())
}
