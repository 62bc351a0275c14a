//! countysync CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use countysync::{
    commands::{
        cmd_init, cmd_query, cmd_regions, cmd_status, cmd_sync, print_init_info,
        print_query_results, print_regions, print_status, print_sync_report, InitOptions,
        QueryOptions,
    },
    config::Config,
    error::{Error, Result},
    meta::SyncStore,
    progress::{finish_progress, sync_progress_bar, LogWriterFactory},
    query::QueryService,
    sync::SyncCoordinator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "countysync")]
#[command(version, about = "Local replica of county-level rolling averages", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the replica database (overrides the config location)
    #[arg(long, global = true, env = "COUNTYSYNC_DB")]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Bring every tracked file up to date with upstream
    Sync,

    /// Sync, then print the records of one region
    Query {
        /// Region (county) name
        #[arg(short, long)]
        region: Option<String>,

        /// Parent region (state) name
        #[arg(short, long)]
        parent: Option<String>,

        /// Only the most recent N days
        #[arg(short, long)]
        latest: Option<usize>,
    },

    /// List regions already in the replica
    Regions {
        /// Only regions within this parent region
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Show tracked files and their sync status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "countysync", &mut std::io::stdout());
        }

        Commands::Init { force } => {
            let (base_dir, config_path) = resolve_init_paths(cli.config.as_deref());
            let info = cmd_init(InitOptions {
                base_dir,
                config_path,
                db_path: cli.db,
                force,
            })
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_init_info(&info);
            }
        }

        Commands::Sync => {
            let (config, store) = open(cli.config.as_deref(), cli.db).await?;
            let progress = if cli.json {
                None
            } else {
                sync_progress_bar(config.files.len())
            };
            let mut coordinator = SyncCoordinator::from_config(&config, store)?;
            if let Some(pb) = &progress {
                coordinator = coordinator.with_progress_bar(pb.clone());
            }

            let report = cmd_sync(&coordinator).await;
            finish_progress(progress, "Files synced");

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sync_report(&report);
            }
        }

        Commands::Query {
            region,
            parent,
            latest,
        } => {
            let (config, store) = open(cli.config.as_deref(), cli.db).await?;
            let coordinator = SyncCoordinator::from_config(&config, store)?;
            let service = QueryService::new(Arc::new(coordinator));
            let options = QueryOptions {
                region,
                parent_region: parent,
                latest,
            };

            let result = cmd_query(&config, &service, options).await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_query_results(&result);
            }
        }

        Commands::Regions { parent } => {
            let (_, store) = open(cli.config.as_deref(), cli.db).await?;
            let regions = cmd_regions(&store, parent.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&regions)?);
            } else {
                print_regions(&regions);
            }
        }

        Commands::Status => {
            let (config, store) = open(cli.config.as_deref(), cli.db).await?;
            let status = cmd_status(&config, &store).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

/// Base directory and config file for init: a `.toml` path is used as-is,
/// any other path is treated as the base directory
fn resolve_init_paths(path: Option<&Path>) -> (PathBuf, PathBuf) {
    match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path.to_path_buf())
        }
        Some(dir) => (dir.to_path_buf(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    }
}

/// Load the config (applying a `--db` override) and connect to its database
async fn open(path: Option<&Path>, db: Option<PathBuf>) -> Result<(Config, SyncStore)> {
    let mut config = load_config(path)?;
    if let Some(db) = db {
        config = config.with_db_file(db);
    }
    let store = SyncStore::connect(&config.paths.db_file).await?;
    Ok((config, store))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
