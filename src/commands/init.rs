//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::SyncStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    /// Database location; defaults to `replica.db` in the base directory
    pub db_path: Option<PathBuf>,
    pub force: bool,
}

/// What init created
#[derive(Debug, Clone, Serialize)]
pub struct InitInfo {
    pub config_path: String,
    pub db_path: String,
    pub tracked_files: Vec<String>,
}

/// Write a default configuration and create the database schema
pub async fn cmd_init(options: InitOptions) -> Result<InitInfo> {
    let InitOptions {
        base_dir,
        config_path,
        db_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    if let Some(db_path) = db_path {
        config.paths.db_file = db_path;
    }

    config.validate()?;
    config.save()?;

    let store = SyncStore::connect(&config.paths.db_file).await?;
    store.ensure_schema().await?;
    info!("Initialized database at {:?}", config.paths.db_file);

    Ok(InitInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        tracked_files: config.files.clone(),
    })
}

pub fn print_init_info(info: &InitInfo) {
    println!("✓ countysync initialized successfully");
    println!("  Config: {}", info.config_path);
    println!("  Database: {}", info.db_path);
    println!("  Tracked files: {}", info.tracked_files.join(", "));
    println!("\nNext steps:");
    println!("  1. Edit the config file to choose tracked files");
    println!("  2. Sync: countysync sync");
    println!("  3. Query: countysync query --region King --parent Washington --latest 14");
}
