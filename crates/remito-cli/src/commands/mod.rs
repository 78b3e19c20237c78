//! CLI subcommands.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod purchase;

use std::path::PathBuf;

use remito_core::{PurchaseStore, RemitoConfig};

/// Shared command context: resolved config and the opened store.
pub struct Context {
    pub config: RemitoConfig,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    store: std::sync::OnceLock<PurchaseStore>,
}

impl Context {
    pub fn new(config_path: Option<&str>, db_path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);

        let config = if config_path.exists() {
            RemitoConfig::from_file(&config_path)?
        } else {
            RemitoConfig::default()
        };

        let db_path = db_path.map(PathBuf::from).unwrap_or_else(default_db_path);

        Ok(Self {
            config,
            config_path,
            db_path,
            store: std::sync::OnceLock::new(),
        })
    }

    /// Open the store lazily; commands that never touch it (config) stay
    /// free of filesystem side effects.
    pub fn store(&self) -> anyhow::Result<&PurchaseStore> {
        if self.store.get().is_none() {
            let opened = PurchaseStore::open(&self.db_path)?;
            let _ = self.store.set(opened);
        }
        self.store
            .get()
            .ok_or_else(|| anyhow::anyhow!("store initialization raced"))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remito")
}

pub fn default_db_path() -> PathBuf {
    data_dir().join("remito.db")
}

pub fn default_config_path() -> PathBuf {
    data_dir().join("config.json")
}
