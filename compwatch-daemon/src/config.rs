//! Environment configuration.
//!
//! Values come from the process environment, after an optional `.env` file in
//! the working directory has been loaded. Every variable has a default except
//! `COMPWATCH_API_KEY`, which is required once `COMPWATCH_API_URL` selects the
//! REST backend.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use compwatch_core::{FileInventory, Inventory, RegisterCatalog};
use compwatch_gateway::{GatewayClient, GatewayReader, ReadMode};
use compwatch_sync::{FileStore, RestStore, Store, SyncOptions};

use crate::error::{config_err, DaemonError};

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:5999";
pub const DEFAULT_DEVICE_PORT: u16 = 8193;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1800);
pub const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_PER_ITEM_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_STORE_DIR: &str = "./compwatch-data";
/// Inventory file looked up inside the store directory when no other source is set.
pub const DEFAULT_INVENTORY_NAME: &str = "machines.yaml";

/// Where baselines and change history live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    File { dir: PathBuf },
    Rest { url: String, api_key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub gateway_url: String,
    pub device_port: u16,
    pub poll_interval: Duration,
    pub error_cooldown: Duration,
    pub catalog: RegisterCatalog,
    pub read_mode: ReadMode,
    pub store: StoreConfig,
    pub inventory_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn load() -> Result<Self, DaemonError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DaemonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let tool_start = parse_or(&get, "COMPWATCH_TOOL_RANGE_START", 1u16)?;
        let tool_end = parse_or(&get, "COMPWATCH_TOOL_RANGE_END", 100u16)?;
        let catalog = RegisterCatalog::new(tool_start, tool_end)?;

        let read_mode = match get("COMPWATCH_READ_MODE") {
            None => ReadMode::Ranged,
            Some(raw) => raw
                .parse::<ReadMode>()
                .map_err(|e| config_err(format!("COMPWATCH_READ_MODE: {e}")))?,
        };
        let read_mode = match read_mode {
            ReadMode::PerItem { .. } => ReadMode::PerItem {
                delay: millis_or(&get, "COMPWATCH_PER_ITEM_DELAY_MS", DEFAULT_PER_ITEM_DELAY)?,
            },
            ranged => ranged,
        };

        let store = match get("COMPWATCH_API_URL") {
            Some(url) => {
                let api_key = get("COMPWATCH_API_KEY").ok_or_else(|| {
                    config_err("COMPWATCH_API_KEY is required when COMPWATCH_API_URL is set")
                })?;
                StoreConfig::Rest { url, api_key }
            }
            None => StoreConfig::File {
                dir: get("COMPWATCH_STORE_DIR")
                    .unwrap_or_else(|| DEFAULT_STORE_DIR.to_string())
                    .into(),
            },
        };

        let log_format = match get("COMPWATCH_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(config_err(format!(
                    "COMPWATCH_LOG_FORMAT: unknown format '{other}'; expected: text, json"
                )))
            }
        };

        Ok(Self {
            gateway_url: get("COMPWATCH_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            device_port: parse_or(&get, "COMPWATCH_DEVICE_PORT", DEFAULT_DEVICE_PORT)?,
            poll_interval: secs_or(&get, "COMPWATCH_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL)?,
            error_cooldown: secs_or(
                &get,
                "COMPWATCH_ERROR_COOLDOWN_SECS",
                DEFAULT_ERROR_COOLDOWN,
            )?,
            catalog,
            read_mode,
            store,
            inventory_file: get("COMPWATCH_INVENTORY_FILE").map(PathBuf::from),
            log_format,
        })
    }

    pub fn reader(&self) -> GatewayReader {
        GatewayReader::new(GatewayClient::new(&self.gateway_url), self.device_port)
    }

    pub fn open_store(&self) -> Result<Store, DaemonError> {
        Ok(match &self.store {
            StoreConfig::File { dir } => Store::File(FileStore::open(dir)?),
            StoreConfig::Rest { url, api_key } => Store::Rest(RestStore::new(url, api_key)),
        })
    }

    /// Machine list source: the inventory file if set, else the REST
    /// `machines` table, else `machines.yaml` in the store directory.
    pub fn inventory(&self) -> Box<dyn Inventory + Send> {
        if let Some(path) = &self.inventory_file {
            return Box::new(FileInventory::new(path));
        }
        match &self.store {
            StoreConfig::Rest { url, api_key } => {
                Box::new(compwatch_sync::RestInventory::new(url, api_key))
            }
            StoreConfig::File { dir } => {
                Box::new(FileInventory::new(dir.join(DEFAULT_INVENTORY_NAME)))
            }
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            catalog: self.catalog.clone(),
            read_mode: self.read_mode,
            ..Default::default()
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, DaemonError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| config_err(format!("{key}: invalid value '{raw}': {e}"))),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, DaemonError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, DaemonError>
where
    G: Fn(&str) -> Option<String>,
{
    let millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(get, key, millis).map(Duration::from_millis)
}
