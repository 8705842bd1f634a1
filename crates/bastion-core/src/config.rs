use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_JOB_TYPE: &str = "maintenance";
pub const DEFAULT_MAX_WHITELIST_IPS: usize = 64; // per schedule request
pub const DEFAULT_ACTIVATION_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Top-level config (bastion.toml + BASTION_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BastionConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long a writer waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Job type names accepted by `schedule`. Each must name a known job kind.
    #[serde(default = "default_job_types")]
    pub job_types: Vec<String>,
    /// Upper bound on whitelist addresses in a single request.
    #[serde(default = "default_max_whitelist_ips")]
    pub max_whitelist_ips: usize,
    /// Tick cadence of the window activator.
    #[serde(default = "default_activation_interval_secs")]
    pub activation_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_types: default_job_types(),
            max_whitelist_ips: DEFAULT_MAX_WHITELIST_IPS,
            activation_interval_secs: DEFAULT_ACTIVATION_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Effective-restriction snapshots older than this are treated as a miss.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

fn default_job_types() -> Vec<String> {
    vec![DEFAULT_JOB_TYPE.to_string()]
}
fn default_max_whitelist_ips() -> usize {
    DEFAULT_MAX_WHITELIST_IPS
}
fn default_activation_interval_secs() -> u64 {
    DEFAULT_ACTIVATION_INTERVAL_SECS
}
fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.bastion/bastion.db", home)
}

impl BastionConfig {
    /// Load config from a TOML file with BASTION_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `BASTION_SCHEDULER__MAX_WHITELIST_IPS=16`. A missing file is not an
    /// error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading configuration");

        let config: BastionConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BASTION_").split("__"))
            .extract()
            .map_err(|e| crate::error::BastionError::Config(e.to_string()))?;

        if config.scheduler.job_types.is_empty() {
            return Err(crate::error::BastionError::Config(
                "scheduler.job_types must name at least one job type".to_string(),
            ));
        }

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.bastion/bastion.toml", home)
}
