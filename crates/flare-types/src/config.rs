//! Configuration loading for flare.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/flare/config.toml.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Weekday;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::FlareError;

/// TLS certificate verification mode for backend connections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Verify the server certificate (default)
    #[default]
    Peer,
    /// Accept any certificate
    None,
}

/// Search backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolrSettings {
    /// Full backend URL. When set, scheme/hostname/path are ignored.
    #[serde(default)]
    pub url: Option<String>,

    /// Scheme used when composing the URL from its parts
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Host (and port). May itself start with "http".
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Path to the core, e.g. "/solr/default"
    #[serde(default = "default_path")]
    pub path: String,

    /// Distinct URL for the write connection (e.g. primary vs. read replica)
    #[serde(default)]
    pub write_url: Option<String>,

    /// Basic-auth user for the write connection
    #[serde(default)]
    pub user: Option<String>,

    /// Basic-auth password for the write connection
    #[serde(default)]
    pub pass: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: f64,

    /// Connect timeout in seconds
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: f64,

    /// Request timeout for the write connection; defaults to `read_timeout_secs`
    #[serde(default)]
    pub write_timeout_secs: Option<f64>,

    /// Connect timeout for the write connection; defaults to `open_timeout_secs`
    #[serde(default)]
    pub write_open_timeout_secs: Option<f64>,

    #[serde(default)]
    pub verify_mode: VerifyMode,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_hostname() -> String {
    "localhost:8983".to_string()
}

fn default_path() -> String {
    "/solr/default".to_string()
}

fn default_read_timeout() -> f64 {
    10.0
}

fn default_open_timeout() -> f64 {
    2.0
}

impl Default for SolrSettings {
    fn default() -> Self {
        Self {
            url: None,
            scheme: default_scheme(),
            hostname: default_hostname(),
            path: default_path(),
            write_url: None,
            user: None,
            pass: None,
            read_timeout_secs: default_read_timeout(),
            open_timeout_secs: default_open_timeout(),
            write_timeout_secs: None,
            write_open_timeout_secs: None,
            verify_mode: VerifyMode::default(),
        }
    }
}

impl SolrSettings {
    /// URL of the read (query) connection.
    pub fn read_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.trim_end_matches('/').to_string();
        }
        let mut url = if self.hostname.starts_with("http") {
            self.hostname.clone()
        } else {
            format!("{}://{}", self.scheme, self.hostname)
        };
        url.push_str(&self.path);
        url.trim_end_matches('/').to_string()
    }

    /// URL of the write (mutation) connection.
    pub fn write_url(&self) -> String {
        match &self.write_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => self.read_url(),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.read_timeout_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_read_timeout()))
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.open_timeout_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_open_timeout()))
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or_else(|| self.read_timeout())
    }

    pub fn write_open_timeout(&self) -> Duration {
        self.write_open_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or_else(|| self.open_timeout())
    }
}

/// Per-entity-type index settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeSettings {
    /// Prefix applied to ids when building uids
    #[serde(default)]
    pub uid_prefix: Option<String>,

    /// Scope filter, rendered as `field:value` fragments
    #[serde(default)]
    pub scope: BTreeMap<String, String>,
}

impl TypeSettings {
    /// Scope fragments in `field:value` form, ordered by field name.
    pub fn scope_fragments(&self) -> Vec<String> {
        self.scope
            .iter()
            .map(|(field, value)| format!("{}:{}", field, value))
            .collect()
    }
}

/// Coalescer and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Lane (dedupe scope) the coalescer enqueues into
    #[serde(default = "default_lane")]
    pub lane: String,

    /// Number of concurrent worker tasks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Force a hard commit after this many completed executions
    #[serde(default = "default_commit_every")]
    pub commit_every: u64,

    /// How long an idle worker waits before polling again
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Cron expression for the periodic commit_if_dirty job (6-field)
    #[serde(default)]
    pub commit_cron: Option<String>,

    /// Whether the cron commit is a soft commit
    #[serde(default)]
    pub soft_commit: bool,

    /// Timezone for the cron schedule (IANA name)
    #[serde(default = "default_cron_timezone")]
    pub timezone: String,
}

fn default_lane() -> String {
    "indexer".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_commit_every() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_cron_timezone() -> String {
    "UTC".to_string()
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            lane: default_lane(),
            workers: default_workers(),
            commit_every: default_commit_every(),
            poll_interval_ms: default_poll_interval_ms(),
            commit_cron: None,
            soft_commit: false,
            timezone: default_cron_timezone(),
        }
    }
}

/// Business-hours throttle window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleSettings {
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,

    #[serde(default = "default_end_hour")]
    pub end_hour: u32,

    /// IANA zone ("America/New_York") or fixed offset ("-05:00")
    #[serde(default = "default_throttle_timezone")]
    pub timezone: String,

    #[serde(default = "default_excluded_weekdays")]
    pub excluded_weekdays: Vec<Weekday>,

    /// Minimum spacing between executions inside the window
    #[serde(default = "default_min_spacing")]
    pub min_spacing_secs: u64,

    /// Sleep until the window closes instead of spacing executions
    #[serde(default)]
    pub defer_until_close: bool,
}

fn default_start_hour() -> u32 {
    8
}

fn default_end_hour() -> u32 {
    17
}

fn default_throttle_timezone() -> String {
    "UTC".to_string()
}

fn default_excluded_weekdays() -> Vec<Weekday> {
    vec![Weekday::Sat, Weekday::Sun]
}

fn default_min_spacing() -> u64 {
    15
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            timezone: default_throttle_timezone(),
            excluded_weekdays: default_excluded_weekdays(),
            min_spacing_secs: default_min_spacing(),
            defer_until_close: false,
        }
    }
}

impl ThrottleSettings {
    pub fn min_spacing(&self) -> Duration {
        Duration::from_secs(self.min_spacing_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_hour > 23 {
            return Err(format!("start_hour must be 0-23, got {}", self.start_hour));
        }
        if self.end_hour > 24 {
            return Err(format!("end_hour must be 0-24, got {}", self.end_hour));
        }
        if self.start_hour >= self.end_hour {
            return Err(format!(
                "start_hour ({}) must be before end_hour ({})",
                self.start_hour, self.end_hour
            ));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub solr: SolrSettings,

    /// Default uid prefix for types without their own
    #[serde(default)]
    pub uid_prefix: Option<String>,

    /// Per-type settings keyed by type name
    #[serde(default)]
    pub types: HashMap<String, TypeSettings>,

    #[serde(default)]
    pub indexer: IndexerSettings,

    /// Business-hours throttle; absent means no throttling
    #[serde(default)]
    pub throttle: Option<ThrottleSettings>,

    /// When true the backend is never contacted
    #[serde(default)]
    pub disabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            solr: SolrSettings::default(),
            uid_prefix: None,
            types: HashMap::new(),
            indexer: IndexerSettings::default(),
            throttle: None,
            disabled: false,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/flare/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (FLARE_*, nested keys separated by `__`)
    /// 5. SOLR_URL / WEBSOLR_URL for the backend URL
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, FlareError> {
        let config_dir = ProjectDirs::from("", "", "flare")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| FlareError::Config(e.to_string()))?
            .set_default("indexer.lane", default_lane())
            .map_err(|e| FlareError::Config(e.to_string()))?
            .set_default("indexer.commit_every", default_commit_every() as i64)
            .map_err(|e| FlareError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: FLARE_SOLR__HOSTNAME, FLARE_INDEXER__WORKERS, FLARE_DISABLED, etc.
        builder = builder.add_source(
            Environment::with_prefix("FLARE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = solr_url_from_env() {
            builder = builder
                .set_override("solr.url", url)
                .map_err(|e| FlareError::Config(e.to_string()))?;
        }

        let config = builder
            .build()
            .map_err(|e| FlareError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| FlareError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings pointing at a single backend URL, everything else default.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            solr: SolrSettings {
                url: Some(url.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), FlareError> {
        if self.indexer.workers == 0 {
            return Err(FlareError::Config("indexer.workers must be > 0".to_string()));
        }
        if self.indexer.commit_every == 0 {
            return Err(FlareError::Config(
                "indexer.commit_every must be > 0".to_string(),
            ));
        }
        if self.indexer.lane.trim().is_empty() {
            return Err(FlareError::Config("indexer.lane must not be empty".to_string()));
        }
        for (name, secs) in [
            ("solr.read_timeout_secs", Some(self.solr.read_timeout_secs)),
            ("solr.open_timeout_secs", Some(self.solr.open_timeout_secs)),
            ("solr.write_timeout_secs", self.solr.write_timeout_secs),
            ("solr.write_open_timeout_secs", self.solr.write_open_timeout_secs),
        ] {
            let Some(secs) = secs else { continue };
            if !(secs.is_finite() && secs > 0.0) {
                return Err(FlareError::Config(format!("{} must be > 0, got {}", name, secs)));
            }
        }
        if let Some(throttle) = &self.throttle {
            throttle
                .validate()
                .map_err(|e| FlareError::Config(format!("throttle: {}", e)))?;
        }
        Ok(())
    }

    /// Effective settings for a type; falls back to the global uid prefix.
    pub fn type_settings(&self, type_name: &str) -> TypeSettings {
        // Environment sources lowercase their keys.
        let mut settings = self
            .types
            .get(type_name)
            .or_else(|| {
                self.types
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(type_name))
                    .map(|(_, settings)| settings)
            })
            .cloned()
            .unwrap_or_default();
        if settings.uid_prefix.as_deref().map_or(true, str::is_empty) {
            settings.uid_prefix = self.uid_prefix.clone();
        }
        settings
    }
}

fn solr_url_from_env() -> Option<String> {
    std::env::var("SOLR_URL")
        .or_else(|_| std::env::var("WEBSOLR_URL"))
        .ok()
        .filter(|url| !url.is_empty())
}
