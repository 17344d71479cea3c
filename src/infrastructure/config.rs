//! Configuration infrastructure
//!
//! One JSON document holds every tunable of a harvesting run:
//! 1. `crawl` / `healing` - pacing, retry and repair knobs
//! 2. `inference` / `http` / `storage` - collaborator endpoints and paths
//! 3. `sources` - per-source search URLs, block heuristics and default selectors
//!
//! Missing sections fall back to [`defaults`], so older files keep loading.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub healing: HealingConfig,
    pub inference: InferenceConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub sources: Vec<SourceConfig>,
}

/// Multi-page driver and page retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Stop once this many unique records were collected for a source
    pub target_count: usize,

    /// Highest result page requested
    pub max_pages: u32,

    /// Stop after this many consecutive pages yield nothing new
    pub max_consecutive_empty_pages: u32,

    /// Fetch attempts per page before it is given up
    pub max_fetch_attempts: u32,

    /// Backoff before retry n is `n * backoff_unit_ms`
    pub backoff_unit_ms: u64,

    /// Randomized pause between page fetches
    pub page_delay_min_ms: u64,
    pub page_delay_max_ms: u64,
}

/// Selector repair settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Minimum spacing of repair attempts for one `(source, field)`
    pub cooldown_secs: u64,

    /// Maximum characters of element markup sent to the inference service
    pub snippet_max_chars: usize,

    /// Confidence assigned to a freshly repaired selector list
    pub healed_confidence: u8,

    /// Selector list cap per field
    pub max_selectors: usize,

    /// Upper bound for one inference call
    pub inference_timeout_secs: u64,
}

/// Selector-inference service (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key; the key itself is never stored
    pub api_key_env: String,
    pub temperature: f32,
}

/// HTTP fetcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

/// Durable state locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx SQLite URL; `None` keeps the catalog in memory (dry run)
    pub database_url: Option<String>,
    pub pattern_file: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,

    /// Log directory; defaults to `logs/` next to the executable
    pub directory: Option<PathBuf>,

    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Keep only the most recent log file (delete all others)
    pub keep_only_latest: bool,

    /// Hour offset of timestamps written to the logs
    pub utc_offset_hours: i32,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

/// One e-commerce source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,

    /// Search URL with `{query}` and `{page}` placeholders
    pub search_url_template: String,

    /// Base for resolving relative product and image links
    pub base_url: String,

    /// Selector locating every listing card on a result page
    pub candidate_selector: String,

    /// Card attribute carrying the product identifier (e.g. `data-asin`)
    #[serde(default)]
    pub identifier_attribute: Option<String>,

    /// Body substrings that mark an anti-automation page
    #[serde(default = "defaults::block_markers")]
    pub block_markers: Vec<String>,

    /// Bodies shorter than this are treated as blocked
    #[serde(default = "defaults::min_body_bytes")]
    pub min_body_bytes: usize,

    /// Built-in selectors per field, tried after learned ones
    #[serde(default)]
    pub default_selectors: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub category: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            target_count: defaults::TARGET_COUNT,
            max_pages: defaults::MAX_PAGES,
            max_consecutive_empty_pages: defaults::MAX_CONSECUTIVE_EMPTY_PAGES,
            max_fetch_attempts: defaults::MAX_FETCH_ATTEMPTS,
            backoff_unit_ms: defaults::BACKOFF_UNIT_MS,
            page_delay_min_ms: defaults::PAGE_DELAY_MIN_MS,
            page_delay_max_ms: defaults::PAGE_DELAY_MAX_MS,
        }
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::HEAL_COOLDOWN_SECS,
            snippet_max_chars: defaults::SNIPPET_MAX_CHARS,
            healed_confidence: defaults::HEALED_CONFIDENCE,
            max_selectors: defaults::MAX_SELECTORS,
            inference_timeout_secs: defaults::INFERENCE_TIMEOUT_SECS,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: defaults::INFERENCE_ENDPOINT.to_string(),
            model: defaults::INFERENCE_MODEL.to_string(),
            api_key_env: defaults::INFERENCE_API_KEY_ENV.to_string(),
            temperature: 0.0,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            follow_redirects: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = ConfigManager::get_app_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            database_url: Some(format!("sqlite:{}", data_dir.join("catalog.db").display())),
            pattern_file: data_dir.join("selector_patterns.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            directory: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            keep_only_latest: defaults::LOG_KEEP_ONLY_LATEST,
            utc_offset_hours: defaults::LOG_UTC_OFFSET_HOURS,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("catalog_harvester".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl CrawlConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(u64::from(attempt)))
    }
}

impl HealingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.crawl.max_fetch_attempts == 0 {
            bail!("crawl.max_fetch_attempts must be at least 1");
        }
        if self.crawl.page_delay_min_ms > self.crawl.page_delay_max_ms {
            bail!(
                "crawl.page_delay_min_ms ({}) exceeds page_delay_max_ms ({})",
                self.crawl.page_delay_min_ms,
                self.crawl.page_delay_max_ms
            );
        }
        if !(1..=defaults::MAX_SELECTORS).contains(&self.healing.max_selectors) {
            bail!(
                "healing.max_selectors must be within 1..={}, got {}",
                defaults::MAX_SELECTORS,
                self.healing.max_selectors
            );
        }
        if self.healing.healed_confidence > 100 {
            bail!("healing.healed_confidence must be within 0..=100");
        }
        if self.http.max_requests_per_second == 0 {
            bail!("http.max_requests_per_second must be greater than 0");
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                bail!("duplicate source name: {}", source.name);
            }
            if !source.search_url_template.contains("{query}") {
                bail!("source {} search_url_template lacks a {{query}} placeholder", source.name);
            }
            if source.candidate_selector.trim().is_empty() {
                bail!("source {} has an empty candidate_selector", source.name);
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(data_dir)
    }

    /// Manager for the default config location
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: Self::get_config_dir()?.join("config.json"),
        })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("Configuration file unreadable: {}", parse_error);
                warn!("Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "catalog-harvester";

    // Crawl
    pub const TARGET_COUNT: usize = 100;
    pub const MAX_PAGES: u32 = 10;
    pub const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 3;
    pub const MAX_FETCH_ATTEMPTS: u32 = 3;
    pub const BACKOFF_UNIT_MS: u64 = 2000;
    pub const PAGE_DELAY_MIN_MS: u64 = 2000;
    pub const PAGE_DELAY_MAX_MS: u64 = 5000;

    // Healing
    pub const HEAL_COOLDOWN_SECS: u64 = 30;
    pub const SNIPPET_MAX_CHARS: usize = 5000;
    pub const HEALED_CONFIDENCE: u8 = crate::domain::constants::patterns::HEALED_CONFIDENCE_BASELINE;
    pub const MAX_SELECTORS: usize = crate::domain::constants::patterns::MAX_SELECTORS_PER_FIELD;
    pub const INFERENCE_TIMEOUT_SECS: u64 = 30;

    // Inference
    pub const INFERENCE_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
    pub const INFERENCE_MODEL: &str = "gpt-4o-mini";
    pub const INFERENCE_API_KEY_ENV: &str = "SELECTOR_INFERENCE_API_KEY";

    // HTTP
    pub const USER_AGENT: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 2;

    // Sources
    pub const MIN_BODY_BYTES: usize = 2048;
    pub const BLOCK_MARKERS: &[&str] = &[
        "captcha",
        "robot check",
        "are you a human",
        "unusual traffic",
        "access denied",
        "request blocked",
    ];

    pub fn block_markers() -> Vec<String> {
        BLOCK_MARKERS.iter().map(|s| s.to_string()).collect()
    }

    pub fn min_body_bytes() -> usize {
        MIN_BODY_BYTES
    }

    // Logging
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_NAME: &str = "catalog-harvester.log";
    pub const LOG_MAX_FILES: u32 = 5;
    pub const LOG_AUTO_CLEANUP: bool = true;
    pub const LOG_KEEP_ONLY_LATEST: bool = false;
    pub const LOG_UTC_OFFSET_HOURS: i32 = 9;
}
