use crate::constants;
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
}

/// Origin-site settings: where to query and how politely.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub graphql_url: String,
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub page_size: u32,
    pub probe_page_size: u32,
    pub probe_delay_ms: u64,
    pub page_delay_ms: u64,
    /// Advisory only: raises confidence in a verified area, never re-ranks candidates.
    pub region_keywords: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            graphql_url: constants::DEFAULT_GRAPHQL_URL.to_string(),
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            user_agent: constants::DEFAULT_USER_AGENT.to_string(),
            timeout_seconds: 30,
            page_size: 20,
            probe_page_size: 5,
            probe_delay_ms: 500,
            page_delay_ms: 1000,
            region_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub requests_per_min: u64,
    pub item_timeout_secs: u64,
    pub output_dir: String,
    pub store_path: Option<String>,
    pub allow_unverified_area: bool,
    pub skip_details: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            requests_per_min: 30,
            item_timeout_secs: 45,
            output_dir: "output".to_string(),
            store_path: None,
            allow_unverified_area: false,
            skip_details: false,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Absolute URL for a site-relative content path such as `/events/123`.
    pub fn absolute_url(&self, content_url: &str) -> String {
        if content_url.starts_with("http://") || content_url.starts_with("https://") {
            content_url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                content_url.trim_start_matches('/')
            )
        }
    }
}

impl PipelineConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }
}

impl Config {
    /// Loads `config.toml` from the working directory (defaults when absent),
    /// then applies `.env` and environment overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();
        let mut config = if Path::new(CONFIG_PATH).exists() {
            Self::from_file(CONFIG_PATH)?
        } else {
            debug!("No {} found, using defaults", CONFIG_PATH);
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("LISTING_GRAPHQL_URL") {
            self.source.graphql_url = v;
        }
        if let Ok(v) = std::env::var("LISTING_BASE_URL") {
            self.source.base_url = v;
        }
        if let Ok(v) = std::env::var("LISTING_WORKERS") {
            self.pipeline.workers = v
                .parse()
                .map_err(|_| ScraperError::Config(format!("LISTING_WORKERS is not a number: {v}")))?;
        }
        if let Ok(v) = std::env::var("LISTING_OUTPUT_DIR") {
            self.pipeline.output_dir = v;
        }
        if let Ok(v) = std::env::var("LISTING_STORE_PATH") {
            self.pipeline.store_path = Some(v);
        }
        Ok(())
    }

    /// The endpoint is configured statically; an empty one is a startup error, not a runtime search.
    pub fn validate(&self) -> Result<()> {
        if self.source.graphql_url.trim().is_empty() {
            return Err(ScraperError::Config("source.graphql_url must be set".to_string()));
        }
        if self.source.page_size == 0 || self.source.probe_page_size == 0 {
            return Err(ScraperError::Config("page sizes must be positive".to_string()));
        }
        if self.pipeline.workers == 0 {
            return Err(ScraperError::Config("pipeline.workers must be positive".to_string()));
        }
        Ok(())
    }
}
