use crate::constants::{
    DDB_BASE_URL, DEFAULT_CONFIG_FILE, DEFAULT_OUTPUT_DIR, DEFAULT_USER_AGENT,
    DEFAULT_WEBDRIVER_URL, FIVETOOLS_BASE_URL,
};
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Everything a run needs, passed explicitly instead of module-level constants.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub timing: TimingConfig,
    pub sites: SiteConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub window_size: (u32, u32),
    pub disable_images: bool,
    /// WebDriver page load strategy: "normal", "eager" or "none".
    pub page_load_strategy: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_size: (1200, 900),
            disable_images: true,
            page_load_strategy: "eager".to_string(),
        }
    }
}

/// Wait bounds and throttle ranges. Milliseconds unless the name says seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub max_wait_secs: u64,
    pub toggle_wait_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub page_delay_min_ms: u64,
    pub page_delay_max_ms: u64,
    pub item_delay_ms: u64,
    pub max_scroll_rounds: usize,
    pub fivetools_max_wait_secs: u64,
    pub fivetools_row_wait_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_max_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 20,
            toggle_wait_secs: 5,
            delay_min_ms: 800,
            delay_max_ms: 1800,
            page_delay_min_ms: 2000,
            page_delay_max_ms: 4000,
            item_delay_ms: 10,
            max_scroll_rounds: 5,
            fivetools_max_wait_secs: 20,
            fivetools_row_wait_secs: 3,
            poll_interval_ms: 150,
            poll_max_interval_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn toggle_wait(&self) -> Duration {
        Duration::from_secs(self.toggle_wait_secs)
    }

    pub fn fivetools_max_wait(&self) -> Duration {
        Duration::from_secs(self.fivetools_max_wait_secs)
    }

    pub fn fivetools_row_wait(&self) -> Duration {
        Duration::from_secs(self.fivetools_row_wait_secs)
    }

    pub fn delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.delay_min_ms),
            Duration::from_millis(self.delay_max_ms),
        )
    }

    pub fn page_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.page_delay_min_ms),
            Duration::from_millis(self.page_delay_max_ms),
        )
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn backoff(&self) -> crate::wait::Backoff {
        crate::wait::Backoff::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.poll_max_interval_ms),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub ddb_base_url: String,
    pub fivetools_base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            ddb_base_url: DDB_BASE_URL.to_string(),
            fivetools_base_url: FIVETOOLS_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop after this many collected rows. Zero or absent means no limit.
    pub limit: Option<usize>,
    /// Join 5e.tools short source codes onto spells and magic items.
    pub enrich: bool,
    /// Visit every 5e.tools row instead of stopping once all collected names match.
    pub scrape_all_fivetools: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            limit: None,
            enrich: true,
            scrape_all_fivetools: true,
        }
    }
}

impl RunConfig {
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&n| n > 0)
    }
}

impl Config {
    /// Load from an explicit path, or from the default file when it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("WEBDRIVER_URL") {
            if !url.trim().is_empty() {
                self.browser.webdriver_url = url.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        if t.delay_min_ms > t.delay_max_ms {
            return Err(ScraperError::Config(format!(
                "timing.delay_min_ms ({}) exceeds timing.delay_max_ms ({})",
                t.delay_min_ms, t.delay_max_ms
            )));
        }
        if t.page_delay_min_ms > t.page_delay_max_ms {
            return Err(ScraperError::Config(format!(
                "timing.page_delay_min_ms ({}) exceeds timing.page_delay_max_ms ({})",
                t.page_delay_min_ms, t.page_delay_max_ms
            )));
        }
        if !matches!(self.browser.page_load_strategy.as_str(), "normal" | "eager" | "none") {
            return Err(ScraperError::Config(format!(
                "browser.page_load_strategy must be normal, eager or none (got '{}')",
                self.browser.page_load_strategy
            )));
        }
        Ok(())
    }
}
