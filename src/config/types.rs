use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Theme Harvester
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Worker pool sizes
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of workers scraping listing metadata
    #[serde(rename = "metadata-scrapers", default = "default_metadata_scrapers")]
    pub metadata_scrapers: usize,

    /// Number of workers downloading and analyzing packages
    #[serde(rename = "package-analyzers", default = "default_package_analyzers")]
    pub package_analyzers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            metadata_scrapers: default_metadata_scrapers(),
            package_analyzers: default_package_analyzers(),
        }
    }
}

/// Per-stage enable flags
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    #[serde(rename = "scrape-metadata", default = "enabled")]
    pub scrape_metadata: bool,

    #[serde(rename = "analyze-packages", default = "enabled")]
    pub analyze_packages: bool,

    /// Write periodic metadata checkpoints to the log directory
    #[serde(rename = "checkpoint-metadata", default = "enabled")]
    pub checkpoint_metadata: bool,

    /// Write periodic theme and failure checkpoints to the log directory
    #[serde(rename = "checkpoint-packages", default = "enabled")]
    pub checkpoint_packages: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            scrape_metadata: true,
            analyze_packages: true,
            checkpoint_metadata: true,
            checkpoint_packages: true,
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "enabled")]
    pub headless: bool,

    /// How long to wait for a listing page to render (milliseconds)
    #[serde(rename = "page-load-timeout-ms", default = "default_page_load_timeout")]
    pub page_load_timeout_ms: u64,

    /// How long to wait for a download to land and unpack (milliseconds)
    #[serde(rename = "download-timeout-ms", default = "default_download_timeout")]
    pub download_timeout_ms: u64,

    /// Delay between two probes of any wait loop (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Explicit Chrome/Chromium binary; auto-detected when absent
    #[serde(rename = "chrome-executable", default)]
    pub chrome_executable: Option<PathBuf>,
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            page_load_timeout_ms: default_page_load_timeout(),
            download_timeout_ms: default_download_timeout(),
            poll_interval_ms: default_poll_interval(),
            chrome_executable: None,
        }
    }
}

/// Checkpoint logger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(rename = "interval-ms", default = "default_checkpoint_interval")]
    pub interval_ms: u64,
}

impl CheckpointConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_checkpoint_interval(),
        }
    }
}

/// Marketplace endpoints used by the listing collector
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
    /// Search page listing every theme, sorted by installs
    #[serde(rename = "search-url", default = "default_search_url")]
    pub search_url: String,

    /// Give up scrolling when the page has not grown for this long (milliseconds)
    #[serde(rename = "scroll-timeout-ms", default = "default_scroll_timeout")]
    pub scroll_timeout_ms: u64,
}

impl MarketplaceConfig {
    pub fn scroll_timeout(&self) -> Duration {
        Duration::from_millis(self.scroll_timeout_ms)
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            scroll_timeout_ms: default_scroll_timeout(),
        }
    }
}

/// Input, output, checkpoint and scratch directories
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(rename = "log-dir", default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Scratch space for downloads; wiped at the start of every run
    #[serde(rename = "temp-dir", default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Run-wide switches
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Re-queue the retryable entries of the previous failure ledger
    #[serde(rename = "retry-failed", default)]
    pub retry_failed: bool,

    /// Diagnostic verbosity (0-3), combined with `-v` flags
    #[serde(default)]
    pub verbosity: u8,
}

fn enabled() -> bool {
    true
}

fn default_metadata_scrapers() -> usize {
    8
}

fn default_package_analyzers() -> usize {
    12
}

fn default_page_load_timeout() -> u64 {
    10_000
}

fn default_download_timeout() -> u64 {
    60_000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_checkpoint_interval() -> u64 {
    3_000
}

fn default_search_url() -> String {
    "https://marketplace.visualstudio.com/search?target=VSCode&category=Themes&sortBy=Installs"
        .to_string()
}

fn default_scroll_timeout() -> u64 {
    120_000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./log")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}
