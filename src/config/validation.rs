use crate::config::types::{
    BrowserConfig, CheckpointConfig, Config, MarketplaceConfig, PathsConfig, RunConfig,
    StageConfig, WorkerConfig,
};
use crate::ConfigError;
use url::Url;

const MAX_WORKERS: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_worker_config(&config.workers, &config.stages)?;
    validate_browser_config(&config.browser)?;
    validate_checkpoint_config(&config.checkpoint)?;
    validate_marketplace_config(&config.marketplace)?;
    validate_paths_config(&config.paths)?;
    validate_run_config(&config.run)?;
    Ok(())
}

/// Validates pool sizes for the stages that are enabled
fn validate_worker_config(workers: &WorkerConfig, stages: &StageConfig) -> Result<(), ConfigError> {
    if stages.scrape_metadata {
        validate_pool_size("metadata_scrapers", workers.metadata_scrapers)?;
    }

    if stages.analyze_packages {
        validate_pool_size("package_analyzers", workers.package_analyzers)?;
    }

    Ok(())
}

fn validate_pool_size(name: &str, size: usize) -> Result<(), ConfigError> {
    if size < 1 || size > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_WORKERS, size
        )));
    }
    Ok(())
}

/// Validates browser timeouts
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.page_load_timeout_ms < config.poll_interval_ms {
        return Err(ConfigError::Validation(format!(
            "page_load_timeout_ms ({}ms) must not be shorter than poll_interval_ms ({}ms)",
            config.page_load_timeout_ms, config.poll_interval_ms
        )));
    }

    if config.download_timeout_ms < config.poll_interval_ms {
        return Err(ConfigError::Validation(format!(
            "download_timeout_ms ({}ms) must not be shorter than poll_interval_ms ({}ms)",
            config.download_timeout_ms, config.poll_interval_ms
        )));
    }

    Ok(())
}

fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "checkpoint interval_ms must be >= 100ms, got {}ms",
            config.interval_ms
        )));
    }
    Ok(())
}

/// Validates the marketplace search URL
fn validate_marketplace_config(config: &MarketplaceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.search_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid search_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "search_url '{}' must use HTTP(S)",
            config.search_url
        )));
    }

    Ok(())
}

/// Validates that every directory is set
fn validate_paths_config(config: &PathsConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("data_dir", &config.data_dir),
        ("log_dir", &config.log_dir),
        ("temp_dir", &config.temp_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    // The temp dir is wiped at startup, never let it alias the outputs.
    if config.temp_dir == config.data_dir || config.temp_dir == config.log_dir {
        return Err(ConfigError::Validation(
            "temp_dir must differ from data_dir and log_dir".to_string(),
        ));
    }

    Ok(())
}

fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.verbosity > 3 {
        return Err(ConfigError::Validation(format!(
            "verbosity must be between 0 and 3, got {}",
            config.verbosity
        )));
    }
    Ok(())
}
