use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_crawl::config::load_config;
///
/// let config = load_config(Path::new("crawl.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Parses TOML text into a configuration without validating it
///
/// Validation is deferred so command-line overrides can be applied first.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Computes a SHA-256 fingerprint of the effective configuration
///
/// The fingerprint covers file values and command-line overrides alike. It is
/// stored on each session row so a resumed crawl can tell whether its
/// configuration changed between sessions.
pub fn config_fingerprint(config: &Config) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}", config).as_bytes());
    hex::encode(hasher.finalize())
}
