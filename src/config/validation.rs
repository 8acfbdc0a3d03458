use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, PolitenessConfig, RenderConfig, RetryConfig, ScopeConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_retry_config(&config.retry)?;
    validate_scope_config(&config.scope)?;
    validate_render_config(&config.render)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.fetch_timeout_sec < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_sec must be >= 1".to_string(),
        ));
    }

    if config.max_body_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_body_bytes must be >= 1024, got {}",
            config.max_body_bytes
        )));
    }

    if config.max_url_length < 16 {
        return Err(ConfigError::Validation(format!(
            "max_url_length must be >= 16, got {}",
            config.max_url_length
        )));
    }

    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.max_concurrency_per_domain < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency_per_domain must be >= 1, got {}",
            config.max_concurrency_per_domain
        )));
    }

    if config.robots_fetch_attempts < 1 {
        return Err(ConfigError::Validation(
            "robots_fetch_attempts must be >= 1".to_string(),
        ));
    }

    if config.max_crawl_delay_sec.saturating_mul(1000) < config.min_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_crawl_delay_sec ({}s) must not be below min_delay_ms ({}ms)",
            config.max_crawl_delay_sec, config.min_delay_ms
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1".to_string(),
        ));
    }

    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= base_delay_ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }
    Ok(())
}

fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &config.endpoint {
        Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid render endpoint: {}", e)))?;
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data_root cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_interval_sec < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_interval_sec must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
pub(crate) fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // Must contain at least one dot (e.g., example.com, not just "example")
    if !domain.contains('.') && domain != "localhost" {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
