use crate::config::types::{
    CacheConfig, Config, FetchConfig, RobotsConfig, ThrottleConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_cache_config(&config.cache)?;
    validate_robots_config(&config.robots)?;
    validate_throttle_config(&config.throttle)?;
    validate_fetch_config(&config.fetch)?;
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // The crawler name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only letters, digits, '-' and '_', got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config
        .cacheable_content_types
        .iter()
        .any(|ct| ct.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "cacheable_content_types cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    ensure_non_negative("default_crawl_delay", config.default_crawl_delay)?;

    if config.policy_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "policy_ttl_secs must be >= 1".to_string(),
        ));
    }

    if config.deny_ttl_secs == 0 || config.deny_ttl_secs > config.policy_ttl_secs {
        return Err(ConfigError::Validation(format!(
            "deny_ttl_secs must be between 1 and policy_ttl_secs ({}), got {}",
            config.policy_ttl_secs, config.deny_ttl_secs
        )));
    }

    if config.scheme != "http" && config.scheme != "https" {
        return Err(ConfigError::Validation(format!(
            "robots scheme must be 'http' or 'https', got '{}'",
            config.scheme
        )));
    }

    Ok(())
}

fn validate_throttle_config(config: &ThrottleConfig) -> Result<(), ConfigError> {
    ensure_positive("base_backoff_secs", config.base_backoff_secs)?;
    ensure_positive("max_backoff_secs", config.max_backoff_secs)?;

    if config.base_backoff_secs > config.max_backoff_secs {
        return Err(ConfigError::Validation(format!(
            "base_backoff_secs ({}) cannot exceed max_backoff_secs ({})",
            config.base_backoff_secs, config.max_backoff_secs
        )));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    ensure_non_negative("retry_base_secs", config.retry_base_secs)?;
    ensure_positive("request_timeout_secs", config.request_timeout_secs)?;
    ensure_positive("connect_timeout_secs", config.connect_timeout_secs)?;

    Ok(())
}

fn ensure_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a positive number, got {}",
            name, value
        )));
    }
    Ok(())
}

fn ensure_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 0, got {}",
            name, value
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

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
