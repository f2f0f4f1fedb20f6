use super::{types::Config, ConfigError};

/// Ceiling for concurrent publications, far below the semaphore's permit limit.
const MAX_OUTSTANDING_FULFILLMENTS: usize = 4096;

/// Validate configuration
/// Currently validates:
/// - Provider id and request source URL are set
/// - Server port is not 0
/// - Driver intervals are positive
/// - Fulfillment concurrency is within bounds
/// - At most one production job outstanding
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.provider.id.trim().is_empty() {
        return Err(invalid("provider.id cannot be empty"));
    }

    if config.request_source.url.trim().is_empty() {
        return Err(invalid("request_source.url cannot be empty"));
    }

    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let driver = &config.driver;
    for (name, value) in [
        ("driver.poll_interval_ms", driver.poll_interval_ms),
        ("driver.monitor_interval_ms", driver.monitor_interval_ms),
        ("driver.reaper_interval_ms", driver.reaper_interval_ms),
    ] {
        if value == 0 {
            return Err(invalid(&format!("{} cannot be 0", name)));
        }
    }

    if driver.max_outstanding_fulfillments == 0 {
        return Err(invalid("driver.max_outstanding_fulfillments cannot be 0"));
    }
    if driver.max_outstanding_fulfillments > MAX_OUTSTANDING_FULFILLMENTS {
        return Err(invalid(&format!(
            "driver.max_outstanding_fulfillments cannot exceed {}, got {}",
            MAX_OUTSTANDING_FULFILLMENTS, driver.max_outstanding_fulfillments
        )));
    }

    if driver.max_outstanding_jobs != 1 {
        return Err(invalid(&format!(
            "driver.max_outstanding_jobs must be 1, got {}",
            driver.max_outstanding_jobs
        )));
    }

    if config.launcher.docker.image.trim().is_empty() {
        return Err(invalid("launcher.docker.image cannot be empty"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
