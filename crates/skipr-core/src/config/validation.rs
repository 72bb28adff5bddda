//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::defaults::HEURISTIC_NAMES;
use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_engine(config)?;
    validate_selection(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_engine(config: &Config) -> Result<()> {
    if config.engine.progress_capacity == 0 {
        return Err(ConfigError::InvalidValue {
            field: "engine.progress_capacity".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .into());
    }

    if config.engine.tool.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "engine.tool".to_string(),
            message: "tool cannot be empty".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_selection(config: &Config) -> Result<()> {
    for (i, name) in config.selection.heuristics.iter().enumerate() {
        if !HEURISTIC_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: format!("selection.heuristics[{}]", i),
                message: format!("must be one of: {}", HEURISTIC_NAMES.join(", ")),
            }
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_unknown_heuristic() {
        let mut config = Config::default();
        config.selection.heuristics = vec!["direct-name".to_string(), "guess".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_progress_capacity() {
        let mut config = Config::default();
        config.engine.progress_capacity = 0;
        assert!(validate_config(&config).is_err());
    }
}
