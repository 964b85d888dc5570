use crate::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        Self::validate_range(timeout_seconds, 1, 3600, field_name)
    }

    /// Validate that a count is reasonable
    pub fn validate_count(count: usize, field_name: &str) -> ConfigResult<()> {
        Self::validate_range(count as u64, 1, 10000, field_name)
    }

    pub fn validate_range(value: u64, min: u64, max: u64, field_name: &str) -> ConfigResult<()> {
        if value < min {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than or equal to {min}"
            )));
        }
        if value > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a value is one of the accepted options
    pub fn validate_one_of(value: &str, options: &[&str], field_name: &str) -> ConfigResult<()> {
        if !options.contains(&value) {
            return Err(ConfigError::Validation(format!(
                "Invalid {field_name}: {value}. Valid options: {options:?}"
            )));
        }
        Ok(())
    }
}
