//! Background task processor configuration types

use crate::{parse_env, ConfigError, ConfigResult};

/// Background task processor tuning
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Hard cap on a single task execution, in seconds. A download or
    /// import that runs past this is aborted and marked failed.
    pub task_timeout_secs: u64,
}

impl TaskConfig {
    /// Load task processor configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            task_timeout_secs: parse_env("TASK_TIMEOUT_SECS", 600)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.task_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "TASK_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TaskConfig::default();
        assert_eq!(config.task_timeout_secs, 600);
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars([("TASK_TIMEOUT_SECS", Some("30"))], || {
            let config = TaskConfig::from_env().unwrap();
            assert_eq!(config.task_timeout_secs, 30);
        });
    }

    #[test]
    fn test_zero_timeout_rejected() {
        temp_env::with_vars([("TASK_TIMEOUT_SECS", Some("0"))], || {
            assert!(TaskConfig::from_env().is_err());
        });
    }
}
