use serde::{Deserialize, Serialize};

use crate::organizations::{InvitationConfig, OrganizationConfig};
use crate::utils::get_env_with_prefix;

/// Top-level configuration for the organizations engine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub organizations: OrganizationConfig,
    #[serde(default)]
    pub invitations: InvitationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

/// Raised by [`ConfigBuilder::build`] when settings are inconsistent.
#[derive(Debug, thiserror::Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_organizations(mut self, organizations: OrganizationConfig) -> Self {
        self.config.organizations = organizations;
        self
    }

    pub fn with_invitations(mut self, invitations: InvitationConfig) -> Self {
        self.config.invitations = invitations;
        self
    }

    /// Load configuration from environment variables with TIDEWAY_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }

        self.config.organizations = OrganizationConfig::from_env();
        self.config.invitations = InvitationConfig::from_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if the log level is unknown or any limit is
    /// inconsistent (zero lengths, default page size above the maximum,
    /// invitation expiry bounds out of order).
    pub fn build(self) -> Result<Config, ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        self.config.organizations.validate().map_err(ConfigError)?;
        self.config.invitations.validate().map_err(ConfigError)?;

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.invitations.default_expiry_hours, 168);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = ConfigBuilder::new().with_log_level("loud").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_inconsistent_page_size_rejected() {
        let orgs = OrganizationConfig::new()
            .default_page_size(500)
            .max_page_size(100);
        let result = ConfigBuilder::new().with_organizations(orgs).build();
        assert!(result.unwrap_err().to_string().contains("page size"));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"organizations": {"slug_max_length": 32}}"#).unwrap();
        assert_eq!(config.organizations.slug_max_length, 32);
        assert_eq!(config.organizations.max_page_size, 100);
        assert_eq!(config.logging.level, "info");
    }
}
