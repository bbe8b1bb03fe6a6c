//! Organization configuration.

use crate::utils::parse_env_with_prefix;
use serde::{Deserialize, Serialize};

/// Limits applied by the organization, membership and role managers.
///
/// # Example
///
/// ```rust
/// use tideway_orgs::organizations::OrganizationConfig;
///
/// let config = OrganizationConfig::new()
///     .slug_max_length(48)
///     .metadata_max_bytes(8192)
///     .max_page_size(50);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationConfig {
    /// Maximum slug length after normalization.
    pub slug_max_length: usize,

    /// Maximum display name length after trimming.
    pub display_name_max_length: usize,

    /// Maximum role name length after trimming.
    pub role_name_max_length: usize,

    /// Maximum role description length.
    pub role_description_max_length: usize,

    /// Maximum length of a single metadata key.
    pub metadata_max_key_length: usize,

    /// Maximum length of a single metadata value.
    pub metadata_max_value_length: usize,

    /// Budget for the whole metadata map once serialized to JSON.
    pub metadata_max_bytes: usize,

    /// Page size used when a member query does not specify one.
    pub default_page_size: u32,

    /// Upper bound for member query page sizes.
    pub max_page_size: u32,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            slug_max_length: 64,
            display_name_max_length: 128,
            role_name_max_length: 64,
            role_description_max_length: 512,
            metadata_max_key_length: 64,
            metadata_max_value_length: 512,
            metadata_max_bytes: 4096,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl OrganizationConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `TIDEWAY_ORG_*` environment variables, keeping defaults
    /// for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = parse_env_with_prefix("ORG_SLUG_MAX_LENGTH") {
            config.slug_max_length = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_DISPLAY_NAME_MAX_LENGTH") {
            config.display_name_max_length = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_ROLE_NAME_MAX_LENGTH") {
            config.role_name_max_length = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_ROLE_DESCRIPTION_MAX_LENGTH") {
            config.role_description_max_length = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_METADATA_MAX_KEY_LENGTH") {
            config.metadata_max_key_length = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_METADATA_MAX_VALUE_LENGTH") {
            config.metadata_max_value_length = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_METADATA_MAX_BYTES") {
            config.metadata_max_bytes = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_DEFAULT_PAGE_SIZE") {
            config.default_page_size = v;
        }
        if let Some(v) = parse_env_with_prefix("ORG_MAX_PAGE_SIZE") {
            config.max_page_size = v;
        }
        config
    }

    /// Set the maximum slug length.
    #[must_use]
    pub fn slug_max_length(mut self, max: usize) -> Self {
        self.slug_max_length = max;
        self
    }

    /// Set the maximum display name length.
    #[must_use]
    pub fn display_name_max_length(mut self, max: usize) -> Self {
        self.display_name_max_length = max;
        self
    }

    /// Set the maximum role name length.
    #[must_use]
    pub fn role_name_max_length(mut self, max: usize) -> Self {
        self.role_name_max_length = max;
        self
    }

    /// Set the maximum role description length.
    #[must_use]
    pub fn role_description_max_length(mut self, max: usize) -> Self {
        self.role_description_max_length = max;
        self
    }

    /// Set the per-key metadata length limit.
    #[must_use]
    pub fn metadata_max_key_length(mut self, max: usize) -> Self {
        self.metadata_max_key_length = max;
        self
    }

    /// Set the per-value metadata length limit.
    #[must_use]
    pub fn metadata_max_value_length(mut self, max: usize) -> Self {
        self.metadata_max_value_length = max;
        self
    }

    /// Set the serialized metadata budget in bytes.
    #[must_use]
    pub fn metadata_max_bytes(mut self, max: usize) -> Self {
        self.metadata_max_bytes = max;
        self
    }

    /// Set the default member page size.
    #[must_use]
    pub fn default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    /// Set the maximum member page size.
    #[must_use]
    pub fn max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size;
        self
    }

    /// Clamp a requested page size into `1..=max_page_size`.
    ///
    /// `None` and `0` fall back to the default page size.
    #[must_use]
    pub fn clamp_page_size(&self, requested: Option<u32>) -> u32 {
        let max = self.max_page_size.max(1);
        match requested {
            None | Some(0) => self.default_page_size.clamp(1, max),
            Some(size) => size.min(max),
        }
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.slug_max_length == 0
            || self.display_name_max_length == 0
            || self.role_name_max_length == 0
        {
            return Err("length limits must be greater than 0".to_string());
        }
        if self.max_page_size == 0 || self.default_page_size == 0 {
            return Err("page size must be greater than 0".to_string());
        }
        if self.default_page_size > self.max_page_size {
            return Err(format!(
                "default page size {} exceeds maximum page size {}",
                self.default_page_size, self.max_page_size
            ));
        }
        Ok(())
    }
}

/// Configuration for invitation management.
///
/// # Example
///
/// ```rust
/// use tideway_orgs::organizations::InvitationConfig;
///
/// let config = InvitationConfig::new()
///     .default_expiry_hours(48)
///     .max_expiry_hours(24 * 14);
/// assert_eq!(config.clamp_expiry_hours(None), 48);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    /// Lifetime used when the caller does not request one.
    pub default_expiry_hours: u32,

    /// Shortest lifetime a caller may request.
    pub min_expiry_hours: u32,

    /// Longest lifetime a caller may request.
    pub max_expiry_hours: u32,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            default_expiry_hours: 24 * 7,
            min_expiry_hours: 1,
            max_expiry_hours: 24 * 30,
        }
    }
}

impl InvitationConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `TIDEWAY_INVITATION_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = parse_env_with_prefix("INVITATION_DEFAULT_EXPIRY_HOURS") {
            config.default_expiry_hours = v;
        }
        if let Some(v) = parse_env_with_prefix("INVITATION_MIN_EXPIRY_HOURS") {
            config.min_expiry_hours = v;
        }
        if let Some(v) = parse_env_with_prefix("INVITATION_MAX_EXPIRY_HOURS") {
            config.max_expiry_hours = v;
        }
        config
    }

    /// Set the default invitation lifetime in hours.
    #[must_use]
    pub fn default_expiry_hours(mut self, hours: u32) -> Self {
        self.default_expiry_hours = hours;
        self
    }

    /// Set the shortest allowed lifetime in hours.
    #[must_use]
    pub fn min_expiry_hours(mut self, hours: u32) -> Self {
        self.min_expiry_hours = hours;
        self
    }

    /// Set the longest allowed lifetime in hours.
    #[must_use]
    pub fn max_expiry_hours(mut self, hours: u32) -> Self {
        self.max_expiry_hours = hours;
        self
    }

    /// Resolve a requested lifetime into the configured bounds.
    #[must_use]
    pub fn clamp_expiry_hours(&self, requested: Option<u32>) -> u32 {
        let min = self.min_expiry_hours.min(self.max_expiry_hours);
        requested
            .unwrap_or(self.default_expiry_hours)
            .clamp(min, self.max_expiry_hours)
    }

    /// Get the expiry duration in seconds for a requested lifetime.
    #[must_use]
    pub fn expiry_seconds(&self, requested: Option<u32>) -> u64 {
        u64::from(self.clamp_expiry_hours(requested)) * 3600
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.min_expiry_hours == 0 {
            return Err("minimum invitation expiry must be at least 1 hour".to_string());
        }
        if self.min_expiry_hours > self.max_expiry_hours {
            return Err(format!(
                "minimum invitation expiry {}h exceeds maximum {}h",
                self.min_expiry_hours, self.max_expiry_hours
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_config_defaults() {
        let config = OrganizationConfig::default();
        assert_eq!(config.slug_max_length, 64);
        assert_eq!(config.metadata_max_bytes, 4096);
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_org_config_builder() {
        let config = OrganizationConfig::new()
            .slug_max_length(10)
            .display_name_max_length(20)
            .metadata_max_bytes(128)
            .max_page_size(5);

        assert_eq!(config.slug_max_length, 10);
        assert_eq!(config.display_name_max_length, 20);
        assert_eq!(config.metadata_max_bytes, 128);
        assert_eq!(config.max_page_size, 5);
    }

    #[test]
    fn test_clamp_page_size() {
        let config = OrganizationConfig::new().default_page_size(20).max_page_size(100);
        assert_eq!(config.clamp_page_size(None), 20);
        assert_eq!(config.clamp_page_size(Some(0)), 20);
        assert_eq!(config.clamp_page_size(Some(7)), 7);
        assert_eq!(config.clamp_page_size(Some(10_000)), 100);
    }

    #[test]
    fn test_invitation_config_defaults() {
        let config = InvitationConfig::default();
        assert_eq!(config.default_expiry_hours, 168);
        assert_eq!(config.min_expiry_hours, 1);
        assert_eq!(config.max_expiry_hours, 720);
    }

    #[test]
    fn test_clamp_expiry_hours() {
        let config = InvitationConfig::default();
        assert_eq!(config.clamp_expiry_hours(None), 168);
        assert_eq!(config.clamp_expiry_hours(Some(0)), 1);
        assert_eq!(config.clamp_expiry_hours(Some(48)), 48);
        assert_eq!(config.clamp_expiry_hours(Some(10_000)), 720);
    }

    #[test]
    fn test_expiry_seconds() {
        let config = InvitationConfig::new();
        assert_eq!(config.expiry_seconds(Some(24)), 24 * 3600);
        assert_eq!(config.expiry_seconds(None), 7 * 24 * 3600);
    }

    #[test]
    fn test_invitation_config_validation() {
        assert!(InvitationConfig::default().validate().is_ok());
        assert!(InvitationConfig::new().min_expiry_hours(0).validate().is_err());
        assert!(
            InvitationConfig::new()
                .min_expiry_hours(48)
                .max_expiry_hours(24)
                .validate()
                .is_err()
        );
    }
}
