use std::str::FromStr;

/// Get environment variable with TIDEWAY_ prefix, falling back to unprefixed version
///
/// This helper function checks for `TIDEWAY_{key}` first, then falls back to `{key}`
/// for compatibility with standard environment variable naming.
///
/// # Examples
///
/// ```rust
/// use tideway_orgs::utils::get_env_with_prefix;
///
/// // Checks TIDEWAY_ORG_SLUG_MAX_LENGTH first, then ORG_SLUG_MAX_LENGTH
/// let slug_max = get_env_with_prefix("ORG_SLUG_MAX_LENGTH");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("TIDEWAY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a prefixed environment variable, ignoring unparsable values.
pub fn parse_env_with_prefix<T: FromStr>(key: &str) -> Option<T> {
    let raw = get_env_with_prefix(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}
