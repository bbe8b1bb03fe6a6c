//! Internal utilities for the organizations module.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in seconds.
#[inline]
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Trim and lowercase an email address.
#[inline]
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format validation.
///
/// Checks that the email:
/// - Contains exactly one `@` symbol
/// - Has at least one character before `@`
/// - Has at least one `.` after `@`
/// - Has at least one character after the last `.`
///
/// This is not RFC 5322 compliant but catches obvious formatting errors.
#[inline]
pub(crate) fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    // Must contain exactly one @
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() {
        return false;
    }

    if !domain.contains('.') {
        return false;
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }

    !domain.rsplit('.').next().is_some_and(str::is_empty)
}

/// Drop blank and repeated IDs, keeping first-seen order.
pub(crate) fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(String::from)
        .collect()
}

/// Why a slug was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlugError {
    Empty,
    TooLong(usize),
    InvalidStart,
    InvalidCharacter(char),
}

impl std::fmt::Display for SlugError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("must not be empty"),
            Self::TooLong(max) => write!(f, "must be at most {max} characters"),
            Self::InvalidStart => f.write_str("must start with a letter or digit"),
            Self::InvalidCharacter(c) => write!(
                f,
                "contains '{c}'; only letters, digits, '-', '_' and '.' are allowed"
            ),
        }
    }
}

/// Lowercase a slug and check it against the token pattern
/// `[a-z0-9][a-z0-9._-]*`.
pub(crate) fn normalize_slug(slug: &str, max_length: usize) -> Result<String, SlugError> {
    let slug = slug.trim().to_lowercase();
    let mut chars = slug.chars();

    let first = chars.next().ok_or(SlugError::Empty)?;
    if !first.is_ascii_alphanumeric() {
        return Err(SlugError::InvalidStart);
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))) {
        return Err(SlugError::InvalidCharacter(bad));
    }
    if slug.chars().count() > max_length {
        return Err(SlugError::TooLong(max_length));
    }

    Ok(slug)
}

/// Escape character used in [`LikePattern`]s.
pub const LIKE_ESCAPE: char = '\\';

/// A SQL `LIKE` pattern whose user-supplied part is escaped.
///
/// Literal `%` and `_` in search text match themselves rather than acting
/// as wildcards. Stores backed by SQL pass [`LikePattern::as_str`] together
/// with `ESCAPE '\'`; other stores can call [`LikePattern::matches`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikePattern(String);

impl LikePattern {
    /// Pattern matching any value that contains `text`.
    pub fn contains(text: &str) -> Self {
        Self(format!("%{}%", escape_like(text)))
    }

    /// The escaped pattern, for `LIKE ... ESCAPE '\'`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive `LIKE` evaluation.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let tokens = tokenize_like(&self.0.to_lowercase());
        let value: Vec<char> = value.to_lowercase().chars().collect();

        // dp[j]: tokens[..i] match value[..j]
        let mut dp = vec![false; value.len() + 1];
        dp[0] = true;
        for token in &tokens {
            let mut next = vec![false; value.len() + 1];
            match token {
                LikeToken::AnyMany => {
                    let mut reachable = false;
                    for j in 0..=value.len() {
                        reachable |= dp[j];
                        next[j] = reachable;
                    }
                }
                LikeToken::AnyOne => {
                    for j in 1..=value.len() {
                        next[j] = dp[j - 1];
                    }
                }
                LikeToken::Literal(c) => {
                    for j in 1..=value.len() {
                        next[j] = dp[j - 1] && value[j - 1] == *c;
                    }
                }
            }
            dp = next;
        }
        dp[value.len()]
    }
}

impl std::fmt::Display for LikePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape `\`, `%` and `_` so they are matched literally.
pub(crate) fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

enum LikeToken {
    Literal(char),
    AnyOne,
    AnyMany,
}

fn tokenize_like(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = match c {
            LIKE_ESCAPE => LikeToken::Literal(chars.next().unwrap_or(LIKE_ESCAPE)),
            '%' => LikeToken::AnyMany,
            '_' => LikeToken::AnyOne,
            other => LikeToken::Literal(other),
        };
        tokens.push(token);
    }
    tokens
}

/// Generate a secure random code for invitations.
pub(crate) fn generate_secure_token() -> String {
    use base64::Engine;
    use rand::Rng;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@example.com"));
        assert!(is_valid_email("user@sub.example.com"));
        assert!(is_valid_email("user+tag@example.com"));
        assert!(is_valid_email("  padded@example.com  "));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@.example.com"));
        assert!(!is_valid_email("user@example."));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_dedup_ids() {
        let ids = vec!["r2".to_string(), " r1 ".to_string(), "r2".to_string(), "".to_string()];
        assert_eq!(dedup_ids(&ids), vec!["r2", "r1"]);
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("Acme", 64).unwrap(), "acme");
        assert_eq!(normalize_slug("acme-corp_2.0", 64).unwrap(), "acme-corp_2.0");
        assert_eq!(normalize_slug("9lives", 64).unwrap(), "9lives");
        assert_eq!(normalize_slug("", 64), Err(SlugError::Empty));
        assert_eq!(normalize_slug("-acme", 64), Err(SlugError::InvalidStart));
        assert_eq!(normalize_slug(".acme", 64), Err(SlugError::InvalidStart));
        assert_eq!(
            normalize_slug("acme corp", 64),
            Err(SlugError::InvalidCharacter(' '))
        );
        assert_eq!(normalize_slug("abcdef", 5), Err(SlugError::TooLong(5)));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\dir"), "c:\\\\dir");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_like_pattern_literal_percent() {
        let pattern = LikePattern::contains("50%");
        assert_eq!(pattern.as_str(), "%50\\%%");
        assert!(pattern.matches("Save 50% today"));
        assert!(pattern.matches("50%"));
        assert!(!pattern.matches("500 units"));
        assert!(!pattern.matches("50"));
    }

    #[test]
    fn test_like_pattern_literal_underscore() {
        let pattern = LikePattern::contains("a_b");
        assert!(pattern.matches("xa_by"));
        assert!(!pattern.matches("axb"));
    }

    #[test]
    fn test_like_pattern_case_insensitive() {
        let pattern = LikePattern::contains("ALICE");
        assert!(pattern.matches("alice@example.com"));
        assert!(pattern.matches("Dr. Alice Smith"));
        assert!(!pattern.matches("bob@example.com"));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = generate_secure_token();
        let b = generate_secure_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }
}
