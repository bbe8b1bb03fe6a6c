//! Storage-level error type.
//!
//! Every storage trait and external collaborator returns [`StoreError`].
//! Domain rules live one level up in
//! [`OrganizationError`](crate::organizations::OrganizationError).

/// Errors raised by stores and external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique constraint rejected the write.
    ///
    /// Stores raise this when a concurrent request won the race between an
    /// existence check and the insert.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator (permission catalog, user directory) is unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure means "the collaborator is down" rather than
    /// "the request was wrong".
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias used by storage traits.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StoreError::not_found("org_1").to_string(),
            "Not found: org_1"
        );
        assert_eq!(
            StoreError::conflict("duplicate slug").to_string(),
            "Conflict: duplicate slug"
        );
        assert_eq!(
            StoreError::unavailable("catalog offline").to_string(),
            "Service unavailable: catalog offline"
        );
    }

    #[test]
    fn test_is_unavailable() {
        assert!(StoreError::unavailable("down").is_unavailable());
        assert!(!StoreError::database("boom").is_unavailable());
    }

    #[test]
    fn test_from_anyhow() {
        let err: StoreError = anyhow::anyhow!("wrapped").into();
        assert_eq!(err.to_string(), "wrapped");
    }
}
