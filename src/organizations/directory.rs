//! External collaborators: the user directory and the permission catalog.
//!
//! Neither is owned by this crate. Applications implement these traits on
//! top of their user store and their global RBAC service.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::utils::LikePattern;
use crate::error::Result;

/// A user as seen by the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Account creation timestamp (Unix seconds).
    pub created_at: u64,
}

impl DirectoryUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>, created_at: u64) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            created_at,
        }
    }

    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Free-text search over the host application's users.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_orgs::organizations::{DirectoryUser, LikePattern, UserDirectory};
/// use async_trait::async_trait;
///
/// struct Users { db: DatabaseConnection }
///
/// #[async_trait]
/// impl UserDirectory for Users {
///     async fn search_user_ids(&self, pattern: &LikePattern) -> Result<Vec<String>> {
///         // SELECT id FROM users
///         // WHERE email LIKE $1 ESCAPE '\' OR display_name LIKE $1 ESCAPE '\'
///         self.db.search_users(pattern.as_str()).await
///     }
/// }
/// ```
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// IDs of users whose email or display name matches `pattern`.
    ///
    /// The pattern is already escaped; SQL stores must evaluate it with
    /// `ESCAPE '\'` so literal `%` and `_` stay literal.
    async fn search_user_ids(&self, pattern: &LikePattern) -> Result<Vec<String>>;
}

/// The global permission catalog and role-assignment service.
///
/// Implementations should return [`StoreError::Unavailable`] when the
/// backing service cannot be reached; the permission resolver degrades to
/// an empty set in that case.
///
/// [`StoreError::Unavailable`]: crate::StoreError::Unavailable
#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    /// Names for the given permission IDs. Unknown IDs are omitted.
    async fn names_for_ids(&self, permission_ids: &[String]) -> Result<HashMap<String, String>>;

    /// IDs for the given permission names, keyed by lowercased name.
    /// Unknown names are omitted.
    async fn ids_for_names(&self, names: &[String]) -> Result<HashMap<String, String>>;

    /// The user's permissions outside any organization.
    async fn user_permissions(&self, user_id: &str, tenant_id: Option<&str>) -> Result<Vec<String>>;
}
