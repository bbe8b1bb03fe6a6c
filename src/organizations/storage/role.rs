//! Role and role-permission storage trait.

use crate::error::Result;
use crate::organizations::types::{Role, RolePermission};
use async_trait::async_trait;

/// Trait for role and role-permission storage.
///
/// Scope arguments are exact tuples: `(None, None)` is the global template
/// scope, `(Some(t), None)` a tenant's template scope, and so on. Role
/// names must be unique per `(tenant_id, org_id)` tuple with nulls treated
/// as a distinct value; report violations as
/// [`StoreError::Conflict`](crate::StoreError::Conflict).
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Insert a new role.
    async fn create(&self, role: &Role) -> Result<()>;

    /// Find a role by ID.
    async fn find(&self, role_id: &str) -> Result<Option<Role>>;

    /// Find the roles with the given IDs. Missing IDs are skipped.
    async fn find_many(&self, role_ids: &[String]) -> Result<Vec<Role>>;

    /// Find a role by exact name within an exact scope tuple.
    async fn find_by_name(
        &self,
        tenant_id: Option<&str>,
        org_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Role>>;

    /// Roles defined at an exact scope tuple, ordered by name.
    async fn list(&self, tenant_id: Option<&str>, org_id: Option<&str>) -> Result<Vec<Role>>;

    /// Roles usable in an organization: its own roles plus templates
    /// whose tenant is null or `tenant_id`. Ordered by name.
    async fn list_assignable(&self, tenant_id: Option<&str>, org_id: &str) -> Result<Vec<Role>>;

    /// Replace a stored role.
    async fn update(&self, role: &Role) -> Result<()>;

    /// Delete a role and its permission rows. Role assignments are kept.
    ///
    /// Returns `false` if the role did not exist.
    async fn delete(&self, role_id: &str) -> Result<bool>;

    /// Every permission row of the given roles, at every scope.
    async fn permissions_for_roles(&self, role_ids: &[String]) -> Result<Vec<RolePermission>>;

    /// Insert `added` and delete the rows with IDs in `removed` atomically.
    async fn apply_permission_changes(
        &self,
        added: &[RolePermission],
        removed: &[String],
    ) -> Result<()>;
}
