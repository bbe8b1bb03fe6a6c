//! Organization storage trait.

use crate::error::Result;
use crate::organizations::types::Organization;
use async_trait::async_trait;

/// Trait for organization storage operations.
///
/// Tenant arguments are exact: `None` addresses the global scope, not
/// "any tenant".
///
/// # Important: Name Uniqueness
///
/// The manager checks slug and display-name availability before writing,
/// but there is an inherent race between the check and the insert. Your
/// database **must** enforce unique constraints and report violations as
/// [`StoreError::Conflict`](crate::StoreError::Conflict):
///
/// ```sql
/// CREATE TABLE organizations (
///     id VARCHAR(36) PRIMARY KEY,
///     tenant_id VARCHAR(64),
///     slug VARCHAR(64) NOT NULL,
///     display_name VARCHAR(128) NOT NULL,
///     -- other columns...
///     UNIQUE NULLS NOT DISTINCT (tenant_id, slug),
///     UNIQUE NULLS NOT DISTINCT (tenant_id, display_name)
/// );
/// ```
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Insert a new organization.
    async fn create(&self, org: &Organization) -> Result<()>;

    /// Find an organization by its ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<Organization>>;

    /// Find an organization by its normalized slug within a tenant scope.
    async fn find_by_slug(&self, tenant_id: Option<&str>, slug: &str) -> Result<Option<Organization>>;

    /// Find an organization by its display name within a tenant scope.
    async fn find_by_display_name(
        &self,
        tenant_id: Option<&str>,
        display_name: &str,
    ) -> Result<Option<Organization>>;

    /// List organizations in a tenant scope, ordered by display name.
    async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<Organization>>;

    /// Replace a stored organization.
    async fn update(&self, org: &Organization) -> Result<()>;
}
