//! Membership storage trait.

use crate::error::Result;
use crate::organizations::types::{MemberFilter, Membership, RoleAssignment};
use async_trait::async_trait;

/// A reconciled set of changes to one membership.
///
/// Built by the membership manager from a diff; applied by the store as a
/// single transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipChanges {
    pub org_id: String,
    pub user_id: String,
    /// New primary flag, if it changes.
    pub is_primary: Option<bool>,
    /// Clear `is_primary` on the user's other memberships in the same tenant.
    pub clear_other_primary: bool,
    /// Role assignments to insert.
    pub added_roles: Vec<RoleAssignment>,
    /// Role IDs whose assignments are removed.
    pub removed_role_ids: Vec<String>,
    /// Timestamp to stamp on the membership.
    pub updated_at: u64,
}

impl MembershipChanges {
    /// Whether applying these changes would modify anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_primary.is_none()
            && !self.clear_other_primary
            && self.added_roles.is_empty()
            && self.removed_role_ids.is_empty()
    }
}

/// Trait for membership storage operations.
///
/// A [`Membership`] is returned with its role assignments loaded.
///
/// Each write method must be atomic: the membership row, its role rows, and
/// the clearing of other primary flags succeed or fail together. The store
/// must enforce uniqueness of `(org_id, user_id)` and report a duplicate
/// as [`StoreError::Conflict`](crate::StoreError::Conflict).
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl MembershipStore for MyStore {
///     async fn insert(&self, membership: &Membership, clear_other_primary: bool) -> Result<()> {
///         let txn = self.db.begin().await?;
///         if clear_other_primary {
///             txn.clear_primary(&membership.user_id, membership.tenant_id.as_deref()).await?;
///         }
///         txn.insert_membership(membership).await?;
///         txn.insert_role_assignments(&membership.roles).await?;
///         txn.commit().await?;
///         Ok(())
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Get a specific membership.
    async fn find(&self, org_id: &str, user_id: &str) -> Result<Option<Membership>>;

    /// All memberships of a user across organizations and tenants.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Membership>>;

    /// Insert a membership together with its role assignments.
    async fn insert(&self, membership: &Membership, clear_other_primary: bool) -> Result<()>;

    /// Apply a reconciled change set and return the updated membership.
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// membership no longer exists.
    async fn apply_changes(&self, changes: &MembershipChanges) -> Result<Membership>;

    /// One page of members matching `filter`, plus the total match count.
    ///
    /// Ordered by creation time, then user ID.
    async fn query(
        &self,
        filter: &MemberFilter,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<Membership>, u64)>;

    /// Delete a membership and its role assignments.
    ///
    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, org_id: &str, user_id: &str) -> Result<bool>;
}
