//! Invitation storage trait.

use crate::error::Result;
use crate::organizations::types::Invitation;
use async_trait::async_trait;

/// Trait for invitation storage operations.
///
/// The invitation code is the primary key. The store must also enforce
/// uniqueness of `(org_id, email)` and report a duplicate as
/// [`StoreError::Conflict`](crate::StoreError::Conflict); the manager
/// removes expired rows for the address before inserting.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Insert a new invitation.
    async fn create(&self, invitation: &Invitation) -> Result<()>;

    /// Find an invitation by its code.
    async fn find_by_code(&self, code: &str) -> Result<Option<Invitation>>;

    /// Find the invitation for a normalized email in an organization.
    async fn find_for_email(&self, org_id: &str, email: &str) -> Result<Option<Invitation>>;

    /// All invitations of an organization, newest first.
    async fn list_for_org(&self, org_id: &str) -> Result<Vec<Invitation>>;

    /// Delete an invitation. Returns `false` if it did not exist.
    async fn delete(&self, code: &str) -> Result<bool>;

    /// Delete every invitation that expired at or before `now`.
    ///
    /// Returns the number of deleted invitations.
    async fn delete_expired(&self, now: u64) -> Result<u64>;
}
