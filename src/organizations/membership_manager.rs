//! Membership manager.
//!
//! Adds, updates and removes members. Keeps at most one primary membership
//! per user and tenant, and only writes the role changes that a request
//! actually makes.

use std::collections::HashSet;

use super::audit::{OrgAuditEntry, OrgAuditEvent};
use super::config::OrganizationConfig;
use super::directory::UserDirectory;
use super::error::{OrganizationError, Result};
use super::role_manager::validate_assignable_roles;
use super::storage::{
    MembershipChanges, MembershipStore, OptionalAuditStore, OrgAuditStore, OrganizationStore,
    RoleStore, WithAuditStore,
};
use super::types::{
    AddMember, MemberFilter, MemberPage, MemberQuery, Membership, Organization, RoleAssignment,
    UpdateMembership,
};
use super::utils::{LikePattern, current_timestamp, dedup_ids};
use tracing::{debug, info, instrument};

/// Build a new membership with role assignments stamped at `now`.
pub(crate) fn new_membership(
    org: &Organization,
    user_id: &str,
    is_primary: bool,
    role_ids: &[String],
    now: u64,
) -> Membership {
    Membership {
        org_id: org.id.clone(),
        user_id: user_id.to_string(),
        tenant_id: org.tenant_id.clone(),
        is_primary,
        roles: role_ids
            .iter()
            .map(|role_id| role_assignment(org, user_id, role_id, now))
            .collect(),
        created_at: now,
        updated_at: now,
    }
}

fn role_assignment(org: &Organization, user_id: &str, role_id: &str, now: u64) -> RoleAssignment {
    RoleAssignment {
        org_id: org.id.clone(),
        user_id: user_id.to_string(),
        role_id: role_id.to_string(),
        tenant_id: org.tenant_id.clone(),
        created_at: now,
    }
}

/// Reconcile a membership's roles against a desired set.
///
/// Fills `changes` with assignments to add and role IDs to remove.
pub(crate) fn diff_roles(
    existing: &Membership,
    org: &Organization,
    desired: &[String],
    now: u64,
    changes: &mut MembershipChanges,
) {
    let current: HashSet<&str> = existing.roles.iter().map(|r| r.role_id.as_str()).collect();
    let wanted: HashSet<&str> = desired.iter().map(String::as_str).collect();

    changes.added_roles = desired
        .iter()
        .filter(|id| !current.contains(id.as_str()))
        .map(|id| role_assignment(org, &existing.user_id, id, now))
        .collect();
    changes.removed_role_ids = existing
        .roles
        .iter()
        .filter(|r| !wanted.contains(r.role_id.as_str()))
        .map(|r| r.role_id.clone())
        .collect();
}

/// Membership manager.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_orgs::organizations::{AddMember, MemberQuery, MembershipManager};
///
/// let members = MembershipManager::new(org_store, membership_store, role_store, directory, config);
///
/// members
///     .add_member(AddMember::new(&org.id, "user_1").primary(true).roles([&viewer.id]))
///     .await?;
///
/// let page = members.get_members(MemberQuery::new(&org.id).search("alice")).await?;
/// ```
pub struct MembershipManager<O, M, R, D, A = ()>
where
    O: OrganizationStore,
    M: MembershipStore,
    R: RoleStore,
    D: UserDirectory,
    A: OptionalAuditStore,
{
    org_store: O,
    membership_store: M,
    role_store: R,
    directory: D,
    audit_store: A,
    config: OrganizationConfig,
}

impl<O, M, R, D> MembershipManager<O, M, R, D, ()>
where
    O: OrganizationStore,
    M: MembershipStore,
    R: RoleStore,
    D: UserDirectory,
{
    /// Create a new membership manager.
    #[must_use]
    pub fn new(
        org_store: O,
        membership_store: M,
        role_store: R,
        directory: D,
        config: OrganizationConfig,
    ) -> Self {
        Self {
            org_store,
            membership_store,
            role_store,
            directory,
            audit_store: (),
            config,
        }
    }

    /// Enable audit logging with the given store.
    pub fn with_audit_store<AuditStore: OrgAuditStore + Clone + 'static>(
        self,
        audit_store: AuditStore,
    ) -> MembershipManager<O, M, R, D, WithAuditStore<AuditStore>> {
        MembershipManager {
            org_store: self.org_store,
            membership_store: self.membership_store,
            role_store: self.role_store,
            directory: self.directory,
            audit_store: WithAuditStore(audit_store),
            config: self.config,
        }
    }
}

impl<O, M, R, D, A> MembershipManager<O, M, R, D, A>
where
    O: OrganizationStore,
    M: MembershipStore,
    R: RoleStore,
    D: UserDirectory,
    A: OptionalAuditStore,
{
    /// Get a reference to the membership store.
    pub fn membership_store(&self) -> &M {
        &self.membership_store
    }

    /// Add a user to an organization.
    ///
    /// A primary membership clears the primary flag on the user's other
    /// memberships in the same tenant, in the same write.
    #[instrument(skip(self, request), fields(org_id = %request.org_id, user_id = %request.user_id))]
    pub async fn add_member(&self, request: AddMember) -> Result<Membership> {
        if request.user_id.trim().is_empty() {
            return Err(OrganizationError::validation("user_id", "must not be empty"));
        }

        let org = self.load_org(&request.org_id).await?;
        if let (Some(expected), Some(actual)) = (&org.tenant_id, &request.tenant_id) {
            if expected != actual {
                debug!(expected = %expected, actual = %actual, "Tenant mismatch");
                return Err(OrganizationError::tenant_mismatch(expected, actual));
            }
        }

        if self
            .membership_store
            .find(&org.id, &request.user_id)
            .await?
            .is_some()
        {
            debug!("User is already a member");
            return Err(OrganizationError::AlreadyMember);
        }

        let role_ids = validate_assignable_roles(&self.role_store, &org, &request.role_ids).await?;

        let membership = new_membership(
            &org,
            &request.user_id,
            request.is_primary,
            &role_ids,
            current_timestamp(),
        );
        self.membership_store
            .insert(&membership, membership.is_primary)
            .await?;

        info!(
            is_primary = membership.is_primary,
            roles = role_ids.len(),
            "Member added"
        );
        self.audit_store
            .record(
                OrgAuditEntry::new(OrgAuditEvent::MemberAdded, &org.id)
                    .with_target(&membership.user_id),
            )
            .await;

        Ok(membership)
    }

    /// Get a user's membership in an organization.
    #[instrument(skip(self))]
    pub async fn get_membership(&self, org_id: &str, user_id: &str) -> Result<Option<Membership>> {
        Ok(self.membership_store.find(org_id, user_id).await?)
    }

    /// A user's memberships, primary first.
    ///
    /// With a tenant, only memberships in that tenant are returned;
    /// without one, memberships in every tenant.
    #[instrument(skip(self))]
    pub async fn get_memberships_for_user(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
    ) -> Result<Vec<Membership>> {
        let mut memberships: Vec<Membership> = self
            .membership_store
            .list_for_user(user_id)
            .await?
            .into_iter()
            .filter(|m| tenant_id.is_none_or(|t| m.tenant_id.as_deref() == Some(t)))
            .collect();
        memberships.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
                .then_with(|| a.org_id.cmp(&b.org_id))
        });
        Ok(memberships)
    }

    /// One page of an organization's members.
    ///
    /// Search text is matched literally against the user directory.
    #[instrument(skip(self, query), fields(org_id = %query.org_id))]
    pub async fn get_members(&self, query: MemberQuery) -> Result<MemberPage> {
        let page = query.page.unwrap_or(1).max(1);
        let page_size = self.config.clamp_page_size(query.page_size);

        let user_ids = match query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => {
                let ids = self
                    .directory
                    .search_user_ids(&LikePattern::contains(text))
                    .await?;
                if ids.is_empty() {
                    debug!("Search matched no users");
                    return Ok(MemberPage::empty(page, page_size));
                }
                Some(ids)
            }
            None => None,
        };

        let filter = MemberFilter {
            org_id: query.org_id,
            is_primary: query.is_primary,
            role_id: query.role_id,
            user_ids,
        };
        let offset = u64::from(page - 1) * u64::from(page_size);
        let (items, total) = self.membership_store.query(&filter, offset, page_size).await?;

        if total == 0 {
            return Ok(MemberPage::empty(page, page_size));
        }

        let total_pages = u32::try_from(total.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX);
        Ok(MemberPage {
            items,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Change a membership's primary flag and/or role set.
    ///
    /// Only the role differences are written. When nothing changes the
    /// membership is returned as stored, without touching `updated_at`.
    #[instrument(skip(self, update))]
    pub async fn update_membership(
        &self,
        org_id: &str,
        user_id: &str,
        update: UpdateMembership,
    ) -> Result<Membership> {
        let existing = self
            .membership_store
            .find(org_id, user_id)
            .await?
            .ok_or_else(|| OrganizationError::membership_not_found(org_id, user_id))?;

        let now = current_timestamp();
        let mut changes = MembershipChanges {
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            updated_at: now,
            ..MembershipChanges::default()
        };

        if let Some(is_primary) = update.is_primary.filter(|p| *p != existing.is_primary) {
            changes.is_primary = Some(is_primary);
            changes.clear_other_primary = is_primary;
        }

        if let Some(role_ids) = update.role_ids {
            let desired = dedup_ids(&role_ids);
            let org = self.load_org(org_id).await?;
            let new_ids: Vec<String> = desired
                .iter()
                .filter(|id| !existing.has_role(id))
                .cloned()
                .collect();
            validate_assignable_roles(&self.role_store, &org, &new_ids).await?;
            diff_roles(&existing, &org, &desired, now, &mut changes);
        }

        if changes.is_empty() {
            debug!("Membership unchanged");
            return Ok(existing);
        }

        let membership = self.membership_store.apply_changes(&changes).await?;

        info!(
            is_primary = ?changes.is_primary,
            added = changes.added_roles.len(),
            removed = changes.removed_role_ids.len(),
            "Membership updated"
        );
        self.audit_store
            .record(
                OrgAuditEntry::new(OrgAuditEvent::MemberUpdated, org_id)
                    .with_target(user_id)
                    .with_details(format!(
                        "added={},removed={}",
                        changes.added_roles.len(),
                        changes.removed_role_ids.len()
                    )),
            )
            .await;

        Ok(membership)
    }

    /// Remove a member. Removing a non-member succeeds.
    #[instrument(skip(self))]
    pub async fn remove_member(&self, org_id: &str, user_id: &str) -> Result<()> {
        if !self.membership_store.delete(org_id, user_id).await? {
            debug!("Membership already absent");
            return Ok(());
        }

        info!("Member removed");
        self.audit_store
            .record(OrgAuditEntry::new(OrgAuditEvent::MemberRemoved, org_id).with_target(user_id))
            .await;

        Ok(())
    }

    async fn load_org(&self, org_id: &str) -> Result<Organization> {
        self.org_store
            .find_by_id(org_id)
            .await?
            .ok_or_else(|| OrganizationError::not_found(org_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizations::types::OrganizationStatus;

    fn org() -> Organization {
        Organization {
            id: "acme".into(),
            tenant_id: Some("t1".into()),
            slug: "acme".into(),
            display_name: "Acme".into(),
            metadata: Default::default(),
            status: OrganizationStatus::Active,
            created_at: 0,
            updated_at: 0,
            archived_at: None,
        }
    }

    #[test]
    fn test_new_membership_snapshots_tenant() {
        let m = new_membership(&org(), "u1", true, &["r1".into(), "r2".into()], 42);
        assert_eq!(m.tenant_id.as_deref(), Some("t1"));
        assert_eq!(m.role_ids(), vec!["r1", "r2"]);
        assert!(m.roles.iter().all(|r| r.created_at == 42 && r.org_id == "acme"));
    }

    #[test]
    fn test_diff_roles_writes_only_deltas() {
        let existing = new_membership(&org(), "u1", false, &["r1".into(), "r2".into()], 1);
        let mut changes = MembershipChanges::default();

        diff_roles(&existing, &org(), &["r2".into(), "r3".into()], 5, &mut changes);

        assert_eq!(changes.added_roles.len(), 1);
        assert_eq!(changes.added_roles[0].role_id, "r3");
        assert_eq!(changes.removed_role_ids, vec!["r1"]);
    }

    #[test]
    fn test_diff_roles_same_set_is_empty() {
        let existing = new_membership(&org(), "u1", false, &["r1".into(), "r2".into()], 1);
        let mut changes = MembershipChanges::default();

        diff_roles(&existing, &org(), &["r2".into(), "r1".into()], 5, &mut changes);

        assert!(changes.is_empty());
    }
}
