//! Invitation manager.
//!
//! Handles the invitation lifecycle: create, accept (merging into an
//! existing membership), revoke, plus on-demand purging of expired rows.
//!
//! Expiry is evaluated lazily. An expired invitation is deleted when it is
//! accepted or when a new invitation is created for the same address, and
//! is hidden from [`InvitationManager::list`].

use super::audit::{OrgAuditEntry, OrgAuditEvent};
use super::config::InvitationConfig;
use super::directory::DirectoryUser;
use super::error::{OrganizationError, Result};
use super::membership_manager::new_membership;
use super::role_manager::{role_fits, validate_assignable_roles};
use super::storage::{
    InvitationStore, MembershipChanges, MembershipStore, OptionalAuditStore, OrgAuditStore,
    OrganizationStore, RoleStore, WithAuditStore,
};
use super::types::{AcceptedInvitation, CreateInvitation, Invitation, Membership, Organization, RoleAssignment};
use super::utils::{current_timestamp, dedup_ids, generate_secure_token, is_valid_email, normalize_email};
use crate::error::StoreError;
use tracing::{debug, info, instrument, warn};

/// Invitation manager.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_orgs::organizations::{CreateInvitation, InvitationConfig, InvitationManager};
///
/// let invitations = InvitationManager::new(
///     org_store,
///     membership_store,
///     role_store,
///     invitation_store,
///     InvitationConfig::default(),
/// );
///
/// let invitation = invitations
///     .create(CreateInvitation::new(&org.id, "alice@example.com", "admin_1").roles([&viewer.id]))
///     .await?;
///
/// // Later, once Alice has signed in:
/// let accepted = invitations.accept(&invitation.code, &alice).await?;
/// ```
pub struct InvitationManager<O, M, R, I, A = ()>
where
    O: OrganizationStore,
    M: MembershipStore,
    R: RoleStore,
    I: InvitationStore,
    A: OptionalAuditStore,
{
    org_store: O,
    membership_store: M,
    role_store: R,
    invitation_store: I,
    audit_store: A,
    config: InvitationConfig,
}

impl<O, M, R, I> InvitationManager<O, M, R, I, ()>
where
    O: OrganizationStore,
    M: MembershipStore,
    R: RoleStore,
    I: InvitationStore,
{
    /// Create a new invitation manager.
    #[must_use]
    pub fn new(
        org_store: O,
        membership_store: M,
        role_store: R,
        invitation_store: I,
        config: InvitationConfig,
    ) -> Self {
        Self {
            org_store,
            membership_store,
            role_store,
            invitation_store,
            audit_store: (),
            config,
        }
    }

    /// Enable audit logging with the given store.
    pub fn with_audit_store<AuditStore: OrgAuditStore + Clone + 'static>(
        self,
        audit_store: AuditStore,
    ) -> InvitationManager<O, M, R, I, WithAuditStore<AuditStore>> {
        InvitationManager {
            org_store: self.org_store,
            membership_store: self.membership_store,
            role_store: self.role_store,
            invitation_store: self.invitation_store,
            audit_store: WithAuditStore(audit_store),
            config: self.config,
        }
    }
}

impl<O, M, R, I, A> InvitationManager<O, M, R, I, A>
where
    O: OrganizationStore,
    M: MembershipStore,
    R: RoleStore,
    I: InvitationStore,
    A: OptionalAuditStore,
{
    /// Get a reference to the invitation store.
    pub fn invitation_store(&self) -> &I {
        &self.invitation_store
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &InvitationConfig {
        &self.config
    }

    /// Create an invitation.
    ///
    /// Fails with [`OrganizationError::InvitationAlreadyExists`] while an
    /// unexpired invitation for the same address exists.
    #[instrument(skip(self, request), fields(org_id = %request.org_id, created_by = %request.created_by))]
    pub async fn create(&self, request: CreateInvitation) -> Result<Invitation> {
        let email = normalize_email(&request.email);
        if !is_valid_email(&email) {
            return Err(OrganizationError::validation("email", "is not a valid address"));
        }
        if request.created_by.trim().is_empty() {
            return Err(OrganizationError::validation("created_by", "must not be empty"));
        }

        let org = self.load_org(&request.org_id).await?;
        let role_ids = validate_assignable_roles(&self.role_store, &org, &request.role_ids).await?;

        let now = current_timestamp();
        if let Some(existing) = self.invitation_store.find_for_email(&org.id, &email).await? {
            if !existing.is_expired_at(now) {
                debug!("Unexpired invitation already exists for address");
                return Err(OrganizationError::InvitationAlreadyExists);
            }
            debug!("Replacing expired invitation");
            self.invitation_store.delete(&existing.code).await?;
        }

        let invitation = Invitation {
            code: generate_secure_token(),
            org_id: org.id.clone(),
            org_slug: org.slug.clone(),
            org_display_name: org.display_name.clone(),
            email,
            role_ids,
            created_by: request.created_by,
            created_at: now,
            expires_at: now + self.config.expiry_seconds(request.expires_in_hours),
        };

        match self.invitation_store.create(&invitation).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                debug!("Concurrent invitation for the same address");
                return Err(OrganizationError::InvitationAlreadyExists);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            expires_at = invitation.expires_at,
            roles = invitation.role_ids.len(),
            "Invitation created"
        );
        self.audit_store
            .record(
                OrgAuditEntry::new(OrgAuditEvent::InvitationCreated, &org.id)
                    .with_actor(&invitation.created_by)
                    .with_details(format!("roles={}", invitation.role_ids.len())),
            )
            .await;

        Ok(invitation)
    }

    /// Accept an invitation as `user`.
    ///
    /// Creates the membership with the invited roles, or adds them to an
    /// existing membership. The invitation is deleted afterwards, so a code
    /// can be used once. Invited roles that were deleted or no longer fit
    /// the organization are skipped.
    #[instrument(skip(self, code, user), fields(user_id = %user.id))]
    pub async fn accept(&self, code: &str, user: &DirectoryUser) -> Result<AcceptedInvitation> {
        let invitation = self
            .invitation_store
            .find_by_code(code)
            .await?
            .ok_or(OrganizationError::InvitationNotFound)?;

        if normalize_email(&user.email) != invitation.email {
            debug!(org_id = %invitation.org_id, "Invitation email does not match accepting user");
            return Err(OrganizationError::EmailMismatch);
        }

        let now = current_timestamp();
        if invitation.is_expired_at(now) {
            debug!(org_id = %invitation.org_id, "Invitation expired");
            self.invitation_store.delete(code).await?;
            return Err(OrganizationError::InvitationExpired);
        }

        let Some(org) = self.org_store.find_by_id(&invitation.org_id).await? else {
            debug!(org_id = %invitation.org_id, "Invitation organization no longer exists");
            self.invitation_store.delete(code).await?;
            return Err(OrganizationError::InvitationNotFound);
        };

        let role_ids = self.still_assignable(&org, &invitation.role_ids).await?;

        let existing = self.membership_store.find(&org.id, &user.id).await?;
        let was_existing_member = existing.is_some();
        let membership = match existing {
            None => {
                let membership = new_membership(&org, &user.id, false, &role_ids, now);
                self.membership_store.insert(&membership, false).await?;
                membership
            }
            Some(existing) => self.merge_roles(&org, existing, &role_ids, now).await?,
        };

        self.invitation_store.delete(code).await?;

        info!(org_id = %org.id, was_existing_member, "Invitation accepted");
        self.audit_store
            .record(
                OrgAuditEntry::new(OrgAuditEvent::InvitationAccepted, &org.id)
                    .with_actor(&user.id)
                    .with_target(&user.id),
            )
            .await;
        let member_event = if was_existing_member {
            OrgAuditEvent::MemberUpdated
        } else {
            OrgAuditEvent::MemberAdded
        };
        self.audit_store
            .record(
                OrgAuditEntry::new(member_event, &org.id)
                    .with_target(&user.id)
                    .with_details("via=invitation"),
            )
            .await;

        Ok(AcceptedInvitation {
            org_id: org.id,
            org_slug: org.slug,
            membership,
            was_existing_member,
            user_predates_invitation: user.created_at < invitation.created_at,
        })
    }

    /// Revoke an invitation of an organization.
    ///
    /// Returns `false` if the code is unknown or belongs to another
    /// organization.
    #[instrument(skip(self, code))]
    pub async fn revoke(&self, org_id: &str, code: &str) -> Result<bool> {
        let Some(invitation) = self
            .invitation_store
            .find_by_code(code)
            .await?
            .filter(|inv| inv.org_id == org_id)
        else {
            debug!("No matching invitation to revoke");
            return Ok(false);
        };

        if !self.invitation_store.delete(&invitation.code).await? {
            return Ok(false);
        }

        info!("Invitation revoked");
        self.audit_store
            .record(OrgAuditEntry::new(OrgAuditEvent::InvitationRevoked, org_id))
            .await;

        Ok(true)
    }

    /// Find an invitation by code, expired or not.
    #[instrument(skip(self, code))]
    pub async fn find(&self, code: &str) -> Result<Option<Invitation>> {
        Ok(self.invitation_store.find_by_code(code).await?)
    }

    /// Unexpired invitations of an organization, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, org_id: &str) -> Result<Vec<Invitation>> {
        let now = current_timestamp();
        Ok(self
            .invitation_store
            .list_for_org(org_id)
            .await?
            .into_iter()
            .filter(|inv| !inv.is_expired_at(now))
            .collect())
    }

    /// Delete every expired invitation. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64> {
        let count = self
            .invitation_store
            .delete_expired(current_timestamp())
            .await?;
        if count > 0 {
            info!(count, "Expired invitations purged");
        }
        Ok(count)
    }

    async fn load_org(&self, org_id: &str) -> Result<Organization> {
        self.org_store
            .find_by_id(org_id)
            .await?
            .ok_or_else(|| OrganizationError::not_found(org_id))
    }

    async fn still_assignable(&self, org: &Organization, role_ids: &[String]) -> Result<Vec<String>> {
        let role_ids = dedup_ids(role_ids);
        if role_ids.is_empty() {
            return Ok(role_ids);
        }
        let roles = self.role_store.find_many(&role_ids).await?;
        Ok(role_ids
            .into_iter()
            .filter(|id| {
                let usable = roles.iter().any(|r| &r.id == id && role_fits(r, org));
                if !usable {
                    warn!(role_id = %id, org_id = %org.id, "Skipping invited role that is no longer assignable");
                }
                usable
            })
            .collect())
    }

    async fn merge_roles(
        &self,
        org: &Organization,
        existing: Membership,
        invited: &[String],
        now: u64,
    ) -> Result<Membership> {
        let added_roles: Vec<RoleAssignment> = invited
            .iter()
            .filter(|id| !existing.has_role(id))
            .map(|role_id| RoleAssignment {
                org_id: org.id.clone(),
                user_id: existing.user_id.clone(),
                role_id: role_id.clone(),
                tenant_id: org.tenant_id.clone(),
                created_at: now,
            })
            .collect();

        if added_roles.is_empty() {
            debug!("Existing membership already holds every invited role");
            return Ok(existing);
        }

        let changes = MembershipChanges {
            org_id: org.id.clone(),
            user_id: existing.user_id.clone(),
            added_roles,
            updated_at: now,
            ..MembershipChanges::default()
        };
        Ok(self.membership_store.apply_changes(&changes).await?)
    }
}
