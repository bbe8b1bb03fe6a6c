//! Organization domain types.
//!
//! These are the records the managers read and write through the storage
//! traits, plus the request/response shapes of the manager operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// String-keyed organization metadata.
pub type OrganizationMetadata = BTreeMap<String, String>;

/// Lifecycle status of an organization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    /// Organization is in use.
    #[default]
    Active,
    /// Organization has been archived.
    Archived,
}

impl OrganizationStatus {
    /// Get the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// Error returned when parsing a status string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid_value: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid organization status: '{}' (expected: active or archived)",
            self.invalid_value
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for OrganizationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            _ => Err(ParseStatusError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OrganizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An organization within an optional tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier.
    pub id: String,
    /// Owning tenant, `None` for the global scope.
    pub tenant_id: Option<String>,
    /// Lowercase URL-safe slug, unique within the tenant.
    pub slug: String,
    /// Display name, unique within the tenant.
    pub display_name: String,
    /// Free-form metadata.
    pub metadata: OrganizationMetadata,
    /// Lifecycle status.
    pub status: OrganizationStatus,
    /// Creation timestamp (Unix seconds).
    pub created_at: u64,
    /// Last update timestamp (Unix seconds).
    pub updated_at: u64,
    /// Set while the organization is archived.
    pub archived_at: Option<u64>,
}

impl Organization {
    /// Whether the organization has been archived.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.status == OrganizationStatus::Archived
    }
}

/// A role granted to a member within one organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub org_id: String,
    pub user_id: String,
    pub role_id: String,
    pub tenant_id: Option<String>,
    pub created_at: u64,
}

/// A user's membership in an organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Organization ID.
    pub org_id: String,
    /// User ID.
    pub user_id: String,
    /// Tenant of the organization when the membership was created.
    pub tenant_id: Option<String>,
    /// Whether this is the user's default organization in the tenant.
    pub is_primary: bool,
    /// Roles assigned within the organization.
    pub roles: Vec<RoleAssignment>,
    /// Creation timestamp (Unix seconds).
    pub created_at: u64,
    /// Last update timestamp (Unix seconds).
    pub updated_at: u64,
}

impl Membership {
    /// IDs of the assigned roles, in assignment order.
    #[must_use]
    pub fn role_ids(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.role_id.clone()).collect()
    }

    /// Whether the given role is assigned.
    #[must_use]
    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r.role_id == role_id)
    }
}

/// A role definition.
///
/// A role without an organization is a *template*: it can be assigned in
/// any organization its tenant scope allows, and its baseline permissions
/// are inherited wherever it is used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    /// Owning organization, `None` for template roles.
    pub org_id: Option<String>,
    pub tenant_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// System roles cannot be deleted.
    pub is_system_role: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Role {
    /// Whether this role has no owning organization.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.org_id.is_none()
    }

    /// Whether the role is defined outside the given scope (`None` is the
    /// global scope), so that its own-scope permissions act as an inherited
    /// baseline there.
    #[must_use]
    pub fn is_template_for(&self, org_id: Option<&str>) -> bool {
        self.org_id.as_deref() != org_id
    }
}

/// A permission granted by a role at a given scope.
///
/// Several rows may exist for the same `(role_id, permission_id)` pair at
/// different scopes: the row at the role's own scope is the baseline, rows
/// at an organization's scope are that organization's overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: String,
    pub role_id: String,
    pub permission_id: String,
    pub org_id: Option<String>,
    pub tenant_id: Option<String>,
}

/// A pending invitation to join an organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Single-use bearer code; also the record key.
    pub code: String,
    pub org_id: String,
    /// Organization slug when the invitation was created.
    pub org_slug: String,
    /// Organization display name when the invitation was created.
    pub org_display_name: String,
    /// Trimmed, lowercased invitee address.
    pub email: String,
    /// Roles granted on acceptance.
    pub role_ids: Vec<String>,
    /// User who created the invitation.
    pub created_by: String,
    /// Creation timestamp (Unix seconds).
    pub created_at: u64,
    /// Expiration timestamp (Unix seconds).
    pub expires_at: u64,
}

impl Invitation {
    /// Whether the invitation has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Input for [`OrganizationManager::create`](crate::organizations::OrganizationManager::create).
#[derive(Clone, Debug, Default)]
pub struct CreateOrganization {
    pub slug: String,
    pub display_name: String,
    pub tenant_id: Option<String>,
    pub metadata: OrganizationMetadata,
}

impl CreateOrganization {
    /// Start a request with the required fields.
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    /// Place the organization in a tenant.
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Add one metadata entry.
    #[must_use]
    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the metadata map.
    #[must_use]
    pub fn metadata(mut self, metadata: OrganizationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Partial update for an organization. `None` fields are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct UpdateOrganization {
    pub display_name: Option<String>,
    pub metadata: Option<OrganizationMetadata>,
    pub status: Option<OrganizationStatus>,
}

impl UpdateOrganization {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: OrganizationMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn status(mut self, status: OrganizationStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Input for [`MembershipManager::add_member`](crate::organizations::MembershipManager::add_member).
#[derive(Clone, Debug, Default)]
pub struct AddMember {
    pub org_id: String,
    pub user_id: String,
    /// Tenant the caller believes the organization belongs to.
    pub tenant_id: Option<String>,
    pub is_primary: bool,
    pub role_ids: Vec<String>,
}

impl AddMember {
    pub fn new(org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    #[must_use]
    pub fn roles<I, S>(mut self, role_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_ids = role_ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update for a membership. `None` fields are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct UpdateMembership {
    pub is_primary: Option<bool>,
    /// Desired complete role set.
    pub role_ids: Option<Vec<String>>,
}

impl UpdateMembership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn primary(mut self, is_primary: bool) -> Self {
        self.is_primary = Some(is_primary);
        self
    }

    #[must_use]
    pub fn roles<I, S>(mut self, role_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_ids = Some(role_ids.into_iter().map(Into::into).collect());
        self
    }
}

/// Member listing request.
#[derive(Clone, Debug, Default)]
pub struct MemberQuery {
    pub org_id: String,
    /// Only primary (or only non-primary) memberships.
    pub is_primary: Option<bool>,
    /// Only members holding this role.
    pub role_id: Option<String>,
    /// Free text matched against the user directory.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl MemberQuery {
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn primary(mut self, is_primary: bool) -> Self {
        self.is_primary = Some(is_primary);
        self
    }

    #[must_use]
    pub fn role(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Store-level member filter built from a [`MemberQuery`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberFilter {
    pub org_id: String,
    pub is_primary: Option<bool>,
    pub role_id: Option<String>,
    /// Restrict to these users (from a directory search).
    pub user_ids: Option<Vec<String>>,
}

/// One page of members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberPage {
    pub items: Vec<Membership>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl MemberPage {
    pub(crate) fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
            total_pages: 0,
        }
    }
}

/// Input for [`RoleManager::create_role`](crate::organizations::RoleManager::create_role).
#[derive(Clone, Debug, Default)]
pub struct CreateRole {
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub org_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl CreateRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn system(mut self, is_system_role: bool) -> Self {
        self.is_system_role = is_system_role;
        self
    }

    #[must_use]
    pub fn organization(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Partial update for a role. `None` fields are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct UpdateRole {
    pub name: Option<String>,
    /// New description; an empty string clears it.
    pub description: Option<String>,
}

impl UpdateRole {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Permissions a role grants within one organization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RolePermissions {
    /// Baseline plus explicit, sorted and de-duplicated.
    pub effective: Vec<String>,
    /// Assigned exactly at the queried organization.
    pub explicit: Vec<String>,
}

/// Input for [`InvitationManager::create`](crate::organizations::InvitationManager::create).
#[derive(Clone, Debug, Default)]
pub struct CreateInvitation {
    pub org_id: String,
    pub email: String,
    pub role_ids: Vec<String>,
    pub created_by: String,
    pub expires_in_hours: Option<u32>,
}

impl CreateInvitation {
    pub fn new(
        org_id: impl Into<String>,
        email: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            email: email.into(),
            created_by: created_by.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn roles<I, S>(mut self, role_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_ids = role_ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn expires_in_hours(mut self, hours: u32) -> Self {
        self.expires_in_hours = Some(hours);
        self
    }
}

/// Outcome of accepting an invitation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AcceptedInvitation {
    pub org_id: String,
    pub org_slug: String,
    /// The membership after acceptance.
    pub membership: Membership,
    /// The user already belonged to the organization.
    pub was_existing_member: bool,
    /// The account was created before the invitation.
    pub user_predates_invitation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "active".parse::<OrganizationStatus>().unwrap(),
            OrganizationStatus::Active
        );
        assert_eq!(
            "ARCHIVED".parse::<OrganizationStatus>().unwrap(),
            OrganizationStatus::Archived
        );
        assert!("deleted".parse::<OrganizationStatus>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&OrganizationStatus::Archived).unwrap();
        assert_eq!(json, "\"archived\"");
        assert_eq!(OrganizationStatus::Active.to_string(), "active");
    }

    #[test]
    fn test_role_template_checks() {
        let template = Role {
            id: "r1".into(),
            org_id: None,
            tenant_id: None,
            name: "Manager".into(),
            description: None,
            is_system_role: false,
            created_at: 0,
            updated_at: 0,
        };
        assert!(template.is_template());
        assert!(template.is_template_for(Some("acme")));
        assert!(!template.is_template_for(None));

        let scoped = Role {
            org_id: Some("acme".into()),
            ..template
        };
        assert!(!scoped.is_template());
        assert!(!scoped.is_template_for(Some("acme")));
        assert!(scoped.is_template_for(Some("globex")));
        assert!(scoped.is_template_for(None));
    }

    #[test]
    fn test_invitation_expiry() {
        let inv = Invitation {
            code: "c".into(),
            org_id: "o".into(),
            org_slug: "o".into(),
            org_display_name: "O".into(),
            email: "a@example.com".into(),
            role_ids: vec![],
            created_by: "u".into(),
            created_at: 100,
            expires_at: 200,
        };
        assert!(!inv.is_expired_at(199));
        assert!(inv.is_expired_at(200));
    }

    #[test]
    fn test_request_builders() {
        let req = AddMember::new("org", "user")
            .tenant("t1")
            .primary(true)
            .roles(["r1", "r2"]);
        assert_eq!(req.tenant_id.as_deref(), Some("t1"));
        assert!(req.is_primary);
        assert_eq!(req.role_ids, vec!["r1".to_string(), "r2".to_string()]);

        let query = MemberQuery::new("org").search("50%").page(2).page_size(10);
        assert_eq!(query.search.as_deref(), Some("50%"));
        assert_eq!(query.page, Some(2));
    }
}
