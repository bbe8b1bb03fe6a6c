//! Token claims for organization context.
//!
//! [`format_claims`] is a pure function of the resolved permissions and the
//! ambient organization. [`OrganizationClaimsContributor`] wires it to the
//! resolver and context accessor for use during token issuance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::organizations::context::{OrganizationContext, OrganizationContextAccessor};
use crate::organizations::directory::PermissionCatalog;
use crate::organizations::error::Result;
use crate::organizations::permissions::normalize_permission_names;
use crate::organizations::resolver::PermissionResolver;
use crate::organizations::storage::{MembershipStore, RoleStore};

/// Claim carrying the space-separated permission names.
pub const PERMISSIONS_CLAIM: &str = "permissions";
/// Claim carrying the organization ID.
pub const ORG_ID_CLAIM: &str = "org_id";
/// Claim carrying the organization slug.
pub const ORG_SLUG_CLAIM: &str = "org_slug";
/// Claim carrying the organization display name.
pub const ORG_NAME_CLAIM: &str = "org_name";

/// A single name/value claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub name: String,
    pub value: String,
}

impl Claim {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Organization claims in their structured form, for embedding as custom
/// JWT claims.
///
/// # Example
///
/// ```rust
/// use tideway_orgs::organizations::{OrgClaims, OrganizationContext};
///
/// let context = OrganizationContext::new("org_1", "acme", "Acme Inc");
/// let claims = OrgClaims::new(&["users.read".to_string()], &context);
///
/// assert_eq!(claims.permissions.as_deref(), Some("users.read"));
/// assert_eq!(claims.org_slug.as_deref(), Some("acme"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
}

impl OrgClaims {
    /// Build claims from resolved permissions and the ambient context.
    pub fn new<S: AsRef<str>>(permissions: &[S], context: &OrganizationContext) -> Self {
        let permissions = normalize_permission_names(permissions);
        let mut claims = Self {
            permissions: (!permissions.is_empty()).then(|| permissions.join(" ")),
            ..Self::default()
        };
        if context.has_organization() {
            claims.org_id = context.org_id().map(String::from);
            claims.org_slug = context.slug().map(String::from);
            claims.org_name = context.display_name().map(String::from);
        }
        claims
    }

    /// Flatten into name/value claims, omitting absent values.
    #[must_use]
    pub fn into_claims(self) -> Vec<Claim> {
        [
            (PERMISSIONS_CLAIM, self.permissions),
            (ORG_ID_CLAIM, self.org_id),
            (ORG_SLUG_CLAIM, self.org_slug),
            (ORG_NAME_CLAIM, self.org_name),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| Claim::new(name, v)))
        .collect()
    }
}

/// Render permissions and the ambient organization as claims.
///
/// Emits one `permissions` claim (sorted, case-insensitively unique names
/// joined by spaces) when there is at least one permission, and the
/// organization claims only when the context names an organization.
pub fn format_claims<S: AsRef<str>>(permissions: &[S], context: &OrganizationContext) -> Vec<Claim> {
    OrgClaims::new(permissions, context).into_claims()
}

/// Hook invoked during token issuance to add claims.
#[async_trait]
pub trait ClaimsContributor: Send + Sync {
    /// Claims to add to a token issued for `user_id`.
    async fn contribute(&self, user_id: &str, tenant_id: Option<&str>) -> Result<Vec<Claim>>;
}

/// [`ClaimsContributor`] that adds resolved permissions and the ambient
/// organization.
pub struct OrganizationClaimsContributor<M, R, C, X>
where
    M: MembershipStore,
    R: RoleStore,
    C: PermissionCatalog,
    X: OrganizationContextAccessor,
{
    resolver: PermissionResolver<M, R, C>,
    accessor: X,
}

impl<M, R, C, X> OrganizationClaimsContributor<M, R, C, X>
where
    M: MembershipStore,
    R: RoleStore,
    C: PermissionCatalog,
    X: OrganizationContextAccessor,
{
    #[must_use]
    pub fn new(resolver: PermissionResolver<M, R, C>, accessor: X) -> Self {
        Self { resolver, accessor }
    }
}

#[async_trait]
impl<M, R, C, X> ClaimsContributor for OrganizationClaimsContributor<M, R, C, X>
where
    M: MembershipStore,
    R: RoleStore,
    C: PermissionCatalog,
    X: OrganizationContextAccessor,
{
    async fn contribute(&self, user_id: &str, tenant_id: Option<&str>) -> Result<Vec<Claim>> {
        let context = self.accessor.current();
        let permissions = self
            .resolver
            .get_permissions(user_id, tenant_id, context.org_id())
            .await?;
        Ok(format_claims(&permissions, &context))
    }
}
