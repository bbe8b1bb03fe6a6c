//! Permission resolution for token issuance.
//!
//! [`PermissionResolver`] answers "what can this user do", driven by the
//! roles assigned to a membership. Catalog failures degrade to an empty
//! set with a warning: a token issued without organization permissions is
//! a legitimate outcome.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::context::OrganizationContextAccessor;
use super::directory::PermissionCatalog;
use super::error::Result;
use super::permissions::{member_visible_ids, names_for_ids, normalize_permission_names};
use super::storage::{MembershipStore, RoleStore};
use super::utils::dedup_ids;

/// Resolves a user's effective permission names.
pub struct PermissionResolver<M, R, C>
where
    M: MembershipStore,
    R: RoleStore,
    C: PermissionCatalog,
{
    membership_store: M,
    role_store: R,
    catalog: C,
}

impl<M, R, C> PermissionResolver<M, R, C>
where
    M: MembershipStore,
    R: RoleStore,
    C: PermissionCatalog,
{
    /// Create a new resolver.
    #[must_use]
    pub fn new(membership_store: M, role_store: R, catalog: C) -> Self {
        Self {
            membership_store,
            role_store,
            catalog,
        }
    }

    /// Global permissions plus, when `org_id` is given and non-empty, the
    /// permissions granted in that organization.
    ///
    /// Case-insensitively de-duplicated and sorted.
    #[instrument(skip(self))]
    pub async fn get_permissions(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
        org_id: Option<&str>,
    ) -> Result<Vec<String>> {
        let global = match self.catalog.user_permissions(user_id, tenant_id).await {
            Ok(permissions) => permissions,
            Err(e) => {
                warn!(error = %e, unavailable = e.is_unavailable(), "Global permissions unavailable; continuing without them");
                Vec::new()
            }
        };

        let org = match org_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(org_id) => self.get_organization_permissions(org_id, user_id).await?,
            None => Vec::new(),
        };

        Ok(normalize_permission_names(global.into_iter().chain(org)))
    }

    /// Permissions the user holds in one organization through assigned roles.
    ///
    /// Empty when the user is not a member. Assignments to deleted roles are
    /// ignored.
    #[instrument(skip(self))]
    pub async fn get_organization_permissions(&self, org_id: &str, user_id: &str) -> Result<Vec<String>> {
        let Some(membership) = self.membership_store.find(org_id, user_id).await? else {
            debug!("Not a member; no organization permissions");
            return Ok(Vec::new());
        };

        let assigned = dedup_ids(&membership.role_ids());
        if assigned.is_empty() {
            return Ok(Vec::new());
        }

        let live: Vec<String> = self
            .role_store
            .find_many(&assigned)
            .await?
            .into_iter()
            .map(|role| role.id)
            .collect();
        if live.len() < assigned.len() {
            debug!(
                dangling = assigned.len() - live.len(),
                "Ignoring assignments to deleted roles"
            );
        }
        if live.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.role_store.permissions_for_roles(&live).await?;
        let live_set: HashSet<&str> = live.iter().map(String::as_str).collect();
        let ids = dedup_ids(&member_visible_ids(
            &rows,
            &live_set,
            org_id,
            membership.tenant_id.as_deref(),
        ));
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let catalog = match self.catalog.names_for_ids(&ids).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Permission catalog unavailable; resolving no organization permissions");
                return Ok(Vec::new());
            }
        };

        Ok(normalize_permission_names(names_for_ids(&ids, &catalog)))
    }
}

/// Hook letting a generic authorization layer ask which extra permissions
/// the current request's organization grants a user.
#[async_trait]
pub trait AdditionalPermissionSource: Send + Sync {
    /// Extra permission names for `user_id`; empty when none apply.
    async fn additional_permissions(&self, user_id: &str) -> Result<Vec<String>>;
}

/// [`AdditionalPermissionSource`] backed by the ambient organization.
///
/// Outside an organization scope it contributes nothing.
pub struct OrganizationPermissionSource<M, R, C, X>
where
    M: MembershipStore,
    R: RoleStore,
    C: PermissionCatalog,
    X: OrganizationContextAccessor,
{
    resolver: PermissionResolver<M, R, C>,
    accessor: X,
}

impl<M, R, C, X> OrganizationPermissionSource<M, R, C, X>
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
impl<M, R, C, X> AdditionalPermissionSource for OrganizationPermissionSource<M, R, C, X>
where
    M: MembershipStore,
    R: RoleStore,
    C: PermissionCatalog,
    X: OrganizationContextAccessor,
{
    async fn additional_permissions(&self, user_id: &str) -> Result<Vec<String>> {
        let context = self.accessor.current();
        match context.org_id() {
            Some(org_id) => {
                self.resolver
                    .get_organization_permissions(org_id, user_id)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }
}
