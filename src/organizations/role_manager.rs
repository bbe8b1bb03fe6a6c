//! Role manager.
//!
//! Role CRUD and scoped permission assignment. Permission reads follow the
//! template/override rules in [`permissions`](super::permissions).

use std::collections::HashSet;

use super::audit::{OrgAuditEntry, OrgAuditEvent};
use super::config::OrganizationConfig;
use super::directory::PermissionCatalog;
use super::error::{OrganizationError, Result};
use super::permissions::{
    merge_inherited, names_for_ids, normalize_permission_names, split_scoped_rows, tenant_visible,
};
use super::storage::{OptionalAuditStore, OrgAuditStore, OrganizationStore, RoleStore, WithAuditStore};
use super::types::{CreateRole, Organization, Role, RolePermission, RolePermissions, UpdateRole};
use super::utils::{current_timestamp, dedup_ids};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Whether a role may be assigned in an organization: its organization is
/// unset or equal, and its tenant is unset or equal.
pub(crate) fn role_fits(role: &Role, org: &Organization) -> bool {
    role.org_id.as_deref().is_none_or(|o| o == org.id)
        && role
            .tenant_id
            .as_deref()
            .is_none_or(|t| Some(t) == org.tenant_id.as_deref())
}

/// Load and check the roles requested for a membership or invitation.
///
/// Returns the de-duplicated IDs in request order. A missing role or a role
/// from another scope rejects the whole request.
pub(crate) async fn validate_assignable_roles<R: RoleStore + ?Sized>(
    store: &R,
    org: &Organization,
    role_ids: &[String],
) -> Result<Vec<String>> {
    let role_ids = dedup_ids(role_ids);
    if role_ids.is_empty() {
        return Ok(role_ids);
    }

    let roles = store.find_many(&role_ids).await?;
    for id in &role_ids {
        let role = roles
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| OrganizationError::role_not_found(id))?;
        if !role_fits(role, org) {
            debug!(role_id = %id, org_id = %org.id, "Role not assignable in organization");
            return Err(OrganizationError::role_scope_mismatch(id, &org.id));
        }
    }
    Ok(role_ids)
}

/// Role manager - generic over organization, role and catalog backends.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_orgs::organizations::{CreateRole, OrganizationConfig, RoleManager};
///
/// let roles = RoleManager::new(org_store, role_store, catalog, OrganizationConfig::default());
///
/// // A template role usable in every organization
/// let manager = roles.create_role(CreateRole::new("Manager")).await?;
/// roles.update_permissions(&manager.id, None, &["x.read".into()]).await?;
///
/// // acme extends it
/// roles.update_permissions(&manager.id, Some(&acme.id), &["x.write".into()]).await?;
/// ```
pub struct RoleManager<O, R, C, A = ()>
where
    O: OrganizationStore,
    R: RoleStore,
    C: PermissionCatalog,
    A: OptionalAuditStore,
{
    org_store: O,
    role_store: R,
    catalog: C,
    audit_store: A,
    config: OrganizationConfig,
}

impl<O, R, C> RoleManager<O, R, C, ()>
where
    O: OrganizationStore,
    R: RoleStore,
    C: PermissionCatalog,
{
    /// Create a new role manager.
    #[must_use]
    pub fn new(org_store: O, role_store: R, catalog: C, config: OrganizationConfig) -> Self {
        Self {
            org_store,
            role_store,
            catalog,
            audit_store: (),
            config,
        }
    }

    /// Enable audit logging with the given store.
    pub fn with_audit_store<AuditStore: OrgAuditStore + Clone + 'static>(
        self,
        audit_store: AuditStore,
    ) -> RoleManager<O, R, C, WithAuditStore<AuditStore>> {
        RoleManager {
            org_store: self.org_store,
            role_store: self.role_store,
            catalog: self.catalog,
            audit_store: WithAuditStore(audit_store),
            config: self.config,
        }
    }
}

impl<O, R, C, A> RoleManager<O, R, C, A>
where
    O: OrganizationStore,
    R: RoleStore,
    C: PermissionCatalog,
    A: OptionalAuditStore,
{
    /// Get a reference to the role store.
    pub fn role_store(&self) -> &R {
        &self.role_store
    }

    /// Create a role.
    ///
    /// When only the organization is given, the tenant is taken from it.
    #[instrument(skip(self, request), fields(role.name = %request.name, org_id = ?request.org_id))]
    pub async fn create_role(&self, request: CreateRole) -> Result<Role> {
        let name = self.validate_name(&request.name)?;
        let description = self.validate_description(request.description.as_deref())?;

        let tenant_id = match request.org_id.as_deref() {
            Some(org_id) => {
                let org = self.load_org(org_id).await?;
                match request.tenant_id {
                    None => org.tenant_id,
                    Some(tenant) if org.tenant_id.as_deref() == Some(tenant.as_str()) => Some(tenant),
                    Some(tenant) => {
                        return Err(OrganizationError::tenant_mismatch(
                            org.tenant_id.unwrap_or_else(|| "global".to_string()),
                            tenant,
                        ));
                    }
                }
            }
            None => request.tenant_id,
        };

        if self
            .role_store
            .find_by_name(tenant_id.as_deref(), request.org_id.as_deref(), &name)
            .await?
            .is_some()
        {
            debug!(name, "Role name already taken in scope");
            return Err(OrganizationError::role_name_taken(name));
        }

        let now = current_timestamp();
        let role = Role {
            id: Uuid::new_v4().to_string(),
            org_id: request.org_id,
            tenant_id,
            name,
            description,
            is_system_role: request.is_system_role,
            created_at: now,
            updated_at: now,
        };

        self.role_store.create(&role).await?;

        info!(role_id = %role.id, name = %role.name, template = role.is_template(), "Role created");
        self.record(OrgAuditEvent::RoleCreated, &role, Some(format!("name={}", role.name)))
            .await;

        Ok(role)
    }

    /// Get a role by ID.
    #[instrument(skip(self))]
    pub async fn get_role(&self, role_id: &str) -> Result<Option<Role>> {
        Ok(self.role_store.find(role_id).await?)
    }

    /// Roles defined at exactly the given scope.
    #[instrument(skip(self))]
    pub async fn list_roles(&self, tenant_id: Option<&str>, org_id: Option<&str>) -> Result<Vec<Role>> {
        Ok(self.role_store.list(tenant_id, org_id).await?)
    }

    /// Roles that can be assigned in an organization.
    #[instrument(skip(self))]
    pub async fn list_assignable_roles(&self, org_id: &str) -> Result<Vec<Role>> {
        let org = self.load_org(org_id).await?;
        Ok(self
            .role_store
            .list_assignable(org.tenant_id.as_deref(), &org.id)
            .await?)
    }

    /// Rename or redescribe a role.
    #[instrument(skip(self, update))]
    pub async fn update_role(&self, role_id: &str, update: UpdateRole) -> Result<Role> {
        let mut role = self.load_role(role_id).await?;
        let mut changed = false;

        if let Some(name) = update.name {
            let name = self.validate_name(&name)?;
            if name != role.name {
                if self
                    .role_store
                    .find_by_name(role.tenant_id.as_deref(), role.org_id.as_deref(), &name)
                    .await?
                    .is_some_and(|other| other.id != role.id)
                {
                    return Err(OrganizationError::role_name_taken(name));
                }
                role.name = name;
                changed = true;
            }
        }

        if let Some(description) = update.description {
            let description = self.validate_description(Some(&description))?;
            if description != role.description {
                role.description = description;
                changed = true;
            }
        }

        if !changed {
            debug!(role_id, "Role update is a no-op");
            return Ok(role);
        }

        role.updated_at = current_timestamp();
        self.role_store.update(&role).await?;

        info!(role_id, "Role updated");
        self.record(OrgAuditEvent::RoleUpdated, &role, None).await;

        Ok(role)
    }

    /// Delete a non-system role.
    ///
    /// Existing assignments are left in place and ignored by permission
    /// resolution from then on.
    #[instrument(skip(self))]
    pub async fn delete_role(&self, role_id: &str) -> Result<()> {
        let role = self.load_role(role_id).await?;
        if role.is_system_role {
            debug!(role_id, "Refusing to delete system role");
            return Err(OrganizationError::SystemRole {
                role_id: role_id.to_string(),
            });
        }

        if !self.role_store.delete(role_id).await? {
            return Err(OrganizationError::role_not_found(role_id));
        }

        info!(role_id, "Role deleted");
        self.record(OrgAuditEvent::RoleDeleted, &role, Some(format!("name={}", role.name)))
            .await;

        Ok(())
    }

    /// Permissions a role grants in an organization, or at the global scope
    /// when `org_id` is `None`.
    ///
    /// `explicit` holds what was assigned exactly at that scope; `effective`
    /// adds the baseline inherited from the role's own scope when the role
    /// is defined elsewhere.
    #[instrument(skip(self))]
    pub async fn get_permissions(&self, role_id: &str, org_id: Option<&str>) -> Result<RolePermissions> {
        let role = self.load_role(role_id).await?;
        let tenant_id = match org_id {
            Some(org_id) => self.load_org(org_id).await?.tenant_id,
            None => role.tenant_id.clone(),
        };

        let rows = self
            .role_store
            .permissions_for_roles(std::slice::from_ref(&role.id))
            .await?;
        let split = split_scoped_rows(&rows, &role, org_id, tenant_id.as_deref());

        let all_ids: Vec<String> = split
            .baseline
            .iter()
            .chain(&split.explicit)
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if all_ids.is_empty() {
            return Ok(RolePermissions::default());
        }

        let catalog = self.catalog.names_for_ids(&all_ids).await?;
        Ok(merge_inherited(
            names_for_ids(&split.baseline, &catalog),
            names_for_ids(&split.explicit, &catalog),
        ))
    }

    /// Replace the permissions assigned to a role at exactly one scope.
    ///
    /// `org_id = None` edits a template role's baseline. Every name must be
    /// known to the catalog; only the difference is written.
    #[instrument(skip(self, permission_names), fields(count = permission_names.len()))]
    pub async fn update_permissions(
        &self,
        role_id: &str,
        org_id: Option<&str>,
        permission_names: &[String],
    ) -> Result<()> {
        let role = self.load_role(role_id).await?;
        let tenant_id = match org_id {
            Some(org_id) => {
                let org = self.load_org(org_id).await?;
                if !role_fits(&role, &org) {
                    return Err(OrganizationError::role_scope_mismatch(role_id, org_id));
                }
                org.tenant_id
            }
            None if role.is_template() => role.tenant_id.clone(),
            None => return Err(OrganizationError::role_scope_mismatch(role_id, "global")),
        };

        let names = normalize_permission_names(permission_names);
        let resolved = if names.is_empty() {
            Default::default()
        } else {
            self.catalog.ids_for_names(&names).await?
        };
        let mut desired = Vec::with_capacity(names.len());
        for name in &names {
            let id = resolved
                .get(&name.to_lowercase())
                .ok_or_else(|| OrganizationError::unknown_permission(name))?;
            if !desired.contains(id) {
                desired.push(id.clone());
            }
        }

        let rows = self
            .role_store
            .permissions_for_roles(std::slice::from_ref(&role.id))
            .await?;
        let mut kept = HashSet::new();
        let mut removed = Vec::new();
        for row in rows.iter().filter(|r| {
            r.role_id == role.id
                && r.org_id.as_deref() == org_id
                && tenant_visible(r.tenant_id.as_deref(), tenant_id.as_deref())
        }) {
            if desired.contains(&row.permission_id) && kept.insert(row.permission_id.as_str()) {
                continue;
            }
            removed.push(row.id.clone());
        }

        let added: Vec<RolePermission> = desired
            .iter()
            .filter(|id| !kept.contains(id.as_str()))
            .map(|permission_id| RolePermission {
                id: Uuid::new_v4().to_string(),
                role_id: role.id.clone(),
                permission_id: permission_id.clone(),
                org_id: org_id.map(String::from),
                tenant_id: tenant_id.clone(),
            })
            .collect();

        if added.is_empty() && removed.is_empty() {
            debug!(role_id, org_id, "Role permissions unchanged");
            return Ok(());
        }

        self.role_store
            .apply_permission_changes(&added, &removed)
            .await?;

        info!(
            role_id,
            org_id,
            added = added.len(),
            removed = removed.len(),
            "Role permissions updated"
        );

        let mut entry = OrgAuditEntry::unscoped(OrgAuditEvent::RolePermissionsUpdated)
            .with_target(&role.id)
            .with_details(format!("added={},removed={}", added.len(), removed.len()));
        if let Some(org_id) = org_id {
            entry = entry.with_org(org_id);
        }
        self.audit_store.record(entry).await;

        Ok(())
    }

    async fn load_role(&self, role_id: &str) -> Result<Role> {
        self.role_store
            .find(role_id)
            .await?
            .ok_or_else(|| OrganizationError::role_not_found(role_id))
    }

    async fn load_org(&self, org_id: &str) -> Result<Organization> {
        self.org_store
            .find_by_id(org_id)
            .await?
            .ok_or_else(|| OrganizationError::not_found(org_id))
    }

    async fn record(&self, event: OrgAuditEvent, role: &Role, details: Option<String>) {
        let mut entry = OrgAuditEntry::unscoped(event).with_target(&role.id);
        if let Some(org_id) = &role.org_id {
            entry = entry.with_org(org_id);
        }
        if let Some(details) = details {
            entry = entry.with_details(details);
        }
        self.audit_store.record(entry).await;
    }

    fn validate_name(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrganizationError::validation("role_name", "must not be empty"));
        }
        if name.chars().count() > self.config.role_name_max_length {
            return Err(OrganizationError::validation(
                "role_name",
                format!("must be at most {} characters", self.config.role_name_max_length),
            ));
        }
        Ok(name.to_string())
    }

    fn validate_description(&self, description: Option<&str>) -> Result<Option<String>> {
        let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        if description.chars().count() > self.config.role_description_max_length {
            return Err(OrganizationError::validation(
                "role_description",
                format!(
                    "must be at most {} characters",
                    self.config.role_description_max_length
                ),
            ));
        }
        Ok(Some(description.to_string()))
    }
}
