//! Organization manager.
//!
//! Handles organization CRUD operations with validation, uniqueness checks
//! and tracing.

use super::audit::{OrgAuditEntry, OrgAuditEvent};
use super::config::OrganizationConfig;
use super::error::{OrganizationError, Result};
use super::storage::{OptionalAuditStore, OrgAuditStore, OrganizationStore, WithAuditStore};
use super::types::{
    CreateOrganization, Organization, OrganizationMetadata, OrganizationStatus, UpdateOrganization,
};
use super::utils::{current_timestamp, normalize_slug};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Organization manager - generic over the organization store.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_orgs::organizations::{CreateOrganization, OrganizationConfig, OrganizationManager};
///
/// let manager = OrganizationManager::new(store, OrganizationConfig::default());
///
/// let org = manager
///     .create(CreateOrganization::new("acme", "Acme Inc").tenant("t1"))
///     .await?;
/// ```
///
/// # Audit Logging
///
/// ```rust,ignore
/// let manager = OrganizationManager::new(store, config).with_audit_store(audit_store);
/// ```
pub struct OrganizationManager<O, A = ()>
where
    O: OrganizationStore,
    A: OptionalAuditStore,
{
    store: O,
    audit_store: A,
    config: OrganizationConfig,
}

impl<O> OrganizationManager<O, ()>
where
    O: OrganizationStore,
{
    /// Create a new organization manager.
    #[must_use]
    pub fn new(store: O, config: OrganizationConfig) -> Self {
        Self {
            store,
            audit_store: (),
            config,
        }
    }

    /// Enable audit logging with the given store.
    pub fn with_audit_store<AuditStore: OrgAuditStore + Clone + 'static>(
        self,
        audit_store: AuditStore,
    ) -> OrganizationManager<O, WithAuditStore<AuditStore>> {
        OrganizationManager {
            store: self.store,
            audit_store: WithAuditStore(audit_store),
            config: self.config,
        }
    }
}

impl<O, A> OrganizationManager<O, A>
where
    O: OrganizationStore,
    A: OptionalAuditStore,
{
    /// Get a reference to the organization store.
    pub fn store(&self) -> &O {
        &self.store
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &OrganizationConfig {
        &self.config
    }

    /// Create a new active organization.
    #[instrument(skip(self, request), fields(org.slug = %request.slug, tenant_id = ?request.tenant_id))]
    pub async fn create(&self, request: CreateOrganization) -> Result<Organization> {
        let slug = self.validate_slug(&request.slug)?;
        let display_name = self.validate_display_name(&request.display_name)?;
        self.validate_metadata(&request.metadata)?;
        let tenant_id = request.tenant_id.as_deref();

        if self.store.find_by_slug(tenant_id, &slug).await?.is_some() {
            debug!(slug, "Slug already taken");
            return Err(OrganizationError::slug_taken(slug));
        }
        if self
            .store
            .find_by_display_name(tenant_id, &display_name)
            .await?
            .is_some()
        {
            debug!(display_name, "Display name already taken");
            return Err(OrganizationError::display_name_taken(display_name));
        }

        let now = current_timestamp();
        let org = Organization {
            id: Uuid::new_v4().to_string(),
            tenant_id: request.tenant_id,
            slug,
            display_name,
            metadata: request.metadata,
            status: OrganizationStatus::Active,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };

        self.store.create(&org).await?;

        info!(org_id = %org.id, slug = %org.slug, "Organization created");

        self.audit_store
            .record(
                OrgAuditEntry::new(OrgAuditEvent::OrgCreated, &org.id)
                    .with_details(format!("slug={}", org.slug)),
            )
            .await;

        Ok(org)
    }

    /// Get an organization by ID.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, org_id: &str) -> Result<Option<Organization>> {
        Ok(self.store.find_by_id(org_id).await?)
    }

    /// Get an organization by slug within a tenant scope.
    ///
    /// The slug is normalized before lookup; a slug that cannot be valid
    /// finds nothing.
    #[instrument(skip(self))]
    pub async fn get_by_slug(&self, tenant_id: Option<&str>, slug: &str) -> Result<Option<Organization>> {
        let Ok(slug) = normalize_slug(slug, self.config.slug_max_length) else {
            return Ok(None);
        };
        Ok(self.store.find_by_slug(tenant_id, &slug).await?)
    }

    /// List the organizations of a tenant scope.
    #[instrument(skip(self))]
    pub async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<Organization>> {
        Ok(self.store.list(tenant_id).await?)
    }

    /// Apply a partial update.
    ///
    /// Returns the organization unchanged (and unwritten) when the patch
    /// does not change anything.
    #[instrument(skip(self, update))]
    pub async fn update(&self, org_id: &str, update: UpdateOrganization) -> Result<Organization> {
        let mut org = self
            .store
            .find_by_id(org_id)
            .await?
            .ok_or_else(|| OrganizationError::not_found(org_id))?;

        let mut changed = Vec::new();

        if let Some(name) = update.display_name {
            let name = self.validate_display_name(&name)?;
            if name != org.display_name {
                if let Some(other) = self
                    .store
                    .find_by_display_name(org.tenant_id.as_deref(), &name)
                    .await?
                    .filter(|other| other.id != org.id)
                {
                    debug!(other_id = %other.id, display_name = %name, "Display name already taken");
                    return Err(OrganizationError::display_name_taken(name));
                }
                org.display_name = name;
                changed.push("display_name");
            }
        }

        if let Some(metadata) = update.metadata {
            self.validate_metadata(&metadata)?;
            if metadata != org.metadata {
                org.metadata = metadata;
                changed.push("metadata");
            }
        }

        let now = current_timestamp();
        if let Some(status) = update.status.filter(|s| *s != org.status) {
            org.archived_at = match status {
                OrganizationStatus::Archived => Some(now),
                OrganizationStatus::Active => None,
            };
            org.status = status;
            changed.push("status");
        }

        if changed.is_empty() {
            debug!(org_id, "Organization update is a no-op");
            return Ok(org);
        }

        org.updated_at = now;
        self.store.update(&org).await?;

        info!(org_id, fields = ?changed, "Organization updated");

        let event = if changed.contains(&"status") && org.is_archived() {
            OrgAuditEvent::OrgArchived
        } else {
            OrgAuditEvent::OrgUpdated
        };
        self.audit_store
            .record(OrgAuditEntry::new(event, org_id).with_details(changed.join(",")))
            .await;

        Ok(org)
    }

    /// Archive an organization. Archiving an archived organization is a no-op.
    #[instrument(skip(self))]
    pub async fn archive(&self, org_id: &str) -> Result<Organization> {
        self.update(org_id, UpdateOrganization::new().status(OrganizationStatus::Archived))
            .await
    }

    fn validate_slug(&self, slug: &str) -> Result<String> {
        normalize_slug(slug, self.config.slug_max_length)
            .map_err(|e| OrganizationError::validation("slug", e.to_string()))
    }

    fn validate_display_name(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrganizationError::validation(
                "display_name",
                "must not be empty",
            ));
        }
        if name.chars().count() > self.config.display_name_max_length {
            return Err(OrganizationError::validation(
                "display_name",
                format!(
                    "must be at most {} characters",
                    self.config.display_name_max_length
                ),
            ));
        }
        Ok(name.to_string())
    }

    fn validate_metadata(&self, metadata: &OrganizationMetadata) -> Result<()> {
        for (key, value) in metadata {
            if key.trim().is_empty() {
                return Err(OrganizationError::validation(
                    "metadata",
                    "keys must not be empty",
                ));
            }
            if key.chars().count() > self.config.metadata_max_key_length {
                return Err(OrganizationError::validation(
                    "metadata",
                    format!(
                        "key '{key}' exceeds {} characters",
                        self.config.metadata_max_key_length
                    ),
                ));
            }
            if value.chars().count() > self.config.metadata_max_value_length {
                return Err(OrganizationError::validation(
                    "metadata",
                    format!(
                        "value for '{key}' exceeds {} characters",
                        self.config.metadata_max_value_length
                    ),
                ));
            }
        }

        let size = serde_json::to_vec(metadata)
            .map_err(|e| OrganizationError::validation("metadata", e.to_string()))?
            .len();
        if size > self.config.metadata_max_bytes {
            return Err(OrganizationError::validation(
                "metadata",
                format!(
                    "serialized size {size} exceeds {} bytes",
                    self.config.metadata_max_bytes
                ),
            ));
        }
        Ok(())
    }
}
