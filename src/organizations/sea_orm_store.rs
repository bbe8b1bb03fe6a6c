//! SeaORM-backed organization storage.
//!
//! Provides database persistence for organizations, memberships, roles,
//! invitations and the audit log using SeaORM. The user directory and the
//! permission catalog belong to the host application and are not
//! implemented here.
//!
//! # Example
//!
//! ```rust,ignore
//! use tideway_orgs::organizations::{OrganizationConfig, OrganizationManager, SeaOrmOrgStore};
//!
//! let store = SeaOrmOrgStore::new(db.clone());
//! let orgs = OrganizationManager::new(store.clone(), OrganizationConfig::default())
//!     .with_audit_store(store.clone());
//! ```
//!
//! # Database Schema
//!
//! Unique constraints back the uniqueness rules, so a request that loses a
//! race against a concurrent one fails with [`StoreError::Conflict`]. On
//! PostgreSQL 15+ use `NULLS NOT DISTINCT` so the global scope (`NULL`
//! tenant) is unique too.
//!
//! Promoting a membership to primary first locks the user's memberships in
//! that tenant (`SELECT ... FOR UPDATE`), so concurrent promotions of
//! existing memberships run one after the other. When the user has no rows
//! to lock yet, `ux_memberships_primary` rejects the second concurrent
//! primary with [`StoreError::Conflict`]; it is not retried.
//!
//! ```sql
//! CREATE TABLE organizations (
//!     id VARCHAR(36) PRIMARY KEY,
//!     tenant_id VARCHAR(64),
//!     slug VARCHAR(64) NOT NULL,
//!     display_name VARCHAR(128) NOT NULL,
//!     metadata TEXT NOT NULL,
//!     status VARCHAR(16) NOT NULL,
//!     created_at BIGINT NOT NULL,
//!     updated_at BIGINT NOT NULL,
//!     archived_at BIGINT,
//!     UNIQUE NULLS NOT DISTINCT (tenant_id, slug),
//!     UNIQUE NULLS NOT DISTINCT (tenant_id, display_name)
//! );
//!
//! CREATE TABLE organization_memberships (
//!     org_id VARCHAR(36) NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
//!     user_id VARCHAR(64) NOT NULL,
//!     tenant_id VARCHAR(64),
//!     is_primary BOOLEAN NOT NULL,
//!     created_at BIGINT NOT NULL,
//!     updated_at BIGINT NOT NULL,
//!     PRIMARY KEY (org_id, user_id)
//! );
//!
//! CREATE INDEX idx_memberships_user ON organization_memberships(user_id, tenant_id);
//!
//! -- At most one primary membership per user and tenant.
//! CREATE UNIQUE INDEX ux_memberships_primary
//!     ON organization_memberships (user_id, tenant_id) NULLS NOT DISTINCT
//!     WHERE is_primary;
//!
//! CREATE TABLE organization_member_roles (
//!     org_id VARCHAR(36) NOT NULL,
//!     user_id VARCHAR(64) NOT NULL,
//!     role_id VARCHAR(36) NOT NULL,
//!     tenant_id VARCHAR(64),
//!     created_at BIGINT NOT NULL,
//!     PRIMARY KEY (org_id, user_id, role_id),
//!     FOREIGN KEY (org_id, user_id)
//!         REFERENCES organization_memberships(org_id, user_id) ON DELETE CASCADE
//! );
//!
//! CREATE TABLE organization_roles (
//!     id VARCHAR(36) PRIMARY KEY,
//!     org_id VARCHAR(36),
//!     tenant_id VARCHAR(64),
//!     name VARCHAR(64) NOT NULL,
//!     description VARCHAR(512),
//!     is_system_role BOOLEAN NOT NULL,
//!     created_at BIGINT NOT NULL,
//!     updated_at BIGINT NOT NULL,
//!     UNIQUE NULLS NOT DISTINCT (tenant_id, org_id, name)
//! );
//!
//! -- Assignments to a deleted role stay behind; resolution ignores them.
//! CREATE TABLE organization_role_permissions (
//!     id VARCHAR(36) PRIMARY KEY,
//!     role_id VARCHAR(36) NOT NULL,
//!     permission_id VARCHAR(64) NOT NULL,
//!     org_id VARCHAR(36),
//!     tenant_id VARCHAR(64),
//!     UNIQUE NULLS NOT DISTINCT (role_id, permission_id, org_id, tenant_id)
//! );
//!
//! CREATE INDEX idx_role_permissions_role ON organization_role_permissions(role_id);
//!
//! CREATE TABLE organization_invitations (
//!     code VARCHAR(64) PRIMARY KEY,
//!     org_id VARCHAR(36) NOT NULL,
//!     org_slug VARCHAR(64) NOT NULL,
//!     org_display_name VARCHAR(128) NOT NULL,
//!     email VARCHAR(255) NOT NULL,
//!     role_ids TEXT NOT NULL,
//!     created_by VARCHAR(64) NOT NULL,
//!     created_at BIGINT NOT NULL,
//!     expires_at BIGINT NOT NULL,
//!     UNIQUE (org_id, email)
//! );
//!
//! CREATE TABLE organization_audit_log (
//!     id VARCHAR(36) PRIMARY KEY,
//!     event VARCHAR(32) NOT NULL,
//!     org_id VARCHAR(36),
//!     actor_id VARCHAR(64),
//!     target_id VARCHAR(64),
//!     details TEXT,
//!     timestamp BIGINT NOT NULL
//! );
//!
//! CREATE INDEX idx_audit_org ON organization_audit_log(org_id, timestamp);
//! CREATE INDEX idx_audit_actor ON organization_audit_log(actor_id, timestamp);
//! ```

use async_trait::async_trait;
use sea_orm::sea_query::{Query, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, SqlErr, TransactionTrait,
};
use std::collections::HashMap;

use super::audit::{OrgAuditEntry, OrgAuditEvent};
use super::storage::{
    InvitationStore, MembershipChanges, MembershipStore, OrgAuditStore, OrganizationStore,
    RoleStore,
};
use super::types::{
    Invitation, MemberFilter, Membership, Organization, OrganizationMetadata, Role,
    RoleAssignment, RolePermission,
};
use crate::error::{Result, StoreError};

// =============================================================================
// SeaORM Entities
// =============================================================================

mod entity {
    use sea_orm::entity::prelude::*;

    pub mod organization {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organizations")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub tenant_id: Option<String>,
            pub slug: String,
            pub display_name: String,
            pub metadata: String,
            pub status: String,
            pub created_at: i64,
            pub updated_at: i64,
            pub archived_at: Option<i64>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod membership {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organization_memberships")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub org_id: String,
            #[sea_orm(primary_key, auto_increment = false)]
            pub user_id: String,
            pub tenant_id: Option<String>,
            pub is_primary: bool,
            pub created_at: i64,
            pub updated_at: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod member_role {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organization_member_roles")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub org_id: String,
            #[sea_orm(primary_key, auto_increment = false)]
            pub user_id: String,
            #[sea_orm(primary_key, auto_increment = false)]
            pub role_id: String,
            pub tenant_id: Option<String>,
            pub created_at: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod role {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organization_roles")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub org_id: Option<String>,
            pub tenant_id: Option<String>,
            pub name: String,
            pub description: Option<String>,
            pub is_system_role: bool,
            pub created_at: i64,
            pub updated_at: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod role_permission {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organization_role_permissions")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub role_id: String,
            pub permission_id: String,
            pub org_id: Option<String>,
            pub tenant_id: Option<String>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod invitation {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organization_invitations")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub code: String,
            pub org_id: String,
            pub org_slug: String,
            pub org_display_name: String,
            pub email: String,
            /// JSON array of role IDs.
            pub role_ids: String,
            pub created_by: String,
            pub created_at: i64,
            pub expires_at: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod audit {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organization_audit_log")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub event: String,
            pub org_id: Option<String>,
            pub actor_id: Option<String>,
            pub target_id: Option<String>,
            pub details: Option<String>,
            pub timestamp: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{audit, invitation, member_role, membership, organization, role, role_permission};

// =============================================================================
// Helper Functions
// =============================================================================

/// Convert i64 to u64 safely (negative values become 0).
#[inline]
fn i64_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Convert u64 to i64 safely (values > i64::MAX become i64::MAX).
#[inline]
fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Map a database error, surfacing unique violations as conflicts.
fn db_err(e: DbErr) -> StoreError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => StoreError::Conflict(msg),
        _ => StoreError::Database(e.to_string()),
    }
}

/// `column = value`, or `column IS NULL` for the global scope.
fn eq_scope<C: ColumnTrait>(column: C, value: Option<&str>) -> SimpleExpr {
    match value {
        Some(v) => column.eq(v),
        None => column.is_null(),
    }
}

/// A user's memberships in one tenant scope, locked for the rest of the
/// transaction. Ordered by organization so concurrent lockers agree on
/// the lock order.
fn lock_user_memberships(user_id: &str, tenant_id: Option<&str>) -> Select<membership::Entity> {
    membership::Entity::find()
        .filter(membership::Column::UserId.eq(user_id))
        .filter(eq_scope(membership::Column::TenantId, tenant_id))
        .order_by_asc(membership::Column::OrgId)
        .lock_exclusive()
}

/// Rows scoped to `tenant_id`, or unscoped.
fn tenant_visible<C: ColumnTrait>(column: C, tenant_id: Option<&str>) -> Condition {
    let mut condition = Condition::any().add(column.is_null());
    if let Some(tenant_id) = tenant_id {
        condition = condition.add(column.eq(tenant_id));
    }
    condition
}

fn model_to_organization(model: organization::Model) -> Result<Organization> {
    let metadata: OrganizationMetadata = serde_json::from_str(&model.metadata)
        .map_err(|e| StoreError::internal(format!("organization {} metadata: {e}", model.id)))?;
    let status = model
        .status
        .parse()
        .map_err(|e| StoreError::internal(format!("organization {}: {e}", model.id)))?;
    Ok(Organization {
        id: model.id,
        tenant_id: model.tenant_id,
        slug: model.slug,
        display_name: model.display_name,
        metadata,
        status,
        created_at: i64_to_u64(model.created_at),
        updated_at: i64_to_u64(model.updated_at),
        archived_at: model.archived_at.map(i64_to_u64),
    })
}

fn organization_to_active(org: &Organization) -> Result<organization::ActiveModel> {
    let metadata = serde_json::to_string(&org.metadata)
        .map_err(|e| StoreError::internal(format!("organization metadata: {e}")))?;
    Ok(organization::ActiveModel {
        id: Set(org.id.clone()),
        tenant_id: Set(org.tenant_id.clone()),
        slug: Set(org.slug.clone()),
        display_name: Set(org.display_name.clone()),
        metadata: Set(metadata),
        status: Set(org.status.as_str().to_string()),
        created_at: Set(u64_to_i64(org.created_at)),
        updated_at: Set(u64_to_i64(org.updated_at)),
        archived_at: Set(org.archived_at.map(u64_to_i64)),
    })
}

fn model_to_assignment(model: member_role::Model) -> RoleAssignment {
    RoleAssignment {
        org_id: model.org_id,
        user_id: model.user_id,
        role_id: model.role_id,
        tenant_id: model.tenant_id,
        created_at: i64_to_u64(model.created_at),
    }
}

fn assignment_to_active(assignment: &RoleAssignment) -> member_role::ActiveModel {
    member_role::ActiveModel {
        org_id: Set(assignment.org_id.clone()),
        user_id: Set(assignment.user_id.clone()),
        role_id: Set(assignment.role_id.clone()),
        tenant_id: Set(assignment.tenant_id.clone()),
        created_at: Set(u64_to_i64(assignment.created_at)),
    }
}

fn model_to_membership(model: membership::Model, roles: Vec<RoleAssignment>) -> Membership {
    Membership {
        org_id: model.org_id,
        user_id: model.user_id,
        tenant_id: model.tenant_id,
        is_primary: model.is_primary,
        roles,
        created_at: i64_to_u64(model.created_at),
        updated_at: i64_to_u64(model.updated_at),
    }
}

/// Attach role assignments to membership rows, keeping assignment order.
fn assemble_memberships(
    models: Vec<membership::Model>,
    assignments: Vec<member_role::Model>,
) -> Vec<Membership> {
    let mut by_member: HashMap<(String, String), Vec<RoleAssignment>> = HashMap::new();
    for assignment in assignments {
        by_member
            .entry((assignment.org_id.clone(), assignment.user_id.clone()))
            .or_default()
            .push(model_to_assignment(assignment));
    }
    models
        .into_iter()
        .map(|model| {
            let roles = by_member
                .remove(&(model.org_id.clone(), model.user_id.clone()))
                .unwrap_or_default();
            model_to_membership(model, roles)
        })
        .collect()
}

fn model_to_role(model: role::Model) -> Role {
    Role {
        id: model.id,
        org_id: model.org_id,
        tenant_id: model.tenant_id,
        name: model.name,
        description: model.description,
        is_system_role: model.is_system_role,
        created_at: i64_to_u64(model.created_at),
        updated_at: i64_to_u64(model.updated_at),
    }
}

fn model_to_role_permission(model: role_permission::Model) -> RolePermission {
    RolePermission {
        id: model.id,
        role_id: model.role_id,
        permission_id: model.permission_id,
        org_id: model.org_id,
        tenant_id: model.tenant_id,
    }
}

fn model_to_invitation(model: invitation::Model) -> Result<Invitation> {
    let role_ids: Vec<String> = serde_json::from_str(&model.role_ids)
        .map_err(|e| StoreError::internal(format!("invitation role ids: {e}")))?;
    Ok(Invitation {
        code: model.code,
        org_id: model.org_id,
        org_slug: model.org_slug,
        org_display_name: model.org_display_name,
        email: model.email,
        role_ids,
        created_by: model.created_by,
        created_at: i64_to_u64(model.created_at),
        expires_at: i64_to_u64(model.expires_at),
    })
}

fn model_to_audit(model: audit::Model) -> Result<OrgAuditEntry> {
    let event: OrgAuditEvent = serde_json::from_value(serde_json::Value::String(model.event))
        .map_err(|e| StoreError::internal(format!("audit event: {e}")))?;
    Ok(OrgAuditEntry {
        id: model.id,
        event,
        org_id: model.org_id,
        actor_id: model.actor_id,
        target_id: model.target_id,
        details: model.details,
        timestamp: i64_to_u64(model.timestamp),
    })
}

// =============================================================================
// SeaOrmOrgStore
// =============================================================================

/// SeaORM-backed store implementing the organization, membership, role,
/// invitation and audit storage traits.
///
/// Every trait method is a single statement or a single transaction.
#[derive(Clone, Debug)]
pub struct SeaOrmOrgStore {
    db: DatabaseConnection,
}

impl SeaOrmOrgStore {
    /// Create a new SeaORM organization store.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn load_membership<C: ConnectionTrait>(
        conn: &C,
        org_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>> {
        let Some(model) = membership::Entity::find_by_id((org_id.to_string(), user_id.to_string()))
            .one(conn)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let roles = member_role::Entity::find()
            .filter(member_role::Column::OrgId.eq(org_id))
            .filter(member_role::Column::UserId.eq(user_id))
            .order_by_asc(member_role::Column::CreatedAt)
            .all(conn)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_assignment)
            .collect();

        Ok(Some(model_to_membership(model, roles)))
    }

    async fn clear_other_primary<C: ConnectionTrait>(
        conn: &C,
        keep_org_id: &str,
        user_id: &str,
        tenant_id: Option<&str>,
        now: u64,
    ) -> Result<()> {
        lock_user_memberships(user_id, tenant_id)
            .all(conn)
            .await
            .map_err(db_err)?;

        let cleared = membership::Entity::update_many()
            .set(membership::ActiveModel {
                is_primary: Set(false),
                updated_at: Set(u64_to_i64(now)),
                ..Default::default()
            })
            .filter(membership::Column::UserId.eq(user_id))
            .filter(membership::Column::OrgId.ne(keep_org_id))
            .filter(eq_scope(membership::Column::TenantId, tenant_id))
            .filter(membership::Column::IsPrimary.eq(true))
            .exec(conn)
            .await
            .map_err(db_err)?;

        if cleared.rows_affected > 0 {
            tracing::debug!(user_id, cleared = cleared.rows_affected, "cleared previous primary membership");
        }
        Ok(())
    }
}

// =============================================================================
// OrganizationStore Implementation
// =============================================================================

#[async_trait]
impl OrganizationStore for SeaOrmOrgStore {
    async fn create(&self, org: &Organization) -> Result<()> {
        tracing::debug!(org_id = %org.id, slug = %org.slug, "creating organization");

        organization::Entity::insert(organization_to_active(org)?)
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Organization>> {
        organization::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_organization)
            .transpose()
    }

    async fn find_by_slug(&self, tenant_id: Option<&str>, slug: &str) -> Result<Option<Organization>> {
        organization::Entity::find()
            .filter(eq_scope(organization::Column::TenantId, tenant_id))
            .filter(organization::Column::Slug.eq(slug))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_organization)
            .transpose()
    }

    async fn find_by_display_name(
        &self,
        tenant_id: Option<&str>,
        display_name: &str,
    ) -> Result<Option<Organization>> {
        organization::Entity::find()
            .filter(eq_scope(organization::Column::TenantId, tenant_id))
            .filter(organization::Column::DisplayName.eq(display_name))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_organization)
            .transpose()
    }

    async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<Organization>> {
        organization::Entity::find()
            .filter(eq_scope(organization::Column::TenantId, tenant_id))
            .order_by_asc(organization::Column::DisplayName)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_organization)
            .collect()
    }

    async fn update(&self, org: &Organization) -> Result<()> {
        tracing::debug!(org_id = %org.id, "updating organization");

        let mut model = organization_to_active(org)?;
        model.id = sea_orm::ActiveValue::NotSet;
        model.created_at = sea_orm::ActiveValue::NotSet;

        let result = organization::Entity::update_many()
            .set(model)
            .filter(organization::Column::Id.eq(org.id.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::not_found(format!("organization {}", org.id)));
        }
        Ok(())
    }
}

// =============================================================================
// MembershipStore Implementation
// =============================================================================

#[async_trait]
impl MembershipStore for SeaOrmOrgStore {
    async fn find(&self, org_id: &str, user_id: &str) -> Result<Option<Membership>> {
        Self::load_membership(&self.db, org_id, user_id).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Membership>> {
        let models = membership::Entity::find()
            .filter(membership::Column::UserId.eq(user_id))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let assignments = member_role::Entity::find()
            .filter(member_role::Column::UserId.eq(user_id))
            .order_by_asc(member_role::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(assemble_memberships(models, assignments))
    }

    async fn insert(&self, m: &Membership, clear_other_primary: bool) -> Result<()> {
        tracing::debug!(org_id = %m.org_id, user_id = %m.user_id, "inserting membership");

        let txn = self.db.begin().await.map_err(db_err)?;

        if clear_other_primary {
            Self::clear_other_primary(&txn, &m.org_id, &m.user_id, m.tenant_id.as_deref(), m.created_at)
                .await?;
        }

        membership::Entity::insert(membership::ActiveModel {
            org_id: Set(m.org_id.clone()),
            user_id: Set(m.user_id.clone()),
            tenant_id: Set(m.tenant_id.clone()),
            is_primary: Set(m.is_primary),
            created_at: Set(u64_to_i64(m.created_at)),
            updated_at: Set(u64_to_i64(m.updated_at)),
        })
        .exec(&txn)
        .await
        .map_err(db_err)?;

        if !m.roles.is_empty() {
            member_role::Entity::insert_many(m.roles.iter().map(assignment_to_active))
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn apply_changes(&self, changes: &MembershipChanges) -> Result<Membership> {
        tracing::debug!(
            org_id = %changes.org_id,
            user_id = %changes.user_id,
            added = changes.added_roles.len(),
            removed = changes.removed_role_ids.len(),
            "applying membership changes"
        );

        let txn = self.db.begin().await.map_err(db_err)?;

        let existing = membership::Entity::find_by_id((changes.org_id.clone(), changes.user_id.clone()))
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("membership"))?;

        if changes.clear_other_primary {
            Self::clear_other_primary(
                &txn,
                &changes.org_id,
                &changes.user_id,
                existing.tenant_id.as_deref(),
                changes.updated_at,
            )
            .await?;
        }

        let mut update = membership::ActiveModel {
            updated_at: Set(u64_to_i64(changes.updated_at)),
            ..Default::default()
        };
        if let Some(is_primary) = changes.is_primary {
            update.is_primary = Set(is_primary);
        }
        membership::Entity::update_many()
            .set(update)
            .filter(membership::Column::OrgId.eq(changes.org_id.as_str()))
            .filter(membership::Column::UserId.eq(changes.user_id.as_str()))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        if !changes.removed_role_ids.is_empty() {
            member_role::Entity::delete_many()
                .filter(member_role::Column::OrgId.eq(changes.org_id.as_str()))
                .filter(member_role::Column::UserId.eq(changes.user_id.as_str()))
                .filter(member_role::Column::RoleId.is_in(changes.removed_role_ids.clone()))
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        if !changes.added_roles.is_empty() {
            member_role::Entity::insert_many(changes.added_roles.iter().map(assignment_to_active))
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        let membership = Self::load_membership(&txn, &changes.org_id, &changes.user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("membership"))?;

        txn.commit().await.map_err(db_err)?;
        Ok(membership)
    }

    async fn query(
        &self,
        filter: &MemberFilter,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<Membership>, u64)> {
        let mut select = membership::Entity::find()
            .filter(membership::Column::OrgId.eq(filter.org_id.as_str()));
        if let Some(is_primary) = filter.is_primary {
            select = select.filter(membership::Column::IsPrimary.eq(is_primary));
        }
        if let Some(role_id) = &filter.role_id {
            select = select.filter(
                membership::Column::UserId.in_subquery(
                    Query::select()
                        .column(member_role::Column::UserId)
                        .from(member_role::Entity)
                        .and_where(member_role::Column::OrgId.eq(filter.org_id.as_str()))
                        .and_where(member_role::Column::RoleId.eq(role_id.as_str()))
                        .to_owned(),
                ),
            );
        }
        if let Some(user_ids) = &filter.user_ids {
            select = select.filter(membership::Column::UserId.is_in(user_ids.clone()));
        }

        let total = select.clone().count(&self.db).await.map_err(db_err)?;
        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let models = select
            .order_by_asc(membership::Column::CreatedAt)
            .order_by_asc(membership::Column::UserId)
            .offset(offset)
            .limit(u64::from(limit))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        if models.is_empty() {
            return Ok((Vec::new(), total));
        }

        let user_ids: Vec<String> = models.iter().map(|m| m.user_id.clone()).collect();
        let assignments = member_role::Entity::find()
            .filter(member_role::Column::OrgId.eq(filter.org_id.as_str()))
            .filter(member_role::Column::UserId.is_in(user_ids))
            .order_by_asc(member_role::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok((assemble_memberships(models, assignments), total))
    }

    async fn delete(&self, org_id: &str, user_id: &str) -> Result<bool> {
        tracing::debug!(org_id, user_id, "deleting membership");

        let txn = self.db.begin().await.map_err(db_err)?;

        member_role::Entity::delete_many()
            .filter(member_role::Column::OrgId.eq(org_id))
            .filter(member_role::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        let result = membership::Entity::delete_many()
            .filter(membership::Column::OrgId.eq(org_id))
            .filter(membership::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }
}

// =============================================================================
// RoleStore Implementation
// =============================================================================

#[async_trait]
impl RoleStore for SeaOrmOrgStore {
    async fn create(&self, r: &Role) -> Result<()> {
        tracing::debug!(role_id = %r.id, name = %r.name, "creating role");

        role::Entity::insert(role::ActiveModel {
            id: Set(r.id.clone()),
            org_id: Set(r.org_id.clone()),
            tenant_id: Set(r.tenant_id.clone()),
            name: Set(r.name.clone()),
            description: Set(r.description.clone()),
            is_system_role: Set(r.is_system_role),
            created_at: Set(u64_to_i64(r.created_at)),
            updated_at: Set(u64_to_i64(r.updated_at)),
        })
        .exec(&self.db)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find(&self, role_id: &str) -> Result<Option<Role>> {
        Ok(role::Entity::find_by_id(role_id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_role))
    }

    async fn find_many(&self, role_ids: &[String]) -> Result<Vec<Role>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(role::Entity::find()
            .filter(role::Column::Id.is_in(role_ids.to_vec()))
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_role)
            .collect())
    }

    async fn find_by_name(
        &self,
        tenant_id: Option<&str>,
        org_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Role>> {
        Ok(role::Entity::find()
            .filter(eq_scope(role::Column::TenantId, tenant_id))
            .filter(eq_scope(role::Column::OrgId, org_id))
            .filter(role::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_role))
    }

    async fn list(&self, tenant_id: Option<&str>, org_id: Option<&str>) -> Result<Vec<Role>> {
        Ok(role::Entity::find()
            .filter(eq_scope(role::Column::TenantId, tenant_id))
            .filter(eq_scope(role::Column::OrgId, org_id))
            .order_by_asc(role::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_role)
            .collect())
    }

    async fn list_assignable(&self, tenant_id: Option<&str>, org_id: &str) -> Result<Vec<Role>> {
        let templates = Condition::all()
            .add(role::Column::OrgId.is_null())
            .add(tenant_visible(role::Column::TenantId, tenant_id));

        Ok(role::Entity::find()
            .filter(
                Condition::any()
                    .add(role::Column::OrgId.eq(org_id))
                    .add(templates),
            )
            .order_by_asc(role::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_role)
            .collect())
    }

    async fn update(&self, r: &Role) -> Result<()> {
        tracing::debug!(role_id = %r.id, "updating role");

        let result = role::Entity::update_many()
            .set(role::ActiveModel {
                name: Set(r.name.clone()),
                description: Set(r.description.clone()),
                updated_at: Set(u64_to_i64(r.updated_at)),
                ..Default::default()
            })
            .filter(role::Column::Id.eq(r.id.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::not_found(format!("role {}", r.id)));
        }
        Ok(())
    }

    async fn delete(&self, role_id: &str) -> Result<bool> {
        tracing::debug!(role_id, "deleting role");

        let txn = self.db.begin().await.map_err(db_err)?;

        role_permission::Entity::delete_many()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        let result = role::Entity::delete_by_id(role_id)
            .exec(&txn)
            .await
            .map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn permissions_for_roles(&self, role_ids: &[String]) -> Result<Vec<RolePermission>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(role_permission::Entity::find()
            .filter(role_permission::Column::RoleId.is_in(role_ids.to_vec()))
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_role_permission)
            .collect())
    }

    async fn apply_permission_changes(
        &self,
        added: &[RolePermission],
        removed: &[String],
    ) -> Result<()> {
        tracing::debug!(added = added.len(), removed = removed.len(), "applying role permission changes");

        let txn = self.db.begin().await.map_err(db_err)?;

        if !removed.is_empty() {
            role_permission::Entity::delete_many()
                .filter(role_permission::Column::Id.is_in(removed.to_vec()))
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        if !added.is_empty() {
            role_permission::Entity::insert_many(added.iter().map(|row| role_permission::ActiveModel {
                id: Set(row.id.clone()),
                role_id: Set(row.role_id.clone()),
                permission_id: Set(row.permission_id.clone()),
                org_id: Set(row.org_id.clone()),
                tenant_id: Set(row.tenant_id.clone()),
            }))
            .exec(&txn)
            .await
            .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        Ok(())
    }
}

// =============================================================================
// InvitationStore Implementation
// =============================================================================

#[async_trait]
impl InvitationStore for SeaOrmOrgStore {
    async fn create(&self, inv: &Invitation) -> Result<()> {
        tracing::debug!(org_id = %inv.org_id, "creating invitation");

        let role_ids = serde_json::to_string(&inv.role_ids)
            .map_err(|e| StoreError::internal(format!("invitation role ids: {e}")))?;

        invitation::Entity::insert(invitation::ActiveModel {
            code: Set(inv.code.clone()),
            org_id: Set(inv.org_id.clone()),
            org_slug: Set(inv.org_slug.clone()),
            org_display_name: Set(inv.org_display_name.clone()),
            email: Set(inv.email.clone()),
            role_ids: Set(role_ids),
            created_by: Set(inv.created_by.clone()),
            created_at: Set(u64_to_i64(inv.created_at)),
            expires_at: Set(u64_to_i64(inv.expires_at)),
        })
        .exec(&self.db)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Invitation>> {
        invitation::Entity::find_by_id(code)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_invitation)
            .transpose()
    }

    async fn find_for_email(&self, org_id: &str, email: &str) -> Result<Option<Invitation>> {
        invitation::Entity::find()
            .filter(invitation::Column::OrgId.eq(org_id))
            .filter(invitation::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_invitation)
            .transpose()
    }

    async fn list_for_org(&self, org_id: &str) -> Result<Vec<Invitation>> {
        invitation::Entity::find()
            .filter(invitation::Column::OrgId.eq(org_id))
            .order_by_desc(invitation::Column::CreatedAt)
            .order_by_asc(invitation::Column::Email)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_invitation)
            .collect()
    }

    async fn delete(&self, code: &str) -> Result<bool> {
        let result = invitation::Entity::delete_by_id(code)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_expired(&self, now: u64) -> Result<u64> {
        let result = invitation::Entity::delete_many()
            .filter(invitation::Column::ExpiresAt.lte(u64_to_i64(now)))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        tracing::debug!(deleted = result.rows_affected, "deleted expired invitations");
        Ok(result.rows_affected)
    }
}

// =============================================================================
// OrgAuditStore Implementation
// =============================================================================

#[async_trait]
impl OrgAuditStore for SeaOrmOrgStore {
    async fn record_audit(&self, entry: &OrgAuditEntry) -> Result<()> {
        audit::Entity::insert(audit::ActiveModel {
            id: Set(entry.id.clone()),
            event: Set(entry.event.as_str().to_string()),
            org_id: Set(entry.org_id.clone()),
            actor_id: Set(entry.actor_id.clone()),
            target_id: Set(entry.target_id.clone()),
            details: Set(entry.details.clone()),
            timestamp: Set(u64_to_i64(entry.timestamp)),
        })
        .exec(&self.db)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_org_audit_log(&self, org_id: &str, limit: usize) -> Result<Vec<OrgAuditEntry>> {
        audit::Entity::find()
            .filter(audit::Column::OrgId.eq(org_id))
            .order_by_desc(audit::Column::Timestamp)
            .limit(limit as u64)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_audit)
            .collect()
    }

    async fn get_user_audit_log(&self, user_id: &str, limit: usize) -> Result<Vec<OrgAuditEntry>> {
        audit::Entity::find()
            .filter(audit::Column::ActorId.eq(user_id))
            .order_by_desc(audit::Column::Timestamp)
            .limit(limit as u64)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_audit)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizations::types::OrganizationStatus;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn test_primary_promotion_locks_user_memberships() {
        let sql = lock_user_memberships("u1", Some("t1"))
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""user_id" = 'u1'"#));
        assert!(sql.contains(r#""tenant_id" = 't1'"#));
        assert!(sql.ends_with("FOR UPDATE"), "{sql}");

        let global = lock_user_memberships("u1", None)
            .build(DbBackend::Postgres)
            .to_string();
        assert!(global.contains(r#""tenant_id" IS NULL"#));
        assert!(global.ends_with("FOR UPDATE"), "{global}");
    }

    #[test]
    fn test_safe_integer_conversions() {
        assert_eq!(i64_to_u64(100), 100);
        assert_eq!(i64_to_u64(-1), 0);
        assert_eq!(i64_to_u64(i64::MIN), 0);
        assert_eq!(u64_to_i64(100), 100);
        assert_eq!(u64_to_i64(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_organization_model_conversion() {
        let model = organization::Model {
            id: "org_123".to_string(),
            tenant_id: Some("t1".to_string()),
            slug: "acme".to_string(),
            display_name: "Acme".to_string(),
            metadata: r#"{"plan":"pro"}"#.to_string(),
            status: "archived".to_string(),
            created_at: 1700000000,
            updated_at: 1700000100,
            archived_at: Some(1700000100),
        };

        let org = model_to_organization(model).unwrap();

        assert_eq!(org.tenant_id.as_deref(), Some("t1"));
        assert_eq!(org.metadata.get("plan").map(String::as_str), Some("pro"));
        assert_eq!(org.status, OrganizationStatus::Archived);
        assert_eq!(org.archived_at, Some(1700000100));
    }

    #[test]
    fn test_corrupt_organization_row_is_internal_error() {
        let model = organization::Model {
            id: "org_123".to_string(),
            tenant_id: None,
            slug: "acme".to_string(),
            display_name: "Acme".to_string(),
            metadata: "{}".to_string(),
            status: "deleted".to_string(),
            created_at: 0,
            updated_at: 0,
            archived_at: None,
        };

        assert!(matches!(
            model_to_organization(model),
            Err(StoreError::Internal(_))
        ));
    }

    #[test]
    fn test_assemble_memberships_groups_roles() {
        let member = |user: &str| membership::Model {
            org_id: "org".to_string(),
            user_id: user.to_string(),
            tenant_id: None,
            is_primary: false,
            created_at: 1,
            updated_at: 1,
        };
        let assignment = |user: &str, role: &str| member_role::Model {
            org_id: "org".to_string(),
            user_id: user.to_string(),
            role_id: role.to_string(),
            tenant_id: None,
            created_at: 1,
        };

        let memberships = assemble_memberships(
            vec![member("u1"), member("u2")],
            vec![assignment("u1", "r1"), assignment("u1", "r2")],
        );

        assert_eq!(memberships[0].role_ids(), vec!["r1", "r2"]);
        assert!(memberships[1].roles.is_empty());
    }

    #[test]
    fn test_invitation_model_conversion() {
        let model = invitation::Model {
            code: "code".to_string(),
            org_id: "org".to_string(),
            org_slug: "acme".to_string(),
            org_display_name: "Acme".to_string(),
            email: "alice@example.com".to_string(),
            role_ids: r#"["r1","r2"]"#.to_string(),
            created_by: "admin".to_string(),
            created_at: 100,
            expires_at: 200,
        };

        let inv = model_to_invitation(model).unwrap();
        assert_eq!(inv.role_ids, vec!["r1", "r2"]);
        assert_eq!(inv.expires_at, 200);
    }

    #[test]
    fn test_audit_event_parsing() {
        let model = audit::Model {
            id: "a1".to_string(),
            event: "role_permissions_updated".to_string(),
            org_id: None,
            actor_id: None,
            target_id: Some("r1".to_string()),
            details: None,
            timestamp: 5,
        };

        let entry = model_to_audit(model).unwrap();
        assert_eq!(entry.event, OrgAuditEvent::RolePermissionsUpdated);
        assert_eq!(entry.event.as_str(), "role_permissions_updated");
    }
}
