//! Organization-scoped authorization.
//!
//! This module provides:
//! - **Organization directory** - tenant-scoped CRUD with slug/name uniqueness
//! - **Memberships** - role assignments with one primary membership per tenant
//! - **Roles** - template roles whose baseline permissions organizations extend
//! - **Invitations** - single-use codes that create or merge memberships
//! - **Permission resolution** - global plus organization permissions per user
//! - **Ambient context** - the current organization, scoped per task
//! - **Auth integration** - claims rendering for token issuance
//!
//! # Features
//!
//! - `test-organizations` - In-memory stores for testing
//! - `database` - SeaORM-backed store
//!
//! # Example
//!
//! ```rust,ignore
//! use tideway_orgs::organizations::{
//!     CreateOrganization, CreateRole, OrganizationConfig, OrganizationManager, RoleManager,
//! };
//!
//! let orgs = OrganizationManager::new(store.clone(), OrganizationConfig::default());
//! let roles = RoleManager::new(store.clone(), store.clone(), catalog, OrganizationConfig::default());
//!
//! let acme = orgs.create(CreateOrganization::new("acme", "Acme").tenant("t1")).await?;
//! let manager = roles.create_role(CreateRole::new("Manager")).await?;
//! roles.update_permissions(&manager.id, None, &["x.read".into()]).await?;
//! roles.update_permissions(&manager.id, Some(&acme.id), &["x.write".into()]).await?;
//!
//! let perms = roles.get_permissions(&manager.id, Some(&acme.id)).await?;
//! assert_eq!(perms.effective, ["x.read", "x.write"]);
//! assert_eq!(perms.explicit, ["x.write"]);
//! ```

mod audit;
mod config;
mod context;
mod directory;
mod error;
mod invitation_manager;
mod manager;
mod membership_manager;
mod permissions;
mod resolver;
mod role_manager;
pub mod storage;
mod types;
mod utils;

pub mod auth;

#[cfg(feature = "database")]
mod sea_orm_store;


// Audit exports
pub use audit::{OrgAuditEntry, OrgAuditEvent};

// Configuration exports
pub use config::{InvitationConfig, OrganizationConfig};

// Context exports
pub use context::{
    ContextScope, NoopContextAccessor, OrganizationContext, OrganizationContextAccessor,
    TaskLocalContextAccessor,
};

// Collaborator exports
pub use directory::{DirectoryUser, PermissionCatalog, UserDirectory};

// Error exports
pub use error::{ErrorKind, OrganizationError, Result};

// Manager exports
pub use invitation_manager::InvitationManager;
pub use manager::OrganizationManager;
pub use membership_manager::MembershipManager;
pub use role_manager::RoleManager;

// Resolution exports
pub use permissions::{merge_inherited, normalize_permission_names};
pub use resolver::{AdditionalPermissionSource, OrganizationPermissionSource, PermissionResolver};

// Storage trait exports
pub use storage::{
    InvitationStore, MembershipChanges, MembershipStore, OptionalAuditStore, OrgAuditStore,
    OrganizationStore, RoleStore, WithAuditStore,
};

// Type exports
pub use types::{
    AcceptedInvitation, AddMember, CreateInvitation, CreateOrganization, CreateRole, Invitation,
    MemberFilter, MemberPage, MemberQuery, Membership, Organization, OrganizationMetadata,
    OrganizationStatus, ParseStatusError, Role, RoleAssignment, RolePermission, RolePermissions,
    UpdateMembership, UpdateOrganization, UpdateRole,
};
pub use utils::{LIKE_ESCAPE, LikePattern};

// Auth integration exports
pub use auth::{
    Claim, ClaimsContributor, OrgClaims, OrganizationClaimsContributor, format_claims,
};

#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmOrgStore;

// Test exports
#[cfg(any(test, feature = "test-organizations"))]
pub use test::InMemoryOrgStore;
