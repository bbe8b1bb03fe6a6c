//! Organization error types.

use crate::error::StoreError;
use thiserror::Error;

/// Broad classification callers map to responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any write.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// The request collides with existing state.
    Conflict,
    /// The invitation was valid once but its lifetime has passed.
    Expired,
    /// The caller is not allowed to perform the operation.
    Forbidden,
    /// The store or a collaborator failed.
    Storage,
}

/// Errors that can occur during organization operations.
#[derive(Debug, Error)]
pub enum OrganizationError {
    /// Input failed validation.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Organization not found.
    #[error("Organization not found: {org_id}")]
    NotFound {
        /// The ID that was not found.
        org_id: String,
    },

    /// Membership not found.
    #[error("User {user_id} is not a member of organization {org_id}")]
    MembershipNotFound {
        /// Organization ID.
        org_id: String,
        /// User ID.
        user_id: String,
    },

    /// Role not found.
    #[error("Role not found: {role_id}")]
    RoleNotFound {
        /// The role ID.
        role_id: String,
    },

    /// Invitation not found.
    #[error("Invitation not found")]
    InvitationNotFound,

    /// Organization slug is already taken within the tenant.
    #[error("Slug already taken: {slug}")]
    SlugTaken {
        /// The slug that is taken.
        slug: String,
    },

    /// Organization display name is already taken within the tenant.
    #[error("Display name already taken: {name}")]
    DisplayNameTaken {
        /// The name that is taken.
        name: String,
    },

    /// User is already a member of the organization.
    #[error("User is already a member of this organization")]
    AlreadyMember,

    /// Tenant of the request does not match the organization's tenant.
    #[error("Tenant mismatch: organization belongs to {expected}, request names {actual}")]
    TenantMismatch {
        /// Tenant the organization belongs to.
        expected: String,
        /// Tenant the caller supplied.
        actual: String,
    },

    /// Role cannot be used in the target organization.
    #[error("Role {role_id} is not assignable in organization {org_id}")]
    RoleScopeMismatch {
        /// The role ID.
        role_id: String,
        /// The target organization.
        org_id: String,
    },

    /// Role name is already used in the same scope.
    #[error("Role name already taken in this scope: {name}")]
    RoleNameTaken {
        /// The role name.
        name: String,
    },

    /// System roles cannot be deleted.
    #[error("System role cannot be deleted: {role_id}")]
    SystemRole {
        /// The role ID.
        role_id: String,
    },

    /// Permission name is not known to the catalog.
    #[error("Unknown permission: {name}")]
    UnknownPermission {
        /// The unresolved permission name.
        name: String,
    },

    /// An unexpired invitation already exists for this address.
    #[error("User already has a pending invitation to this organization")]
    InvitationAlreadyExists,

    /// Invitation has expired.
    #[error("Invitation has expired")]
    InvitationExpired,

    /// The accepting account's email differs from the invited address.
    #[error("Invitation was issued to a different email address")]
    EmailMismatch,

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl OrganizationError {
    /// Create a validation error.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(org_id: impl Into<String>) -> Self {
        Self::NotFound {
            org_id: org_id.into(),
        }
    }

    /// Create a membership not found error.
    pub fn membership_not_found(org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::MembershipNotFound {
            org_id: org_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Create a role not found error.
    pub fn role_not_found(role_id: impl Into<String>) -> Self {
        Self::RoleNotFound {
            role_id: role_id.into(),
        }
    }

    /// Create a slug taken error.
    pub fn slug_taken(slug: impl Into<String>) -> Self {
        Self::SlugTaken { slug: slug.into() }
    }

    /// Create a display name taken error.
    pub fn display_name_taken(name: impl Into<String>) -> Self {
        Self::DisplayNameTaken { name: name.into() }
    }

    /// Create a tenant mismatch error.
    pub fn tenant_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TenantMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a role scope mismatch error.
    pub fn role_scope_mismatch(role_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self::RoleScopeMismatch {
            role_id: role_id.into(),
            org_id: org_id.into(),
        }
    }

    /// Create a role name taken error.
    pub fn role_name_taken(name: impl Into<String>) -> Self {
        Self::RoleNameTaken { name: name.into() }
    }

    /// Create an unknown permission error.
    pub fn unknown_permission(name: impl Into<String>) -> Self {
        Self::UnknownPermission { name: name.into() }
    }

    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::UnknownPermission { .. } => ErrorKind::Validation,
            Self::NotFound { .. }
            | Self::MembershipNotFound { .. }
            | Self::RoleNotFound { .. }
            | Self::InvitationNotFound => ErrorKind::NotFound,
            Self::SlugTaken { .. }
            | Self::DisplayNameTaken { .. }
            | Self::AlreadyMember
            | Self::TenantMismatch { .. }
            | Self::RoleScopeMismatch { .. }
            | Self::RoleNameTaken { .. }
            | Self::SystemRole { .. }
            | Self::InvitationAlreadyExists => ErrorKind::Conflict,
            Self::InvitationExpired => ErrorKind::Expired,
            Self::EmailMismatch => ErrorKind::Forbidden,
            Self::Storage(StoreError::Conflict(_)) => ErrorKind::Conflict,
            Self::Storage(StoreError::NotFound(_)) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Result type for organization operations.
pub type Result<T> = std::result::Result<T, OrganizationError>;
