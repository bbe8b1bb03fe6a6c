//! Organization audit logging.
//!
//! Managers record one entry per state change when an audit store is
//! attached with `.with_audit_store(..)`.

use serde::{Deserialize, Serialize};

/// Audit entry for organization operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAuditEntry {
    /// Unique identifier for this audit entry.
    pub id: String,
    /// The type of event.
    pub event: OrgAuditEvent,
    /// Organization the event relates to; `None` for template role events.
    pub org_id: Option<String>,
    /// User who performed the action, when known.
    pub actor_id: Option<String>,
    /// Target of the event (user ID for membership events, role ID for role events).
    pub target_id: Option<String>,
    /// Additional details about the event.
    pub details: Option<String>,
    /// Timestamp (Unix seconds).
    pub timestamp: u64,
}

/// Organization audit event types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrgAuditEvent {
    // Organization events
    /// Organization was created.
    OrgCreated,
    /// Organization display name, metadata or status changed.
    OrgUpdated,
    /// Organization was archived.
    OrgArchived,

    // Membership events
    /// A member was added, directly or through an invitation.
    MemberAdded,
    /// A member's primary flag or roles changed.
    MemberUpdated,
    /// A member was removed from the organization.
    MemberRemoved,

    // Role events
    /// A role was created.
    RoleCreated,
    /// A role was renamed or redescribed.
    RoleUpdated,
    /// A role was deleted.
    RoleDeleted,
    /// A role's permissions at one scope changed.
    RolePermissionsUpdated,

    // Invitation events
    /// An invitation was created.
    InvitationCreated,
    /// An invitation was accepted.
    InvitationAccepted,
    /// An invitation was revoked.
    InvitationRevoked,
}

impl OrgAuditEvent {
    /// Get the string representation of the event.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrgCreated => "org_created",
            Self::OrgUpdated => "org_updated",
            Self::OrgArchived => "org_archived",
            Self::MemberAdded => "member_added",
            Self::MemberUpdated => "member_updated",
            Self::MemberRemoved => "member_removed",
            Self::RoleCreated => "role_created",
            Self::RoleUpdated => "role_updated",
            Self::RoleDeleted => "role_deleted",
            Self::RolePermissionsUpdated => "role_permissions_updated",
            Self::InvitationCreated => "invitation_created",
            Self::InvitationAccepted => "invitation_accepted",
            Self::InvitationRevoked => "invitation_revoked",
        }
    }
}

impl std::fmt::Display for OrgAuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OrgAuditEntry {
    /// Create a new audit entry for an event in an organization.
    #[must_use]
    pub fn new(event: OrgAuditEvent, org_id: impl Into<String>) -> Self {
        Self::unscoped(event).with_org(org_id)
    }

    /// Create a new audit entry that is not tied to an organization.
    #[must_use]
    pub fn unscoped(event: OrgAuditEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            org_id: None,
            actor_id: None,
            target_id: None,
            details: None,
            timestamp: crate::organizations::utils::current_timestamp(),
        }
    }

    /// Set the organization.
    #[must_use]
    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Set the acting user.
    #[must_use]
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Set the target ID.
    #[must_use]
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Set additional details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_entry_builder() {
        let entry = OrgAuditEntry::new(OrgAuditEvent::OrgCreated, "org_123")
            .with_details("slug=acme");

        assert_eq!(entry.event, OrgAuditEvent::OrgCreated);
        assert_eq!(entry.org_id.as_deref(), Some("org_123"));
        assert!(entry.actor_id.is_none());
        assert!(entry.target_id.is_none());
        assert_eq!(entry.details.as_deref(), Some("slug=acme"));
    }

    #[test]
    fn test_unscoped_entry_with_target() {
        let entry = OrgAuditEntry::unscoped(OrgAuditEvent::RoleCreated).with_target("role_1");

        assert!(entry.org_id.is_none());
        assert_eq!(entry.target_id.as_deref(), Some("role_1"));
    }

    #[test]
    fn test_event_display() {
        assert_eq!(OrgAuditEvent::OrgArchived.to_string(), "org_archived");
        assert_eq!(
            OrgAuditEvent::RolePermissionsUpdated.to_string(),
            "role_permissions_updated"
        );
    }

    #[test]
    fn test_event_serialization() {
        let entry = OrgAuditEntry::new(OrgAuditEvent::InvitationCreated, "org_1")
            .with_actor("user_1");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event\":\"invitation_created\""));
        assert!(json.contains("\"actor_id\":\"user_1\""));
    }
}
