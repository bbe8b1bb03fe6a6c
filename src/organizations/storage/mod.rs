//! Storage traits for organizations.
//!
//! Implement these traits for your database layer, or enable the
//! `database` feature for the SeaORM implementation.

mod audit;
mod invitation;
mod membership;
mod organization;
mod role;

pub use audit::{OptionalAuditStore, OrgAuditStore, WithAuditStore};
pub use invitation::InvitationStore;
pub use membership::{MembershipChanges, MembershipStore};
pub use organization::OrganizationStore;
pub use role::RoleStore;
