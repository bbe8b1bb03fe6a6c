//! Auth integration for organizations.
//!
//! Renders organization permissions and context into token claims.

mod claims;

pub use claims::{
    Claim, ClaimsContributor, ORG_ID_CLAIM, ORG_NAME_CLAIM, ORG_SLUG_CLAIM, OrgClaims,
    OrganizationClaimsContributor, PERMISSIONS_CLAIM, format_claims,
};
