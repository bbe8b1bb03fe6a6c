//! Scope visibility and template/override inheritance.
//!
//! Permission rows carry an optional organization and an optional tenant.
//! Two questions are answered from the same rows:
//!
//! - *What does this role grant in organization O?* The rows assigned
//!   exactly at O are the **explicit** set. When the role is defined
//!   outside O (a template, or another organization's role), the rows at
//!   the role's own scope form an inherited **baseline**. Effective is
//!   baseline plus explicit.
//! - *What can this member do in organization O?* Every row of an assigned
//!   role whose organization is null or O and whose tenant is null or the
//!   membership's tenant.
//!
//! Both are plain functions over loaded rows so the managers only fetch.

use std::collections::{HashMap, HashSet};

use super::types::{Role, RolePermission, RolePermissions};

/// A row is visible to a tenant when it is global or belongs to that tenant.
#[inline]
pub(crate) fn tenant_visible(row_tenant: Option<&str>, tenant: Option<&str>) -> bool {
    row_tenant.is_none() || row_tenant == tenant
}

/// A row is visible to an organization when it is unscoped or scoped to it.
#[inline]
pub(crate) fn org_visible(row_org: Option<&str>, org_id: &str) -> bool {
    row_org.is_none_or(|o| o == org_id)
}

/// Permission ids of one role, split by where they were assigned.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ScopedRows {
    /// Assigned exactly at the queried scope.
    pub explicit: Vec<String>,
    /// Assigned at the role's own scope, inherited into the queried one.
    pub baseline: Vec<String>,
}

/// Split a role's rows into explicit and baseline permission ids for the
/// queried organization (`None` queries the global scope).
///
/// Only rows visible to `tenant` are considered. Baseline rows are
/// collected only when the role's own organization differs from the
/// queried one.
pub(crate) fn split_scoped_rows(
    rows: &[RolePermission],
    role: &Role,
    org_id: Option<&str>,
    tenant: Option<&str>,
) -> ScopedRows {
    let inherits = role.is_template_for(org_id);
    let mut split = ScopedRows::default();

    for row in rows.iter().filter(|r| r.role_id == role.id) {
        if !tenant_visible(row.tenant_id.as_deref(), tenant) {
            continue;
        }
        let row_org = row.org_id.as_deref();
        if row_org == org_id {
            split.explicit.push(row.permission_id.clone());
        } else if inherits && row_org == role.org_id.as_deref() {
            split.baseline.push(row.permission_id.clone());
        }
    }

    split
}

/// Permission ids a member holds through the given roles.
pub(crate) fn member_visible_ids(
    rows: &[RolePermission],
    role_ids: &HashSet<&str>,
    org_id: &str,
    tenant: Option<&str>,
) -> Vec<String> {
    rows.iter()
        .filter(|r| role_ids.contains(r.role_id.as_str()))
        .filter(|r| org_visible(r.org_id.as_deref(), org_id))
        .filter(|r| tenant_visible(r.tenant_id.as_deref(), tenant))
        .map(|r| r.permission_id.clone())
        .collect()
}

/// Combine baseline and explicit names into effective and explicit sets.
///
/// Both outputs are case-insensitively de-duplicated and sorted, and
/// `effective` always contains every explicit name.
pub fn merge_inherited(baseline: Vec<String>, explicit: Vec<String>) -> RolePermissions {
    let effective = normalize_permission_names(baseline.into_iter().chain(explicit.iter().cloned()));
    RolePermissions {
        effective,
        explicit: normalize_permission_names(explicit),
    }
}

/// Case-insensitively de-duplicate and alphabetically sort permission names.
///
/// Blank names are dropped; the first spelling seen wins.
pub fn normalize_permission_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<String> = names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref().trim();
            (!name.is_empty() && seen.insert(name.to_lowercase())).then(|| name.to_string())
        })
        .collect();
    unique.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    unique
}

/// Map permission ids to names, dropping ids the catalog no longer knows.
pub(crate) fn names_for_ids(ids: &[String], catalog: &HashMap<String, String>) -> Vec<String> {
    ids.iter()
        .filter_map(|id| match catalog.get(id) {
            Some(name) => Some(name.clone()),
            None => {
                tracing::warn!(permission_id = %id, "Dropping permission id with no catalog entry");
                None
            }
        })
        .collect()
}
