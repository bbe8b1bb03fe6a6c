use std::sync::Arc;

use tideway_orgs::organizations::{
    AddMember, AdditionalPermissionSource, ClaimsContributor, CreateInvitation, CreateOrganization,
    CreateRole, DirectoryUser, ErrorKind, InMemoryOrgStore, InvitationConfig, InvitationManager,
    MemberQuery, MembershipManager, NoopContextAccessor, OrgClaims, Organization,
    OrganizationClaimsContributor, OrganizationConfig, OrganizationContext,
    OrganizationContextAccessor, OrganizationError, OrganizationManager,
    OrganizationPermissionSource, PermissionResolver, Role, RoleManager, TaskLocalContextAccessor,
    UpdateMembership, format_claims,
};

type Store = InMemoryOrgStore;

/// All managers over one shared in-memory store.
struct Fixture {
    store: Store,
    orgs: OrganizationManager<Store>,
    members: MembershipManager<Store, Store, Store, Store>,
    roles: RoleManager<Store, Store, Store>,
    invitations: InvitationManager<Store, Store, Store, Store>,
}

impl Fixture {
    fn new() -> Self {
        let store = Store::new();
        for (id, name) in [
            ("p_read", "x.read"),
            ("p_write", "x.write"),
            ("p_delete", "x.delete"),
            ("p_billing", "billing.view"),
        ] {
            store.add_permission(id, name);
        }

        Self {
            orgs: OrganizationManager::new(store.clone(), OrganizationConfig::default()),
            members: MembershipManager::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                OrganizationConfig::default(),
            ),
            roles: RoleManager::new(
                store.clone(),
                store.clone(),
                store.clone(),
                OrganizationConfig::default(),
            ),
            invitations: InvitationManager::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                InvitationConfig::default(),
            ),
            store,
        }
    }

    fn resolver(&self) -> PermissionResolver<Store, Store, Store> {
        PermissionResolver::new(self.store.clone(), self.store.clone(), self.store.clone())
    }

    async fn org(&self, slug: &str, tenant: &str) -> Organization {
        self.orgs
            .create(CreateOrganization::new(slug, slug.to_uppercase()).tenant(tenant))
            .await
            .unwrap()
    }

    async fn role(&self, name: &str) -> Role {
        self.roles.create_role(CreateRole::new(name)).await.unwrap()
    }
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_at_most_one_primary_per_user_and_tenant() {
    let f = Fixture::new();
    let mut orgs = Vec::new();
    for slug in ["a", "b", "c", "d"] {
        orgs.push(f.org(slug, "t1").await);
    }

    // Interleave adds and promotions in an arbitrary order.
    let steps: [(usize, bool); 4] = [(0, true), (1, false), (2, true), (3, true)];
    for (i, primary) in steps {
        f.members
            .add_member(AddMember::new(&orgs[i].id, "u1").primary(primary))
            .await
            .unwrap();
        assert_primary_count(&f, "u1", 1).await;
    }
    for i in [1, 0, 3, 2, 1] {
        f.members
            .update_membership(&orgs[i].id, "u1", UpdateMembership::new().primary(true))
            .await
            .unwrap();
        assert_primary_count(&f, "u1", 1).await;
    }

    f.members
        .update_membership(&orgs[1].id, "u1", UpdateMembership::new().primary(false))
        .await
        .unwrap();
    assert_primary_count(&f, "u1", 0).await;
}

async fn assert_primary_count(f: &Fixture, user_id: &str, expected: usize) {
    let memberships = f
        .members
        .get_memberships_for_user(user_id, Some("t1"))
        .await
        .unwrap();
    let primaries = memberships.iter().filter(|m| m.is_primary).count();
    assert_eq!(primaries, expected);
    if expected == 1 {
        assert!(memberships[0].is_primary, "primary membership is listed first");
    }
}

#[tokio::test]
async fn test_effective_contains_explicit_and_baseline() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;
    let manager = f.role("Manager").await;
    f.roles
        .update_permissions(&manager.id, None, &names(&["x.read", "x.delete"]))
        .await
        .unwrap();
    f.roles
        .update_permissions(&manager.id, Some(&acme.id), &names(&["x.write", "x.read"]))
        .await
        .unwrap();

    let baseline = f.roles.get_permissions(&manager.id, None).await.unwrap();
    let scoped = f.roles.get_permissions(&manager.id, Some(&acme.id)).await.unwrap();

    for name in &scoped.explicit {
        assert!(scoped.effective.contains(name));
    }
    let mut union: Vec<String> = baseline
        .explicit
        .iter()
        .chain(&scoped.explicit)
        .cloned()
        .collect();
    union.sort();
    union.dedup();
    assert_eq!(scoped.effective, union);
}

#[tokio::test]
async fn test_update_permissions_round_trip() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;
    let role = f.role("Editor").await;

    let requested = names(&["x.write", "X.READ", "x.write", "billing.view"]);
    f.roles
        .update_permissions(&role.id, Some(&acme.id), &requested)
        .await
        .unwrap();

    let perms = f.roles.get_permissions(&role.id, Some(&acme.id)).await.unwrap();
    // Names come back as the catalog spells them.
    assert_eq!(perms.explicit, vec!["billing.view", "x.read", "x.write"]);

    f.roles
        .update_permissions(&role.id, Some(&acme.id), &[])
        .await
        .unwrap();
    let perms = f.roles.get_permissions(&role.id, Some(&acme.id)).await.unwrap();
    assert!(perms.explicit.is_empty());
}

#[tokio::test]
async fn test_remove_member_twice() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;
    f.members
        .add_member(AddMember::new(&acme.id, "u1"))
        .await
        .unwrap();

    f.members.remove_member(&acme.id, "u1").await.unwrap();
    f.members.remove_member(&acme.id, "u1").await.unwrap();
    f.members.remove_member(&acme.id, "never-joined").await.unwrap();

    assert!(f.members.get_membership(&acme.id, "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invitation_is_unique_and_single_use() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;

    let invitation = f
        .invitations
        .create(CreateInvitation::new(&acme.id, "bob@example.com", "admin"))
        .await
        .unwrap();
    let err = f
        .invitations
        .create(CreateInvitation::new(&acme.id, "Bob@Example.com ", "admin"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrganizationError::InvitationAlreadyExists));

    let bob = DirectoryUser::new("bob", "bob@example.com", 0);
    f.invitations.accept(&invitation.code, &bob).await.unwrap();

    let err = f.invitations.accept(&invitation.code, &bob).await.unwrap_err();
    assert!(matches!(err, OrganizationError::InvitationNotFound));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_template_role_with_organization_override() {
    let f = Fixture::new();
    let acme = f.org("acme", "T1").await;
    let manager = f.role("Manager").await;

    f.roles
        .update_permissions(&manager.id, None, &names(&["x.read"]))
        .await
        .unwrap();
    f.roles
        .update_permissions(&manager.id, Some(&acme.id), &names(&["x.write"]))
        .await
        .unwrap();

    let perms = f.roles.get_permissions(&manager.id, Some(&acme.id)).await.unwrap();
    assert_eq!(perms.effective, vec!["x.read", "x.write"]);
    assert_eq!(perms.explicit, vec!["x.write"]);

    // Another organization sees only the template baseline.
    let globex = f.org("globex", "T1").await;
    let perms = f.roles.get_permissions(&manager.id, Some(&globex.id)).await.unwrap();
    assert_eq!(perms.effective, vec!["x.read"]);
    assert!(perms.explicit.is_empty());

    // A member of acme holding Manager resolves the same effective set.
    f.members
        .add_member(AddMember::new(&acme.id, "u1").roles([&manager.id]))
        .await
        .unwrap();
    let resolved = f
        .resolver()
        .get_organization_permissions(&acme.id, "u1")
        .await
        .unwrap();
    assert_eq!(resolved, vec!["x.read", "x.write"]);
}

#[tokio::test]
async fn test_accept_merges_into_existing_membership() {
    let f = Fixture::new();
    let org = f.org("acme", "t1").await;
    let r1 = f.role("R1").await;
    let r2 = f.role("R2").await;
    f.store
        .add_user(DirectoryUser::new("u", "u@example.com", 0));

    f.members
        .add_member(AddMember::new(&org.id, "u").roles([&r2.id]))
        .await
        .unwrap();
    let invitation = f
        .invitations
        .create(CreateInvitation::new(&org.id, "u@example.com", "admin").roles([&r1.id]))
        .await
        .unwrap();

    let user = DirectoryUser::new("u", "U@example.com", 0);
    let accepted = f.invitations.accept(&invitation.code, &user).await.unwrap();

    assert!(accepted.was_existing_member);
    let mut roles = accepted.membership.role_ids();
    roles.sort();
    let mut expected = vec![r1.id.clone(), r2.id.clone()];
    expected.sort();
    assert_eq!(roles, expected);
    assert!(f.invitations.find(&invitation.code).await.unwrap().is_none());

    let stored = f.members.get_membership(&org.id, "u").await.unwrap().unwrap();
    assert_eq!(stored, accepted.membership);
}

#[tokio::test]
async fn test_accept_with_no_new_roles_still_consumes_code() {
    let f = Fixture::new();
    let org = f.org("acme", "t1").await;
    let r1 = f.role("R1").await;
    f.members
        .add_member(AddMember::new(&org.id, "u").roles([&r1.id]))
        .await
        .unwrap();
    let writes = f.store.membership_write_count();

    let invitation = f
        .invitations
        .create(CreateInvitation::new(&org.id, "u@example.com", "admin").roles([&r1.id]))
        .await
        .unwrap();
    let accepted = f
        .invitations
        .accept(&invitation.code, &DirectoryUser::new("u", "u@example.com", 0))
        .await
        .unwrap();

    assert!(accepted.was_existing_member);
    assert_eq!(f.store.membership_write_count(), writes);
    assert!(f.invitations.find(&invitation.code).await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_percent_is_literal() {
    let f = Fixture::new();
    let org = f.org("acme", "t1").await;
    f.store
        .add_user(DirectoryUser::new("promo", "promo@example.com", 0).display_name("Save 50% Today"));
    f.store
        .add_user(DirectoryUser::new("fifty", "fifty@example.com", 0).display_name("Team 50"));
    f.store
        .add_user(DirectoryUser::new("five", "five@example.com", 0).display_name("500 Club"));
    for id in ["promo", "fifty", "five"] {
        f.members
            .add_member(AddMember::new(&org.id, id))
            .await
            .unwrap();
    }

    let page = f
        .members
        .get_members(MemberQuery::new(&org.id).search("50%"))
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].user_id, "promo");
}

// =============================================================================
// Context, resolution and claims
// =============================================================================

#[tokio::test]
async fn test_claims_for_ambient_organization() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;
    let viewer = f.role("Viewer").await;
    f.roles
        .update_permissions(&viewer.id, None, &names(&["x.read"]))
        .await
        .unwrap();
    f.members
        .add_member(AddMember::new(&acme.id, "u1").roles([&viewer.id]))
        .await
        .unwrap();
    f.store.grant_global_permissions("u1", ["billing.view"]);

    let accessor = Arc::new(TaskLocalContextAccessor::new());
    let contributor = OrganizationClaimsContributor::new(f.resolver(), accessor.clone());

    let claims = accessor
        .run(async {
            let without_org = contributor.contribute("u1", Some("t1")).await.unwrap();
            assert_eq!(without_org.len(), 1);
            assert_eq!(without_org[0].value, "billing.view");

            let _scope = accessor.begin_scope(OrganizationContext::from_organization(&acme));
            contributor.contribute("u1", Some("t1")).await.unwrap()
        })
        .await;

    let expected = format_claims(
        &["billing.view", "x.read"],
        &OrganizationContext::from_organization(&acme),
    );
    assert_eq!(claims, expected);

    let structured = OrgClaims::new(&["x.read", "billing.view"], &OrganizationContext::from_organization(&acme));
    assert_eq!(structured.permissions.as_deref(), Some("billing.view x.read"));
    assert_eq!(structured.org_slug.as_deref(), Some("acme"));
}

#[tokio::test]
async fn test_additional_permission_source_follows_scope() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;
    let writer = f.role("Writer").await;
    f.roles
        .update_permissions(&writer.id, Some(&acme.id), &names(&["x.write"]))
        .await
        .unwrap();
    f.members
        .add_member(AddMember::new(&acme.id, "u1").roles([&writer.id]))
        .await
        .unwrap();

    let accessor = Arc::new(TaskLocalContextAccessor::new());
    let source = OrganizationPermissionSource::new(f.resolver(), accessor.clone());

    accessor
        .run(async {
            assert!(source.additional_permissions("u1").await.unwrap().is_empty());

            let inside = accessor
                .within(OrganizationContext::from_organization(&acme), async {
                    source.additional_permissions("u1").await.unwrap()
                })
                .await;
            assert_eq!(inside, vec!["x.write"]);

            // The frame is gone once the scoped future completes.
            assert!(!accessor.current().has_organization());
        })
        .await;
}

#[tokio::test]
async fn test_noop_accessor_never_scopes() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;
    let accessor = NoopContextAccessor;
    let _scope = accessor.begin_scope(OrganizationContext::from_organization(&acme));

    let contributor = OrganizationClaimsContributor::new(f.resolver(), NoopContextAccessor);
    f.store.grant_global_permissions("u1", ["x.read"]);
    let claims = contributor.contribute("u1", None).await.unwrap();

    assert!(!accessor.current().has_organization());
    assert_eq!(claims.len(), 1);
}

#[tokio::test]
async fn test_concurrent_flows_see_their_own_organization() {
    let f = Fixture::new();
    let a = f.org("alpha", "t1").await;
    let b = f.org("beta", "t1").await;
    let accessor = Arc::new(TaskLocalContextAccessor::new());

    let mut handles = Vec::new();
    for org in [a, b] {
        let accessor = accessor.clone();
        handles.push(tokio::spawn(async move {
            let inner = accessor.clone();
            accessor
                .run(async move {
                    let _scope = inner.begin_scope(OrganizationContext::from_organization(&org));
                    tokio::task::yield_now().await;
                    (org.id.clone(), inner.current().org_id().map(String::from))
                })
                .await
        }));
    }

    for handle in handles {
        let (expected, seen) = handle.await.unwrap();
        assert_eq!(seen.as_deref(), Some(expected.as_str()));
    }
}

// =============================================================================
// Cross-cutting rules
// =============================================================================

#[tokio::test]
async fn test_roles_from_other_scopes_are_rejected_everywhere() {
    let f = Fixture::new();
    let acme = f.org("acme", "t1").await;
    let globex = f.org("globex", "t1").await;
    let foreign = f
        .roles
        .create_role(CreateRole::new("Foreign").organization(&globex.id))
        .await
        .unwrap();

    let err = f
        .members
        .add_member(AddMember::new(&acme.id, "u1").roles([&foreign.id]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = f
        .invitations
        .create(CreateInvitation::new(&acme.id, "a@example.com", "admin").roles([&foreign.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrganizationError::RoleScopeMismatch { .. }));

    f.members
        .add_member(AddMember::new(&acme.id, "u1"))
        .await
        .unwrap();
    let err = f
        .members
        .update_membership(&acme.id, "u1", UpdateMembership::new().roles([&foreign.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrganizationError::RoleScopeMismatch { .. }));
}

#[tokio::test]
async fn test_tenant_isolation_of_reads() {
    let f = Fixture::new();
    let t1 = f.org("shared", "t1").await;
    let t2 = f.org("shared", "t2").await;

    assert_ne!(t1.id, t2.id);
    let found = f.orgs.get_by_slug(Some("t2"), "SHARED").await.unwrap().unwrap();
    assert_eq!(found.id, t2.id);
    assert_eq!(f.orgs.list(Some("t1")).await.unwrap().len(), 1);
    assert!(f.orgs.list(None).await.unwrap().is_empty());
}
