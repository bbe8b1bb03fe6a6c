//! Ambient organization context.
//!
//! Code that renders claims during token issuance needs to know which
//! organization the request is scoped to without every intermediate call
//! passing it along. The current organization lives in task-local storage
//! as a stack of frames:
//!
//! - [`TaskLocalContextAccessor::run`] establishes an empty stack for one
//!   logical operation (typically one request).
//! - [`OrganizationContextAccessor::begin_scope`] pushes a frame and returns
//!   a [`ContextScope`] guard; dropping the guard restores the exact
//!   previous frame, on every exit path.
//! - [`TaskLocalContextAccessor::within`] runs a future with one extra frame.
//!
//! Frames follow the future across `.await` points but never leak into
//! other tasks: a `tokio::spawn`ed task starts with no context.
//!
//! # Example
//!
//! ```rust
//! use tideway_orgs::organizations::{
//!     OrganizationContext, OrganizationContextAccessor, TaskLocalContextAccessor,
//! };
//!
//! # async fn example() {
//! let accessor = TaskLocalContextAccessor::new();
//! accessor
//!     .run(async {
//!         let _scope = accessor.begin_scope(OrganizationContext::new("org_1", "acme", "Acme"));
//!         assert_eq!(accessor.current().org_id(), Some("org_1"));
//!     })
//!     .await;
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use super::types::Organization;

/// The organization a logical operation is scoped to.
///
/// Use [`OrganizationContext::empty`] for "no organization in scope".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationContext {
    org_id: Option<String>,
    slug: Option<String>,
    display_name: Option<String>,
}

impl OrganizationContext {
    /// Context naming an organization.
    pub fn new(
        org_id: impl Into<String>,
        slug: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            org_id: Some(org_id.into()),
            slug: Some(slug.into()),
            display_name: Some(display_name.into()),
        }
    }

    /// The "no organization" context.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            org_id: None,
            slug: None,
            display_name: None,
        }
    }

    /// Context for a loaded organization.
    #[must_use]
    pub fn from_organization(org: &Organization) -> Self {
        Self::new(&org.id, &org.slug, &org.display_name)
    }

    #[must_use]
    pub fn has_organization(&self) -> bool {
        self.org_id.is_some()
    }

    #[must_use]
    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    #[must_use]
    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// Read and scope the current organization.
///
/// Injected into consumers (claims contributors, permission sources) so
/// deployments without multi-organization support can plug in
/// [`NoopContextAccessor`].
pub trait OrganizationContextAccessor: Send + Sync {
    /// The innermost active frame, or the empty context.
    fn current(&self) -> OrganizationContext;

    /// Push a frame until the returned guard is dropped.
    ///
    /// [`TaskLocalContextAccessor`] only has somewhere to push inside
    /// [`TaskLocalContextAccessor::run`] or [`TaskLocalContextAccessor::within`].
    /// Called outside both, it logs a warning and returns an inert guard
    /// ([`ContextScope::is_active`] is `false`), and [`current`](Self::current)
    /// stays empty. Wrap each request in `run` before scoping it.
    #[must_use = "the scope ends as soon as the guard is dropped"]
    fn begin_scope(&self, context: OrganizationContext) -> ContextScope;
}

impl<T: OrganizationContextAccessor + ?Sized> OrganizationContextAccessor for Arc<T> {
    fn current(&self) -> OrganizationContext {
        (**self).current()
    }

    fn begin_scope(&self, context: OrganizationContext) -> ContextScope {
        (**self).begin_scope(context)
    }
}

tokio::task_local! {
    static CONTEXT_FRAMES: RefCell<Vec<OrganizationContext>>;
}

/// Guard returned by [`OrganizationContextAccessor::begin_scope`].
///
/// Dropping it truncates the frame stack back to the depth it had before
/// the matching `begin_scope`, so a guard dropped out of order still
/// restores its own prior frame.
#[derive(Debug)]
pub struct ContextScope {
    restore_depth: Option<usize>,
}

impl ContextScope {
    /// A guard that does nothing on drop.
    #[must_use]
    pub fn inert() -> Self {
        Self { restore_depth: None }
    }

    /// Whether this guard pushed a frame.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.restore_depth.is_some()
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if let Some(depth) = self.restore_depth.take() {
            let _ = CONTEXT_FRAMES.try_with(|frames| {
                frames.borrow_mut().truncate(depth);
            });
        }
    }
}

/// Accessor backed by tokio task-local storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskLocalContextAccessor;

impl TaskLocalContextAccessor {
    /// Create a new accessor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run `future` as one logical operation with its own, initially empty,
    /// frame stack.
    pub async fn run<F: Future>(&self, future: F) -> F::Output {
        CONTEXT_FRAMES.scope(RefCell::new(Vec::new()), future).await
    }

    /// Run `future` with `context` pushed on top of the current frames.
    ///
    /// Works whether or not a flow has been established; the caller's frames
    /// are untouched when the future completes or is dropped.
    pub async fn within<F: Future>(&self, context: OrganizationContext, future: F) -> F::Output {
        let mut frames = CONTEXT_FRAMES
            .try_with(|frames| frames.borrow().clone())
            .unwrap_or_default();
        frames.push(context);
        CONTEXT_FRAMES.scope(RefCell::new(frames), future).await
    }

    /// Number of active frames in the current flow.
    #[must_use]
    pub fn depth(&self) -> usize {
        CONTEXT_FRAMES
            .try_with(|frames| frames.borrow().len())
            .unwrap_or(0)
    }
}

impl OrganizationContextAccessor for TaskLocalContextAccessor {
    fn current(&self) -> OrganizationContext {
        CONTEXT_FRAMES
            .try_with(|frames| frames.borrow().last().cloned())
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn begin_scope(&self, context: OrganizationContext) -> ContextScope {
        let pushed = CONTEXT_FRAMES.try_with(|frames| {
            let mut frames = frames.borrow_mut();
            let depth = frames.len();
            frames.push(context);
            depth
        });

        match pushed {
            Ok(depth) => ContextScope {
                restore_depth: Some(depth),
            },
            Err(_) => {
                tracing::warn!(
                    "begin_scope called outside an organization context flow; scope ignored"
                );
                ContextScope::inert()
            }
        }
    }
}

/// Accessor for deployments without multi-organization support.
///
/// Always reports the empty context; scopes are accepted and ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopContextAccessor;

impl OrganizationContextAccessor for NoopContextAccessor {
    fn current(&self) -> OrganizationContext {
        OrganizationContext::empty()
    }

    fn begin_scope(&self, _context: OrganizationContext) -> ContextScope {
        ContextScope::inert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: &str) -> OrganizationContext {
        OrganizationContext::new(id, format!("{id}-slug"), format!("{id} name"))
    }

    #[test]
    fn test_empty_context() {
        let empty = OrganizationContext::empty();
        assert!(!empty.has_organization());
        assert_eq!(empty.org_id(), None);
        assert_eq!(empty, OrganizationContext::default());
    }

    #[tokio::test]
    async fn test_current_is_empty_outside_flow() {
        let accessor = TaskLocalContextAccessor::new();
        assert!(!accessor.current().has_organization());

        let scope = accessor.begin_scope(ctx("org_1"));
        assert!(!scope.is_active());
        assert!(!accessor.current().has_organization());
    }

    #[tokio::test]
    async fn test_begin_scope_needs_run() {
        let accessor = TaskLocalContextAccessor::new();

        let outside = accessor.begin_scope(ctx("org_1"));
        assert!(!outside.is_active());
        assert_eq!(accessor.depth(), 0);
        drop(outside);

        let seen = accessor
            .run(async {
                let inside = accessor.begin_scope(ctx("org_1"));
                assert!(inside.is_active());
                accessor.current().org_id().map(String::from)
            })
            .await;
        assert_eq!(seen.as_deref(), Some("org_1"));
    }

    #[tokio::test]
    async fn test_nested_scopes_restore_previous_frame() {
        let accessor = TaskLocalContextAccessor::new();
        accessor
            .run(async {
                let outer = accessor.begin_scope(ctx("outer"));
                assert_eq!(accessor.current().org_id(), Some("outer"));

                {
                    let _inner = accessor.begin_scope(ctx("inner"));
                    assert_eq!(accessor.current().org_id(), Some("inner"));
                    assert_eq!(accessor.depth(), 2);
                }

                assert_eq!(accessor.current().org_id(), Some("outer"));
                drop(outer);
                assert!(!accessor.current().has_organization());
            })
            .await;
    }

    #[tokio::test]
    async fn test_scope_survives_await_points() {
        let accessor = TaskLocalContextAccessor::new();
        accessor
            .run(async {
                let _scope = accessor.begin_scope(ctx("org_1"));
                tokio::task::yield_now().await;
                assert_eq!(accessor.current().org_id(), Some("org_1"));
            })
            .await;
    }

    #[tokio::test]
    async fn test_scope_released_on_early_return() {
        let accessor = TaskLocalContextAccessor::new();

        async fn fails(accessor: &TaskLocalContextAccessor) -> Result<(), &'static str> {
            let _scope = accessor.begin_scope(ctx("temporary"));
            Err("boom")?;
            Ok(())
        }

        accessor
            .run(async {
                let _outer = accessor.begin_scope(ctx("outer"));
                assert!(fails(&accessor).await.is_err());
                assert_eq!(accessor.current().org_id(), Some("outer"));
            })
            .await;
    }

    #[tokio::test]
    async fn test_within_does_not_leak_to_caller() {
        let accessor = TaskLocalContextAccessor::new();
        let seen = accessor
            .within(ctx("org_1"), async { accessor.current() })
            .await;
        assert_eq!(seen.org_id(), Some("org_1"));
        assert!(!accessor.current().has_organization());
    }

    #[tokio::test]
    async fn test_spawned_tasks_do_not_inherit_context() {
        let accessor = TaskLocalContextAccessor::new();
        accessor
            .within(ctx("parent"), async {
                let child = tokio::spawn(async move {
                    TaskLocalContextAccessor::new().current().has_organization()
                });
                assert!(!child.await.unwrap());
                assert_eq!(accessor.current().org_id(), Some("parent"));
            })
            .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flows_are_isolated() {
        let mut handles = Vec::new();
        for i in 0..16 {
            handles.push(tokio::spawn(async move {
                let accessor = TaskLocalContextAccessor::new();
                let id = format!("org_{i}");
                accessor
                    .run(async {
                        let _scope = accessor.begin_scope(ctx(&id));
                        for _ in 0..10 {
                            tokio::task::yield_now().await;
                            assert_eq!(accessor.current().org_id(), Some(id.as_str()));
                        }
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[test]
    fn test_noop_accessor() {
        let accessor = NoopContextAccessor;
        let scope = accessor.begin_scope(ctx("org_1"));
        assert!(!scope.is_active());
        assert!(!accessor.current().has_organization());
    }
}
