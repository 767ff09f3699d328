//! Async support for the RBAC core (requires 'async' feature).
//!
//! Every unit of work is synchronous and may block on the store or the
//! publisher, so each call runs on tokio's blocking pool.

use crate::{
    batch::{BatchResult, ImportRow},
    core::Rbac,
    error::{Error, Result},
    member::{Member, MemberRole},
    notify::{EventPublisher, NoopPublisher},
    query::{MemberWithRoles, Page, PageRequest, RoleAssignmentSearch, RoleWithMemberCount},
    reconcile::RoleUpdate,
    role::{Role, RoleDefinition},
    scope::Scope,
    storage::{MemoryStorage, Storage},
    validation::{RoleAssignment, RoleAssignmentDeleteRequest},
};
use std::sync::Arc;

/// Async wrapper around [`Rbac`].
pub struct AsyncRbac<S = MemoryStorage, P = NoopPublisher>
where
    S: Storage,
{
    inner: Arc<Rbac<S, P>>,
}

impl<S, P> AsyncRbac<S, P>
where
    S: Storage + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(rbac: Rbac<S, P>) -> Self {
        Self {
            inner: Arc::new(rbac),
        }
    }

    /// The wrapped core, for synchronous access.
    pub fn inner(&self) -> &Rbac<S, P> {
        &self.inner
    }

    /// Run `operation` against the core on the blocking pool.
    pub async fn run<F, R>(&self, operation: F) -> Result<R>
    where
        F: FnOnce(&Rbac<S, P>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || operation(&inner))
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))?
    }

    pub async fn create_role(&self, definition: RoleDefinition) -> Result<Role> {
        self.run(move |rbac| rbac.create_role(&definition)).await
    }

    pub async fn update_role(&self, role_id: i64, definition: RoleDefinition) -> Result<RoleUpdate> {
        self.run(move |rbac| rbac.update_role(role_id, &definition))
            .await
    }

    pub async fn delete_role(&self, role_id: i64) -> Result<()> {
        self.run(move |rbac| rbac.delete_role(role_id)).await
    }

    pub async fn enable_role(&self, role_id: i64) -> Result<Role> {
        self.run(move |rbac| rbac.enable_role(role_id)).await
    }

    pub async fn disable_role(&self, role_id: i64) -> Result<Role> {
        self.run(move |rbac| rbac.disable_role(role_id)).await
    }

    pub async fn get_role(&self, role_id: i64) -> Result<Option<Role>> {
        self.run(move |rbac| rbac.get_role(role_id)).await
    }

    /// Assign roles at any scope.
    pub async fn assign(
        &self,
        scope: Scope,
        is_edit: Option<bool>,
        member_ids: Vec<i64>,
        assignments: Vec<RoleAssignment>,
    ) -> Result<Vec<MemberRole>> {
        self.run(move |rbac| {
            rbac.members()
                .assign(scope, is_edit, &member_ids, &assignments)
        })
        .await
    }

    /// Remove role assignments at any scope.
    pub async fn unassign(
        &self,
        scope: Scope,
        request: RoleAssignmentDeleteRequest,
    ) -> Result<usize> {
        self.run(move |rbac| rbac.members().unassign(scope, &request))
            .await
    }

    pub async fn import(&self, scope: Scope, rows: Vec<ImportRow>) -> Result<BatchResult<MemberRole>> {
        self.run(move |rbac| rbac.import(scope, &rows)).await
    }

    pub async fn roles_with_member_count(
        &self,
        scope: Scope,
        search: RoleAssignmentSearch,
    ) -> Result<Vec<RoleWithMemberCount>> {
        self.run(move |rbac| rbac.query().roles_with_member_count(scope, &search))
            .await
    }

    pub async fn members_with_roles(
        &self,
        scope: Scope,
        search: RoleAssignmentSearch,
        page: PageRequest,
    ) -> Result<Page<MemberWithRoles>> {
        self.run(move |rbac| rbac.query().members_with_roles(scope, &search, page))
            .await
    }

    pub async fn members_by_role(
        &self,
        scope: Scope,
        role_id: i64,
        search: RoleAssignmentSearch,
        page: PageRequest,
    ) -> Result<Page<Member>> {
        self.run(move |rbac| rbac.query().members_by_role(scope, role_id, &search, page))
            .await
    }
}

impl<S, P> Clone for AsyncRbac<S, P>
where
    S: Storage,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
