//! The `Rbac` façade.
//!
//! `Rbac` wires one Association Store into the three services that share it:
//!
//! - the [`RoleReconciler`], which owns role lifecycle and keeps role
//!   permissions and labels in step with role definitions,
//! - the [`MemberRoleService`], which assigns and removes member roles per
//!   scope,
//! - the [`RoleAssignmentQuery`], which serves read views.
//!
//! All three report into one [`RbacMetrics`].

use crate::{
    assignment::MemberRoleService,
    batch::{BatchImport, BatchResult, ImportRow},
    config::RbacConfig,
    error::Result,
    member::MemberRole,
    metrics::RbacMetrics,
    notify::{EventPublisher, NoopPublisher},
    query::RoleAssignmentQuery,
    reconcile::{RoleReconciler, RoleUpdate},
    role::{Role, RoleDefinition},
    scope::Scope,
    storage::{MemoryStorage, Storage},
    validation::{RoleAssignment, RoleAssignmentDeleteRequest},
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Multi-tenant RBAC core over one store.
pub struct Rbac<S = MemoryStorage, P = NoopPublisher>
where
    S: Storage,
{
    storage: Arc<S>,
    roles: RoleReconciler<Arc<S>, P>,
    members: MemberRoleService<Arc<S>>,
}

impl Rbac<MemoryStorage, NoopPublisher> {
    /// Create an in-memory core with default configuration.
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::new(), NoopPublisher, RbacConfig::default())
    }
}

impl Default for Rbac<MemoryStorage, NoopPublisher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P> Rbac<S, P>
where
    S: Storage,
    P: EventPublisher,
{
    /// Create a core over a custom store and publisher.
    pub fn with_storage(storage: S, publisher: P, config: RbacConfig) -> Self {
        let storage = Arc::new(storage);
        let metrics = Arc::new(RbacMetrics::new());

        Self {
            roles: RoleReconciler::with_metrics(
                Arc::clone(&storage),
                publisher,
                config,
                Arc::clone(&metrics),
            ),
            members: MemberRoleService::with_metrics(Arc::clone(&storage), metrics),
            storage,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &RbacConfig {
        self.roles.config()
    }

    pub fn metrics(&self) -> &Arc<RbacMetrics> {
        self.roles.metrics()
    }

    pub fn publisher(&self) -> &P {
        self.roles.publisher()
    }

    /// The role lifecycle service.
    pub fn roles(&self) -> &RoleReconciler<Arc<S>, P> {
        &self.roles
    }

    /// The member-role assignment service.
    pub fn members(&self) -> &MemberRoleService<Arc<S>> {
        &self.members
    }

    /// Read views over role assignments.
    pub fn query(&self) -> RoleAssignmentQuery<'_, Arc<S>> {
        RoleAssignmentQuery::new(&self.storage)
    }

    // Roles

    pub fn create_role(&self, definition: &RoleDefinition) -> Result<Role> {
        self.roles.create_role(definition)
    }

    pub fn update_role(&self, role_id: i64, definition: &RoleDefinition) -> Result<RoleUpdate> {
        self.roles.update_role(role_id, definition)
    }

    pub fn delete_role(&self, role_id: i64) -> Result<()> {
        self.roles.delete_role(role_id)
    }

    pub fn enable_role(&self, role_id: i64) -> Result<Role> {
        self.roles.enable_role(role_id)
    }

    pub fn disable_role(&self, role_id: i64) -> Result<Role> {
        self.roles.disable_role(role_id)
    }

    pub fn get_role(&self, role_id: i64) -> Result<Option<Role>> {
        self.roles.get_role(role_id)
    }

    pub fn role_permission_ids(&self, role_id: i64) -> Result<BTreeSet<i64>> {
        self.roles.permission_ids(role_id)
    }

    pub fn role_label_ids(&self, role_id: i64) -> Result<BTreeSet<i64>> {
        self.roles.label_ids(role_id)
    }

    // Assignments

    pub fn assign_on_site(
        &self,
        is_edit: Option<bool>,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        self.members.assign_on_site(is_edit, member_ids, assignments)
    }

    pub fn assign_on_organization(
        &self,
        is_edit: Option<bool>,
        organization_id: i64,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        self.members
            .assign_on_organization(is_edit, organization_id, member_ids, assignments)
    }

    pub fn assign_on_project(
        &self,
        is_edit: Option<bool>,
        project_id: i64,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        self.members
            .assign_on_project(is_edit, project_id, member_ids, assignments)
    }

    pub fn unassign_on_site(&self, request: &RoleAssignmentDeleteRequest) -> Result<usize> {
        self.members.unassign_on_site(request)
    }

    pub fn unassign_on_organization(
        &self,
        organization_id: i64,
        request: &RoleAssignmentDeleteRequest,
    ) -> Result<usize> {
        self.members.unassign_on_organization(organization_id, request)
    }

    pub fn unassign_on_project(
        &self,
        project_id: i64,
        request: &RoleAssignmentDeleteRequest,
    ) -> Result<usize> {
        self.members.unassign_on_project(project_id, request)
    }

    /// Import `(member, role)` rows as first-time assignments at `scope`.
    pub fn import(&self, scope: Scope, rows: &[ImportRow]) -> Result<BatchResult<MemberRole>> {
        BatchImport::new(&self.members).import(scope, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        label::Label,
        member::Member,
        notify::InMemoryPublisher,
        permission::Permission,
        query::{PageRequest, RoleAssignmentSearch},
        scope::ResourceLevel,
        storage::Transaction,
    };

    fn seed<P: EventPublisher>(rbac: &Rbac<MemoryStorage, P>) {
        let mut tx = rbac.storage().begin().unwrap();
        tx.put_permission(Permission::new(1, "project.read", ResourceLevel::Project));
        tx.put_permission(Permission::new(2, "project.write", ResourceLevel::Project));
        tx.put_label(Label::new(10, "project.gitlab.developer"));
        tx.put_member(Member::new(7, "alice"));
        tx.put_member(Member::new(8, "bob"));
        tx.commit().unwrap();
    }

    #[test]
    fn test_role_lifecycle_through_facade() {
        let rbac = Rbac::new();
        seed(&rbac);

        let role = rbac
            .create_role(
                &RoleDefinition::new("project.dev", ResourceLevel::Project).add_permission(1),
            )
            .unwrap();
        rbac.update_role(
            role.id(),
            &RoleDefinition::new("project.dev", ResourceLevel::Project).add_permissions([1, 2]),
        )
        .unwrap();

        assert_eq!(rbac.role_permission_ids(role.id()).unwrap(), BTreeSet::from([1, 2]));
        assert!(!rbac.disable_role(role.id()).unwrap().is_enabled());
        assert!(rbac.enable_role(role.id()).unwrap().is_enabled());
        rbac.delete_role(role.id()).unwrap();
        assert!(rbac.get_role(role.id()).unwrap().is_none());
    }

    #[test]
    fn test_assignment_and_query_share_store() {
        let rbac = Rbac::new();
        seed(&rbac);
        let role = rbac
            .create_role(&RoleDefinition::new("project.dev", ResourceLevel::Project))
            .unwrap();
        let dev = RoleAssignment::new(role.id(), ResourceLevel::Project);

        rbac.assign_on_project(None, 3, &[7, 8], &[dev]).unwrap();

        let scope = Scope::project(3).unwrap();
        let page = rbac
            .query()
            .members_by_role(scope, role.id(), &RoleAssignmentSearch::new(), PageRequest::default())
            .unwrap();
        assert_eq!(page.total_elements, 2);

        rbac.unassign_on_project(3, &RoleAssignmentDeleteRequest::pairs([(role.id(), 8)]))
            .unwrap();
        let counts = rbac
            .query()
            .roles_with_member_count(scope, &RoleAssignmentSearch::new())
            .unwrap();
        assert_eq!(counts[0].member_count, 1);

        let summary = rbac.metrics().summary();
        assert_eq!(summary.roles_created, 1);
        assert_eq!(summary.member_roles_assigned, 2);
        assert_eq!(summary.member_roles_removed, 1);
    }

    #[test]
    fn test_label_events_reach_publisher() {
        let publisher = InMemoryPublisher::new();
        let rbac = Rbac::with_storage(
            MemoryStorage::new(),
            publisher.clone(),
            RbacConfig::default().with_notifications(true),
        );
        seed(&rbac);
        let role = rbac
            .create_role(&RoleDefinition::new("project.dev", ResourceLevel::Project))
            .unwrap();
        rbac.assign_on_project(
            None,
            3,
            &[7],
            &[RoleAssignment::new(role.id(), ResourceLevel::Project)],
        )
        .unwrap();

        rbac.update_role(
            role.id(),
            &RoleDefinition::new("project.dev", ResourceLevel::Project).add_label(10),
        )
        .unwrap();

        let events = rbac.publisher().published();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload[0].username, "alice");
        assert_eq!(events[0].topic, "memberRole");
    }

    #[test]
    fn test_import_through_facade() {
        let rbac = Rbac::new();
        seed(&rbac);
        let role = rbac
            .create_role(&RoleDefinition::new("project.dev", ResourceLevel::Project))
            .unwrap();

        let result = rbac
            .import(
                Scope::project(3).unwrap(),
                &[ImportRow::from((7, role.id())), ImportRow::from((7, 404))],
            )
            .unwrap();

        assert_eq!(result.successes.len(), 1);
        assert_eq!(result.failures, vec![(1, Error::RoleNotFound(404))]);
    }
}
