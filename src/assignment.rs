//! Bulk assignment and removal of member roles at a scope.

#[cfg(feature = "audit")]
use log::{info, warn};

use crate::{
    error::{Error, Result},
    member::MemberRole,
    metrics::RbacMetrics,
    query::matching_assignments,
    reconcile::SetDelta,
    scope::Scope,
    storage::{MemberRoleExample, Storage, Transaction},
    validation::{
        DeleteTarget, RoleAssignment, RoleAssignmentDeleteRequest, validate_assignment,
        validate_delete_request,
    },
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Assigns roles to members and removes them, one scope at a time.
///
/// Each call validates the request shape first and then runs as a single
/// storage unit; a failure anywhere leaves the store untouched.
pub struct MemberRoleService<S> {
    storage: S,
    metrics: Arc<RbacMetrics>,
}

impl<S: Storage> MemberRoleService<S> {
    pub fn new(storage: S) -> Self {
        Self::with_metrics(storage, Arc::new(RbacMetrics::new()))
    }

    pub fn with_metrics(storage: S, metrics: Arc<RbacMetrics>) -> Self {
        Self { storage, metrics }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn metrics(&self) -> &Arc<RbacMetrics> {
        &self.metrics
    }

    /// Assign roles at the site scope.
    pub fn assign_on_site(
        &self,
        is_edit: Option<bool>,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        self.assign(Scope::site(), is_edit, member_ids, assignments)
    }

    /// Assign roles inside one organization.
    pub fn assign_on_organization(
        &self,
        is_edit: Option<bool>,
        organization_id: i64,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        let scope = self.observe("assign", Scope::organization(organization_id))?;
        self.assign(scope, is_edit, member_ids, assignments)
    }

    /// Assign roles inside one project.
    pub fn assign_on_project(
        &self,
        is_edit: Option<bool>,
        project_id: i64,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        let scope = self.observe("assign", Scope::project(project_id))?;
        self.assign(scope, is_edit, member_ids, assignments)
    }

    /// Give every member every requested role at `scope`.
    ///
    /// Pairs that already exist are left alone. With `is_edit` set, roles a
    /// member held at this scope that are not in the request are removed, so
    /// the request becomes the member's complete role set there. Returns
    /// every assignment the members hold at `scope` afterwards, ordered by
    /// member then role.
    pub fn assign(
        &self,
        scope: Scope,
        is_edit: Option<bool>,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        let result = validate_assignment(scope.level(), member_ids, assignments).and_then(|()| {
            self.assign_unit(scope, is_edit.unwrap_or(false), member_ids, assignments)
        });
        self.observe("assign", result)
    }

    /// Remove role assignments at the site scope.
    pub fn unassign_on_site(&self, request: &RoleAssignmentDeleteRequest) -> Result<usize> {
        self.unassign(Scope::site(), request)
    }

    /// Remove role assignments inside one organization.
    pub fn unassign_on_organization(
        &self,
        organization_id: i64,
        request: &RoleAssignmentDeleteRequest,
    ) -> Result<usize> {
        let scope = self.observe("unassign", Scope::organization(organization_id))?;
        self.unassign(scope, request)
    }

    /// Remove role assignments inside one project.
    pub fn unassign_on_project(
        &self,
        project_id: i64,
        request: &RoleAssignmentDeleteRequest,
    ) -> Result<usize> {
        let scope = self.observe("unassign", Scope::project(project_id))?;
        self.unassign(scope, request)
    }

    /// Remove the assignments a request describes at `scope`.
    ///
    /// Pairs that do not exist are skipped. Returns the number of rows removed.
    pub fn unassign(&self, scope: Scope, request: &RoleAssignmentDeleteRequest) -> Result<usize> {
        let result =
            validate_delete_request(request).and_then(|target| self.unassign_unit(scope, target));
        self.observe("unassign", result)
    }

    /// Every assignment a member holds at a scope.
    pub fn member_roles(&self, scope: Scope, member_id: i64) -> Result<Vec<MemberRole>> {
        let tx = self.storage.begin()?;
        let mut rows = tx.select_member_roles(&MemberRoleExample::in_scope(scope).member(member_id))?;
        rows.sort();
        Ok(rows)
    }

    fn assign_unit(
        &self,
        scope: Scope,
        is_edit: bool,
        member_ids: &[i64],
        assignments: &[RoleAssignment],
    ) -> Result<Vec<MemberRole>> {
        let mut tx = self.storage.begin()?;

        let desired: BTreeSet<i64> = assignments.iter().map(|a| a.role_id).collect();
        for &role_id in &desired {
            let role = tx.select_role(role_id)?.ok_or(Error::RoleNotFound(role_id))?;
            if role.level() != scope.level() {
                return Err(Error::RoleLevelMismatch {
                    role_id,
                    expected: scope.level(),
                    actual: role.level(),
                });
            }
        }

        let members: BTreeSet<i64> = member_ids.iter().copied().collect();
        for &member_id in &members {
            if tx.select_member(member_id)?.is_none() {
                return Err(Error::MemberNotFound(member_id));
            }
        }

        let mut assigned = 0;
        let mut removed = 0;
        let mut result = Vec::new();

        for &member_id in &members {
            let in_scope = MemberRoleExample::in_scope(scope).member(member_id);
            let existing = tx
                .select_member_roles(&in_scope)?
                .into_iter()
                .map(|row| row.role_id);
            let delta = SetDelta::compute(existing, desired.iter().copied());

            for &role_id in &delta.insert {
                tx.insert_member_role(MemberRole::new(member_id, role_id, scope))?;
                assigned += 1;
            }
            if is_edit {
                for &role_id in &delta.delete {
                    removed += tx.delete_member_roles(&in_scope.role(role_id))?;
                }
            }

            let mut rows = tx.select_member_roles(&in_scope)?;
            rows.sort();
            result.extend(rows);
        }

        tx.commit()?;

        RbacMetrics::add(&self.metrics.member_roles_assigned, assigned);
        RbacMetrics::add(&self.metrics.member_roles_removed, removed);

        #[cfg(feature = "audit")]
        info!(
            "Assigned roles {:?} to {} member(s) at {} ({} added, {} removed, edit={})",
            desired,
            members.len(),
            scope,
            assigned,
            removed,
            is_edit
        );

        Ok(result)
    }

    fn unassign_unit(&self, scope: Scope, target: DeleteTarget<'_>) -> Result<usize> {
        let mut tx = self.storage.begin()?;

        let examples: Vec<MemberRoleExample> = match target {
            DeleteTarget::Pairs(pairs) => pairs
                .iter()
                .map(|pair| {
                    MemberRoleExample::in_scope(scope)
                        .member(pair.member_id)
                        .role(pair.role_id)
                })
                .collect(),
            DeleteTarget::View(search) => matching_assignments(&tx, scope, search)?
                .into_iter()
                .map(|row| {
                    MemberRoleExample::in_scope(scope)
                        .member(row.member_id)
                        .role(row.role_id)
                })
                .collect(),
        };

        let mut removed = 0;
        for example in &examples {
            removed += tx.delete_member_roles(example)?;
        }

        tx.commit()?;

        RbacMetrics::add(&self.metrics.member_roles_removed, removed);

        #[cfg(feature = "audit")]
        info!("Removed {removed} role assignment(s) at {scope}");

        Ok(removed)
    }

    #[cfg_attr(not(feature = "audit"), allow(unused_variables))]
    fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.record_error(e);

            #[cfg(feature = "audit")]
            warn!("{operation} rejected: {e}");
        }
        result
    }
}
