//! Shape checks run on assignment requests before any storage access.

use crate::{
    error::{Error, Result},
    query::RoleAssignmentSearch,
    scope::ResourceLevel,
};

/// A role the caller wants assigned, tagged with the level the caller
/// believes the role lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleAssignment {
    pub role_id: i64,
    pub level: ResourceLevel,
}

impl RoleAssignment {
    pub fn new(role_id: i64, level: ResourceLevel) -> Self {
        Self { role_id, level }
    }
}

/// One explicit `(role, member)` pair to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleMemberPair {
    pub role_id: i64,
    pub member_id: i64,
}

/// Removal request: either explicit pairs or a search view, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleAssignmentDeleteRequest {
    pub roles_and_members: Option<Vec<RoleMemberPair>>,
    pub view: Option<RoleAssignmentSearch>,
}

impl RoleAssignmentDeleteRequest {
    /// Remove the given `(role_id, member_id)` pairs.
    pub fn pairs(pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self {
            roles_and_members: Some(
                pairs
                    .into_iter()
                    .map(|(role_id, member_id)| RoleMemberPair { role_id, member_id })
                    .collect(),
            ),
            view: None,
        }
    }

    /// Remove every assignment matching a search.
    pub fn view(search: RoleAssignmentSearch) -> Self {
        Self {
            roles_and_members: None,
            view: Some(search),
        }
    }
}

/// Which half of a delete request is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget<'a> {
    Pairs(&'a [RoleMemberPair]),
    View(&'a RoleAssignmentSearch),
}

/// Validate an assign request against the level it targets.
pub fn validate_assignment(
    level: ResourceLevel,
    member_ids: &[i64],
    assignments: &[RoleAssignment],
) -> Result<()> {
    if member_ids.is_empty() {
        return Err(Error::EmptyMemberList);
    }
    if assignments.is_empty() {
        return Err(Error::EmptyRoleList);
    }

    if let Some(bad) = assignments.iter().find(|a| a.level != level) {
        return Err(Error::RoleLevelMismatch {
            role_id: bad.role_id,
            expected: level,
            actual: bad.level,
        });
    }

    Ok(())
}

/// Resolve a delete request into exactly one target.
pub fn validate_delete_request(request: &RoleAssignmentDeleteRequest) -> Result<DeleteTarget<'_>> {
    match (&request.roles_and_members, &request.view) {
        (Some(pairs), None) => Ok(DeleteTarget::Pairs(pairs)),
        (None, Some(view)) => Ok(DeleteTarget::View(view)),
        _ => Err(Error::AmbiguousDeleteView),
    }
}
