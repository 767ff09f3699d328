//! Read views over role assignments.
//!
//! Each view reads one point-in-time snapshot of the store, scoped to a
//! single site, organization or project, and narrowed by a
//! [`RoleAssignmentSearch`].

use crate::{
    error::Result,
    member::{Member, MemberRole},
    role::Role,
    scope::Scope,
    storage::{MemberRoleExample, Storage, Transaction},
};
use std::collections::{BTreeMap, BTreeSet};

/// Filter over the role-assignment listing. Unset fields match everything.
///
/// Name filters are case-insensitive substring matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleAssignmentSearch {
    pub login_name: Option<String>,
    pub real_name: Option<String>,
    pub enabled: Option<bool>,
    pub role_ids: Option<BTreeSet<i64>>,
}

impl RoleAssignmentSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login_name(mut self, login_name: impl Into<String>) -> Self {
        self.login_name = Some(login_name.into());
        self
    }

    pub fn with_real_name(mut self, real_name: impl Into<String>) -> Self {
        self.real_name = Some(real_name.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_role_ids(mut self, role_ids: impl IntoIterator<Item = i64>) -> Self {
        self.role_ids = Some(role_ids.into_iter().collect());
        self
    }

    /// Check the member-side filters.
    pub fn matches_member(&self, member: &Member) -> bool {
        self.login_name
            .as_deref()
            .is_none_or(|needle| contains_ignore_case(member.login_name(), needle))
            && self.real_name.as_deref().is_none_or(|needle| {
                member
                    .real_name()
                    .is_some_and(|name| contains_ignore_case(name, needle))
            })
            && self.enabled.is_none_or(|enabled| member.is_enabled() == enabled)
    }

    /// Check the role-side filter.
    pub fn matches_role(&self, role_id: i64) -> bool {
        self.role_ids
            .as_ref()
            .is_none_or(|role_ids| role_ids.contains(&role_id))
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    /// Create a page request. Zero page numbers and sizes are raised to 1.
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page: page.max(1),
            size: size.max(1),
        }
    }

    fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, size: 20 }
    }
}

/// One page of an ordered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Cut one page out of a fully ordered listing.
    pub fn from_sorted(items: Vec<T>, request: PageRequest) -> Self {
        let request = PageRequest::new(request.page, request.size);
        let total_elements = items.len();
        let content = items
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .collect();

        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages: total_elements.div_ceil(request.size),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A role at a scope with the number of distinct members holding it there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleWithMemberCount {
    pub role: Role,
    pub member_count: usize,
}

/// A member with the roles it holds at a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberWithRoles {
    pub member: Member,
    pub roles: Vec<Role>,
}

/// Query interface over the role-assignment listing of a store.
pub struct RoleAssignmentQuery<'a, S: Storage> {
    storage: &'a S,
}

impl<'a, S: Storage> RoleAssignmentQuery<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// Roles defined at the scope's level with the count of matching members
    /// holding each at this scope, ordered by role id.
    pub fn roles_with_member_count(
        &self,
        scope: Scope,
        search: &RoleAssignmentSearch,
    ) -> Result<Vec<RoleWithMemberCount>> {
        let tx = self.storage.begin()?;
        let assignments = matching_assignments(&tx, scope, search)?;

        let mut members_by_role: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
        for assignment in &assignments {
            members_by_role
                .entry(assignment.role_id)
                .or_default()
                .insert(assignment.member_id);
        }

        Ok(tx
            .select_roles(Some(scope.level()))?
            .into_iter()
            .filter(|role| search.matches_role(role.id()))
            .map(|role| {
                let member_count = members_by_role.get(&role.id()).map_or(0, BTreeSet::len);
                RoleWithMemberCount { role, member_count }
            })
            .collect())
    }

    /// Members holding at least one matching role at the scope, each with
    /// those roles, paged by member id.
    pub fn members_with_roles(
        &self,
        scope: Scope,
        search: &RoleAssignmentSearch,
        page: PageRequest,
    ) -> Result<Page<MemberWithRoles>> {
        let tx = self.storage.begin()?;
        let assignments = matching_assignments(&tx, scope, search)?;

        let mut roles_by_member: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
        for assignment in assignments {
            roles_by_member
                .entry(assignment.member_id)
                .or_default()
                .insert(assignment.role_id);
        }

        let mut listing = Vec::with_capacity(roles_by_member.len());
        for (member_id, role_ids) in roles_by_member {
            let Some(member) = tx.select_member(member_id)? else {
                continue;
            };
            let mut roles = Vec::with_capacity(role_ids.len());
            for role_id in role_ids {
                if let Some(role) = tx.select_role(role_id)? {
                    roles.push(role);
                }
            }
            listing.push(MemberWithRoles { member, roles });
        }

        Ok(Page::from_sorted(listing, page))
    }

    /// Matching members holding one role at the scope, paged by member id.
    pub fn members_by_role(
        &self,
        scope: Scope,
        role_id: i64,
        search: &RoleAssignmentSearch,
        page: PageRequest,
    ) -> Result<Page<Member>> {
        let tx = self.storage.begin()?;
        let member_ids: BTreeSet<i64> = matching_assignments(&tx, scope, search)?
            .into_iter()
            .filter(|assignment| assignment.role_id == role_id)
            .map(|assignment| assignment.member_id)
            .collect();

        let mut members = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            if let Some(member) = tx.select_member(member_id)? {
                members.push(member);
            }
        }

        Ok(Page::from_sorted(members, page))
    }
}

/// Assignments at `scope` whose member and role both satisfy `search`,
/// ordered by member then role.
///
/// Rows left behind by a deleted role are not listed.
pub(crate) fn matching_assignments<T: Transaction>(
    tx: &T,
    scope: Scope,
    search: &RoleAssignmentSearch,
) -> Result<Vec<MemberRole>> {
    let mut matched = Vec::new();
    for assignment in tx.select_member_roles(&MemberRoleExample::in_scope(scope))? {
        if !search.matches_role(assignment.role_id)
            || tx.select_role(assignment.role_id)?.is_none()
        {
            continue;
        }
        let member_matches = tx
            .select_member(assignment.member_id)?
            .is_some_and(|member| search.matches_member(&member));
        if member_matches {
            matched.push(assignment);
        }
    }
    matched.sort();
    Ok(matched)
}
