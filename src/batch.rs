//! Bulk import of `(member, role)` rows into one scope.

#[cfg(feature = "audit")]
use log::info;

use crate::{
    assignment::MemberRoleService,
    error::{Error, Result},
    member::MemberRole,
    scope::Scope,
    storage::{Storage, Transaction},
    validation::RoleAssignment,
};
use std::collections::BTreeMap;

/// Result of a batch operation
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    /// Successful rows with their results, by row index
    pub successes: Vec<(usize, T)>,
    /// Failed rows with their errors, by row index
    pub failures: Vec<(usize, Error)>,
}

impl<T> BatchResult<T> {
    /// Create a new empty batch result
    pub fn new() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Add a successful result
    pub fn add_success(&mut self, index: usize, result: T) {
        self.successes.push((index, result));
    }

    /// Add a failed result
    pub fn add_failure(&mut self, index: usize, error: Error) {
        self.failures.push((index, error));
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 {
            return 0.0;
        }
        (self.successes.len() as f64 / total as f64) * 100.0
    }

    /// Check if all rows succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Get total number of rows
    pub fn total_operations(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    fn sort_by_index(&mut self) {
        self.successes.sort_by_key(|(index, _)| *index);
        self.failures.sort_by_key(|(index, _)| *index);
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One imported row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportRow {
    pub member_id: i64,
    pub role_id: i64,
}

impl From<(i64, i64)> for ImportRow {
    fn from((member_id, role_id): (i64, i64)) -> Self {
        Self { member_id, role_id }
    }
}

/// Feeds imported rows to [`MemberRoleService::assign`] as first-time
/// assignments, one call per member.
pub struct BatchImport<'a, S: Storage> {
    service: &'a MemberRoleService<S>,
}

impl<'a, S: Storage> BatchImport<'a, S> {
    pub fn new(service: &'a MemberRoleService<S>) -> Self {
        Self { service }
    }

    /// Import rows into `scope`.
    ///
    /// Rows naming an unknown member, an unknown role or a role from another
    /// level are reported as failures and skipped. The remaining rows are
    /// assigned per member; if a member's assignment fails, all of that
    /// member's rows fail with the same error.
    pub fn import(&self, scope: Scope, rows: &[ImportRow]) -> Result<BatchResult<MemberRole>> {
        let mut result = BatchResult::new();
        let mut by_member: BTreeMap<i64, Vec<(usize, i64)>> = BTreeMap::new();

        {
            let tx = self.service.storage().begin()?;
            for (index, row) in rows.iter().enumerate() {
                match check_row(&tx, scope, row) {
                    Ok(()) => by_member
                        .entry(row.member_id)
                        .or_default()
                        .push((index, row.role_id)),
                    Err(error) => result.add_failure(index, error),
                }
            }
        }

        for (member_id, entries) in by_member {
            let assignments: Vec<RoleAssignment> = entries
                .iter()
                .map(|&(_, role_id)| RoleAssignment::new(role_id, scope.level()))
                .collect();

            match self
                .service
                .assign(scope, Some(false), &[member_id], &assignments)
            {
                Ok(_) => {
                    for (index, role_id) in entries {
                        result.add_success(index, MemberRole::new(member_id, role_id, scope));
                    }
                }
                Err(error) => {
                    for (index, _) in entries {
                        result.add_failure(index, error.clone());
                    }
                }
            }
        }

        result.sort_by_index();

        #[cfg(feature = "audit")]
        info!(
            "Imported {} of {} row(s) at {}",
            result.successes.len(),
            rows.len(),
            scope
        );

        Ok(result)
    }
}

fn check_row<T: Transaction>(tx: &T, scope: Scope, row: &ImportRow) -> Result<()> {
    if tx.select_member(row.member_id)?.is_none() {
        return Err(Error::MemberNotFound(row.member_id));
    }
    let role = tx
        .select_role(row.role_id)?
        .ok_or(Error::RoleNotFound(row.role_id))?;
    if role.level() != scope.level() {
        return Err(Error::RoleLevelMismatch {
            role_id: row.role_id,
            expected: scope.level(),
            actual: role.level(),
        });
    }
    Ok(())
}
