//! Role lifecycle and reconciliation of role associations.
//!
//! A role declares the permissions and labels it should carry. Creating a role
//! inserts one join row per declaration. Updating a role compares the declared
//! id sets against the stored rows and applies only the difference: rows in
//! both are left alone, stored-only rows are deleted and declared-only rows
//! are inserted.
//!
//! Every public operation runs as one storage unit, and operations on the
//! same role are serialized through [`RoleLocks`], so a diff is never computed
//! against a read another unit is about to invalidate.

#[cfg(feature = "audit")]
use log::{debug, info, warn};

use crate::{
    config::RbacConfig,
    error::{Error, Result},
    locks::RoleLocks,
    metrics::RbacMetrics,
    notify::{EventPublisher, MemberRoleEvent, NoopPublisher, NotificationGateway},
    role::{Role, RoleDefinition, RoleLabel, RolePermission},
    scope::compatible_level,
    storage::{RoleLabelExample, RolePermissionExample, Storage, Transaction},
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The minimal change moving a stored id set to a desired one.
///
/// Both lists are sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDelta {
    pub insert: Vec<i64>,
    pub delete: Vec<i64>,
}

impl SetDelta {
    /// Compute the delta between the stored ids and the desired ids.
    pub fn compute(
        existing: impl IntoIterator<Item = i64>,
        desired: impl IntoIterator<Item = i64>,
    ) -> Self {
        let existing: BTreeSet<i64> = existing.into_iter().collect();
        let desired: BTreeSet<i64> = desired.into_iter().collect();
        let intersection: BTreeSet<i64> = existing.intersection(&desired).copied().collect();

        Self {
            insert: desired.difference(&intersection).copied().collect(),
            delete: existing.difference(&intersection).copied().collect(),
        }
    }

    /// True when the stored set already equals the desired set.
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}

/// The outcome of [`RoleReconciler::update_role`].
#[derive(Debug, Clone)]
pub struct RoleUpdate {
    /// The role after the update.
    pub role: Role,
    /// Permission ids linked and unlinked.
    pub permissions: SetDelta,
    /// Label ids linked and unlinked.
    pub labels: SetDelta,
    /// The event published for the label change, if one was published.
    pub event: Option<MemberRoleEvent>,
}

/// Creates, updates, deletes and toggles roles while keeping their
/// permission and label associations consistent.
pub struct RoleReconciler<S, P = NoopPublisher> {
    storage: S,
    config: RbacConfig,
    gateway: NotificationGateway<P>,
    locks: RoleLocks,
    metrics: Arc<RbacMetrics>,
}

impl<S> RoleReconciler<S, NoopPublisher>
where
    S: Storage,
{
    /// Create a reconciler that never publishes events.
    pub fn without_notifications(storage: S) -> Self {
        Self::new(storage, NoopPublisher, RbacConfig::default())
    }
}

impl<S, P> RoleReconciler<S, P>
where
    S: Storage,
    P: EventPublisher,
{
    /// Create a reconciler with its own metrics.
    pub fn new(storage: S, publisher: P, config: RbacConfig) -> Self {
        Self::with_metrics(storage, publisher, config, Arc::new(RbacMetrics::new()))
    }

    /// Create a reconciler reporting into shared metrics.
    pub fn with_metrics(
        storage: S,
        publisher: P,
        config: RbacConfig,
        metrics: Arc<RbacMetrics>,
    ) -> Self {
        let gateway = NotificationGateway::new(publisher, &config, Arc::clone(&metrics));
        Self {
            storage,
            config,
            gateway,
            locks: RoleLocks::new(),
            metrics,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RbacMetrics> {
        &self.metrics
    }

    pub fn publisher(&self) -> &P {
        self.gateway.publisher()
    }

    /// Create a role and link every declared permission and label.
    ///
    /// Declarations are inserted as given; a permission declared twice
    /// yields two rows.
    pub fn create_role(&self, definition: &RoleDefinition) -> Result<Role> {
        self.observe("create_role", self.create_role_unit(definition))
    }

    /// Reconcile a role's scalar fields, permissions and labels against
    /// `definition`. The stored code and level are kept.
    pub fn update_role(&self, role_id: i64, definition: &RoleDefinition) -> Result<RoleUpdate> {
        let result = self
            .locks
            .with_role(role_id, || self.update_role_unit(role_id, definition));
        self.observe("update_role", result)
    }

    /// Delete a removable role along with all of its permission and label rows.
    pub fn delete_role(&self, role_id: i64) -> Result<()> {
        let result = self
            .locks
            .with_role(role_id, || self.delete_role_unit(role_id));
        self.observe("delete_role", result)
    }

    /// Enable a role.
    pub fn enable_role(&self, role_id: i64) -> Result<Role> {
        let result = self
            .locks
            .with_role(role_id, || self.set_enabled_unit(role_id, true));
        self.observe("enable_role", result)
    }

    /// Disable a role.
    pub fn disable_role(&self, role_id: i64) -> Result<Role> {
        let result = self
            .locks
            .with_role(role_id, || self.set_enabled_unit(role_id, false));
        self.observe("disable_role", result)
    }

    /// Get a role by id.
    pub fn get_role(&self, role_id: i64) -> Result<Option<Role>> {
        self.storage.begin()?.select_role(role_id)
    }

    /// The distinct permission ids currently linked to a role.
    pub fn permission_ids(&self, role_id: i64) -> Result<BTreeSet<i64>> {
        let tx = self.storage.begin()?;
        Ok(tx
            .select_role_permissions(&RolePermissionExample::role(role_id))?
            .into_iter()
            .map(|row| row.permission_id)
            .collect())
    }

    /// The distinct label ids currently linked to a role.
    pub fn label_ids(&self, role_id: i64) -> Result<BTreeSet<i64>> {
        let tx = self.storage.begin()?;
        Ok(tx
            .select_role_labels(&RoleLabelExample::role(role_id))?
            .into_iter()
            .map(|row| row.label_id)
            .collect())
    }

    // Units

    fn create_role_unit(&self, definition: &RoleDefinition) -> Result<Role> {
        if definition.code().trim().is_empty() {
            return Err(Error::InvalidRole("role code must not be empty".to_string()));
        }

        let mut tx = self.storage.begin()?;
        if tx.select_role_by_code(definition.code())?.is_some() {
            return Err(Error::DuplicateCode(definition.code().to_string()));
        }

        let role = tx.insert_role(definition)?;

        for permission in definition.permissions() {
            let permission_id = permission.id.ok_or(Error::PermissionIdRequired)?;
            validate_permission(&tx, &role, permission_id)?;
            tx.insert_role_permission(RolePermission {
                role_id: role.id(),
                permission_id,
            })?;
        }

        for label in definition.labels() {
            let label_id = check_label(&tx, label.id)?;
            tx.insert_role_label(RoleLabel {
                role_id: role.id(),
                label_id,
            })?;
        }

        tx.commit()?;

        RbacMetrics::add(&self.metrics.roles_created, 1);
        RbacMetrics::add(
            &self.metrics.permission_links_inserted,
            definition.permissions().len(),
        );
        RbacMetrics::add(&self.metrics.label_links_inserted, definition.labels().len());

        #[cfg(feature = "audit")]
        info!(
            "Role '{}' ({}) created at level '{}' with {} permission(s) and {} label(s)",
            role.code(),
            role.id(),
            role.level(),
            definition.permissions().len(),
            definition.labels().len()
        );

        Ok(role)
    }

    fn update_role_unit(&self, role_id: i64, definition: &RoleDefinition) -> Result<RoleUpdate> {
        let mut tx = self.storage.begin()?;

        let mut role = tx.select_role(role_id)?.ok_or(Error::RoleNotFound(role_id))?;
        role.apply(definition);
        let role = tx.update_role(&role)?;

        let permissions = self.reconcile_permissions(&mut tx, &role, definition)?;

        let desired_labels = definition
            .labels()
            .iter()
            .map(|label| label.id.ok_or(Error::LabelIdRequired))
            .collect::<Result<Vec<_>>>()?;
        let existing_labels = tx
            .select_role_labels(&RoleLabelExample::role(role_id))?
            .into_iter()
            .map(|row| row.label_id);
        let labels = SetDelta::compute(existing_labels, desired_labels);

        let event = if labels.is_empty() {
            None
        } else if self.config.notify_label_changes {
            let event = self.gateway.propagate_label_change(&mut tx, role_id, |tx| {
                apply_label_delta(tx, role_id, &labels)
            });
            match event {
                Ok(event) => Some(event),
                Err(e) => {
                    tx.rollback()?;
                    return Err(e);
                }
            }
        } else {
            apply_label_delta(&mut tx, role_id, &labels)?;
            None
        };

        tx.commit()?;

        RbacMetrics::add(&self.metrics.permission_links_inserted, permissions.insert.len());
        RbacMetrics::add(&self.metrics.permission_links_deleted, permissions.delete.len());
        RbacMetrics::add(&self.metrics.label_links_inserted, labels.insert.len());
        RbacMetrics::add(&self.metrics.label_links_deleted, labels.delete.len());

        #[cfg(feature = "audit")]
        info!(
            "Role '{}' updated: permissions +{:?} -{:?}, labels +{:?} -{:?}",
            role.code(),
            permissions.insert,
            permissions.delete,
            labels.insert,
            labels.delete
        );

        Ok(RoleUpdate {
            role,
            permissions,
            labels,
            event,
        })
    }

    fn reconcile_permissions(
        &self,
        tx: &mut S::Tx<'_>,
        role: &Role,
        definition: &RoleDefinition,
    ) -> Result<SetDelta> {
        let desired = definition
            .permissions()
            .iter()
            .map(|permission| permission.id.ok_or(Error::PermissionIdRequired))
            .collect::<Result<Vec<_>>>()?;
        let existing = tx
            .select_role_permissions(&RolePermissionExample::role(role.id()))?
            .into_iter()
            .map(|row| row.permission_id);
        let delta = SetDelta::compute(existing, desired);

        for &permission_id in &delta.insert {
            validate_permission(&*tx, role, permission_id)?;
        }

        for &permission_id in &delta.insert {
            tx.insert_role_permission(RolePermission {
                role_id: role.id(),
                permission_id,
            })?;
        }
        for &permission_id in &delta.delete {
            let removed =
                tx.delete_role_permissions(&RolePermissionExample::pair(role.id(), permission_id))?;

            #[cfg(feature = "audit")]
            debug!(
                "Unlinked permission {} from role {} ({} row(s))",
                permission_id,
                role.id(),
                removed
            );
            #[cfg(not(feature = "audit"))]
            let _ = removed;
        }

        Ok(delta)
    }

    fn delete_role_unit(&self, role_id: i64) -> Result<()> {
        let mut tx = self.storage.begin()?;

        let role = tx.select_role(role_id)?.ok_or(Error::RoleNotFound(role_id))?;
        if !role.removable() {
            return Err(Error::RoleNotRemovable(role_id));
        }

        tx.delete_role(role_id)?;
        let permissions = tx.delete_role_permissions(&RolePermissionExample::role(role_id))?;
        let labels = tx.delete_role_labels(&RoleLabelExample::role(role_id))?;
        tx.commit()?;

        RbacMetrics::add(&self.metrics.roles_deleted, 1);
        RbacMetrics::add(&self.metrics.permission_links_deleted, permissions);
        RbacMetrics::add(&self.metrics.label_links_deleted, labels);

        #[cfg(feature = "audit")]
        info!(
            "Role '{}' ({}) deleted with {} permission row(s) and {} label row(s)",
            role.code(),
            role_id,
            permissions,
            labels
        );

        Ok(())
    }

    fn set_enabled_unit(&self, role_id: i64, enabled: bool) -> Result<Role> {
        let mut tx = self.storage.begin()?;

        let mut role = tx.select_role(role_id)?.ok_or(Error::RoleNotFound(role_id))?;
        role.set_enabled(enabled);
        let role = tx.update_role(&role)?;
        tx.commit()?;

        #[cfg(feature = "audit")]
        info!(
            "Role '{}' {}",
            role.code(),
            if enabled { "enabled" } else { "disabled" }
        );

        Ok(role)
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

/// Check that a permission exists and sits at the role's level.
fn validate_permission<T: Transaction>(tx: &T, role: &Role, permission_id: i64) -> Result<()> {
    let permission = tx
        .select_permission(permission_id)?
        .ok_or(Error::PermissionNotFound(permission_id))?;

    if !compatible_level(permission.level(), role.level()) {
        return Err(Error::LevelMismatch {
            role: role.level(),
            permission: permission.level(),
        });
    }

    Ok(())
}

/// Check that a label reference carries an id that resolves.
fn check_label<T: Transaction>(tx: &T, label_id: Option<i64>) -> Result<i64> {
    let label_id = label_id.ok_or(Error::LabelIdRequired)?;
    if tx.select_label(label_id)?.is_none() {
        return Err(Error::LabelNotFound(label_id));
    }
    Ok(label_id)
}

/// Stage a label delta, validating every id on both sides.
fn apply_label_delta<T: Transaction>(tx: &mut T, role_id: i64, delta: &SetDelta) -> Result<()> {
    for &label_id in &delta.insert {
        check_label(&*tx, Some(label_id))?;
        tx.insert_role_label(RoleLabel { role_id, label_id })?;
    }
    for &label_id in &delta.delete {
        check_label(&*tx, Some(label_id))?;
        tx.delete_role_labels(&RoleLabelExample::pair(role_id, label_id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        label::Label,
        member::{Member, MemberRole},
        notify::{InMemoryPublisher, LogPublisher},
        role::LabelRef,
        permission::Permission,
        scope::{ResourceLevel, Scope},
        storage::MemoryStorage,
    };

    fn fixture() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().unwrap();
        for (id, level) in [
            (1, ResourceLevel::Project),
            (2, ResourceLevel::Project),
            (3, ResourceLevel::Project),
            (4, ResourceLevel::Organization),
            (5, ResourceLevel::Site),
        ] {
            tx.put_permission(Permission::new(id, format!("perm.{id}"), level));
        }
        tx.put_label(Label::new(10, "project.gitlab.developer"));
        tx.put_label(Label::new(11, "project.gitlab.owner"));
        tx.put_member(Member::new(7, "alice"));
        tx.commit().unwrap();
        storage
    }

    fn project_role(code: &str) -> RoleDefinition {
        RoleDefinition::new(code, ResourceLevel::Project)
    }

    #[test]
    fn test_set_delta() {
        let delta = SetDelta::compute([1, 2], [2, 3]);
        assert_eq!(delta.insert, vec![3]);
        assert_eq!(delta.delete, vec![1]);

        let same = SetDelta::compute([3, 1, 1], [1, 3]);
        assert!(same.is_empty());

        let from_empty = SetDelta::compute([], [5, 4, 5]);
        assert_eq!(from_empty.insert, vec![4, 5]);
        assert!(from_empty.delete.is_empty());
    }

    #[test]
    fn test_create_role_links_declarations() {
        let reconciler = RoleReconciler::without_notifications(fixture());

        let role = reconciler
            .create_role(&project_role("dev").add_permissions([1, 2]).add_label(10))
            .unwrap();

        assert_eq!(
            reconciler.permission_ids(role.id()).unwrap(),
            BTreeSet::from([1, 2])
        );
        assert_eq!(reconciler.label_ids(role.id()).unwrap(), BTreeSet::from([10]));
        assert_eq!(reconciler.metrics().summary().roles_created, 1);
    }

    #[test]
    fn test_create_role_keeps_duplicate_declarations() {
        let storage = fixture();
        let reconciler = RoleReconciler::without_notifications(storage.clone());

        let role = reconciler
            .create_role(&project_role("dup").add_permissions([1, 1]))
            .unwrap();

        let tx = storage.begin().unwrap();
        let rows = tx
            .select_role_permissions(&RolePermissionExample::role(role.id()))
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_create_role_rejections() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        reconciler.create_role(&project_role("taken")).unwrap();

        assert_eq!(
            reconciler.create_role(&project_role("taken")).unwrap_err(),
            Error::DuplicateCode("taken".to_string())
        );
        assert_eq!(
            reconciler
                .create_role(&project_role("missing").add_permission(99))
                .unwrap_err(),
            Error::PermissionNotFound(99)
        );
        assert_eq!(
            reconciler
                .create_role(&project_role("wrong-level").add_permission(4))
                .unwrap_err(),
            Error::LevelMismatch {
                role: ResourceLevel::Project,
                permission: ResourceLevel::Organization,
            }
        );
        assert_eq!(
            reconciler
                .create_role(&project_role("no-label-id").add_label(LabelRef {
                    id: None,
                    name: Some("orphan".to_string()),
                }))
                .unwrap_err(),
            Error::LabelIdRequired
        );
        assert_eq!(
            reconciler
                .create_role(&project_role("unknown-label").add_label(42))
                .unwrap_err(),
            Error::LabelNotFound(42)
        );
        assert!(matches!(
            reconciler.create_role(&project_role("  ")),
            Err(Error::InvalidRole(_))
        ));
    }

    #[test]
    fn test_failed_create_persists_nothing() {
        let storage = fixture();
        let reconciler = RoleReconciler::without_notifications(storage.clone());

        reconciler
            .create_role(&project_role("half").add_permissions([1, 4]))
            .unwrap_err();

        let tx = storage.begin().unwrap();
        assert!(tx.select_role_by_code("half").unwrap().is_none());
        assert!(tx
            .select_role_permissions(&RolePermissionExample::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_update_role_applies_minimal_delta() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        let role = reconciler
            .create_role(&project_role("r1").add_permissions([1, 2]))
            .unwrap();

        let update = reconciler
            .update_role(role.id(), &project_role("r1").add_permissions([2, 3]))
            .unwrap();

        assert_eq!(update.permissions.insert, vec![3]);
        assert_eq!(update.permissions.delete, vec![1]);
        assert_eq!(
            reconciler.permission_ids(role.id()).unwrap(),
            BTreeSet::from([2, 3])
        );

        let again = reconciler
            .update_role(role.id(), &project_role("r1").add_permissions([3, 2]))
            .unwrap();
        assert!(again.permissions.is_empty());
        assert!(again.labels.is_empty());
    }

    #[test]
    fn test_update_role_keeps_code_and_level() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        let role = reconciler.create_role(&project_role("stable")).unwrap();

        let update = reconciler
            .update_role(
                role.id(),
                &RoleDefinition::new("other", ResourceLevel::Site).with_name("Stable Role"),
            )
            .unwrap();

        assert_eq!(update.role.code(), "stable");
        assert_eq!(update.role.level(), ResourceLevel::Project);
        assert_eq!(update.role.name(), "Stable Role");
    }

    #[test]
    fn test_update_role_rejects_level_mismatch_atomically() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        let role = reconciler
            .create_role(&project_role("r").add_permission(1).add_label(10))
            .unwrap();

        let err = reconciler
            .update_role(role.id(), &project_role("r").add_permissions([2, 5]).add_label(11))
            .unwrap_err();

        assert!(matches!(err, Error::LevelMismatch { .. }));
        assert_eq!(reconciler.permission_ids(role.id()).unwrap(), BTreeSet::from([1]));
        assert_eq!(reconciler.label_ids(role.id()).unwrap(), BTreeSet::from([10]));
    }

    #[test]
    fn test_update_missing_role() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        assert_eq!(
            reconciler.update_role(404, &project_role("x")).unwrap_err(),
            Error::RoleNotFound(404)
        );
    }

    #[test]
    fn test_label_change_publishes_when_enabled() {
        let storage = fixture();
        let publisher = InMemoryPublisher::new();
        let reconciler = RoleReconciler::new(
            storage.clone(),
            publisher.clone(),
            RbacConfig::default().with_notifications(true),
        );
        let role = reconciler.create_role(&project_role("dev").add_label(10)).unwrap();

        let mut tx = storage.begin().unwrap();
        tx.insert_member_role(MemberRole::new(7, role.id(), Scope::project(100).unwrap()))
            .unwrap();
        tx.commit().unwrap();

        let update = reconciler
            .update_role(role.id(), &project_role("dev").add_labels([10, 11]))
            .unwrap();

        let event = update.event.expect("label change should publish");
        assert_eq!(event.payload.len(), 1);
        assert_eq!(event.payload[0].username, "alice");
        assert_eq!(event.payload[0].resource_id, 100);
        assert_eq!(
            event.payload[0].role_labels,
            BTreeSet::from([
                "project.gitlab.developer".to_string(),
                "project.gitlab.owner".to_string()
            ])
        );
        assert_eq!(publisher.published().len(), 1);
    }

    #[test]
    fn test_publish_failure_rolls_back_everything() {
        let publisher = InMemoryPublisher::new();
        let reconciler = RoleReconciler::new(
            fixture(),
            publisher.clone(),
            RbacConfig::default().with_notifications(true),
        );
        let role = reconciler
            .create_role(&project_role("dev").add_permission(1).add_label(10))
            .unwrap();

        publisher.set_failing(true);
        let err = reconciler
            .update_role(role.id(), &project_role("dev").add_permission(2).add_label(11))
            .unwrap_err();

        assert!(matches!(err, Error::NotificationFailure(_)));
        assert_eq!(reconciler.label_ids(role.id()).unwrap(), BTreeSet::from([10]));
        assert_eq!(reconciler.permission_ids(role.id()).unwrap(), BTreeSet::from([1]));
        assert_eq!(reconciler.metrics().summary().notifications_failed, 1);
    }

    #[test]
    fn test_label_change_without_flag_skips_publisher() {
        let publisher = InMemoryPublisher::new();
        publisher.set_failing(true);
        let reconciler = RoleReconciler::new(fixture(), publisher.clone(), RbacConfig::default());
        let role = reconciler.create_role(&project_role("dev")).unwrap();

        let update = reconciler
            .update_role(role.id(), &project_role("dev").add_label(11))
            .unwrap();

        assert!(update.event.is_none());
        assert_eq!(reconciler.label_ids(role.id()).unwrap(), BTreeSet::from([11]));
    }

    #[test]
    fn test_delete_role_cascades() {
        let storage = fixture();
        let reconciler = RoleReconciler::without_notifications(storage.clone());
        let role = reconciler
            .create_role(&project_role("gone").add_permissions([1, 2]).add_label(10))
            .unwrap();

        reconciler.delete_role(role.id()).unwrap();

        assert!(reconciler.get_role(role.id()).unwrap().is_none());
        assert!(reconciler.permission_ids(role.id()).unwrap().is_empty());
        assert!(reconciler.label_ids(role.id()).unwrap().is_empty());
        assert_eq!(
            reconciler.delete_role(role.id()).unwrap_err(),
            Error::RoleNotFound(role.id())
        );
    }

    #[test]
    fn test_built_in_role_is_protected() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        let role = reconciler
            .create_role(&project_role("owner").built_in().add_permission(1).add_label(10))
            .unwrap();

        assert_eq!(
            reconciler.delete_role(role.id()).unwrap_err(),
            Error::RoleNotRemovable(role.id())
        );
        assert!(reconciler.get_role(role.id()).unwrap().is_some());
        assert_eq!(reconciler.permission_ids(role.id()).unwrap(), BTreeSet::from([1]));
        assert_eq!(reconciler.label_ids(role.id()).unwrap(), BTreeSet::from([10]));
    }

    #[test]
    fn test_enable_and_disable() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        let role = reconciler.create_role(&project_role("toggle")).unwrap();

        assert!(!reconciler.disable_role(role.id()).unwrap().is_enabled());
        assert!(!reconciler.get_role(role.id()).unwrap().unwrap().is_enabled());
        assert!(reconciler.enable_role(role.id()).unwrap().is_enabled());
        assert_eq!(reconciler.enable_role(99).unwrap_err(), Error::RoleNotFound(99));
        assert_eq!(reconciler.disable_role(99).unwrap_err(), Error::RoleNotFound(99));
    }

    #[test]
    fn test_rejected_calls_leave_no_lease_entries() {
        let reconciler = RoleReconciler::without_notifications(fixture());
        let owner = reconciler
            .create_role(&project_role("owner").built_in())
            .unwrap();

        for role_id in 1000..1100 {
            assert!(reconciler.enable_role(role_id).is_err());
            assert!(reconciler.disable_role(role_id).is_err());
            assert!(reconciler.update_role(role_id, &project_role("x")).is_err());
            assert!(reconciler.delete_role(role_id).is_err());
        }
        assert!(reconciler.delete_role(owner.id()).is_err());
        reconciler.enable_role(owner.id()).unwrap();

        assert!(reconciler.locks.is_empty());
    }

    #[test]
    fn test_operations_fail_fast_while_unit_is_open() {
        let storage = fixture();
        let reconciler = RoleReconciler::without_notifications(storage.clone());
        let role = reconciler.create_role(&project_role("dev")).unwrap();

        let tx = storage.begin().unwrap();
        assert!(matches!(
            reconciler.create_role(&project_role("other")),
            Err(Error::Storage(_))
        ));
        assert!(matches!(
            reconciler.update_role(role.id(), &project_role("dev").add_permission(1)),
            Err(Error::Storage(_))
        ));
        assert!(matches!(reconciler.get_role(role.id()), Err(Error::Storage(_))));
        drop(tx);

        reconciler
            .update_role(role.id(), &project_role("dev").add_permission(1))
            .unwrap();
        assert_eq!(reconciler.permission_ids(role.id()).unwrap(), BTreeSet::from([1]));
    }

    #[test]
    fn test_label_change_through_log_publisher() {
        let storage = fixture();
        let reconciler = RoleReconciler::new(
            storage.clone(),
            LogPublisher,
            RbacConfig::default().with_notifications(true),
        );
        let role = reconciler.create_role(&project_role("dev")).unwrap();

        let mut tx = storage.begin().unwrap();
        tx.insert_member_role(MemberRole::new(7, role.id(), Scope::project(3).unwrap()))
            .unwrap();
        tx.commit().unwrap();

        let update = reconciler
            .update_role(role.id(), &project_role("dev").add_label(11))
            .unwrap();

        assert_eq!(update.event.unwrap().payload[0].username, "alice");
        assert_eq!(reconciler.metrics().summary().notifications_published, 1);
    }
}
