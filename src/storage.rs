//! Storage abstractions for roles, permissions, labels, members and their
//! association records.
//!
//! All reads and writes go through a [`Transaction`] obtained from
//! [`Storage::begin`]. Writes are staged inside the unit and become visible
//! only on [`Transaction::commit`]; dropping the unit or calling
//! [`Transaction::rollback`] discards them.

use crate::{
    error::{Error, Result},
    label::Label,
    member::{Member, MemberRole},
    permission::Permission,
    role::{Role, RoleDefinition, RoleLabel, RolePermission},
    scope::{ResourceLevel, Scope},
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError},
    thread::{self, ThreadId},
};

/// Exact-match example over role-permission rows. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolePermissionExample {
    pub role_id: Option<i64>,
    pub permission_id: Option<i64>,
}

impl RolePermissionExample {
    /// All rows of one role.
    pub fn role(role_id: i64) -> Self {
        Self {
            role_id: Some(role_id),
            permission_id: None,
        }
    }

    /// The rows linking one role to one permission.
    pub fn pair(role_id: i64, permission_id: i64) -> Self {
        Self {
            role_id: Some(role_id),
            permission_id: Some(permission_id),
        }
    }

    pub fn matches(&self, row: &RolePermission) -> bool {
        self.role_id.is_none_or(|id| id == row.role_id)
            && self.permission_id.is_none_or(|id| id == row.permission_id)
    }
}

/// Exact-match example over role-label rows. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleLabelExample {
    pub role_id: Option<i64>,
    pub label_id: Option<i64>,
}

impl RoleLabelExample {
    /// All rows of one role.
    pub fn role(role_id: i64) -> Self {
        Self {
            role_id: Some(role_id),
            label_id: None,
        }
    }

    /// The rows linking one role to one label.
    pub fn pair(role_id: i64, label_id: i64) -> Self {
        Self {
            role_id: Some(role_id),
            label_id: Some(label_id),
        }
    }

    pub fn matches(&self, row: &RoleLabel) -> bool {
        self.role_id.is_none_or(|id| id == row.role_id)
            && self.label_id.is_none_or(|id| id == row.label_id)
    }
}

/// Exact-match example over member-role rows. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberRoleExample {
    pub member_id: Option<i64>,
    pub role_id: Option<i64>,
    pub source_type: Option<ResourceLevel>,
    pub source_id: Option<i64>,
}

impl MemberRoleExample {
    /// Every assignment at a scope.
    pub fn in_scope(scope: Scope) -> Self {
        Self {
            source_type: Some(scope.level()),
            source_id: Some(scope.source_id()),
            ..Self::default()
        }
    }

    /// Every assignment of a role at any scope of the given level.
    pub fn role_at_level(role_id: i64, level: ResourceLevel) -> Self {
        Self {
            role_id: Some(role_id),
            source_type: Some(level),
            ..Self::default()
        }
    }

    /// Restrict to one member.
    pub fn member(mut self, member_id: i64) -> Self {
        self.member_id = Some(member_id);
        self
    }

    /// Restrict to one role.
    pub fn role(mut self, role_id: i64) -> Self {
        self.role_id = Some(role_id);
        self
    }

    pub fn matches(&self, row: &MemberRole) -> bool {
        self.member_id.is_none_or(|id| id == row.member_id)
            && self.role_id.is_none_or(|id| id == row.role_id)
            && self.source_type.is_none_or(|level| level == row.source_type)
            && self.source_id.is_none_or(|id| id == row.source_id)
    }
}

/// A store that hands out transactional units.
pub trait Storage: Send + Sync {
    /// The unit of work type.
    type Tx<'a>: Transaction
    where
        Self: 'a;

    /// Begin a unit of work.
    fn begin(&self) -> Result<Self::Tx<'_>>;
}

impl<S: Storage> Storage for Arc<S> {
    type Tx<'a>
        = S::Tx<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>> {
        (**self).begin()
    }
}

/// Select/insert/delete by natural key for every record the core touches.
pub trait Transaction {
    /// Get a role by id.
    fn select_role(&self, id: i64) -> Result<Option<Role>>;

    /// Get a role by its unique code.
    fn select_role_by_code(&self, code: &str) -> Result<Option<Role>>;

    /// List roles, optionally restricted to one level, ordered by id.
    fn select_roles(&self, level: Option<ResourceLevel>) -> Result<Vec<Role>>;

    /// Persist a new role and return it with its assigned id.
    fn insert_role(&mut self, definition: &RoleDefinition) -> Result<Role>;

    /// Overwrite an existing role record.
    fn update_role(&mut self, role: &Role) -> Result<Role>;

    /// Delete a role. Returns whether a row was removed.
    fn delete_role(&mut self, id: i64) -> Result<bool>;

    /// Get a permission by id.
    fn select_permission(&self, id: i64) -> Result<Option<Permission>>;

    /// Get a label by id.
    fn select_label(&self, id: i64) -> Result<Option<Label>>;

    fn select_role_permissions(&self, example: &RolePermissionExample)
    -> Result<Vec<RolePermission>>;

    fn insert_role_permission(&mut self, row: RolePermission) -> Result<()>;

    /// Delete every matching row. Returns the number removed.
    fn delete_role_permissions(&mut self, example: &RolePermissionExample) -> Result<usize>;

    fn select_role_labels(&self, example: &RoleLabelExample) -> Result<Vec<RoleLabel>>;

    fn insert_role_label(&mut self, row: RoleLabel) -> Result<()>;

    /// Delete every matching row. Returns the number removed.
    fn delete_role_labels(&mut self, example: &RoleLabelExample) -> Result<usize>;

    /// Get a member by id.
    fn select_member(&self, id: i64) -> Result<Option<Member>>;

    /// List all members ordered by id.
    fn select_members(&self) -> Result<Vec<Member>>;

    fn select_member_roles(&self, example: &MemberRoleExample) -> Result<Vec<MemberRole>>;

    /// Insert an assignment. Fails if the exact row already exists.
    fn insert_member_role(&mut self, row: MemberRole) -> Result<()>;

    /// Delete every matching row. Returns the number removed.
    fn delete_member_roles(&mut self, example: &MemberRoleExample) -> Result<usize>;

    /// Make every staged write durable and visible.
    fn commit(self) -> Result<()>;

    /// Discard every staged write.
    fn rollback(self) -> Result<()>;

    /// Labels currently associated with a role.
    fn select_labels_by_role(&self, role_id: i64) -> Result<Vec<Label>> {
        let mut labels = Vec::new();
        for row in self.select_role_labels(&RoleLabelExample::role(role_id))? {
            if let Some(label) = self.select_label(row.label_id)? {
                labels.push(label);
            }
        }
        Ok(labels)
    }
}

/// The full table set held by the in-memory and file stores.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Tables {
    roles: BTreeMap<i64, Role>,
    permissions: BTreeMap<i64, Permission>,
    labels: BTreeMap<i64, Label>,
    members: BTreeMap<i64, Member>,
    role_permissions: Vec<RolePermission>,
    role_labels: Vec<RoleLabel>,
    member_roles: Vec<MemberRole>,
    next_role_id: i64,
}

/// In-memory storage. Clones share the same tables.
///
/// A unit holds the store lock from `begin` until it is committed or dropped,
/// so units against one store run one at a time. Opening a second unit (or
/// calling [`MemoryStorage::role_count`]) on the thread that already holds
/// one fails with [`Error::Storage`] instead of blocking.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
    holder: Arc<Mutex<Option<ThreadId>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "persistence")]
    fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
            holder: Arc::default(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        match self.tables.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => {
                if self.held_by_current_thread() {
                    return Err(Error::Storage(
                        "unit already open on this store".to_string(),
                    ));
                }
                self.tables.lock().map_err(|_| poisoned())
            }
            Err(TryLockError::Poisoned(_)) => Err(poisoned()),
        }
    }

    fn held_by_current_thread(&self) -> bool {
        let holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        *holder == Some(thread::current().id())
    }

    fn open(&self) -> Result<MemoryTransaction<'_>> {
        let guard = self.lock()?;
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Ok(MemoryTransaction::new(guard, &self.holder))
    }

    /// Get the number of stored roles.
    pub fn role_count(&self) -> Result<usize> {
        Ok(self.lock()?.roles.len())
    }
}

fn poisoned() -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

impl Storage for MemoryStorage {
    type Tx<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<MemoryTransaction<'_>> {
        self.open()
    }
}

/// A unit of work over [`Tables`]: a private staged copy that replaces the
/// shared tables on commit.
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
    holder: &'a Mutex<Option<ThreadId>>,
    staged: Tables,
    #[cfg(feature = "persistence")]
    persist_to: Option<&'a std::path::Path>,
}

impl<'a> MemoryTransaction<'a> {
    fn new(guard: MutexGuard<'a, Tables>, holder: &'a Mutex<Option<ThreadId>>) -> Self {
        let staged = guard.clone();
        Self {
            guard,
            holder,
            staged,
            #[cfg(feature = "persistence")]
            persist_to: None,
        }
    }

    /// Register or replace a permission.
    pub fn put_permission(&mut self, permission: Permission) {
        self.staged.permissions.insert(permission.id(), permission);
    }

    /// Register or replace a label.
    pub fn put_label(&mut self, label: Label) {
        self.staged.labels.insert(label.id(), label);
    }

    /// Register or replace a member.
    pub fn put_member(&mut self, member: Member) {
        self.staged.members.insert(member.id(), member);
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn select_role(&self, id: i64) -> Result<Option<Role>> {
        Ok(self.staged.roles.get(&id).cloned())
    }

    fn select_role_by_code(&self, code: &str) -> Result<Option<Role>> {
        Ok(self
            .staged
            .roles
            .values()
            .find(|role| role.code() == code)
            .cloned())
    }

    fn select_roles(&self, level: Option<ResourceLevel>) -> Result<Vec<Role>> {
        Ok(self
            .staged
            .roles
            .values()
            .filter(|role| level.is_none_or(|level| role.level() == level))
            .cloned()
            .collect())
    }

    fn insert_role(&mut self, definition: &RoleDefinition) -> Result<Role> {
        self.staged.next_role_id += 1;
        let role = Role::from_definition(self.staged.next_role_id, definition);
        self.staged.roles.insert(role.id(), role.clone());
        Ok(role)
    }

    fn update_role(&mut self, role: &Role) -> Result<Role> {
        match self.staged.roles.get_mut(&role.id()) {
            Some(stored) => {
                *stored = role.clone();
                Ok(role.clone())
            }
            None => Err(Error::RoleNotFound(role.id())),
        }
    }

    fn delete_role(&mut self, id: i64) -> Result<bool> {
        Ok(self.staged.roles.remove(&id).is_some())
    }

    fn select_permission(&self, id: i64) -> Result<Option<Permission>> {
        Ok(self.staged.permissions.get(&id).cloned())
    }

    fn select_label(&self, id: i64) -> Result<Option<Label>> {
        Ok(self.staged.labels.get(&id).cloned())
    }

    fn select_role_permissions(
        &self,
        example: &RolePermissionExample,
    ) -> Result<Vec<RolePermission>> {
        Ok(self
            .staged
            .role_permissions
            .iter()
            .filter(|row| example.matches(row))
            .copied()
            .collect())
    }

    fn insert_role_permission(&mut self, row: RolePermission) -> Result<()> {
        self.staged.role_permissions.push(row);
        Ok(())
    }

    fn delete_role_permissions(&mut self, example: &RolePermissionExample) -> Result<usize> {
        let before = self.staged.role_permissions.len();
        self.staged.role_permissions.retain(|row| !example.matches(row));
        Ok(before - self.staged.role_permissions.len())
    }

    fn select_role_labels(&self, example: &RoleLabelExample) -> Result<Vec<RoleLabel>> {
        Ok(self
            .staged
            .role_labels
            .iter()
            .filter(|row| example.matches(row))
            .copied()
            .collect())
    }

    fn insert_role_label(&mut self, row: RoleLabel) -> Result<()> {
        self.staged.role_labels.push(row);
        Ok(())
    }

    fn delete_role_labels(&mut self, example: &RoleLabelExample) -> Result<usize> {
        let before = self.staged.role_labels.len();
        self.staged.role_labels.retain(|row| !example.matches(row));
        Ok(before - self.staged.role_labels.len())
    }

    fn select_member(&self, id: i64) -> Result<Option<Member>> {
        Ok(self.staged.members.get(&id).cloned())
    }

    fn select_members(&self) -> Result<Vec<Member>> {
        Ok(self.staged.members.values().cloned().collect())
    }

    fn select_member_roles(&self, example: &MemberRoleExample) -> Result<Vec<MemberRole>> {
        Ok(self
            .staged
            .member_roles
            .iter()
            .filter(|row| example.matches(row))
            .copied()
            .collect())
    }

    fn insert_member_role(&mut self, row: MemberRole) -> Result<()> {
        if self.staged.member_roles.contains(&row) {
            return Err(Error::Storage(format!(
                "member role ({}, {}, {}, {}) already exists",
                row.member_id, row.role_id, row.source_type, row.source_id
            )));
        }
        self.staged.member_roles.push(row);
        Ok(())
    }

    fn delete_member_roles(&mut self, example: &MemberRoleExample) -> Result<usize> {
        let before = self.staged.member_roles.len();
        self.staged.member_roles.retain(|row| !example.matches(row));
        Ok(before - self.staged.member_roles.len())
    }

    fn commit(mut self) -> Result<()> {
        #[cfg(feature = "persistence")]
        if let Some(path) = self.persist_to {
            file_storage::save_to_disk(path, &self.staged)?;
        }
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    // Runs before the guard field is released.
    fn drop(&mut self) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// File-based storage implementation (requires persistence feature).
#[cfg(feature = "persistence")]
pub mod file_storage {
    use super::*;
    use std::{
        fs::{File, OpenOptions},
        io::{BufReader, BufWriter},
        path::{Path, PathBuf},
    };

    /// Storage that rewrites a JSON snapshot of every table on each commit.
    #[derive(Debug)]
    pub struct FileStorage {
        storage_path: PathBuf,
        inner: MemoryStorage,
    }

    impl FileStorage {
        /// Open a file store, loading existing data if the file exists.
        pub fn new(storage_path: impl AsRef<Path>) -> Result<Self> {
            let storage_path = storage_path.as_ref().to_path_buf();

            if let Some(parent) = storage_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create storage directory: {e}"))
                })?;
            }

            let tables = load_from_disk(&storage_path)?;

            Ok(Self {
                storage_path,
                inner: MemoryStorage::from_tables(tables),
            })
        }

        /// Get the storage file path.
        pub fn storage_path(&self) -> &Path {
            &self.storage_path
        }

        /// Get the number of stored roles.
        pub fn role_count(&self) -> Result<usize> {
            self.inner.role_count()
        }
    }

    impl Storage for FileStorage {
        type Tx<'a> = MemoryTransaction<'a>;

        fn begin(&self) -> Result<MemoryTransaction<'_>> {
            let mut tx = self.inner.open()?;
            tx.persist_to = Some(&self.storage_path);
            Ok(tx)
        }
    }

    fn load_from_disk(path: &Path) -> Result<Tables> {
        if !path.exists() {
            return Ok(Tables::default());
        }

        let file = File::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open storage file: {e}")))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub(super) fn save_to_disk(path: &Path, tables: &Tables) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::Storage(format!("Failed to create storage file: {e}")))?;

        serde_json::to_writer_pretty(BufWriter::new(file), tables)?;
        Ok(())
    }
}

#[cfg(feature = "persistence")]
pub use file_storage::FileStorage;

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().unwrap();
        tx.put_permission(Permission::new(1, "role.read", ResourceLevel::Project));
        tx.put_label(Label::new(10, "project.gitlab.developer"));
        tx.put_member(Member::new(7, "alice"));
        tx.commit().unwrap();
        storage
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let storage = seeded();

        let mut tx = storage.begin().unwrap();
        let role = tx
            .insert_role(&RoleDefinition::new("dev", ResourceLevel::Project))
            .unwrap();
        tx.insert_role_permission(RolePermission {
            role_id: role.id(),
            permission_id: 1,
        })
        .unwrap();
        tx.commit().unwrap();

        let tx = storage.begin().unwrap();
        assert_eq!(tx.select_role_by_code("dev").unwrap(), Some(role.clone()));
        assert_eq!(
            tx.select_role_permissions(&RolePermissionExample::role(role.id()))
                .unwrap()
                .len(),
            1
        );
        drop(tx);
        assert_eq!(storage.role_count().unwrap(), 1);
    }

    #[test]
    fn test_second_unit_on_same_thread_fails_fast() {
        let storage = seeded();

        let tx = storage.begin().unwrap();
        assert!(matches!(storage.begin(), Err(Error::Storage(_))));
        assert!(matches!(storage.role_count(), Err(Error::Storage(_))));
        drop(tx);

        assert!(storage.begin().is_ok());
        assert_eq!(storage.role_count().unwrap(), 0);
    }

    #[test]
    fn test_other_threads_wait_for_open_unit() {
        use std::{sync::mpsc, time::Duration};

        let storage = seeded();
        let (sender, receiver) = mpsc::channel();

        let mut tx = storage.begin().unwrap();
        tx.insert_role(&RoleDefinition::new("dev", ResourceLevel::Project))
            .unwrap();

        let waiter = {
            let storage = storage.clone();
            thread::spawn(move || {
                let count = storage.role_count();
                sender.send(()).unwrap();
                count
            })
        };

        assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());
        tx.commit().unwrap();

        assert_eq!(waiter.join().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_drop_and_rollback_discard_writes() {
        let storage = seeded();

        {
            let mut tx = storage.begin().unwrap();
            tx.insert_role(&RoleDefinition::new("dropped", ResourceLevel::Site))
                .unwrap();
        }

        let mut tx = storage.begin().unwrap();
        tx.insert_role(&RoleDefinition::new("rolled-back", ResourceLevel::Site))
            .unwrap();
        tx.rollback().unwrap();

        let tx = storage.begin().unwrap();
        assert!(tx.select_roles(None).unwrap().is_empty());
    }

    #[test]
    fn test_query_by_example() {
        let storage = seeded();
        let mut tx = storage.begin().unwrap();
        for (role_id, permission_id) in [(1, 1), (1, 2), (2, 1), (1, 1)] {
            tx.insert_role_permission(RolePermission {
                role_id,
                permission_id,
            })
            .unwrap();
        }

        assert_eq!(
            tx.select_role_permissions(&RolePermissionExample::role(1))
                .unwrap()
                .len(),
            3
        );
        assert_eq!(
            tx.delete_role_permissions(&RolePermissionExample::pair(1, 1))
                .unwrap(),
            2
        );
        assert_eq!(
            tx.select_role_permissions(&RolePermissionExample::default())
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_member_role_uniqueness() {
        let storage = seeded();
        let scope = Scope::project(3).unwrap();
        let mut tx = storage.begin().unwrap();

        tx.insert_member_role(MemberRole::new(7, 1, scope)).unwrap();
        assert!(matches!(
            tx.insert_member_role(MemberRole::new(7, 1, scope)),
            Err(Error::Storage(_))
        ));
        tx.insert_member_role(MemberRole::new(7, 1, Scope::project(4).unwrap()))
            .unwrap();

        let example = MemberRoleExample::role_at_level(1, ResourceLevel::Project);
        assert_eq!(tx.select_member_roles(&example).unwrap().len(), 2);
        assert_eq!(
            tx.select_member_roles(&MemberRoleExample::in_scope(scope).member(7))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_labels_by_role() {
        let storage = seeded();
        let mut tx = storage.begin().unwrap();
        tx.insert_role_label(RoleLabel {
            role_id: 1,
            label_id: 10,
        })
        .unwrap();

        let labels = tx.select_labels_by_role(1).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name(), "project.gitlab.developer");
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_file_storage() {
        use std::env;

        let storage_path = env::temp_dir().join("scoped_rbac_file_storage_test.json");
        let _ = std::fs::remove_file(&storage_path);

        {
            let storage = FileStorage::new(&storage_path).unwrap();
            let mut tx = storage.begin().unwrap();
            tx.put_member(Member::new(1, "bob"));
            tx.insert_role(&RoleDefinition::new("file-test-role", ResourceLevel::Site))
                .unwrap();
            tx.commit().unwrap();
            assert!(storage_path.exists());
        }

        {
            let storage = FileStorage::new(&storage_path).unwrap();
            assert_eq!(storage.role_count().unwrap(), 1);
            let tx = storage.begin().unwrap();
            assert!(tx.select_role_by_code("file-test-role").unwrap().is_some());
            assert_eq!(tx.select_member(1).unwrap().unwrap().login_name(), "bob");
        }

        let _ = std::fs::remove_file(&storage_path);
    }
}
