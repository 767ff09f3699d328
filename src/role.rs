//! Role records, desired role definitions and the role join records.

use crate::scope::ResourceLevel;

/// A stored role.
///
/// `code` and `level` are fixed at creation; built-in roles are not removable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Role {
    id: i64,
    code: String,
    name: String,
    description: Option<String>,
    level: ResourceLevel,
    enabled: bool,
    built_in: bool,
}

impl Role {
    pub(crate) fn from_definition(id: i64, definition: &RoleDefinition) -> Self {
        Self {
            id,
            code: definition.code.clone(),
            name: definition
                .name
                .clone()
                .unwrap_or_else(|| definition.code.clone()),
            description: definition.description.clone(),
            level: definition.level,
            enabled: definition.enabled,
            built_in: definition.built_in,
        }
    }

    /// Get the role's identifier.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Get the role's unique code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the role's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the role's description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the level this role lives at.
    pub fn level(&self) -> ResourceLevel {
        self.level
    }

    /// Check if this role is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check if this role ships with the system.
    pub fn is_built_in(&self) -> bool {
        self.built_in
    }

    /// Whether the role may be deleted.
    pub fn removable(&self) -> bool {
        !self.built_in
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Apply the mutable fields of a definition. Code and level are left untouched.
    pub(crate) fn apply(&mut self, definition: &RoleDefinition) {
        if let Some(name) = &definition.name {
            self.name = name.clone();
        }
        if let Some(description) = &definition.description {
            self.description = Some(description.clone());
        }
    }
}

/// Reference to a permission inside a role definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionRef {
    pub id: Option<i64>,
}

impl From<i64> for PermissionRef {
    fn from(id: i64) -> Self {
        Self { id: Some(id) }
    }
}

/// Reference to a label inside a role definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelRef {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl From<i64> for LabelRef {
    fn from(id: i64) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }
}

/// The desired state of a role: its scalar fields plus the ordered
/// permission and label references it should be associated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinition {
    code: String,
    name: Option<String>,
    description: Option<String>,
    level: ResourceLevel,
    enabled: bool,
    built_in: bool,
    permissions: Vec<PermissionRef>,
    labels: Vec<LabelRef>,
}

impl RoleDefinition {
    /// Start a definition for a role with the given code at the given level.
    pub fn new(code: impl Into<String>, level: ResourceLevel) -> Self {
        Self {
            code: code.into(),
            name: None,
            description: None,
            level,
            enabled: true,
            built_in: false,
            permissions: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the role as built in (non-removable).
    pub fn built_in(mut self) -> Self {
        self.built_in = true;
        self
    }

    /// Create the role disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Declare a permission.
    pub fn add_permission(mut self, permission: impl Into<PermissionRef>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Declare several permissions.
    pub fn add_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionRef>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Declare a label.
    pub fn add_label(mut self, label: impl Into<LabelRef>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Declare several labels.
    pub fn add_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LabelRef>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn level(&self) -> ResourceLevel {
        self.level
    }

    pub fn permissions(&self) -> &[PermissionRef] {
        &self.permissions
    }

    pub fn labels(&self) -> &[LabelRef] {
        &self.labels
    }
}

/// Join record between a role and a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct RolePermission {
    pub role_id: i64,
    pub permission_id: i64,
}

/// Join record between a role and a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleLabel {
    pub role_id: i64,
    pub label_id: i64,
}
