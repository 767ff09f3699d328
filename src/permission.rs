//! Permission records.
//!
//! Permissions are read-only here: they are looked up and level-checked when a
//! role is associated with them, never created by the reconciliation engine.

use crate::scope::ResourceLevel;

/// An atomic grantable capability, scoped to one level.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Permission {
    id: i64,
    code: String,
    level: ResourceLevel,
}

impl Permission {
    /// Create a permission record.
    pub fn new(id: i64, code: impl Into<String>, level: ResourceLevel) -> Self {
        Self {
            id,
            code: code.into(),
            level,
        }
    }

    /// Get the permission's identifier.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Get the permission's code (e.g. "iam-service.role.update").
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the level this permission lives at.
    pub fn level(&self) -> ResourceLevel {
        self.level
    }
}
