//! Members (users) and their scoped role assignments.

use crate::scope::{ResourceLevel, Scope};
use serde::Serialize;

/// A user eligible to hold role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "persistence", derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct Member {
    id: i64,
    login_name: String,
    real_name: Option<String>,
    enabled: bool,
}

impl Member {
    /// Create an enabled member.
    pub fn new(id: i64, login_name: impl Into<String>) -> Self {
        Self {
            id,
            login_name: login_name.into(),
            real_name: None,
            enabled: true,
        }
    }

    /// Set the member's real name.
    pub fn with_real_name(mut self, real_name: impl Into<String>) -> Self {
        self.real_name = Some(real_name.into());
        self
    }

    /// Mark the member as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Get the member's unique identifier.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Get the member's login name.
    pub fn login_name(&self) -> &str {
        &self.login_name
    }

    /// Get the member's real name.
    pub fn real_name(&self) -> Option<&str> {
        self.real_name.as_deref()
    }

    /// Check if the member is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// One member holding one role at one scope.
///
/// Unique on `(member_id, role_id, source_type, source_id)`. Never updated in
/// place: reassignment is delete plus insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[cfg_attr(feature = "persistence", derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct MemberRole {
    pub member_id: i64,
    pub role_id: i64,
    pub source_type: ResourceLevel,
    pub source_id: i64,
}

impl MemberRole {
    pub fn new(member_id: i64, role_id: i64, scope: Scope) -> Self {
        Self {
            member_id,
            role_id,
            source_type: scope.level(),
            source_id: scope.source_id(),
        }
    }
}
