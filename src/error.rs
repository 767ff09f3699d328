//! Error types for role reconciliation and member-role assignment.

use crate::scope::ResourceLevel;
use thiserror::Error;

/// The main error type for RBAC operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Role with the given id was not found.
    #[error("Role '{0}' not found")]
    RoleNotFound(i64),

    /// Permission with the given id was not found.
    #[error("Permission '{0}' not found")]
    PermissionNotFound(i64),

    /// Label with the given id was not found.
    #[error("Label '{0}' not found")]
    LabelNotFound(i64),

    /// Member with the given id was not found.
    #[error("Member '{0}' not found")]
    MemberNotFound(i64),

    /// A role with the same code already exists.
    #[error("Role code '{0}' already exists")]
    DuplicateCode(String),

    /// The role is built in and cannot be deleted.
    #[error("Role '{0}' is not allowed to be deleted")]
    RoleNotRemovable(i64),

    /// A declared permission reference carries no id.
    #[error("Permission id is required")]
    PermissionIdRequired,

    /// A declared label reference carries no id.
    #[error("Label id is required")]
    LabelIdRequired,

    /// A permission's level differs from the level of the role it is attached to.
    #[error("Role level '{role}' does not equal permission level '{permission}'")]
    LevelMismatch {
        role: ResourceLevel,
        permission: ResourceLevel,
    },

    /// A role assignment targets a scope of a different level than the role.
    #[error("Role '{role_id}' has level '{actual}' but is being assigned at level '{expected}'")]
    RoleLevelMismatch {
        role_id: i64,
        expected: ResourceLevel,
        actual: ResourceLevel,
    },

    /// No member ids were supplied.
    #[error("Member id list must not be empty")]
    EmptyMemberList,

    /// No role assignments were supplied.
    #[error("Role assignment list must not be empty")]
    EmptyRoleList,

    /// A delete request must carry exactly one of explicit pairs or a view predicate.
    #[error("Delete request must specify exactly one of rolesAndMembers or view")]
    AmbiguousDeleteView,

    /// Level and source id are inconsistent.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Malformed role definition.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// The notification publisher rejected the event batch.
    #[error("Notification failed: {0}")]
    NotificationFailure(String),

    /// Storage operation failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A background task did not complete.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

/// Coarse classification of an [`Error`], used by callers to map failures
/// onto responses and by metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced role, permission, label or member is absent.
    NotFound,
    /// Duplicate code or deletion of a protected role.
    Conflict,
    /// The request itself is malformed.
    InvalidRequest,
    /// A downstream collaborator failed; the unit was rolled back.
    DependencyFailure,
    /// Store, configuration or runtime fault.
    Internal,
}

impl ErrorKind {
    /// Stable name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::DependencyFailure => "dependency_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RoleNotFound(_)
            | Error::PermissionNotFound(_)
            | Error::LabelNotFound(_)
            | Error::MemberNotFound(_) => ErrorKind::NotFound,
            Error::DuplicateCode(_) | Error::RoleNotRemovable(_) => ErrorKind::Conflict,
            Error::PermissionIdRequired
            | Error::LabelIdRequired
            | Error::LevelMismatch { .. }
            | Error::RoleLevelMismatch { .. }
            | Error::EmptyMemberList
            | Error::EmptyRoleList
            | Error::AmbiguousDeleteView
            | Error::InvalidScope(_)
            | Error::InvalidRole(_) => ErrorKind::InvalidRequest,
            Error::NotificationFailure(_) => ErrorKind::DependencyFailure,
            Error::Storage(_)
            | Error::InvalidConfiguration(_)
            | Error::Serialization(_)
            | Error::TaskFailed(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias for RBAC operations.
pub type Result<T> = std::result::Result<T, Error>;
